//! Metered generation integration tests.

mod common;

use std::sync::Arc;

use axum::http::StatusCode;
use common::{StubProvider, TestHarness, STUB_TEXT};
use copyforge_core::Plan;
use copyforge_providers::{ChatCompletionsProvider, Provider, ProviderError};
use serde_json::json;
use wiremock::matchers::{bearer_token, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn post_body() -> serde_json::Value {
    json!({
        "prompt": "our new espresso blend",
        "platform": "twitter"
    })
}

async fn entries(harness: &TestHarness) -> Vec<serde_json::Value> {
    let body: serde_json::Value = harness
        .server
        .get("/v1/credits/entries")
        .add_header("authorization", harness.user_auth_header())
        .await
        .json();
    body["entries"].as_array().cloned().unwrap_or_default()
}

// ============================================================================
// Charging
// ============================================================================

#[tokio::test]
async fn generate_charges_once_and_returns_text() {
    let harness = TestHarness::new();
    harness.open_account(Plan::Basic).await;

    let response = harness
        .server
        .post("/v1/generate")
        .add_header("authorization", harness.plan_auth_header(Plan::Basic))
        .add_header("idempotency-key", "post-1")
        .json(&post_body())
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["text"], STUB_TEXT);
    assert_eq!(body["provider"], "stub");
    assert_eq!(body["platform"], "twitter");
    assert_eq!(body["idempotency_key"], "post-1");
    assert_eq!(body["cost"], 10);
    assert_eq!(body["available"], 490);
    assert_eq!(body["low_balance"], false);

    let balance = harness.balance(Plan::Basic).await;
    assert_eq!(balance["balance"], 490);
    assert_eq!(balance["reserved"], 0);
}

#[tokio::test]
async fn generate_opens_account_on_first_use() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/v1/generate")
        .add_header("authorization", harness.plan_auth_header(Plan::Pro))
        .json(&post_body())
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["available"], 2990);
    assert!(!body["idempotency_key"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn replayed_key_returns_stored_result_without_charging() {
    let provider = StubProvider::ok("stub", "only once");
    let harness = TestHarness::with_providers(vec![provider.clone() as Arc<dyn Provider>]);
    harness.open_account(Plan::Basic).await;

    let mut texts = Vec::new();
    let mut costs = Vec::new();
    for _ in 0..2 {
        let response = harness
            .server
            .post("/v1/generate")
            .add_header("authorization", harness.plan_auth_header(Plan::Basic))
            .json(&json!({
                "prompt": "launch day",
                "idempotency_key": "retry-me"
            }))
            .await;
        response.assert_status_ok();
        let body: serde_json::Value = response.json();
        texts.push(body["text"].clone());
        costs.push(body["cost"].clone());
        assert_eq!(body["available"], 490);
    }

    assert_eq!(texts[0], "only once");
    assert_eq!(texts[0], texts[1]);
    assert_eq!(costs, vec![json!(10), json!(0)]);
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn generate_keeps_the_stored_plan() {
    let harness = TestHarness::new();
    harness.open_account(Plan::Pro).await;

    // A token minted before the upgrade still says basic
    for i in 0..2 {
        let response = harness
            .server
            .post("/v1/generate")
            .add_header("authorization", harness.plan_auth_header(Plan::Basic))
            .add_header("idempotency-key", format!("old-token-{i}"))
            .json(&post_body())
            .await;
        response.assert_status_ok();
    }

    let balance = harness.balance(Plan::Pro).await;
    assert_eq!(balance["plan"], "pro");
    assert_eq!(balance["balance"], 2980);

    let grants = entries(&harness)
        .await
        .into_iter()
        .filter(|e| e["kind"] == "grant")
        .count();
    assert_eq!(grants, 1);
}

#[tokio::test]
async fn freemium_generates_without_debit() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/v1/generate")
        .add_header("authorization", harness.user_auth_header())
        .json(&post_body())
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["cost"], 0);
    assert_eq!(body["available"], 0);
    assert_eq!(body["low_balance"], false);
    assert!(entries(&harness).await.is_empty());
}

#[tokio::test]
async fn insufficient_credits_is_payment_required() {
    let provider = StubProvider::ok("stub", "unused");
    let harness = TestHarness::with_providers(vec![provider.clone() as Arc<dyn Provider>]);
    harness.open_funded_account(5).await;

    let response = harness
        .server
        .post("/v1/generate")
        .add_header("authorization", harness.plan_auth_header(Plan::Enterprise))
        .json(&post_body())
        .await;

    response.assert_status(StatusCode::PAYMENT_REQUIRED);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], "insufficient_credits");
    assert_eq!(body["error"]["details"]["available"], 5);
    assert_eq!(body["error"]["details"]["required"], 10);
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn low_balance_is_flagged_after_charge() {
    let harness = TestHarness::new();
    harness.open_funded_account(25).await;

    let response = harness
        .server
        .post("/v1/generate")
        .add_header("authorization", harness.plan_auth_header(Plan::Enterprise))
        .json(&post_body())
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["available"], 15);
    assert_eq!(body["low_balance"], true);
}

#[tokio::test]
async fn key_used_by_another_account_conflicts() {
    let harness = TestHarness::new();
    harness.open_account(Plan::Basic).await;

    harness
        .server
        .post("/v1/generate")
        .add_header("authorization", harness.plan_auth_header(Plan::Basic))
        .add_header("idempotency-key", "shared")
        .json(&post_body())
        .await
        .assert_status_ok();

    let response = harness
        .server
        .post("/v1/generate")
        .add_header(
            "authorization",
            format!("{}:basic", TestHarness::other_user_auth_header()),
        )
        .add_header("idempotency-key", "shared")
        .json(&post_body())
        .await;

    response.assert_status(StatusCode::CONFLICT);
}

// ============================================================================
// Provider Failures
// ============================================================================

#[tokio::test]
async fn provider_failure_releases_reservation() {
    let harness = TestHarness::with_providers(vec![StubProvider::failing(
        "stub",
        ProviderError::Unavailable("status 500".into()),
    )]);
    harness.open_account(Plan::Basic).await;

    let response = harness
        .server
        .post("/v1/generate")
        .add_header("authorization", harness.plan_auth_header(Plan::Basic))
        .add_header("idempotency-key", "doomed")
        .json(&post_body())
        .await;

    response.assert_status(StatusCode::BAD_GATEWAY);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], "external_service_error");

    let balance = harness.balance(Plan::Basic).await;
    assert_eq!(balance["balance"], 500);
    assert_eq!(balance["reserved"], 0);

    // Reversed charge plus its compensation, above the plan grant.
    let entries = entries(&harness).await;
    assert_eq!(entries.len(), 3);
    let kinds: Vec<_> = entries.iter().map(|e| e["kind"].as_str().unwrap()).collect();
    assert!(kinds.contains(&"compensation"));
    assert!(entries
        .iter()
        .any(|e| e["kind"] == "charge" && e["status"] == "reversed"));
}

#[tokio::test]
async fn released_key_can_be_retried() {
    let harness = TestHarness::with_providers(vec![StubProvider::failing(
        "stub",
        ProviderError::Unavailable("down".into()),
    )]);
    harness.open_account(Plan::Basic).await;

    for _ in 0..2 {
        harness
            .server
            .post("/v1/generate")
            .add_header("authorization", harness.plan_auth_header(Plan::Basic))
            .add_header("idempotency-key", "again")
            .json(&post_body())
            .await
            .assert_status(StatusCode::BAD_GATEWAY);
    }

    let balance = harness.balance(Plan::Basic).await;
    assert_eq!(balance["available"], 500);
}

#[tokio::test]
async fn rate_limited_providers_return_retry_after() {
    let harness = TestHarness::with_providers(vec![
        StubProvider::failing("upstage", ProviderError::RateLimited { retry_after: Some(7) }),
        StubProvider::failing("mistral", ProviderError::Unavailable("down".into())),
    ]);
    harness.open_account(Plan::Basic).await;

    let response = harness
        .server
        .post("/v1/generate")
        .add_header("authorization", harness.plan_auth_header(Plan::Basic))
        .json(&post_body())
        .await;

    response.assert_status(StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.header("retry-after"), "7");
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["details"]["retry_after"], 7);

    let balance = harness.balance(Plan::Basic).await;
    assert_eq!(balance["available"], 500);
}

#[tokio::test]
async fn fallback_success_is_charged_once() {
    let first = StubProvider::failing("upstage", ProviderError::InvalidResponse("empty".into()));
    let second = StubProvider::ok("ollama", "local model wrote this");
    let harness = TestHarness::with_providers(vec![
        first.clone() as Arc<dyn Provider>,
        second.clone() as Arc<dyn Provider>,
    ]);
    harness.open_account(Plan::Basic).await;

    let response = harness
        .server
        .post("/v1/generate")
        .add_header("authorization", harness.plan_auth_header(Plan::Basic))
        .json(&post_body())
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["provider"], "ollama");
    assert_eq!(body["available"], 490);
    assert_eq!(first.calls(), 1);
    assert_eq!(second.calls(), 1);
}

#[tokio::test]
async fn no_providers_is_bad_gateway() {
    let harness = TestHarness::with_providers(Vec::new());
    harness.open_account(Plan::Basic).await;

    let response = harness
        .server
        .post("/v1/generate")
        .add_header("authorization", harness.plan_auth_header(Plan::Basic))
        .json(&post_body())
        .await;

    response.assert_status(StatusCode::BAD_GATEWAY);
    assert_eq!(harness.balance(Plan::Basic).await["available"], 500);
}

#[tokio::test]
async fn upstage_end_to_end() {
    let upstage = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/solar/chat/completions"))
        .and(bearer_token("sk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "role": "assistant", "content": "Solar says hi" } }]
        })))
        .expect(1)
        .mount(&upstage)
        .await;

    let provider = ChatCompletionsProvider::upstage(&upstage.uri(), "sk-test", "solar-1-mini-chat");
    let harness = TestHarness::with_providers(vec![Arc::new(provider) as Arc<dyn Provider>]);
    harness.open_account(Plan::Basic).await;

    let response = harness
        .server
        .post("/v1/generate")
        .add_header("authorization", harness.plan_auth_header(Plan::Basic))
        .json(&post_body())
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["text"], "Solar says hi");
    assert_eq!(body["provider"], "upstage");
}

// ============================================================================
// Validation
// ============================================================================

#[tokio::test]
async fn empty_prompt_is_rejected() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/v1/generate")
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({ "prompt": "   " }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn oversized_prompt_is_rejected() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/v1/generate")
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({ "prompt": "a".repeat(2001) }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_platform_is_rejected() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/v1/generate")
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({ "prompt": "hello", "platform": "myspace" }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["message"], "unknown platform: myspace");
}

#[tokio::test]
async fn generate_requires_auth() {
    let harness = TestHarness::new();

    harness
        .server
        .post("/v1/generate")
        .json(&post_body())
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}
