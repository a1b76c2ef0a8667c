//! Common test utilities for copyforge integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum_test::TestServer;
use serde_json::json;

use copyforge_core::{AccountId, Plan};
use copyforge_providers::{Provider, ProviderError, Selector};
use copyforge_service::config::StoreBackend;
use copyforge_service::{create_router, AppState, ServiceConfig};
use copyforge_store::MemoryStore;

/// Admin key configured on every harness.
pub const ADMIN_KEY: &str = "test-admin-key";

/// Text returned by the default stub provider.
pub const STUB_TEXT: &str = "Fresh roast, fresh start. #coffee";

/// A provider that always gives the same answer and counts its calls.
pub struct StubProvider {
    name: &'static str,
    outcome: Result<String, ProviderError>,
    calls: AtomicUsize,
}

impl StubProvider {
    pub fn ok(name: &'static str, text: &str) -> Arc<Self> {
        Arc::new(Self {
            name,
            outcome: Ok(text.to_string()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing(name: &'static str, error: ProviderError) -> Arc<Self> {
        Arc::new(Self {
            name,
            outcome: Err(error),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for StubProvider {
    fn name(&self) -> &str {
        self.name
    }

    async fn generate(&self, _prompt: &str, _timeout: Duration) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcome.clone()
    }
}

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// A test account ID for authenticated requests.
    pub test_account_id: AccountId,
}

impl TestHarness {
    /// Create a harness with a single provider that always succeeds.
    pub fn new() -> Self {
        Self::with_providers(vec![StubProvider::ok("stub", STUB_TEXT)])
    }

    /// Create a harness over the given providers, in fallback order.
    pub fn with_providers(providers: Vec<Arc<dyn Provider>>) -> Self {
        Self::with_selector(Selector::new(providers))
    }

    pub fn with_selector(selector: Selector) -> Self {
        let config = ServiceConfig {
            listen_addr: "127.0.0.1:0".into(),
            store_backend: StoreBackend::Memory,
            auth_base_url: "http://localhost".into(),
            admin_api_key: Some(ADMIN_KEY.into()),
            request_timeout_seconds: 30,
            ..ServiceConfig::default()
        };

        let state = AppState::new(Arc::new(MemoryStore::new()), selector, config)
            .expect("memory store supports atomic writes");
        let router: Router = create_router(state);

        let server = TestServer::new(router).expect("Failed to create test server");

        Self {
            server,
            test_account_id: AccountId::generate(),
        }
    }

    /// Authorization header for the test account on the freemium plan.
    pub fn user_auth_header(&self) -> String {
        format!("Bearer test-token:{}", self.test_account_id)
    }

    /// Authorization header for the test account on `plan`.
    pub fn plan_auth_header(&self, plan: Plan) -> String {
        format!("Bearer test-token:{}:{plan}", self.test_account_id)
    }

    /// A different account's auth header (for testing isolation).
    pub fn other_user_auth_header() -> String {
        format!("Bearer test-token:{}", AccountId::generate())
    }

    /// Open the test account on `plan`.
    pub async fn open_account(&self, plan: Plan) -> serde_json::Value {
        let response = self
            .server
            .post("/v1/accounts")
            .add_header("authorization", self.plan_auth_header(plan))
            .await;
        response.assert_status_ok();
        response.json()
    }

    /// Open the test account on the enterprise plan (no included credits)
    /// and grant it `credits`.
    pub async fn open_funded_account(&self, credits: i64) {
        self.open_account(Plan::Enterprise).await;

        if credits > 0 {
            self.server
                .post("/v1/credits/grant")
                .add_header("x-admin-key", ADMIN_KEY)
                .json(&json!({
                    "account_id": self.test_account_id.to_string(),
                    "amount": credits,
                    "idempotency_key": format!("fund-{}", self.test_account_id),
                    "reason": "Test funding"
                }))
                .await
                .assert_status_ok();
        }
    }

    /// Current balance response for the test account on `plan`.
    pub async fn balance(&self, plan: Plan) -> serde_json::Value {
        let response = self
            .server
            .get("/v1/credits/balance")
            .add_header("authorization", self.plan_auth_header(plan))
            .await;
        response.assert_status_ok();
        response.json()
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
