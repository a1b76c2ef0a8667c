//! Copyforge HTTP API service.
//!
//! This crate provides the HTTP API for copyforge, including:
//!
//! - Account opening and plan sync
//! - Credit balance, ledger history and operator grants
//! - Metered content generation with provider fallback
//!
//! # Authentication
//!
//! The service supports two authentication methods:
//!
//! 1. **JWT bearer tokens** - For end-user requests, validated against the
//!    identity provider's JWKS
//! 2. **Admin API key** - For operator endpoints (`X-Admin-Key`)

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are noisy for Axum handler functions
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result
#![allow(clippy::unused_async)]

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use config::ServiceConfig;
pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
