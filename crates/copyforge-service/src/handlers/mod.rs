//! HTTP request handlers.

pub mod accounts;
pub mod credits;
pub mod generate;
pub mod health;
