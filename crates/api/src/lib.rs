// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Praxis API Server library
//!
//! The HTTP layer: configuration, application state, session-cookie
//! authentication, route handlers, and the external AI/calendar clients.
//! The worker binary reuses the config and clients from here.

pub mod ai;
pub mod auth;
pub mod calendar;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use state::AppState;
