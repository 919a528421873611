//! Registration service.
//!
//! Runs the Seatline engine behind an axum HTTP API:
//!
//! - **[`config`]**: environment configuration (`.env` supported)
//! - **[`server`]**: router, shared state and health check
//! - **[`api`]**: admission, listing, availability and lifecycle handlers
//! - **[`idempotency`]**: Redis-backed `Idempotency-Key` tracking
//! - **[`error`]**: mapping of engine errors to HTTP responses

pub mod api;
pub mod config;
pub mod error;
pub mod idempotency;
pub mod server;

pub use config::Config;
pub use error::AppError;
pub use server::{AppState, build_router};
