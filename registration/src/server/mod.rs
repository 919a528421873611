//! HTTP server: state, routes and health check.

pub mod health;
pub mod routes;
pub mod state;

pub use routes::build_router;
pub use state::{AppState, RegistrationBackend};
