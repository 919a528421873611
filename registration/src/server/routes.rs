//! Router configuration.

use super::health::health_check;
use super::state::{AppState, RegistrationBackend};
use crate::api::{availability, lifecycle, registrations};
use axum::{
    Router,
    routing::{get, post},
};

/// Build the complete Axum router.
///
/// - `GET  /health`
/// - `POST /api/instances/:code/registrations`
/// - `GET  /api/instances/:code/registrations`
/// - `GET  /api/instances/:code/availability`
/// - `POST /api/registrations/:id/cancel`
/// - `POST /api/registrations/:id/check-in`
pub fn build_router<S: RegistrationBackend>(state: AppState<S>) -> Router {
    let api_routes = Router::new()
        .route(
            "/instances/:code/registrations",
            post(registrations::admit::<S>).get(registrations::list::<S>),
        )
        .route(
            "/instances/:code/availability",
            get(availability::get_availability::<S>),
        )
        .route("/registrations/:id/cancel", post(lifecycle::cancel::<S>))
        .route("/registrations/:id/check-in", post(lifecycle::check_in::<S>));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_routes)
        .with_state(state)
}
