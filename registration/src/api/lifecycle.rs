//! Registration lifecycle endpoints.
//!
//! - POST /api/registrations/:id/cancel
//! - POST /api/registrations/:id/check-in

use super::RegistrationView;
use crate::error::AppError;
use crate::server::{AppState, RegistrationBackend};
use axum::{
    Json,
    extract::{Path, State},
};
use seatline_core::types::RegistrationId;

/// Cancel a booked registration and release its seats.
pub async fn cancel<S: RegistrationBackend>(
    State(state): State<AppState<S>>,
    Path(id): Path<i64>,
) -> Result<Json<RegistrationView>, AppError> {
    let record = state.lifecycle.cancel(RegistrationId::new(id)).await?;
    Ok(Json(record.into()))
}

/// Check in a booked registration.
pub async fn check_in<S: RegistrationBackend>(
    State(state): State<AppState<S>>,
    Path(id): Path<i64>,
) -> Result<Json<RegistrationView>, AppError> {
    let record = state.lifecycle.check_in(RegistrationId::new(id)).await?;
    Ok(Json(record.into()))
}
