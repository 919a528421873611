//! Instance availability endpoint.
//!
//! - GET /api/instances/:code/availability

use crate::error::AppError;
use crate::server::{AppState, RegistrationBackend};
use axum::{
    Json,
    extract::{Path, State},
};
use chrono::{DateTime, Utc};
use seatline_core::availability::{Availability, SeatWindowInfo, classify};
use seatline_core::error::RegistrationError;
use seatline_core::store::AdmissionStore;
use seatline_core::types::{InstanceCode, RegisterFlow};
use serde::Serialize;

/// Availability of one instance with the counters it was derived from.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityResponse {
    /// Instance code
    pub instance_code: String,
    /// Classifier result
    pub availability: Availability,
    /// Whether an admission attempt would be evaluated further
    pub accepts_registrations: bool,
    /// Capacity (0 = unlimited)
    pub total_seats: u32,
    /// Seats held
    pub booked_seats: u32,
    /// Seats checked in
    pub scanned_seats: u32,
    /// `total - booked`
    pub remaining_seats: i64,
    /// Register-flow configuration
    pub register_flow: RegisterFlow,
    /// Window start
    pub register_window_start: DateTime<Utc>,
    /// Window end
    pub register_window_end: DateTime<Utc>,
}

/// Classify an instance at the current time.
///
/// ```bash
/// curl http://localhost:8080/api/instances/WS-01/availability
/// # {"instanceCode":"WS-01","availability":"available","acceptsRegistrations":true,...}
/// ```
pub async fn get_availability<S: RegistrationBackend>(
    State(state): State<AppState<S>>,
    Path(code): Path<String>,
) -> Result<Json<AvailabilityResponse>, AppError> {
    let code = InstanceCode::new(code);
    let instance = state
        .store
        .load_instance(&code)
        .await?
        .ok_or_else(|| RegistrationError::instance_not_found(&code))?;

    let availability = classify(&SeatWindowInfo::from(&instance), state.clock.now());

    Ok(Json(AvailabilityResponse {
        instance_code: instance.code.as_str().to_string(),
        availability,
        accepts_registrations: availability.accepts_registrations(),
        total_seats: instance.total_seats,
        booked_seats: instance.booked_seats,
        scanned_seats: instance.scanned_seats,
        remaining_seats: instance.remaining_seats(),
        register_flow: instance.register_flow,
        register_window_start: instance.register_window_start,
        register_window_end: instance.register_window_end,
    }))
}
