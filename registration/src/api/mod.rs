//! HTTP handlers.
//!
//! - `registrations`: admission and listings
//! - `availability`: classifier result for one instance
//! - `lifecycle`: cancel and check-in

pub mod availability;
pub mod lifecycle;
pub mod registrations;

use chrono::{DateTime, Utc};
use seatline_core::types::{FlowKind, RegistrationRecord, RegistrationStatus};
use serde::{Deserialize, Serialize};

/// A registration as returned by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationView {
    /// Registration id
    pub id: i64,
    /// Instance registered for
    pub instance_code: String,
    /// Who registered
    pub registrant: String,
    /// Seats claimed
    pub quantity: u32,
    /// Flow the booking was counted against
    pub flow: Option<FlowKind>,
    /// Current status
    pub status: RegistrationStatus,
    /// Admission timestamp
    pub registered_at: DateTime<Utc>,
    /// Check-in timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<DateTime<Utc>>,
}

impl From<RegistrationRecord> for RegistrationView {
    fn from(record: RegistrationRecord) -> Self {
        Self {
            id: record.id.get(),
            instance_code: record.instance_code.as_str().to_string(),
            registrant: record.registrant,
            quantity: record.quantity,
            flow: record.flow,
            status: record.status,
            registered_at: record.registered_at,
            verified_at: record.verified_at,
        }
    }
}
