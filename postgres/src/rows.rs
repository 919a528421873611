//! Row types and column conversions.

use chrono::{DateTime, Utc};
use seatline_core::error::{RegistrationError, Result};
use seatline_core::types::{
    FlowKind, FlowSlot, Instance, InstanceCode, InstanceStatus, RegisterFlow, RegistrationId,
    RegistrationRecord, RegistrationStatus,
};

/// Columns selected for an instance.
pub(crate) const INSTANCE_COLUMNS: &str = "code, total_seats, booked_seats, scanned_seats, \
     register_flow, register_window_start, register_window_end, max_per_transaction, status, version";

/// Columns selected for a registration.
pub(crate) const REGISTRATION_COLUMNS: &str =
    "id, instance_code, registrant, quantity, flow, status, registered_at, verified_at";

pub(crate) fn to_u32(value: i32, column: &str) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| RegistrationError::Internal(format!("Negative {column}: {value}")))
}

pub(crate) fn to_i32(value: u32, column: &str) -> Result<i32> {
    i32::try_from(value)
        .map_err(|_| RegistrationError::Internal(format!("{column} out of range: {value}")))
}

#[derive(sqlx::FromRow)]
pub(crate) struct InstanceRow {
    code: String,
    total_seats: i32,
    booked_seats: i32,
    scanned_seats: i32,
    register_flow: String,
    register_window_start: DateTime<Utc>,
    register_window_end: DateTime<Utc>,
    max_per_transaction: i32,
    status: String,
    version: i64,
}

impl InstanceRow {
    pub(crate) fn into_instance(self, flow_slots: Vec<FlowSlot>) -> Result<Instance> {
        Ok(Instance {
            code: InstanceCode::new(self.code),
            total_seats: to_u32(self.total_seats, "total_seats")?,
            booked_seats: to_u32(self.booked_seats, "booked_seats")?,
            scanned_seats: to_u32(self.scanned_seats, "scanned_seats")?,
            register_flow: RegisterFlow::parse(&self.register_flow)?,
            register_window_start: self.register_window_start,
            register_window_end: self.register_window_end,
            max_per_transaction: to_u32(self.max_per_transaction, "max_per_transaction")?,
            status: InstanceStatus::parse(&self.status)?,
            flow_slots,
            version: self.version,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct FlowSlotRow {
    flow: String,
    capacity: i32,
    used: i32,
}

impl FlowSlotRow {
    pub(crate) fn into_slot(self) -> Result<FlowSlot> {
        Ok(FlowSlot {
            flow: FlowKind::parse(&self.flow)?,
            capacity: to_u32(self.capacity, "capacity")?,
            used: to_u32(self.used, "used")?,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct RegistrationRow {
    id: i64,
    instance_code: String,
    registrant: String,
    quantity: i32,
    flow: Option<String>,
    status: String,
    registered_at: DateTime<Utc>,
    verified_at: Option<DateTime<Utc>>,
}

impl RegistrationRow {
    pub(crate) fn into_record(self) -> Result<RegistrationRecord> {
        Ok(RegistrationRecord {
            id: RegistrationId::new(self.id),
            instance_code: InstanceCode::new(self.instance_code),
            registrant: self.registrant,
            quantity: to_u32(self.quantity, "quantity")?,
            flow: self.flow.as_deref().map(FlowKind::parse).transpose()?,
            status: RegistrationStatus::parse(&self.status)?,
            registered_at: self.registered_at,
            verified_at: self.verified_at,
        })
    }
}
