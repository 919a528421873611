//! Instance fixtures.

use crate::mocks::test_time;
use chrono::{DateTime, Duration, Utc};
use seatline_core::types::{FlowSlot, Instance, InstanceCode, InstanceStatus, RegisterFlow};

/// Builder for [`Instance`] test data.
///
/// Defaults: 10 seats, personal flow, at most 4 seats per registration, active,
/// window open from one day before to one week after [`test_time`]. Each
/// offered flow gets a slot sized to the seat capacity unless overridden.
#[derive(Clone, Debug)]
pub struct InstanceBuilder {
    code: String,
    total_seats: u32,
    booked_seats: u32,
    scanned_seats: u32,
    register_flow: RegisterFlow,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    max_per_transaction: u32,
    status: InstanceStatus,
    slot_capacity: Option<u32>,
    slots: Option<Vec<FlowSlot>>,
}

impl InstanceBuilder {
    /// Start building an instance with `code`.
    #[must_use]
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            total_seats: 10,
            booked_seats: 0,
            scanned_seats: 0,
            register_flow: RegisterFlow::Personal,
            window_start: test_time() - Duration::days(1),
            window_end: test_time() + Duration::days(7),
            max_per_transaction: 4,
            status: InstanceStatus::Active,
            slot_capacity: None,
            slots: None,
        }
    }

    /// Seat capacity (0 = walk-in).
    #[must_use]
    pub const fn total_seats(mut self, total: u32) -> Self {
        self.total_seats = total;
        self
    }

    /// Seats already booked.
    #[must_use]
    pub const fn booked_seats(mut self, booked: u32) -> Self {
        self.booked_seats = booked;
        self
    }

    /// Seats already scanned.
    #[must_use]
    pub const fn scanned_seats(mut self, scanned: u32) -> Self {
        self.scanned_seats = scanned;
        self
    }

    /// Register-flow configuration.
    #[must_use]
    pub const fn register_flow(mut self, flow: RegisterFlow) -> Self {
        self.register_flow = flow;
        self
    }

    /// Registration window.
    #[must_use]
    pub const fn window(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.window_start = start;
        self.window_end = end;
        self
    }

    /// Per-registration maximum.
    #[must_use]
    pub const fn max_per_transaction(mut self, max: u32) -> Self {
        self.max_per_transaction = max;
        self
    }

    /// Switch the instance off.
    #[must_use]
    pub const fn inactive(mut self) -> Self {
        self.status = InstanceStatus::Inactive;
        self
    }

    /// Capacity of every generated flow slot.
    #[must_use]
    pub const fn slot_capacity(mut self, capacity: u32) -> Self {
        self.slot_capacity = Some(capacity);
        self
    }

    /// Explicit flow slots, replacing the generated ones.
    #[must_use]
    pub fn flow_slots(mut self, slots: Vec<FlowSlot>) -> Self {
        self.slots = Some(slots);
        self
    }

    /// Build the instance at version 1.
    #[must_use]
    pub fn build(self) -> Instance {
        let capacity = self.slot_capacity.unwrap_or(self.total_seats);
        let flow_slots = self.slots.unwrap_or_else(|| {
            self.register_flow
                .offered()
                .iter()
                .map(|flow| FlowSlot::new(*flow, capacity))
                .collect()
        });

        Instance {
            code: InstanceCode::new(self.code),
            total_seats: self.total_seats,
            booked_seats: self.booked_seats,
            scanned_seats: self.scanned_seats,
            register_flow: self.register_flow,
            register_window_start: self.window_start,
            register_window_end: self.window_end,
            max_per_transaction: self.max_per_transaction,
            status: self.status,
            flow_slots,
            version: 1,
        }
    }
}
