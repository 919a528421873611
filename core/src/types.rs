//! Domain types for instances and registrations.

use crate::cursor::SortKey;
use crate::error::{RegistrationError, Result};
use crate::seats::SeatCounters;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Identifiers
// ============================================================================

/// Stable external identifier of a bookable instance.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceCode(String);

impl InstanceCode {
    /// Create an `InstanceCode`.
    #[must_use]
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Borrow the code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Store-generated numeric identifier of a registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegistrationId(i64);

impl RegistrationId {
    /// Wrap a raw id.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Raw id value.
    #[must_use]
    pub const fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for RegistrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Register flows
// ============================================================================

/// A single registration flow an attendee can be counted against.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowKind {
    /// Registrant presents a personal QR code.
    Personal,
    /// Registrant presents the shared event QR code.
    Event,
}

impl FlowKind {
    /// Database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Personal => "personal",
            Self::Event => "event",
        }
    }

    /// Parse from database string.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::Internal`] for unknown values.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "personal" => Ok(Self::Personal),
            "event" => Ok(Self::Event),
            _ => Err(RegistrationError::Internal(format!("Invalid flow kind: {s}"))),
        }
    }
}

impl fmt::Display for FlowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Register-flow configuration of an instance.
///
/// Determines whether a booking consumes seats at all (`None` does not) and
/// which flow slots it is counted against.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegisterFlow {
    /// Personal QR only
    Personal,
    /// Event QR only
    Event,
    /// Both personal and event QR
    Both,
    /// No registration required; no seats are tracked
    None,
}

impl RegisterFlow {
    /// Database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Personal => "personal",
            Self::Event => "event",
            Self::Both => "both",
            Self::None => "none",
        }
    }

    /// Parse from database string.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::Internal`] for unknown values.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "personal" => Ok(Self::Personal),
            "event" => Ok(Self::Event),
            "both" => Ok(Self::Both),
            "none" => Ok(Self::None),
            _ => Err(RegistrationError::Internal(format!("Invalid register flow: {s}"))),
        }
    }

    /// Flow kinds this configuration offers.
    #[must_use]
    pub const fn offered(&self) -> &'static [FlowKind] {
        match self {
            Self::Personal => &[FlowKind::Personal],
            Self::Event => &[FlowKind::Event],
            Self::Both => &[FlowKind::Personal, FlowKind::Event],
            Self::None => &[],
        }
    }

    /// Whether registering consumes seats.
    #[must_use]
    pub const fn requires_registration(&self) -> bool {
        !matches!(self, Self::None)
    }

    /// Resolve which flow a booking is counted against.
    ///
    /// `Both` defaults to [`FlowKind::Personal`] when the caller does not choose.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::FlowNotOffered`] if the caller asked for a
    /// flow this configuration does not offer.
    pub fn resolve(&self, requested: Option<FlowKind>) -> Result<Option<FlowKind>> {
        let offered = self.offered();
        match (requested, offered.first()) {
            (_, None) => Ok(None),
            (None, Some(default)) => Ok(Some(*default)),
            (Some(flow), Some(_)) if offered.contains(&flow) => Ok(Some(flow)),
            (Some(flow), Some(_)) => Err(RegistrationError::FlowNotOffered {
                flow,
                offered: *self,
            }),
        }
    }
}

impl fmt::Display for RegisterFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-flow registration counter.
///
/// Slots are counted alongside the seat counter but never deduct seats; the
/// classifier uses them to tell "seat counter exhausted" apart from "every
/// flow exhausted".
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowSlot {
    /// Flow this slot counts
    pub flow: FlowKind,
    /// Configured slot capacity (0 = uncounted)
    pub capacity: u32,
    /// Seats booked through this flow
    pub used: u32,
}

impl FlowSlot {
    /// Create an empty slot.
    #[must_use]
    pub const fn new(flow: FlowKind, capacity: u32) -> Self {
        Self {
            flow,
            capacity,
            used: 0,
        }
    }

    /// A slot is consumed once it has a capacity and it is used up.
    #[must_use]
    pub const fn is_consumed(&self) -> bool {
        self.capacity > 0 && self.used >= self.capacity
    }
}

// ============================================================================
// Instance
// ============================================================================

/// Administrative status of an instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    /// Open for business (subject to window and seats)
    Active,
    /// Switched off regardless of seats
    Inactive,
}

impl InstanceStatus {
    /// Database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }

    /// Parse from database string.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::Internal`] for unknown values.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            _ => Err(RegistrationError::Internal(format!("Invalid instance status: {s}"))),
        }
    }
}

/// A bookable occurrence of an event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    /// Unique external code
    pub code: InstanceCode,
    /// Capacity (0 = unlimited / walk-in)
    pub total_seats: u32,
    /// Seats held by live registrations
    pub booked_seats: u32,
    /// Seats whose holders checked in
    pub scanned_seats: u32,
    /// Register-flow configuration
    pub register_flow: RegisterFlow,
    /// Registration opens at
    pub register_window_start: DateTime<Utc>,
    /// Registration closes at
    pub register_window_end: DateTime<Utc>,
    /// Most seats a single registration may claim
    pub max_per_transaction: u32,
    /// Administrative switch
    pub status: InstanceStatus,
    /// Per-flow counters, one per offered flow
    pub flow_slots: Vec<FlowSlot>,
    /// Row version, bumped on every counter write
    pub version: i64,
}

impl Instance {
    /// Current seat counters.
    #[must_use]
    pub const fn counters(&self) -> SeatCounters {
        SeatCounters {
            total: self.total_seats,
            booked: self.booked_seats,
            scanned: self.scanned_seats,
        }
    }

    /// `total - booked`; negative only on rows that violate the capacity invariant.
    #[must_use]
    pub fn remaining_seats(&self) -> i64 {
        self.counters().remaining()
    }

    /// Slot for a flow, if configured.
    #[must_use]
    pub fn flow_slot(&self, flow: FlowKind) -> Option<&FlowSlot> {
        self.flow_slots.iter().find(|slot| slot.flow == flow)
    }
}

// ============================================================================
// Registrations
// ============================================================================

/// Lifecycle status of a registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationStatus {
    /// Seats reserved
    Booked,
    /// Seats released
    Cancelled,
    /// Holder checked in; seats still held and scanned
    Attended,
}

impl RegistrationStatus {
    /// Database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Booked => "booked",
            Self::Cancelled => "cancelled",
            Self::Attended => "attended",
        }
    }

    /// Parse from database string.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::Internal`] for unknown values.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "booked" => Ok(Self::Booked),
            "cancelled" => Ok(Self::Cancelled),
            "attended" => Ok(Self::Attended),
            _ => Err(RegistrationError::Internal(format!("Invalid registration status: {s}"))),
        }
    }

    /// Whether a registration in this status still holds its seats.
    #[must_use]
    pub const fn holds_seats(&self) -> bool {
        !matches!(self, Self::Cancelled)
    }
}

impl fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted registration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRecord {
    /// Store-generated id
    pub id: RegistrationId,
    /// Owning instance
    pub instance_code: InstanceCode,
    /// Who registered
    pub registrant: String,
    /// Seats claimed
    pub quantity: u32,
    /// Flow slot the booking was counted against
    pub flow: Option<FlowKind>,
    /// Current status
    pub status: RegistrationStatus,
    /// When the registration was admitted
    pub registered_at: DateTime<Utc>,
    /// When the holder checked in
    pub verified_at: Option<DateTime<Utc>>,
}

impl RegistrationRecord {
    /// Seats this registration counts against the instance.
    ///
    /// Bookings on instances without a register flow never touched the seat
    /// counters, so they hold nothing. Cancelled registrations hold nothing.
    #[must_use]
    pub const fn seats_held(&self) -> u32 {
        if self.flow.is_some() && self.status.holds_seats() {
            self.quantity
        } else {
            0
        }
    }

    /// Listing sort key `(registered_at, id)`.
    #[must_use]
    pub const fn sort_key(&self) -> SortKey {
        SortKey::new(self.registered_at, self.id)
    }
}

/// A registration about to be inserted; the store assigns the id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewRegistration {
    /// Owning instance
    pub instance_code: InstanceCode,
    /// Who registered
    pub registrant: String,
    /// Seats claimed
    pub quantity: u32,
    /// Flow slot counted against
    pub flow: Option<FlowKind>,
    /// Admission timestamp
    pub registered_at: DateTime<Utc>,
}

impl NewRegistration {
    /// Materialize the record once the store has allocated an id.
    #[must_use]
    pub fn into_record(self, id: RegistrationId) -> RegistrationRecord {
        RegistrationRecord {
            id,
            instance_code: self.instance_code,
            registrant: self.registrant,
            quantity: self.quantity,
            flow: self.flow,
            status: RegistrationStatus::Booked,
            registered_at: self.registered_at,
            verified_at: None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn resolve_defaults_to_first_offered_flow() {
        assert_eq!(RegisterFlow::Both.resolve(None).unwrap(), Some(FlowKind::Personal));
        assert_eq!(
            RegisterFlow::Both.resolve(Some(FlowKind::Event)).unwrap(),
            Some(FlowKind::Event)
        );
        assert_eq!(RegisterFlow::Event.resolve(None).unwrap(), Some(FlowKind::Event));
    }

    #[test]
    fn resolve_rejects_flow_not_offered() {
        let err = RegisterFlow::Personal.resolve(Some(FlowKind::Event)).unwrap_err();
        assert!(matches!(err, RegistrationError::FlowNotOffered { .. }));
    }

    #[test]
    fn none_flow_never_counts_against_a_slot() {
        assert_eq!(RegisterFlow::None.resolve(Some(FlowKind::Event)).unwrap(), None);
        assert!(!RegisterFlow::None.requires_registration());
    }

    #[test]
    fn status_strings_round_trip() {
        for status in [
            RegistrationStatus::Booked,
            RegistrationStatus::Cancelled,
            RegistrationStatus::Attended,
        ] {
            assert_eq!(RegistrationStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(RegistrationStatus::parse("refunded").is_err());
    }

    #[test]
    fn seats_held_follow_flow_and_status() {
        let mut record = NewRegistration {
            instance_code: InstanceCode::new("WS-01"),
            registrant: "ada".to_string(),
            quantity: 3,
            flow: Some(FlowKind::Personal),
            registered_at: DateTime::<Utc>::UNIX_EPOCH,
        }
        .into_record(RegistrationId::new(1));
        assert_eq!(record.seats_held(), 3);

        record.status = RegistrationStatus::Attended;
        assert_eq!(record.seats_held(), 3);

        record.status = RegistrationStatus::Cancelled;
        assert_eq!(record.seats_held(), 0);

        record.status = RegistrationStatus::Booked;
        record.flow = None;
        assert_eq!(record.seats_held(), 0);
    }

    #[test]
    fn zero_capacity_slot_is_never_consumed() {
        let mut slot = FlowSlot::new(FlowKind::Event, 0);
        slot.used = 10;
        assert!(!slot.is_consumed());
    }
}
