//! Availability classification.
//!
//! [`classify`] maps one [`SeatWindowInfo`] and the current time to an
//! [`Availability`]. Whatever the data source (a locked instance row, a listing
//! row, a hand-written fixture), it is adapted into `SeatWindowInfo` first.
//!
//! Rules are evaluated in order, first match wins:
//!
//! ```text
//! 1. total == 0 && consumed_flows == 0              -> walkin
//! 2. remaining <= 0 && consumed_flows < flows       -> available
//! 3. remaining <= 0 && consumed_flows == flows
//!                   && total > 0                    -> full
//! 4. now < window_start                             -> soon
//! 5. now > window_end                               -> unavailable
//! 6. otherwise                                      -> available
//! ```
//!
//! Seat exhaustion alone does not mean `full`: an instance can offer several
//! register flows that are counted separately from the seat counter.

use crate::error::ClosedReason;
use crate::seats::SeatCounters;
use crate::types::{FlowSlot, Instance};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Availability state of an instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Availability {
    /// Open for registration
    Available,
    /// Registration window has passed
    Unavailable,
    /// No seats and no flow slots left
    Full,
    /// Registration window not open yet
    Soon,
    /// No capacity tracking; walk in
    Walkin,
}

impl Availability {
    /// Whether an admission attempt may proceed.
    #[must_use]
    pub const fn accepts_registrations(&self) -> bool {
        matches!(self, Self::Available | Self::Walkin)
    }

    /// Reason to report when registrations are refused.
    #[must_use]
    pub const fn closed_reason(&self) -> Option<ClosedReason> {
        match self {
            Self::Available | Self::Walkin => None,
            Self::Unavailable => Some(ClosedReason::WindowClosed),
            Self::Full => Some(ClosedReason::Full),
            Self::Soon => Some(ClosedReason::NotYetOpen),
        }
    }

    /// Stable string form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Unavailable => "unavailable",
            Self::Full => "full",
            Self::Soon => "soon",
            Self::Walkin => "walkin",
        }
    }
}

/// Everything [`classify`] looks at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SeatWindowInfo {
    /// Configured capacity (0 = unlimited)
    pub total_seats: u32,
    /// Seats currently booked
    pub booked_seats: u32,
    /// Register flows whose slots are used up
    pub consumed_flows: u32,
    /// Register flows configured on the instance
    pub configured_flows: u32,
    /// Registration opens at
    pub window_start: DateTime<Utc>,
    /// Registration closes at
    pub window_end: DateTime<Utc>,
}

impl SeatWindowInfo {
    /// Build from counters, a window and the per-flow slots.
    #[must_use]
    pub fn from_parts(
        counters: SeatCounters,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        slots: &[FlowSlot],
    ) -> Self {
        let consumed = slots.iter().filter(|slot| slot.is_consumed()).count();
        Self {
            total_seats: counters.total,
            booked_seats: counters.booked,
            consumed_flows: u32::try_from(consumed).unwrap_or(u32::MAX),
            configured_flows: u32::try_from(slots.len()).unwrap_or(u32::MAX),
            window_start,
            window_end,
        }
    }

    /// `total - booked`.
    #[must_use]
    pub fn remaining_seats(&self) -> i64 {
        i64::from(self.total_seats) - i64::from(self.booked_seats)
    }
}

impl From<&Instance> for SeatWindowInfo {
    fn from(instance: &Instance) -> Self {
        Self::from_parts(
            instance.counters(),
            instance.register_window_start,
            instance.register_window_end,
            &instance.flow_slots,
        )
    }
}

/// Classify availability. Pure and deterministic.
#[must_use]
pub fn classify(info: &SeatWindowInfo, now: DateTime<Utc>) -> Availability {
    let remaining = info.remaining_seats();

    if info.total_seats == 0 && info.consumed_flows == 0 {
        return Availability::Walkin;
    }
    if remaining <= 0 && info.consumed_flows < info.configured_flows {
        return Availability::Available;
    }
    if remaining <= 0 && info.consumed_flows == info.configured_flows && info.total_seats > 0 {
        return Availability::Full;
    }
    if now < info.window_start {
        return Availability::Soon;
    }
    if now > info.window_end {
        return Availability::Unavailable;
    }
    Availability::Available
}
