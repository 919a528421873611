//! Seat counter arithmetic.
//!
//! [`SeatCounters`] is the value the capacity ledger reads under a row lock and
//! writes back. All invariants live here so they can be checked without a
//! database:
//!
//! ```text
//! booked  <= total      (when total > 0)
//! scanned <= booked
//! ```

use crate::error::{RegistrationError, Result};
use serde::{Deserialize, Serialize};

/// Seat counters of one instance.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatCounters {
    /// Configured capacity (0 = unlimited)
    pub total: u32,
    /// Seats held by live registrations
    pub booked: u32,
    /// Seats whose holders checked in
    pub scanned: u32,
}

impl SeatCounters {
    /// Fresh counters for a capacity.
    #[must_use]
    pub const fn with_capacity(total: u32) -> Self {
        Self {
            total,
            booked: 0,
            scanned: 0,
        }
    }

    /// Whether seats are tracked at all.
    #[must_use]
    pub const fn is_unlimited(&self) -> bool {
        self.total == 0
    }

    /// `total - booked`.
    #[must_use]
    pub fn remaining(&self) -> i64 {
        i64::from(self.total) - i64::from(self.booked)
    }

    /// Counters after booking `quantity` more seats.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::CapacityExhausted`] when the booking would
    /// exceed a tracked capacity; the counters are left as they were.
    pub fn reserve(self, quantity: u32) -> Result<Self> {
        let exhausted = RegistrationError::CapacityExhausted {
            requested: quantity,
            remaining: self.remaining(),
        };
        let booked = self.booked.checked_add(quantity).ok_or(exhausted.clone())?;

        if !self.is_unlimited() && booked > self.total {
            return Err(exhausted);
        }

        Ok(Self { booked, ..self })
    }

    /// Counters after releasing `quantity` seats, clamped at zero.
    ///
    /// Scanned seats follow booked seats down so `scanned <= booked` holds.
    #[must_use]
    pub fn release(self, quantity: u32) -> Self {
        let booked = self.booked.saturating_sub(quantity);
        Self {
            booked,
            scanned: self.scanned.min(booked),
            ..self
        }
    }

    /// Counters after checking in `quantity` seats, capped at `booked`.
    #[must_use]
    pub fn mark_scanned(self, quantity: u32) -> Self {
        Self {
            scanned: self.scanned.saturating_add(quantity).min(self.booked),
            ..self
        }
    }

    /// Whether the invariants hold.
    #[must_use]
    pub const fn is_consistent(&self) -> bool {
        (self.total == 0 || self.booked <= self.total) && self.scanned <= self.booked
    }
}
