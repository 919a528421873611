//! Error taxonomy for admission, lifecycle and listing operations.
//!
//! Every failure the engine can surface is a [`RegistrationError`]. Persistence
//! adapters map their driver errors into the two storage variants
//! ([`RegistrationError::WriteConflict`] and [`RegistrationError::Internal`]) so
//! callers never see driver types.

use crate::types::{FlowKind, RegisterFlow, RegistrationStatus};
use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, RegistrationError>;

/// Why an instance is not accepting registrations right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClosedReason {
    /// Administratively switched off.
    Inactive,
    /// The registration window has not opened yet.
    NotYetOpen,
    /// The registration window has passed.
    WindowClosed,
    /// Every seat and every register-flow slot is taken.
    Full,
}

impl ClosedReason {
    /// Stable string form, used in error codes and metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Inactive => "inactive",
            Self::NotYetOpen => "not_yet_open",
            Self::WindowClosed => "window_closed",
            Self::Full => "full",
        }
    }
}

impl std::fmt::Display for ClosedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors surfaced by the registration engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    // ═══════════════════════════════════════════════════════════
    // Lookup
    // ═══════════════════════════════════════════════════════════

    /// Instance or registration does not exist.
    #[error("{resource} {id} not found")]
    NotFound {
        /// Kind of resource ("instance", "registration")
        resource: &'static str,
        /// Identifier that was looked up
        id: String,
    },

    // ═══════════════════════════════════════════════════════════
    // Admission
    // ═══════════════════════════════════════════════════════════

    /// Registration is closed for this instance.
    #[error("Registration is closed ({0})")]
    RegistrationClosed(ClosedReason),

    /// Quantity must be at least one seat.
    #[error("Quantity must be at least 1")]
    InvalidQuantity,

    /// More seats requested than a single registration may claim.
    #[error("Requested {requested} seats, at most {max} allowed per registration")]
    ExceedsMaxPerTransaction {
        /// Seats requested
        requested: u32,
        /// Configured per-registration maximum
        max: u32,
    },

    /// Requested flow is not offered by the instance.
    #[error("Register flow {flow} is not offered (instance uses {offered})")]
    FlowNotOffered {
        /// Flow the caller asked for
        flow: FlowKind,
        /// Flow configuration of the instance
        offered: RegisterFlow,
    },

    /// Not enough seats left at check time.
    #[error("Quota not available: requested {requested}, remaining {remaining}")]
    QuotaNotAvailable {
        /// Seats requested
        requested: u32,
        /// Seats remaining when checked (may be negative on misconfigured rows)
        remaining: i64,
    },

    /// Not enough seats left under the row lock (lost a race).
    #[error("Capacity exhausted: requested {requested}, remaining {remaining}")]
    CapacityExhausted {
        /// Seats requested
        requested: u32,
        /// Seats remaining under the lock
        remaining: i64,
    },

    /// The same client request id was already processed.
    #[error("Duplicate request")]
    DuplicateRequest,

    // ═══════════════════════════════════════════════════════════
    // Lifecycle
    // ═══════════════════════════════════════════════════════════

    /// Registration status change not allowed from the current status.
    #[error("Cannot move registration from {from} to {to}")]
    InvalidTransition {
        /// Current status
        from: RegistrationStatus,
        /// Requested status
        to: RegistrationStatus,
    },

    // ═══════════════════════════════════════════════════════════
    // Pagination
    // ═══════════════════════════════════════════════════════════

    /// Cursor is malformed or was not issued by this server.
    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),

    // ═══════════════════════════════════════════════════════════
    // Storage / system
    // ═══════════════════════════════════════════════════════════

    /// Concurrent modification detected; safe to retry.
    #[error("Write conflict: {0}")]
    WriteConflict(String),

    /// The caller's deadline expired; the transaction was rolled back.
    #[error("Deadline exceeded")]
    DeadlineExceeded,

    /// Unexpected persistence failure. The message is for logs only.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RegistrationError {
    /// Shorthand for a missing instance.
    #[must_use]
    pub fn instance_not_found(code: impl std::fmt::Display) -> Self {
        Self::NotFound {
            resource: "instance",
            id: code.to_string(),
        }
    }

    /// Shorthand for a missing registration.
    #[must_use]
    pub fn registration_not_found(id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            resource: "registration",
            id: id.to_string(),
        }
    }

    /// Whether the caller may retry the identical request.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::WriteConflict(_) | Self::DeadlineExceeded)
    }

    /// Stable machine-readable kind, used for error codes and metric labels.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::RegistrationClosed(_) => "registration_closed",
            Self::InvalidQuantity => "invalid_quantity",
            Self::ExceedsMaxPerTransaction { .. } => "exceeds_max_per_transaction",
            Self::FlowNotOffered { .. } => "flow_not_offered",
            Self::QuotaNotAvailable { .. } => "quota_not_available",
            Self::CapacityExhausted { .. } => "capacity_exhausted",
            Self::DuplicateRequest => "duplicate_request",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::InvalidCursor(_) => "invalid_cursor",
            Self::WriteConflict(_) => "write_conflict",
            Self::DeadlineExceeded => "deadline_exceeded",
            Self::Internal(_) => "internal",
        }
    }
}
