//! # Seatline Core
//!
//! Domain types and pure logic for the Seatline registration engine.
//!
//! This crate holds everything that can be decided without I/O:
//!
//! - **Types**: instances, register flows, registrations ([`types`])
//! - **Seat arithmetic**: the counter invariants the ledger enforces ([`seats`])
//! - **Availability**: the classifier ([`availability`])
//! - **Pagination**: cursor codec and page assembly ([`cursor`], [`page`])
//! - **Collaborators**: store and clock traits ([`store`], [`environment`])
//!
//! Orchestration (transactions, retries, deadlines) lives in `seatline-runtime`.
//!
//! ## Example
//!
//! ```
//! use chrono::{Duration, Utc};
//! use seatline_core::availability::{classify, Availability, SeatWindowInfo};
//!
//! let now = Utc::now();
//! let info = SeatWindowInfo {
//!     total_seats: 50,
//!     booked_seats: 50,
//!     consumed_flows: 1,
//!     configured_flows: 1,
//!     window_start: now - Duration::days(1),
//!     window_end: now + Duration::days(1),
//! };
//! assert_eq!(classify(&info, now), Availability::Full);
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};

pub mod availability;
pub mod cursor;
pub mod environment;
pub mod error;
pub mod page;
pub mod seats;
pub mod store;
pub mod types;

pub use error::{RegistrationError, Result};
