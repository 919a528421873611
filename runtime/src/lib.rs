//! # Seatline Runtime
//!
//! Transactional orchestration for the Seatline registration engine.
//!
//! ## Core Components
//!
//! - **[`CapacityLedger`]**: sole writer of an instance's seat counters
//! - **[`AdmissionController`]**: one registration attempt, all or nothing
//! - **[`RegistrationLifecycle`]**: cancellation and check-in
//! - **[`KeysetPaginator`]**: cursor-based registration listings
//!
//! All of them are generic over the store traits in `seatline_core::store`,
//! so the same code runs against PostgreSQL and the in-memory test store.
//!
//! ## Example
//!
//! ```ignore
//! use seatline_runtime::{AdmissionController, AdmissionRequest};
//! use std::time::Duration;
//!
//! let controller = AdmissionController::new(store, clock);
//! let admission = controller
//!     .admit(request, Duration::from_secs(5))
//!     .await?;
//! ```

/// Admission controller
pub mod admission;

/// Capacity ledger
pub mod ledger;

/// Cancellation and check-in
pub mod lifecycle;

/// Keyset paginator
pub mod pagination;

/// Retry logic with exponential backoff
pub mod retry;

pub use admission::{Admission, AdmissionController, AdmissionPlan, AdmissionRequest, evaluate_admission};
pub use ledger::CapacityLedger;
pub use lifecycle::RegistrationLifecycle;
pub use pagination::KeysetPaginator;
pub use retry::RetryPolicy;
