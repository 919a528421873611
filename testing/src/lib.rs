//! # Seatline Testing
//!
//! Testing utilities for the Seatline registration engine.
//!
//! This crate provides:
//! - [`FixedClock`]: settable, deterministic time
//! - [`InMemoryStore`]: row-locking in-memory [`AdmissionStore`] and
//!   [`RegistrationQuery`] with commit-conflict injection
//! - [`InMemoryIdempotencyStore`]: TTL-based request de-duplication
//! - [`InstanceBuilder`]: instance fixtures
//!
//! ## Example
//!
//! ```
//! use seatline_testing::{InMemoryStore, InstanceBuilder};
//!
//! let store = InMemoryStore::new();
//! store.insert_instance(InstanceBuilder::new("WS-01").total_seats(2).build());
//! assert_eq!(store.instance("WS-01").map(|i| i.total_seats), Some(2));
//! ```
//!
//! [`AdmissionStore`]: seatline_core::store::AdmissionStore
//! [`RegistrationQuery`]: seatline_core::store::RegistrationQuery

mod fixtures;
mod idempotency;
mod memory_store;

pub use fixtures::InstanceBuilder;
pub use idempotency::InMemoryIdempotencyStore;
pub use memory_store::{InMemoryStore, InMemoryTx, InstanceLockGuard};

/// Mock implementations of collaborator traits
pub mod mocks {
    use chrono::{DateTime, Duration, Utc};
    use seatline_core::environment::Clock;
    use std::sync::{Arc, Mutex};

    /// Fixed clock for deterministic tests
    ///
    /// Returns the same time until moved with [`FixedClock::set`] or
    /// [`FixedClock::advance`]. Clones share the same time.
    ///
    /// # Example
    ///
    /// ```
    /// use seatline_testing::mocks::FixedClock;
    /// use seatline_core::environment::Clock;
    /// use chrono::{Duration, Utc};
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// assert_eq!(time1, clock.now());
    /// clock.advance(Duration::minutes(5));
    /// assert_eq!(clock.now() - time1, Duration::minutes(5));
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: Arc<Mutex<DateTime<Utc>>>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(Mutex::new(time)),
            }
        }

        /// Move the clock to `time`.
        pub fn set(&self, time: DateTime<Utc>) {
            if let Ok(mut current) = self.time.lock() {
                *current = time;
            }
        }

        /// Move the clock forward.
        pub fn advance(&self, by: Duration) {
            if let Ok(mut current) = self.time.lock() {
                *current += by;
            }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
                .lock()
                .map_or_else(|poisoned| *poisoned.into_inner(), |time| *time)
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(test_time())
    }

    /// The instant [`test_clock`] starts at.
    ///
    /// # Panics
    ///
    /// Never in practice; the timestamp is hardcoded.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_time() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
            .expect("hardcoded timestamp should always parse")
            .with_timezone(&Utc)
    }
}

/// Install a test-writer tracing subscriber once per process.
///
/// Honors `RUST_LOG`; later calls are no-ops.
pub fn init_test_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_test_writer()
        .try_init()
        .ok();
}

// Re-export commonly used items
pub use mocks::{FixedClock, test_clock, test_time};
