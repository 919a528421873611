//! Application state for the registration HTTP server.
//!
//! Contains all shared resources needed by HTTP handlers:
//! - The store (PostgreSQL in production, in-memory in tests)
//! - Admission, lifecycle and listing services built on that store
//! - The idempotency store and the clock

use seatline_core::cursor::CursorCodec;
use seatline_core::environment::Clock;
use seatline_core::store::{AdmissionStore, IdempotencyStore, RegistrationQuery};
use seatline_runtime::{AdmissionController, KeysetPaginator, RegistrationLifecycle, RetryPolicy};
use std::sync::Arc;
use std::time::Duration;

/// Everything a store must provide to back the HTTP surface.
pub trait RegistrationBackend: AdmissionStore + RegistrationQuery + 'static {}

impl<T: AdmissionStore + RegistrationQuery + 'static> RegistrationBackend for T {}

/// Application state shared across all HTTP handlers.
///
/// Cloned (cheaply via `Arc`) for each request.
pub struct AppState<S> {
    /// Backing store
    pub store: Arc<S>,
    /// Registration attempts
    pub admission: AdmissionController<S>,
    /// Cancellation and check-in
    pub lifecycle: RegistrationLifecycle<S>,
    /// Registration listings
    pub paginator: KeysetPaginator<S>,
    /// Duplicate request detection
    pub idempotency: Arc<dyn IdempotencyStore>,
    /// Time source for availability
    pub clock: Arc<dyn Clock>,
    /// Deadline for one admission attempt
    pub admission_deadline: Duration,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            admission: self.admission.clone(),
            lifecycle: self.lifecycle.clone(),
            paginator: self.paginator.clone(),
            idempotency: Arc::clone(&self.idempotency),
            clock: Arc::clone(&self.clock),
            admission_deadline: self.admission_deadline,
        }
    }
}

impl<S: RegistrationBackend> AppState<S> {
    /// Create a new application state with default retry, deadline and
    /// page limits.
    #[must_use]
    pub fn new(
        store: Arc<S>,
        clock: Arc<dyn Clock>,
        idempotency: Arc<dyn IdempotencyStore>,
        codec: CursorCodec,
    ) -> Self {
        Self {
            admission: AdmissionController::new(Arc::clone(&store), Arc::clone(&clock)),
            lifecycle: RegistrationLifecycle::new(Arc::clone(&store), Arc::clone(&clock)),
            paginator: KeysetPaginator::new(Arc::clone(&store), codec),
            store,
            idempotency,
            clock,
            admission_deadline: Duration::from_secs(5),
        }
    }

    /// Retry policy for write conflicts during admission and lifecycle changes.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.admission = self.admission.with_retry_policy(retry.clone());
        self.lifecycle = self.lifecycle.with_retry_policy(retry);
        self
    }

    /// Deadline for one admission attempt.
    #[must_use]
    pub const fn with_admission_deadline(mut self, deadline: Duration) -> Self {
        self.admission_deadline = deadline;
        self
    }

    /// Page size limits for listings.
    #[must_use]
    pub fn with_page_limits(mut self, default_limit: u32, max_limit: u32) -> Self {
        self.paginator = self.paginator.with_limits(default_limit, max_limit);
        self
    }
}
