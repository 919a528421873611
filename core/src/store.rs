//! Persistence collaborators.
//!
//! Three seams, each implemented by `seatline-postgres` in production and by
//! `seatline-testing` in tests:
//!
//! - [`AdmissionStore`]: transaction-scoped reads and writes used by the ledger,
//!   the admission controller and the lifecycle operations
//! - [`RegistrationQuery`]: keyset window reads for listings
//! - [`IdempotencyStore`]: request de-duplication with a TTL
//!
//! Every mutating method takes the caller's transaction handle. There is no
//! ambient transaction.

use crate::cursor::SortKey;
use crate::error::Result;
use crate::page::Direction;
use crate::seats::SeatCounters;
use crate::types::{
    FlowKind, Instance, InstanceCode, NewRegistration, RegistrationId, RegistrationRecord,
    RegistrationStatus,
};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;

// ============================================================================
// Admission store
// ============================================================================

/// Counter write-back for one instance.
///
/// `expected_version` is the version read under the lock; a store that finds a
/// different version reports [`crate::error::RegistrationError::WriteConflict`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeatUpdate {
    /// Instance being written
    pub instance_code: InstanceCode,
    /// New counter values
    pub counters: SeatCounters,
    /// New `used` value of one flow slot
    pub flow_used: Option<(FlowKind, u32)>,
    /// Version observed when the row was locked
    pub expected_version: i64,
}

/// Transaction-scoped persistence for instances and registrations.
///
/// Implementations serialise writers per instance row: [`lock_instance`]
/// blocks until no other open transaction holds the same instance.
///
/// [`lock_instance`]: AdmissionStore::lock_instance
pub trait AdmissionStore: Send + Sync {
    /// Open transaction handle.
    type Tx: Send;

    /// Begin a transaction.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the store is unreachable.
    fn begin(&self) -> impl Future<Output = Result<Self::Tx>> + Send;

    /// Commit a transaction.
    ///
    /// # Errors
    ///
    /// Returns `WriteConflict` on serialization failure, `Internal` otherwise.
    fn commit(&self, tx: Self::Tx) -> impl Future<Output = Result<()>> + Send;

    /// Roll back a transaction. Dropping the handle has the same effect.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the store rejects the rollback.
    fn rollback(&self, tx: Self::Tx) -> impl Future<Output = Result<()>> + Send;

    /// Read an instance without locking it.
    ///
    /// # Errors
    ///
    /// Returns `Internal` on store failure.
    fn load_instance(
        &self,
        code: &InstanceCode,
    ) -> impl Future<Output = Result<Option<Instance>>> + Send;

    /// Read an instance with write intent, holding its lock until the
    /// transaction ends.
    ///
    /// # Errors
    ///
    /// Returns `WriteConflict` on deadlock or serialization failure, `Internal`
    /// otherwise.
    fn lock_instance(
        &self,
        tx: &mut Self::Tx,
        code: &InstanceCode,
    ) -> impl Future<Output = Result<Option<Instance>>> + Send;

    /// Write new counter values for a locked instance.
    ///
    /// # Errors
    ///
    /// Returns `WriteConflict` if the row version moved, `Internal` otherwise.
    fn write_seats(
        &self,
        tx: &mut Self::Tx,
        update: &SeatUpdate,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Insert a `booked` registration and return it with its new id.
    ///
    /// # Errors
    ///
    /// Returns `Internal` on store failure.
    fn insert_registration(
        &self,
        tx: &mut Self::Tx,
        registration: &NewRegistration,
    ) -> impl Future<Output = Result<RegistrationRecord>> + Send;

    /// Read a registration with write intent.
    ///
    /// # Errors
    ///
    /// Returns `WriteConflict` on deadlock, `Internal` otherwise.
    fn lock_registration(
        &self,
        tx: &mut Self::Tx,
        id: RegistrationId,
    ) -> impl Future<Output = Result<Option<RegistrationRecord>>> + Send;

    /// Change the status of a locked registration.
    ///
    /// # Errors
    ///
    /// Returns `Internal` on store failure.
    fn update_registration_status(
        &self,
        tx: &mut Self::Tx,
        id: RegistrationId,
        status: RegistrationStatus,
        verified_at: Option<DateTime<Utc>>,
    ) -> impl Future<Output = Result<()>> + Send;
}

// ============================================================================
// Listing queries
// ============================================================================

/// Predicate shared by the window query and the count.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegistrationFilter {
    /// Instance whose registrations are listed
    pub instance_code: InstanceCode,
    /// Only this status
    pub status: Option<RegistrationStatus>,
    /// Case-insensitive substring of the registrant
    pub search: Option<String>,
}

impl RegistrationFilter {
    /// Every registration of an instance.
    #[must_use]
    pub const fn for_instance(instance_code: InstanceCode) -> Self {
        Self {
            instance_code,
            status: None,
            search: None,
        }
    }

    /// Whether a record passes the filter.
    #[must_use]
    pub fn matches(&self, record: &RegistrationRecord) -> bool {
        record.instance_code == self.instance_code
            && self.status.is_none_or(|status| record.status == status)
            && self.search.as_deref().is_none_or(|needle| {
                record
                    .registrant
                    .to_lowercase()
                    .contains(&needle.to_lowercase())
            })
    }
}

/// Rows to fetch past a boundary key.
///
/// [`Direction::Next`] reads keys strictly below `after`, descending.
/// [`Direction::Prev`] reads keys strictly above `after`, ascending.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeysetWindow {
    /// Boundary key; `None` starts from the matching end
    pub after: Option<SortKey>,
    /// Traversal direction
    pub direction: Direction,
    /// Maximum rows to return (page size plus one look-ahead row)
    pub fetch: u32,
}

/// Read side for registration listings.
pub trait RegistrationQuery: Send + Sync {
    /// Fetch one keyset window.
    ///
    /// # Errors
    ///
    /// Returns `Internal` on store failure.
    fn fetch_window(
        &self,
        filter: &RegistrationFilter,
        window: &KeysetWindow,
    ) -> impl Future<Output = Result<Vec<RegistrationRecord>>> + Send;

    /// Count rows matching the filter.
    ///
    /// # Errors
    ///
    /// Returns `Internal` on store failure.
    fn count(&self, filter: &RegistrationFilter) -> impl Future<Output = Result<u64>> + Send;
}

// ============================================================================
// Idempotency
// ============================================================================

/// Request de-duplication keyed by a client-supplied id.
///
/// Entries expire after a store-configured TTL. This trait uses explicit
/// `Pin<Box<dyn Future>>` returns so it can be held as `Arc<dyn IdempotencyStore>`.
pub trait IdempotencyStore: Send + Sync {
    /// Whether `key` was marked and has not expired.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the backing store is unreachable.
    fn seen<'a>(&'a self, key: &'a str) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + 'a>>;

    /// Atomically mark `key`. Returns `true` if this call marked it, `false` if
    /// it was already present.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the backing store is unreachable.
    fn mark_seen<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + 'a>>;

    /// Remove a mark so the request can be retried.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the backing store is unreachable.
    fn forget<'a>(&'a self, key: &'a str) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}
