//! In-memory admission store.
//!
//! Mirrors the PostgreSQL store closely enough for concurrency tests:
//! - one async row lock per instance and per registration, held by the
//!   transaction until commit or drop (like `SELECT ... FOR UPDATE`)
//! - writes buffered in the transaction and applied atomically on commit
//! - a version check on commit, plus [`InMemoryStore::inject_conflicts`] to
//!   force `WriteConflict` on the next commits

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Panics only on poisoned locks

use chrono::{DateTime, Utc};
use seatline_core::error::{RegistrationError, Result};
use seatline_core::page::Direction;
use seatline_core::store::{
    AdmissionStore, KeysetWindow, RegistrationFilter, RegistrationQuery, SeatUpdate,
};
use seatline_core::types::{
    Instance, InstanceCode, NewRegistration, RegistrationId, RegistrationRecord,
    RegistrationStatus,
};
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::hash::Hash;
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as RowLock, OwnedMutexGuard};

type LockTable<K> = Mutex<HashMap<K, Arc<RowLock<()>>>>;

#[derive(Default)]
struct State {
    instances: HashMap<InstanceCode, Instance>,
    registrations: BTreeMap<RegistrationId, RegistrationRecord>,
}

struct Inner {
    state: Mutex<State>,
    instance_locks: LockTable<InstanceCode>,
    registration_locks: LockTable<RegistrationId>,
    next_id: AtomicI64,
    pending_conflicts: AtomicU32,
}

fn row_lock<K: Eq + Hash + Clone>(table: &LockTable<K>, key: &K) -> Arc<RowLock<()>> {
    table.lock().unwrap().entry(key.clone()).or_default().clone()
}

/// In-memory store for fast, deterministic tests.
///
/// Clones share the same data.
#[derive(Clone)]
pub struct InMemoryStore {
    inner: Arc<Inner>,
}

/// Open transaction on an [`InMemoryStore`].
///
/// Dropping it releases its row locks and discards its writes.
pub struct InMemoryTx {
    guards: Vec<OwnedMutexGuard<()>>,
    locked_instances: HashSet<InstanceCode>,
    locked_registrations: HashSet<RegistrationId>,
    /// Locked instances with the version they were read at
    instances: HashMap<InstanceCode, (i64, Instance)>,
    /// Inserted or modified registrations
    registrations: HashMap<RegistrationId, RegistrationRecord>,
}

/// Row lock on an instance held outside any transaction.
///
/// Used to simulate a slow writer; released on drop.
pub struct InstanceLockGuard {
    _guard: OwnedMutexGuard<()>,
}

impl InMemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                instance_locks: Mutex::new(HashMap::new()),
                registration_locks: Mutex::new(HashMap::new()),
                next_id: AtomicI64::new(1),
                pending_conflicts: AtomicU32::new(0),
            }),
        }
    }

    /// Add or replace an instance.
    pub fn insert_instance(&self, instance: Instance) {
        self.inner
            .state
            .lock()
            .unwrap()
            .instances
            .insert(instance.code.clone(), instance);
    }

    /// Committed state of an instance.
    #[must_use]
    pub fn instance(&self, code: &str) -> Option<Instance> {
        self.inner
            .state
            .lock()
            .unwrap()
            .instances
            .get(&InstanceCode::new(code))
            .cloned()
    }

    /// Committed state of a registration.
    #[must_use]
    pub fn registration(&self, id: RegistrationId) -> Option<RegistrationRecord> {
        self.inner.state.lock().unwrap().registrations.get(&id).cloned()
    }

    /// Committed registrations of an instance, in id order.
    #[must_use]
    pub fn registrations_for(&self, code: &str) -> Vec<RegistrationRecord> {
        let code = InstanceCode::new(code);
        self.inner
            .state
            .lock()
            .unwrap()
            .registrations
            .values()
            .filter(|record| record.instance_code == code)
            .cloned()
            .collect()
    }

    /// Insert a registration directly, bypassing seat accounting.
    ///
    /// For listing tests that only need rows.
    pub fn seed_registration(
        &self,
        registration: NewRegistration,
        status: RegistrationStatus,
    ) -> RegistrationRecord {
        let id = RegistrationId::new(self.inner.next_id.fetch_add(1, Ordering::SeqCst));
        let mut record = registration.into_record(id);
        record.status = status;
        self.inner
            .state
            .lock()
            .unwrap()
            .registrations
            .insert(id, record.clone());
        record
    }

    /// Make the next `count` commits fail with `WriteConflict`.
    pub fn inject_conflicts(&self, count: u32) {
        self.inner.pending_conflicts.store(count, Ordering::SeqCst);
    }

    /// Take an instance's row lock outside of any transaction.
    pub async fn hold_instance_lock(&self, code: &str) -> InstanceLockGuard {
        let lock = row_lock(&self.inner.instance_locks, &InstanceCode::new(code));
        InstanceLockGuard {
            _guard: lock.lock_owned().await,
        }
    }

    fn take_injected_conflict(&self) -> bool {
        self.inner
            .pending_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn apply(&self, tx: InMemoryTx) -> Result<()> {
        if self.take_injected_conflict() {
            return Err(RegistrationError::WriteConflict(
                "injected commit conflict".to_string(),
            ));
        }

        let mut state = self.inner.state.lock().unwrap();
        for (code, (read_version, _)) in &tx.instances {
            let current = state.instances.get(code).map(|instance| instance.version);
            if current != Some(*read_version) {
                return Err(RegistrationError::WriteConflict(format!(
                    "instance {code} changed since it was read"
                )));
            }
        }
        for (code, (_, instance)) in tx.instances {
            state.instances.insert(code, instance);
        }
        state.registrations.extend(tx.registrations);
        Ok(())
    }

    fn select(&self, filter: &RegistrationFilter, window: &KeysetWindow) -> Vec<RegistrationRecord> {
        let state = self.inner.state.lock().unwrap();
        let mut rows: Vec<RegistrationRecord> = state
            .registrations
            .values()
            .filter(|record| filter.matches(record))
            .filter(|record| match (window.after, window.direction) {
                (None, _) => true,
                (Some(after), Direction::Next) => record.sort_key() < after,
                (Some(after), Direction::Prev) => record.sort_key() > after,
            })
            .cloned()
            .collect();
        drop(state);

        match window.direction {
            Direction::Next => rows.sort_by_key(|record| Reverse(record.sort_key())),
            Direction::Prev => rows.sort_by_key(RegistrationRecord::sort_key),
        }
        rows.truncate(usize::try_from(window.fetch).unwrap_or(usize::MAX));
        rows
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AdmissionStore for InMemoryStore {
    type Tx = InMemoryTx;

    async fn begin(&self) -> Result<InMemoryTx> {
        Ok(InMemoryTx {
            guards: Vec::new(),
            locked_instances: HashSet::new(),
            locked_registrations: HashSet::new(),
            instances: HashMap::new(),
            registrations: HashMap::new(),
        })
    }

    async fn commit(&self, tx: InMemoryTx) -> Result<()> {
        self.apply(tx)
    }

    async fn rollback(&self, tx: InMemoryTx) -> Result<()> {
        drop(tx);
        Ok(())
    }

    async fn load_instance(&self, code: &InstanceCode) -> Result<Option<Instance>> {
        Ok(self.inner.state.lock().unwrap().instances.get(code).cloned())
    }

    async fn lock_instance(
        &self,
        tx: &mut InMemoryTx,
        code: &InstanceCode,
    ) -> Result<Option<Instance>> {
        if let Some((_, instance)) = tx.instances.get(code) {
            return Ok(Some(instance.clone()));
        }
        if !tx.locked_instances.contains(code) {
            let lock = row_lock(&self.inner.instance_locks, code);
            tx.guards.push(lock.lock_owned().await);
            tx.locked_instances.insert(code.clone());
        }

        let instance = self.inner.state.lock().unwrap().instances.get(code).cloned();
        if let Some(instance) = &instance {
            tx.instances
                .insert(code.clone(), (instance.version, instance.clone()));
        }
        Ok(instance)
    }

    async fn write_seats(&self, tx: &mut InMemoryTx, update: &SeatUpdate) -> Result<()> {
        let Some((_, instance)) = tx.instances.get_mut(&update.instance_code) else {
            return Err(RegistrationError::Internal(format!(
                "instance {} is not locked by this transaction",
                update.instance_code
            )));
        };
        if instance.version != update.expected_version {
            return Err(RegistrationError::WriteConflict(format!(
                "instance {} version {} != expected {}",
                update.instance_code, instance.version, update.expected_version
            )));
        }

        instance.total_seats = update.counters.total;
        instance.booked_seats = update.counters.booked;
        instance.scanned_seats = update.counters.scanned;
        if let Some((flow, used)) = update.flow_used {
            if let Some(slot) = instance.flow_slots.iter_mut().find(|slot| slot.flow == flow) {
                slot.used = used;
            }
        }
        instance.version += 1;
        Ok(())
    }

    async fn insert_registration(
        &self,
        tx: &mut InMemoryTx,
        registration: &NewRegistration,
    ) -> Result<RegistrationRecord> {
        let id = RegistrationId::new(self.inner.next_id.fetch_add(1, Ordering::SeqCst));
        let record = registration.clone().into_record(id);
        tx.registrations.insert(id, record.clone());
        Ok(record)
    }

    async fn lock_registration(
        &self,
        tx: &mut InMemoryTx,
        id: RegistrationId,
    ) -> Result<Option<RegistrationRecord>> {
        if let Some(record) = tx.registrations.get(&id) {
            return Ok(Some(record.clone()));
        }
        if !tx.locked_registrations.contains(&id) {
            let lock = row_lock(&self.inner.registration_locks, &id);
            tx.guards.push(lock.lock_owned().await);
            tx.locked_registrations.insert(id);
        }
        Ok(self.registration(id))
    }

    async fn update_registration_status(
        &self,
        tx: &mut InMemoryTx,
        id: RegistrationId,
        status: RegistrationStatus,
        verified_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let mut record = match tx.registrations.get(&id) {
            Some(record) => record.clone(),
            None => self
                .registration(id)
                .ok_or_else(|| RegistrationError::registration_not_found(id))?,
        };
        record.status = status;
        record.verified_at = verified_at;
        tx.registrations.insert(id, record);
        Ok(())
    }
}

impl RegistrationQuery for InMemoryStore {
    async fn fetch_window(
        &self,
        filter: &RegistrationFilter,
        window: &KeysetWindow,
    ) -> Result<Vec<RegistrationRecord>> {
        Ok(self.select(filter, window))
    }

    async fn count(&self, filter: &RegistrationFilter) -> Result<u64> {
        let state = self.inner.state.lock().unwrap();
        let count = state
            .registrations
            .values()
            .filter(|record| filter.matches(record))
            .count();
        Ok(u64::try_from(count).unwrap_or(u64::MAX))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::{InstanceBuilder, test_time};
    use seatline_core::seats::SeatCounters;

    fn update(instance: &Instance, booked: u32) -> SeatUpdate {
        SeatUpdate {
            instance_code: instance.code.clone(),
            counters: SeatCounters {
                booked,
                ..instance.counters()
            },
            flow_used: None,
            expected_version: instance.version,
        }
    }

    #[tokio::test]
    async fn uncommitted_writes_are_invisible_and_dropped_on_rollback() {
        let store = InMemoryStore::new();
        store.insert_instance(InstanceBuilder::new("WS-01").total_seats(5).build());
        let code = InstanceCode::new("WS-01");

        let mut tx = store.begin().await.unwrap();
        let instance = store.lock_instance(&mut tx, &code).await.unwrap().unwrap();
        store.write_seats(&mut tx, &update(&instance, 3)).await.unwrap();
        assert_eq!(store.instance("WS-01").unwrap().booked_seats, 0);

        store.rollback(tx).await.unwrap();
        assert_eq!(store.instance("WS-01").unwrap().booked_seats, 0);
    }

    #[tokio::test]
    async fn commit_applies_writes_and_bumps_version() {
        let store = InMemoryStore::new();
        store.insert_instance(InstanceBuilder::new("WS-01").total_seats(5).build());
        let code = InstanceCode::new("WS-01");

        let mut tx = store.begin().await.unwrap();
        let instance = store.lock_instance(&mut tx, &code).await.unwrap().unwrap();
        store.write_seats(&mut tx, &update(&instance, 3)).await.unwrap();
        store.commit(tx).await.unwrap();

        let committed = store.instance("WS-01").unwrap();
        assert_eq!(committed.booked_seats, 3);
        assert_eq!(committed.version, instance.version + 1);
    }

    #[tokio::test]
    async fn stale_version_is_a_write_conflict() {
        let store = InMemoryStore::new();
        store.insert_instance(InstanceBuilder::new("WS-01").build());
        let code = InstanceCode::new("WS-01");

        let mut tx = store.begin().await.unwrap();
        let mut instance = store.lock_instance(&mut tx, &code).await.unwrap().unwrap();
        instance.version -= 1;
        let err = store.write_seats(&mut tx, &update(&instance, 1)).await.unwrap_err();
        assert!(matches!(err, RegistrationError::WriteConflict(_)));
    }

    #[tokio::test]
    async fn injected_conflicts_fail_the_next_commits_only() {
        let store = InMemoryStore::new();
        store.inject_conflicts(1);

        let tx = store.begin().await.unwrap();
        assert!(matches!(
            store.commit(tx).await,
            Err(RegistrationError::WriteConflict(_))
        ));
        let tx = store.begin().await.unwrap();
        assert!(store.commit(tx).await.is_ok());
    }

    #[tokio::test]
    async fn second_transaction_waits_for_the_row_lock() {
        let store = InMemoryStore::new();
        store.insert_instance(InstanceBuilder::new("WS-01").build());
        let code = InstanceCode::new("WS-01");

        let mut first = store.begin().await.unwrap();
        store.lock_instance(&mut first, &code).await.unwrap();

        let contender = {
            let store = store.clone();
            let code = code.clone();
            tokio::spawn(async move {
                let mut tx = store.begin().await.unwrap();
                store.lock_instance(&mut tx, &code).await.unwrap()
            })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        store.commit(first).await.unwrap();
        assert!(contender.await.unwrap().is_some());
    }

    #[tokio::test]
    async fn keyset_window_reads_both_directions() {
        let store = InMemoryStore::new();
        for minute in 0..5 {
            store.seed_registration(
                NewRegistration {
                    instance_code: InstanceCode::new("WS-01"),
                    registrant: format!("guest-{minute}"),
                    quantity: 1,
                    flow: None,
                    registered_at: test_time() + chrono::Duration::minutes(minute),
                },
                RegistrationStatus::Booked,
            );
        }
        let filter = RegistrationFilter::for_instance(InstanceCode::new("WS-01"));
        let all = store
            .fetch_window(&filter, &KeysetWindow { after: None, direction: Direction::Next, fetch: 10 })
            .await
            .unwrap();
        assert_eq!(all.len(), 5);
        assert_eq!(all[0].registrant, "guest-4");

        let pivot = all[2].sort_key();
        let newer = store
            .fetch_window(
                &filter,
                &KeysetWindow { after: Some(pivot), direction: Direction::Prev, fetch: 10 },
            )
            .await
            .unwrap();
        let names: Vec<&str> = newer.iter().map(|r| r.registrant.as_str()).collect();
        assert_eq!(names, ["guest-3", "guest-4"]);
        assert_eq!(store.count(&filter).await.unwrap(), 5);
    }
}
