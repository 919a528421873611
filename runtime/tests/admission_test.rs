//! Admission, ledger and lifecycle behaviour against the in-memory store.
//!
//! Covers concurrent reservations on one instance, the single write-conflict
//! retry, deadline rollback and seat conservation.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use chrono::{DateTime, Utc};
use futures::future::join_all;
use proptest::prelude::*;
use seatline_core::error::{ClosedReason, RegistrationError, Result};
use seatline_core::store::{AdmissionStore, SeatUpdate};
use seatline_core::types::{
    Instance, InstanceCode, NewRegistration, RegisterFlow, RegistrationId, RegistrationRecord,
    RegistrationStatus,
};
use seatline_runtime::retry::RetryPolicy;
use seatline_runtime::{AdmissionController, AdmissionRequest, CapacityLedger, RegistrationLifecycle};
use seatline_testing::{InMemoryStore, InMemoryTx, InstanceBuilder, init_test_tracing, test_clock};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Fixtures
// ============================================================================

const DEADLINE: Duration = Duration::from_secs(5);

fn fast_retry() -> RetryPolicy {
    RetryPolicy::builder()
        .initial_delay(Duration::from_millis(1))
        .build()
}

fn controller(store: &Arc<InMemoryStore>) -> AdmissionController<InMemoryStore> {
    AdmissionController::new(Arc::clone(store), Arc::new(test_clock())).with_retry_policy(fast_retry())
}

fn request(quantity: u32, registrant: &str) -> AdmissionRequest {
    AdmissionRequest {
        instance_code: InstanceCode::new("WS-01"),
        quantity,
        registrant: registrant.to_string(),
        flow: None,
    }
}

fn store_with(builder: InstanceBuilder) -> Arc<InMemoryStore> {
    init_test_tracing();
    let store = Arc::new(InMemoryStore::new());
    store.insert_instance(builder.build());
    store
}

fn seats_held(store: &InMemoryStore) -> u32 {
    store
        .registrations_for("WS-01")
        .iter()
        .map(seatline_core::types::RegistrationRecord::seats_held)
        .sum()
}

// ============================================================================
// Two requests for the last seats
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_ledger_reserves_admit_exactly_one() {
    let store = store_with(InstanceBuilder::new("WS-01").total_seats(2));

    let attempts = (0..2).map(|_| {
        let store = Arc::clone(&store);
        tokio::spawn(async move {
            let ledger = CapacityLedger::new(Arc::clone(&store));
            let mut tx = store.begin().await?;
            ledger
                .reserve(&mut tx, &InstanceCode::new("WS-01"), 2, None)
                .await?;
            store.commit(tx).await
        })
    });
    let results: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results.iter().any(|r| matches!(
        r,
        Err(RegistrationError::CapacityExhausted { requested: 2, remaining: 0 })
    )));
    assert_eq!(store.instance("WS-01").unwrap().booked_seats, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_admissions_for_last_seats_admit_exactly_one() {
    let store = store_with(InstanceBuilder::new("WS-01").total_seats(2));
    let controller = controller(&store);

    let attempts = ["ada", "grace"].map(|who| {
        let controller = controller.clone();
        tokio::spawn(async move { controller.admit(request(2, who), DEADLINE).await })
    });
    let results: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    let loser = results.into_iter().find_map(Result::err).unwrap();
    assert!(
        matches!(
            loser,
            RegistrationError::CapacityExhausted { .. }
                | RegistrationError::QuotaNotAvailable { .. }
                | RegistrationError::RegistrationClosed(ClosedReason::Full)
        ),
        "unexpected loser error: {loser:?}"
    );
    assert_eq!(store.instance("WS-01").unwrap().booked_seats, 2);
    assert_eq!(store.registrations_for("WS-01").len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn many_concurrent_admissions_never_overbook() {
    let store = store_with(
        InstanceBuilder::new("WS-01")
            .total_seats(25)
            .max_per_transaction(3),
    );
    let controller = controller(&store);

    let attempts = (0..60u32).map(|i| {
        let controller = controller.clone();
        tokio::spawn(async move {
            controller
                .admit(request(i % 3 + 1, &format!("guest-{i}")), DEADLINE)
                .await
        })
    });
    let admitted: u32 = join_all(attempts)
        .await
        .into_iter()
        .filter_map(|joined| joined.unwrap().ok())
        .map(|admission| admission.quantity)
        .sum();

    let instance = store.instance("WS-01").unwrap();
    assert!(instance.booked_seats <= instance.total_seats);
    assert_eq!(instance.booked_seats, admitted);
    assert_eq!(seats_held(&store), admitted);
}

// ============================================================================
// Register flow `none`
// ============================================================================

#[tokio::test]
async fn instance_without_register_flow_never_touches_counters() {
    let store = store_with(
        InstanceBuilder::new("WS-01")
            .register_flow(RegisterFlow::None)
            .total_seats(5),
    );
    let before = store.instance("WS-01").unwrap();
    let controller = controller(&store);

    for who in ["ada", "grace", "edsger"] {
        let admission = controller.admit(request(4, who), DEADLINE).await.unwrap();
        assert_eq!(admission.status, RegistrationStatus::Booked);
    }

    assert_eq!(store.instance("WS-01").unwrap(), before);
    assert_eq!(store.registrations_for("WS-01").len(), 3);
}

// ============================================================================
// Conflicts and deadlines
// ============================================================================

#[tokio::test]
async fn single_write_conflict_is_retried() {
    let store = store_with(InstanceBuilder::new("WS-01").total_seats(5));
    store.inject_conflicts(1);

    let admission = controller(&store)
        .admit(request(2, "ada"), DEADLINE)
        .await
        .unwrap();

    let records = store.registrations_for("WS-01");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, admission.registration_id);
    assert_eq!(store.instance("WS-01").unwrap().booked_seats, 2);
}

#[tokio::test]
async fn second_write_conflict_is_surfaced_and_nothing_is_committed() {
    let store = store_with(InstanceBuilder::new("WS-01").total_seats(5));
    store.inject_conflicts(2);

    let err = controller(&store)
        .admit(request(2, "ada"), DEADLINE)
        .await
        .unwrap_err();

    assert!(matches!(err, RegistrationError::WriteConflict(_)));
    assert!(err.is_retryable());
    assert!(store.registrations_for("WS-01").is_empty());
    assert_eq!(store.instance("WS-01").unwrap().booked_seats, 0);
}

#[tokio::test]
async fn deadline_expiry_rolls_back() {
    let store = store_with(InstanceBuilder::new("WS-01").total_seats(5));
    let controller = controller(&store);

    let held = store.hold_instance_lock("WS-01").await;
    let err = controller
        .admit(request(1, "ada"), Duration::from_millis(50))
        .await
        .unwrap_err();
    assert_eq!(err, RegistrationError::DeadlineExceeded);
    drop(held);

    assert!(store.registrations_for("WS-01").is_empty());
    assert_eq!(store.instance("WS-01").unwrap().booked_seats, 0);

    // The abandoned attempt left no lock behind.
    controller.admit(request(1, "ada"), DEADLINE).await.unwrap();
    assert_eq!(store.instance("WS-01").unwrap().booked_seats, 1);
}

/// Store whose commit is applied before a slow acknowledgement.
struct SlowCommitStore {
    inner: InMemoryStore,
    ack_delay: Duration,
}

impl AdmissionStore for SlowCommitStore {
    type Tx = InMemoryTx;

    async fn begin(&self) -> Result<InMemoryTx> {
        self.inner.begin().await
    }

    async fn commit(&self, tx: InMemoryTx) -> Result<()> {
        self.inner.commit(tx).await?;
        tokio::time::sleep(self.ack_delay).await;
        Ok(())
    }

    async fn rollback(&self, tx: InMemoryTx) -> Result<()> {
        self.inner.rollback(tx).await
    }

    async fn load_instance(&self, code: &InstanceCode) -> Result<Option<Instance>> {
        self.inner.load_instance(code).await
    }

    async fn lock_instance(
        &self,
        tx: &mut InMemoryTx,
        code: &InstanceCode,
    ) -> Result<Option<Instance>> {
        self.inner.lock_instance(tx, code).await
    }

    async fn write_seats(&self, tx: &mut InMemoryTx, update: &SeatUpdate) -> Result<()> {
        self.inner.write_seats(tx, update).await
    }

    async fn insert_registration(
        &self,
        tx: &mut InMemoryTx,
        registration: &NewRegistration,
    ) -> Result<RegistrationRecord> {
        self.inner.insert_registration(tx, registration).await
    }

    async fn lock_registration(
        &self,
        tx: &mut InMemoryTx,
        id: RegistrationId,
    ) -> Result<Option<RegistrationRecord>> {
        self.inner.lock_registration(tx, id).await
    }

    async fn update_registration_status(
        &self,
        tx: &mut InMemoryTx,
        id: RegistrationId,
        status: RegistrationStatus,
        verified_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        self.inner
            .update_registration_status(tx, id, status, verified_at)
            .await
    }
}

#[tokio::test]
async fn slow_commit_past_the_deadline_still_reports_the_admission() {
    init_test_tracing();
    let inner = InMemoryStore::new();
    inner.insert_instance(InstanceBuilder::new("WS-01").total_seats(5).build());
    let store = Arc::new(SlowCommitStore {
        inner,
        ack_delay: Duration::from_millis(200),
    });
    let controller = AdmissionController::new(Arc::clone(&store), Arc::new(test_clock()));

    let admission = controller
        .admit(request(2, "ada"), Duration::from_millis(50))
        .await
        .unwrap();

    let records = store.inner.registrations_for("WS-01");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, admission.registration_id);
    assert_eq!(store.inner.instance("WS-01").unwrap().booked_seats, 2);
}

// ============================================================================
// Window and lifecycle
// ============================================================================

#[tokio::test]
async fn closed_window_rejects_and_full_instance_reports_full() {
    let store = store_with(InstanceBuilder::new("WS-01").total_seats(2));
    let clock = test_clock();
    let controller = AdmissionController::new(Arc::clone(&store), Arc::new(clock.clone()));

    controller.admit(request(2, "ada"), DEADLINE).await.unwrap();
    assert_eq!(
        controller.admit(request(1, "grace"), DEADLINE).await,
        Err(RegistrationError::RegistrationClosed(ClosedReason::Full))
    );

    let lifecycle = RegistrationLifecycle::new(Arc::clone(&store), Arc::new(clock.clone()));
    let first = store.registrations_for("WS-01")[0].id;
    lifecycle.cancel(first).await.unwrap();

    clock.advance(chrono::Duration::days(30));
    assert_eq!(
        controller.admit(request(1, "grace"), DEADLINE).await,
        Err(RegistrationError::RegistrationClosed(ClosedReason::WindowClosed))
    );
}

#[tokio::test]
async fn unknown_instance_is_not_found() {
    let store = store_with(InstanceBuilder::new("WS-01"));
    let mut req = request(1, "ada");
    req.instance_code = InstanceCode::new("WS-404");
    assert!(matches!(
        controller(&store).admit(req, DEADLINE).await,
        Err(RegistrationError::NotFound { .. })
    ));
}

// ============================================================================
// Conservation
// ============================================================================

#[derive(Debug, Clone)]
enum Step {
    Admit(u32),
    Cancel(usize),
    CheckIn(usize),
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        (1u32..4).prop_map(Step::Admit),
        (0usize..16).prop_map(Step::Cancel),
        (0usize..16).prop_map(Step::CheckIn),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn booked_seats_equal_seats_held_by_registrations(
        total in 1u32..12,
        steps in prop::collection::vec(step(), 1..24),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let store = store_with(InstanceBuilder::new("WS-01").total_seats(total));
            let controller = controller(&store);
            let lifecycle = RegistrationLifecycle::new(Arc::clone(&store), Arc::new(test_clock()));

            for step in steps {
                match step {
                    Step::Admit(q) => {
                        let _ = controller.admit(request(q, "guest"), DEADLINE).await;
                    }
                    Step::Cancel(i) | Step::CheckIn(i) => {
                        let records = store.registrations_for("WS-01");
                        if let Some(record) = records.get(i % records.len().max(1)) {
                            let _ = if matches!(step, Step::Cancel(_)) {
                                lifecycle.cancel(record.id).await
                            } else {
                                lifecycle.check_in(record.id).await
                            };
                        }
                    }
                }

                let instance = store.instance("WS-01").unwrap();
                assert!(instance.counters().is_consistent());
                assert_eq!(instance.booked_seats, seats_held(&store));
            }
        });
    }
}
