//! Registration status transitions that move seats.
//!
//! ```text
//! booked --cancel-->   cancelled   (seats released)
//! booked --check_in--> attended    (seats stay booked, marked scanned)
//! ```
//!
//! Locks are taken registration first, instance second.

use crate::ledger::CapacityLedger;
use crate::retry::{RetryPolicy, retry_on_conflict};
use seatline_core::environment::Clock;
use seatline_core::error::{RegistrationError, Result};
use seatline_core::store::AdmissionStore;
use seatline_core::types::{RegistrationId, RegistrationRecord, RegistrationStatus};
use std::sync::Arc;

/// Cancellation and check-in.
pub struct RegistrationLifecycle<S> {
    store: Arc<S>,
    ledger: CapacityLedger<S>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
}

impl<S> Clone for RegistrationLifecycle<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            ledger: self.ledger.clone(),
            clock: Arc::clone(&self.clock),
            retry: self.retry.clone(),
        }
    }
}

impl<S: AdmissionStore> RegistrationLifecycle<S> {
    /// Create the lifecycle service.
    #[must_use]
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self {
            ledger: CapacityLedger::new(Arc::clone(&store)),
            store,
            clock,
            retry: RetryPolicy::default(),
        }
    }

    /// Replace the conflict retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Cancel a booked registration and release its seats.
    ///
    /// # Errors
    ///
    /// - `NotFound` for an unknown id
    /// - `InvalidTransition` unless the registration is `booked`
    /// - `WriteConflict` / `Internal` from the store
    #[tracing::instrument(skip(self))]
    pub async fn cancel(&self, id: RegistrationId) -> Result<RegistrationRecord> {
        let record = retry_on_conflict(&self.retry, "cancel", || {
            self.transition(id, RegistrationStatus::Cancelled)
        })
        .await?;

        metrics::counter!("lifecycle.cancelled").increment(1);
        tracing::info!(instance = %record.instance_code, "Registration cancelled");
        Ok(record)
    }

    /// Check in a booked registration and mark its seats scanned.
    ///
    /// # Errors
    ///
    /// - `NotFound` for an unknown id
    /// - `InvalidTransition` unless the registration is `booked`
    /// - `WriteConflict` / `Internal` from the store
    #[tracing::instrument(skip(self))]
    pub async fn check_in(&self, id: RegistrationId) -> Result<RegistrationRecord> {
        let record = retry_on_conflict(&self.retry, "check_in", || {
            self.transition(id, RegistrationStatus::Attended)
        })
        .await?;

        metrics::counter!("lifecycle.checked_in").increment(1);
        tracing::info!(instance = %record.instance_code, "Registration checked in");
        Ok(record)
    }

    async fn transition(
        &self,
        id: RegistrationId,
        to: RegistrationStatus,
    ) -> Result<RegistrationRecord> {
        let mut tx = self.store.begin().await?;
        match self.apply(&mut tx, id, to).await {
            Ok(record) => {
                self.store.commit(tx).await?;
                Ok(record)
            }
            Err(err) => {
                if let Err(rollback_err) = self.store.rollback(tx).await {
                    tracing::warn!(error = %rollback_err, "Rollback failed");
                }
                Err(err)
            }
        }
    }

    async fn apply(
        &self,
        tx: &mut S::Tx,
        id: RegistrationId,
        to: RegistrationStatus,
    ) -> Result<RegistrationRecord> {
        let mut record = self
            .store
            .lock_registration(tx, id)
            .await?
            .ok_or_else(|| RegistrationError::registration_not_found(id))?;

        if record.status != RegistrationStatus::Booked {
            return Err(RegistrationError::InvalidTransition {
                from: record.status,
                to,
            });
        }

        let seats = record.seats_held();
        if to == RegistrationStatus::Attended {
            record.verified_at = Some(self.clock.now());
        }
        self.store
            .update_registration_status(tx, id, to, record.verified_at)
            .await?;

        match to {
            RegistrationStatus::Cancelled => {
                self.ledger
                    .release(tx, &record.instance_code, seats, record.flow)
                    .await?;
            }
            RegistrationStatus::Attended => {
                self.ledger
                    .mark_scanned(tx, &record.instance_code, seats)
                    .await?;
            }
            RegistrationStatus::Booked => {}
        }

        record.status = to;
        Ok(record)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use seatline_core::types::{FlowKind, InstanceCode, NewRegistration};
    use seatline_testing::{InMemoryStore, InstanceBuilder, test_clock, test_time};

    async fn booked(store: &InMemoryStore, quantity: u32) -> RegistrationRecord {
        let ledger = CapacityLedger::new(Arc::new(store.clone()));
        let mut tx = store.begin().await.unwrap();
        let code = InstanceCode::new("WS-01");
        ledger
            .reserve(&mut tx, &code, quantity, Some(FlowKind::Personal))
            .await
            .unwrap();
        let record = store
            .insert_registration(
                &mut tx,
                &NewRegistration {
                    instance_code: code,
                    registrant: "ada".to_string(),
                    quantity,
                    flow: Some(FlowKind::Personal),
                    registered_at: test_time(),
                },
            )
            .await
            .unwrap();
        store.commit(tx).await.unwrap();
        record
    }

    fn lifecycle(store: &InMemoryStore) -> RegistrationLifecycle<InMemoryStore> {
        RegistrationLifecycle::new(Arc::new(store.clone()), Arc::new(test_clock()))
    }

    #[tokio::test]
    async fn cancel_releases_seats_once() {
        let store = InMemoryStore::new();
        store.insert_instance(InstanceBuilder::new("WS-01").total_seats(5).build());
        let record = booked(&store, 3).await;

        let cancelled = lifecycle(&store).cancel(record.id).await.unwrap();
        assert_eq!(cancelled.status, RegistrationStatus::Cancelled);

        let instance = store.instance("WS-01").unwrap();
        assert_eq!(instance.booked_seats, 0);
        assert_eq!(instance.flow_slot(FlowKind::Personal).unwrap().used, 0);

        let err = lifecycle(&store).cancel(record.id).await.unwrap_err();
        assert_eq!(
            err,
            RegistrationError::InvalidTransition {
                from: RegistrationStatus::Cancelled,
                to: RegistrationStatus::Cancelled
            }
        );
        assert_eq!(store.instance("WS-01").unwrap().booked_seats, 0);
    }

    #[tokio::test]
    async fn check_in_marks_scanned_and_keeps_seats() {
        let store = InMemoryStore::new();
        store.insert_instance(InstanceBuilder::new("WS-01").total_seats(5).build());
        let record = booked(&store, 2).await;

        let attended = lifecycle(&store).check_in(record.id).await.unwrap();
        assert_eq!(attended.status, RegistrationStatus::Attended);
        assert_eq!(attended.verified_at, Some(test_time()));

        let instance = store.instance("WS-01").unwrap();
        assert_eq!(instance.booked_seats, 2);
        assert_eq!(instance.scanned_seats, 2);
        assert_eq!(
            store.registration(record.id).unwrap().status,
            RegistrationStatus::Attended
        );

        assert!(matches!(
            lifecycle(&store).cancel(record.id).await,
            Err(RegistrationError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn unknown_registration_is_not_found() {
        let store = InMemoryStore::new();
        let err = lifecycle(&store)
            .cancel(RegistrationId::new(404))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistrationError::NotFound { .. }));
    }
}
