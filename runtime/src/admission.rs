//! Admission controller.
//!
//! One call to [`AdmissionController::admit`] is one registration attempt:
//!
//! ```text
//! load instance -> evaluate (classify, quantity, flow, advisory quota)
//!   -> begin -> reserve seats under lock -> insert record -> commit
//! ```
//!
//! The seat reservation and the record insert share one transaction, so either
//! both are committed or neither is. A write conflict re-runs the whole attempt
//! once. The caller's deadline bounds everything up to the commit, retries
//! included; a commit that has been issued is always awaited, so
//! `DeadlineExceeded` means nothing was written.

use crate::ledger::CapacityLedger;
use crate::retry::{RetryPolicy, retry_on_conflict};
use chrono::{DateTime, Utc};
use seatline_core::availability::{Availability, SeatWindowInfo, classify};
use seatline_core::environment::Clock;
use seatline_core::error::{ClosedReason, RegistrationError, Result};
use seatline_core::store::AdmissionStore;
use seatline_core::types::{
    FlowKind, Instance, InstanceCode, InstanceStatus, NewRegistration, RegistrationId,
    RegistrationRecord, RegistrationStatus,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// A registration attempt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionRequest {
    /// Instance to register for
    pub instance_code: InstanceCode,
    /// Seats requested
    pub quantity: u32,
    /// Registrant identity
    pub registrant: String,
    /// Flow to count the booking against; defaults per instance
    #[serde(default)]
    pub flow: Option<FlowKind>,
}

/// A committed registration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Admission {
    /// New registration id
    pub registration_id: RegistrationId,
    /// Instance registered for
    pub instance_code: InstanceCode,
    /// Seats claimed
    pub quantity: u32,
    /// Always `booked`
    pub status: RegistrationStatus,
    /// Admission timestamp
    pub registered_at: DateTime<Utc>,
}

impl From<RegistrationRecord> for Admission {
    fn from(record: RegistrationRecord) -> Self {
        Self {
            registration_id: record.id,
            instance_code: record.instance_code,
            quantity: record.quantity,
            status: record.status,
            registered_at: record.registered_at,
        }
    }
}

/// Outcome of the checks that run before the transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AdmissionPlan {
    /// Availability at evaluation time
    pub availability: Availability,
    /// Seats to reserve (0 for instances without a register flow)
    pub effective_quantity: u32,
    /// Flow slot to count against
    pub flow: Option<FlowKind>,
}

/// Run the pre-transaction checks against a loaded instance.
///
/// The quota check here is advisory: the ledger re-checks under the row lock.
///
/// # Errors
///
/// - `RegistrationClosed` if the instance is inactive or not classified
///   `available`/`walkin`
/// - `InvalidQuantity` for zero seats
/// - `ExceedsMaxPerTransaction` above the per-registration maximum
/// - `FlowNotOffered` for a flow the instance does not offer
/// - `QuotaNotAvailable` if fewer seats remain than requested
pub fn evaluate_admission(
    instance: &Instance,
    request: &AdmissionRequest,
    now: DateTime<Utc>,
) -> Result<AdmissionPlan> {
    if instance.status == InstanceStatus::Inactive {
        return Err(RegistrationError::RegistrationClosed(ClosedReason::Inactive));
    }

    let availability = classify(&SeatWindowInfo::from(instance), now);
    if let Some(reason) = availability.closed_reason() {
        return Err(RegistrationError::RegistrationClosed(reason));
    }

    if request.quantity == 0 {
        return Err(RegistrationError::InvalidQuantity);
    }
    if request.quantity > instance.max_per_transaction {
        return Err(RegistrationError::ExceedsMaxPerTransaction {
            requested: request.quantity,
            max: instance.max_per_transaction,
        });
    }

    let flow = instance.register_flow.resolve(request.flow)?;
    let tracks_seats = instance.register_flow.requires_registration();

    let remaining = instance.remaining_seats();
    if tracks_seats && instance.total_seats > 0 && remaining < i64::from(request.quantity) {
        return Err(RegistrationError::QuotaNotAvailable {
            requested: request.quantity,
            remaining,
        });
    }

    Ok(AdmissionPlan {
        availability,
        effective_quantity: if tracks_seats { request.quantity } else { 0 },
        flow,
    })
}

/// Orchestrates registration attempts.
pub struct AdmissionController<S> {
    store: Arc<S>,
    ledger: CapacityLedger<S>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
}

impl<S> Clone for AdmissionController<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            ledger: self.ledger.clone(),
            clock: Arc::clone(&self.clock),
            retry: self.retry.clone(),
        }
    }
}

impl<S: AdmissionStore> AdmissionController<S> {
    /// Create a controller with the default single-retry policy.
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

    /// Admit one registration within `deadline`.
    ///
    /// # Errors
    ///
    /// Everything [`evaluate_admission`] returns, plus:
    /// - `NotFound` if the instance does not exist
    /// - `CapacityExhausted` if the seats went to a concurrent request
    /// - `WriteConflict` if the retry also conflicted
    /// - `DeadlineExceeded` if `deadline` passed before the commit was
    ///   issued; nothing was written
    /// - `Internal` on other store failures
    ///
    /// The deadline is not applied to the commit itself. A slow commit delays
    /// the result instead of turning a stored registration into an error.
    #[tracing::instrument(
        skip(self, request),
        fields(instance = %request.instance_code, quantity = request.quantity)
    )]
    pub async fn admit(&self, request: AdmissionRequest, deadline: Duration) -> Result<Admission> {
        let expires_at = Instant::now() + deadline;
        let outcome = retry_on_conflict(&self.retry, "admission", || {
            self.attempt(&request, expires_at)
        })
        .await;

        match &outcome {
            Ok(admission) => {
                metrics::counter!("admission.admitted").increment(1);
                tracing::info!(
                    registration_id = %admission.registration_id,
                    "Registration admitted"
                );
            }
            Err(err) => {
                metrics::counter!("admission.rejected", "reason" => err.kind()).increment(1);
                match err {
                    RegistrationError::Internal(detail) => {
                        tracing::error!(error = %detail, "Admission failed");
                    }
                    RegistrationError::WriteConflict(_) | RegistrationError::DeadlineExceeded => {
                        tracing::warn!(error = %err, "Admission not completed");
                    }
                    _ => tracing::debug!(reason = err.kind(), "Admission rejected"),
                }
            }
        }
        outcome
    }

    async fn attempt(&self, request: &AdmissionRequest, expires_at: Instant) -> Result<Admission> {
        // Dropping an unfinished prepare drops its transaction, which rolls back.
        let (tx, record) = match tokio::time::timeout_at(expires_at, self.prepare(request)).await {
            Ok(prepared) => prepared?,
            Err(_) => return Err(RegistrationError::DeadlineExceeded),
        };

        self.store.commit(tx).await?;
        Ok(record.into())
    }

    /// Everything before the commit: load, evaluate, begin, reserve, insert.
    async fn prepare(&self, request: &AdmissionRequest) -> Result<(S::Tx, RegistrationRecord)> {
        let now = self.clock.now();
        let instance = self
            .store
            .load_instance(&request.instance_code)
            .await?
            .ok_or_else(|| RegistrationError::instance_not_found(&request.instance_code))?;

        let plan = evaluate_admission(&instance, request, now)?;

        let mut tx = self.store.begin().await?;
        match self.reserve_and_record(&mut tx, request, &plan, now).await {
            Ok(record) => Ok((tx, record)),
            Err(err) => {
                if let Err(rollback_err) = self.store.rollback(tx).await {
                    tracing::warn!(error = %rollback_err, "Rollback failed");
                }
                Err(err)
            }
        }
    }

    async fn reserve_and_record(
        &self,
        tx: &mut S::Tx,
        request: &AdmissionRequest,
        plan: &AdmissionPlan,
        now: DateTime<Utc>,
    ) -> Result<RegistrationRecord> {
        self.ledger
            .reserve(tx, &request.instance_code, plan.effective_quantity, plan.flow)
            .await?;

        self.store
            .insert_registration(
                tx,
                &NewRegistration {
                    instance_code: request.instance_code.clone(),
                    registrant: request.registrant.clone(),
                    quantity: request.quantity,
                    flow: plan.flow,
                    registered_at: now,
                },
            )
            .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use seatline_core::types::RegisterFlow;
    use seatline_testing::{InstanceBuilder, test_time};

    fn request(quantity: u32) -> AdmissionRequest {
        AdmissionRequest {
            instance_code: InstanceCode::new("WS-01"),
            quantity,
            registrant: "ada@example.com".to_string(),
            flow: None,
        }
    }

    #[test]
    fn open_instance_is_planned() {
        let instance = InstanceBuilder::new("WS-01").build();
        let plan = evaluate_admission(&instance, &request(2), test_time()).unwrap();
        assert_eq!(plan.effective_quantity, 2);
        assert_eq!(plan.flow, Some(FlowKind::Personal));
        assert_eq!(plan.availability, Availability::Available);
    }

    #[test]
    fn inactive_instance_is_closed() {
        let instance = InstanceBuilder::new("WS-01").inactive().build();
        assert_eq!(
            evaluate_admission(&instance, &request(1), test_time()),
            Err(RegistrationError::RegistrationClosed(ClosedReason::Inactive))
        );
    }

    #[test]
    fn window_not_open_is_closed() {
        let instance = InstanceBuilder::new("WS-01")
            .window(
                test_time() + ChronoDuration::hours(1),
                test_time() + ChronoDuration::days(1),
            )
            .build();
        assert_eq!(
            evaluate_admission(&instance, &request(1), test_time()),
            Err(RegistrationError::RegistrationClosed(ClosedReason::NotYetOpen))
        );
    }

    #[test]
    fn quantity_limits() {
        let instance = InstanceBuilder::new("WS-01").max_per_transaction(2).build();
        assert_eq!(
            evaluate_admission(&instance, &request(0), test_time()),
            Err(RegistrationError::InvalidQuantity)
        );
        assert_eq!(
            evaluate_admission(&instance, &request(3), test_time()),
            Err(RegistrationError::ExceedsMaxPerTransaction { requested: 3, max: 2 })
        );
    }

    #[test]
    fn advisory_quota_check() {
        let instance = InstanceBuilder::new("WS-01")
            .total_seats(10)
            .booked_seats(9)
            .build();
        assert_eq!(
            evaluate_admission(&instance, &request(2), test_time()),
            Err(RegistrationError::QuotaNotAvailable { requested: 2, remaining: 1 })
        );
    }

    #[test]
    fn instance_without_flow_reserves_nothing() {
        let instance = InstanceBuilder::new("WS-01")
            .register_flow(RegisterFlow::None)
            .total_seats(3)
            .booked_seats(2)
            .build();
        let plan = evaluate_admission(&instance, &request(4), test_time()).unwrap();
        assert_eq!(plan.effective_quantity, 0);
        assert_eq!(plan.flow, None);
    }

    #[test]
    fn requested_flow_must_be_offered() {
        let instance = InstanceBuilder::new("WS-01").register_flow(RegisterFlow::Event).build();
        let mut req = request(1);
        req.flow = Some(FlowKind::Personal);
        assert!(matches!(
            evaluate_admission(&instance, &req, test_time()),
            Err(RegistrationError::FlowNotOffered { .. })
        ));
    }

    #[test]
    fn admission_serializes_camel_case() {
        let admission = Admission {
            registration_id: RegistrationId::new(9),
            instance_code: InstanceCode::new("WS-01"),
            quantity: 2,
            status: RegistrationStatus::Booked,
            registered_at: test_time(),
        };
        let json = serde_json::to_value(&admission).unwrap();
        assert_eq!(json["registrationId"], 9);
        assert_eq!(json["status"], "booked");
    }
}
