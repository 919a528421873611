//! Capacity ledger: the only writer of an instance's seat counters.
//!
//! Every method runs inside the caller's transaction. The instance row is
//! locked first, the new counters are computed with
//! [`SeatCounters`](seatline_core::seats::SeatCounters) arithmetic, and the
//! result is written back against the locked version.

use seatline_core::error::{RegistrationError, Result};
use seatline_core::seats::SeatCounters;
use seatline_core::store::{AdmissionStore, SeatUpdate};
use seatline_core::types::{FlowKind, Instance, InstanceCode};
use std::sync::Arc;

/// Seat counter mutations for instances.
pub struct CapacityLedger<S> {
    store: Arc<S>,
}

impl<S> Clone for CapacityLedger<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: AdmissionStore> CapacityLedger<S> {
    /// Create a ledger over `store`.
    #[must_use]
    pub const fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Book `quantity` seats, counting them against `flow` if given.
    ///
    /// A zero quantity does not touch the instance row.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the instance does not exist
    /// - `CapacityExhausted` if the seats are not available under the lock;
    ///   nothing is written
    /// - `WriteConflict` / `Internal` from the store
    #[tracing::instrument(skip(self, tx), fields(instance = %code))]
    pub async fn reserve(
        &self,
        tx: &mut S::Tx,
        code: &InstanceCode,
        quantity: u32,
        flow: Option<FlowKind>,
    ) -> Result<SeatCounters> {
        if quantity == 0 {
            return Ok(SeatCounters::default());
        }

        let instance = self.lock(tx, code).await?;
        let counters = instance.counters().reserve(quantity)?;
        let flow_used = flow.and_then(|flow| {
            instance
                .flow_slot(flow)
                .map(|slot| (flow, slot.used.saturating_add(quantity)))
        });

        self.write(tx, &instance, counters, flow_used).await?;
        tracing::debug!(booked = counters.booked, total = counters.total, "Seats reserved");
        Ok(counters)
    }

    /// Release `quantity` seats, clamped at zero.
    ///
    /// A zero quantity does not touch the instance row.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the instance does not exist
    /// - `WriteConflict` / `Internal` from the store
    #[tracing::instrument(skip(self, tx), fields(instance = %code))]
    pub async fn release(
        &self,
        tx: &mut S::Tx,
        code: &InstanceCode,
        quantity: u32,
        flow: Option<FlowKind>,
    ) -> Result<SeatCounters> {
        if quantity == 0 {
            return Ok(SeatCounters::default());
        }

        let instance = self.lock(tx, code).await?;
        let counters = instance.counters().release(quantity);
        let flow_used = flow.and_then(|flow| {
            instance
                .flow_slot(flow)
                .map(|slot| (flow, slot.used.saturating_sub(quantity)))
        });

        self.write(tx, &instance, counters, flow_used).await?;
        tracing::debug!(booked = counters.booked, "Seats released");
        Ok(counters)
    }

    /// Mark `quantity` seats as scanned, capped at the booked count.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the instance does not exist
    /// - `WriteConflict` / `Internal` from the store
    #[tracing::instrument(skip(self, tx), fields(instance = %code))]
    pub async fn mark_scanned(
        &self,
        tx: &mut S::Tx,
        code: &InstanceCode,
        quantity: u32,
    ) -> Result<SeatCounters> {
        if quantity == 0 {
            return Ok(SeatCounters::default());
        }

        let instance = self.lock(tx, code).await?;
        let counters = instance.counters().mark_scanned(quantity);

        self.write(tx, &instance, counters, None).await?;
        tracing::debug!(scanned = counters.scanned, "Seats scanned");
        Ok(counters)
    }

    async fn lock(&self, tx: &mut S::Tx, code: &InstanceCode) -> Result<Instance> {
        self.store
            .lock_instance(tx, code)
            .await?
            .ok_or_else(|| RegistrationError::instance_not_found(code))
    }

    async fn write(
        &self,
        tx: &mut S::Tx,
        instance: &Instance,
        counters: SeatCounters,
        flow_used: Option<(FlowKind, u32)>,
    ) -> Result<()> {
        self.store
            .write_seats(
                tx,
                &SeatUpdate {
                    instance_code: instance.code.clone(),
                    counters,
                    flow_used,
                    expected_version: instance.version,
                },
            )
            .await
    }
}
