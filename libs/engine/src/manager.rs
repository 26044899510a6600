//! The pool manager: lifecycle state machine and operator operations.
//!
//! ## Lifecycle
//!
//! ```text
//! unconfigured -> configured (idle <-> ticking) -> stopped
//!                     ^    |
//!                     +----+  (reconfiguration restarts the timer)
//! ```
//!
//! One manager owns one pool: the termination queue, the desired size,
//! and the periodic worker driving reconciliation passes. Every operator
//! operation and every pass serializes on the same per-instance lock;
//! concurrent mutation of the queue or the desired size is the classic
//! lost-update bug this design rules out.
//!
//! `PoolManager` is a cheap clone handle; the background worker holds
//! one, the API layer holds another, both see the same state.

use std::sync::Arc;

use serde::Serialize;
use skypool_alerts::{topics, Alert, AlertDispatcher, AlertSeverity};
use skypool_model::{MachineId, MachinePool, MembershipStatus, ServiceState};
use tokio::sync::Mutex;
use tracing::info;

use crate::clock::Clock;
use crate::config::PoolConfig;
use crate::driver::CloudPoolDriver;
use crate::error::{PoolError, PoolResult};
use crate::planner::ResizePlanner;
use crate::queue::TerminationQueue;
use crate::reconciler::TickSummary;
use crate::selector::VictimSelector;
use crate::worker::{self, WorkerHandle};

/// Lifecycle state of a pool manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// No configuration applied yet; operations are rejected.
    Unconfigured,
    /// Configured and reconciling on the configured period.
    Configured,
    /// Closed; the manager cannot be reused.
    Stopped,
}

/// A point-in-time view of the manager for the API layer.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStatus {
    /// Current lifecycle state.
    pub lifecycle: LifecycleState,
    /// Desired pool size, once known.
    pub desired_size: Option<u32>,
    /// Number of machines queued for termination.
    pub queued_terminations: usize,
}

/// Everything guarded by the per-instance lock.
pub(crate) struct PoolState {
    pub(crate) config: PoolConfig,
    pub(crate) desired_size: Option<u32>,
    pub(crate) queue: TerminationQueue,
    pub(crate) selector: VictimSelector,
    pub(crate) planner: ResizePlanner,
    pub(crate) last_pool: Option<MachinePool>,
}

pub(crate) enum Lifecycle {
    Unconfigured,
    Configured(Box<PoolState>),
    Stopped,
}

impl Lifecycle {
    pub(crate) fn configured_mut(&mut self) -> PoolResult<&mut PoolState> {
        match self {
            Lifecycle::Configured(state) => Ok(state),
            Lifecycle::Unconfigured => Err(PoolError::NotConfigured),
            Lifecycle::Stopped => Err(PoolError::Stopped),
        }
    }

    fn state(&self) -> LifecycleState {
        match self {
            Lifecycle::Unconfigured => LifecycleState::Unconfigured,
            Lifecycle::Configured(_) => LifecycleState::Configured,
            Lifecycle::Stopped => LifecycleState::Stopped,
        }
    }
}

pub(crate) struct ManagerInner {
    pub(crate) driver: Arc<dyn CloudPoolDriver>,
    pub(crate) alerts: Arc<dyn AlertDispatcher>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) lifecycle: Mutex<Lifecycle>,
    worker: Mutex<Option<WorkerHandle>>,
}

/// Drives one machine pool toward its desired size.
#[derive(Clone)]
pub struct PoolManager {
    pub(crate) inner: Arc<ManagerInner>,
}

impl PoolManager {
    /// Creates an unconfigured manager around a driver and alert sink.
    #[must_use]
    pub fn new(
        driver: Arc<dyn CloudPoolDriver>,
        alerts: Arc<dyn AlertDispatcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                driver,
                alerts,
                clock,
                lifecycle: Mutex::new(Lifecycle::Unconfigured),
                worker: Mutex::new(None),
            }),
        }
    }

    /// Applies a configuration and (re)starts the periodic worker.
    ///
    /// Reconfiguration keeps the termination queue and the current
    /// desired size (unless the new configuration names a
    /// `desired_capacity`), cancels the pending timer, and reschedules
    /// at the new period. An in-flight pass runs to completion.
    pub async fn configure(&self, config: PoolConfig) -> PoolResult<()> {
        config.validate()?;

        {
            let mut lifecycle = self.inner.lifecycle.lock().await;
            if matches!(*lifecycle, Lifecycle::Stopped) {
                return Err(PoolError::Stopped);
            }

            self.inner.driver.configure(config.scale_out.clone()).await?;

            let (desired_size, queue, last_pool) =
                match std::mem::replace(&mut *lifecycle, Lifecycle::Unconfigured) {
                    Lifecycle::Configured(previous) => (
                        config.desired_capacity.or(previous.desired_size),
                        previous.queue,
                        previous.last_pool,
                    ),
                    _ => (
                        config.desired_capacity,
                        TerminationQueue::new(Arc::clone(&self.inner.clock)),
                        None,
                    ),
                };

            let selector = VictimSelector::new(
                config.scale_in.victim_selection_policy,
                Arc::clone(&self.inner.clock),
            );
            let planner = ResizePlanner::new(Arc::clone(&self.inner.clock));

            info!(
                period_secs = config.pool_update_period_secs,
                policy = %config.scale_in.victim_selection_policy,
                desired_size,
                "pool manager configured"
            );

            *lifecycle = Lifecycle::Configured(Box::new(PoolState {
                config: config.clone(),
                desired_size,
                queue,
                selector,
                planner,
                last_pool,
            }));
        }

        let mut worker = self.inner.worker.lock().await;
        if let Some(previous) = worker.take() {
            previous.stop();
        }
        *worker = Some(worker::spawn(self.clone(), config.pool_update_period()));
        Ok(())
    }

    /// Sets the desired pool size; realized by the next pass.
    pub async fn set_desired_size(&self, size: u32) -> PoolResult<()> {
        let mut lifecycle = self.inner.lifecycle.lock().await;
        let state = lifecycle.configured_mut()?;
        info!(size, "setting desired size");
        state.desired_size = Some(size);
        Ok(())
    }

    /// The desired pool size, or `None` until one has been set or
    /// adopted from the first observed snapshot.
    pub async fn desired_size(&self) -> PoolResult<Option<u32>> {
        let mut lifecycle = self.inner.lifecycle.lock().await;
        Ok(lifecycle.configured_mut()?.desired_size)
    }

    /// Forces an immediate reconciliation pass and returns its summary.
    pub async fn resize(&self) -> PoolResult<TickSummary> {
        self.run_tick().await
    }

    /// The most recent pool snapshot fetched from the driver, without
    /// forcing a pass.
    pub async fn machine_pool(&self) -> PoolResult<Option<MachinePool>> {
        let mut lifecycle = self.inner.lifecycle.lock().await;
        Ok(lifecycle.configured_mut()?.last_pool.clone())
    }

    /// Current lifecycle and sizing, for the API layer.
    pub async fn status(&self) -> PoolStatus {
        let mut lifecycle = self.inner.lifecycle.lock().await;
        let (desired_size, queued) = match lifecycle.configured_mut() {
            Ok(state) => (state.desired_size, state.queue.len()),
            Err(_) => (None, 0),
        };
        PoolStatus {
            lifecycle: lifecycle.state(),
            desired_size,
            queued_terminations: queued,
        }
    }

    /// Terminates one machine right away, optionally shrinking the
    /// desired size so the next pass does not replace it.
    pub async fn terminate_machine(
        &self,
        id: &MachineId,
        decrement_desired_size: bool,
    ) -> PoolResult<()> {
        let mut lifecycle = self.inner.lifecycle.lock().await;
        let state = lifecycle.configured_mut()?;

        self.inner.driver.terminate_machine(id).await?;
        state.queue.remove(id);
        if decrement_desired_size {
            if let Some(desired) = state.desired_size {
                state.desired_size = Some(desired.saturating_sub(1));
            }
        }

        self.publish(
            Alert::builder(topics::MACHINE_TERMINATED)
                .severity(AlertSeverity::Notice)
                .message(format!("terminated machine {id}"))
                .detail("machine_id", id.as_str())
                .detail("decrement_desired_size", decrement_desired_size)
                .occurred_at(self.inner.clock.now())
                .build(),
        )
        .await;
        Ok(())
    }

    /// Adopts an existing machine into the pool and grows the desired
    /// size by one, so the next pass does not evict it again.
    pub async fn attach_machine(&self, id: &MachineId) -> PoolResult<()> {
        let mut lifecycle = self.inner.lifecycle.lock().await;
        let state = lifecycle.configured_mut()?;

        self.inner.driver.attach_machine(id).await?;
        if let Some(desired) = state.desired_size {
            state.desired_size = Some(desired + 1);
        }

        self.publish(
            Alert::builder(topics::MACHINE_ATTACHED)
                .severity(AlertSeverity::Notice)
                .message(format!("attached machine {id}"))
                .detail("machine_id", id.as_str())
                .occurred_at(self.inner.clock.now())
                .build(),
        )
        .await;
        Ok(())
    }

    /// Releases a machine from the pool without destroying it,
    /// optionally shrinking the desired size so it is not replaced.
    pub async fn detach_machine(
        &self,
        id: &MachineId,
        decrement_desired_size: bool,
    ) -> PoolResult<()> {
        let mut lifecycle = self.inner.lifecycle.lock().await;
        let state = lifecycle.configured_mut()?;

        self.inner.driver.detach_machine(id).await?;
        state.queue.remove(id);
        if decrement_desired_size {
            if let Some(desired) = state.desired_size {
                state.desired_size = Some(desired.saturating_sub(1));
            }
        }

        self.publish(
            Alert::builder(topics::MACHINE_DETACHED)
                .severity(AlertSeverity::Notice)
                .message(format!("detached machine {id}"))
                .detail("machine_id", id.as_str())
                .detail("decrement_desired_size", decrement_desired_size)
                .occurred_at(self.inner.clock.now())
                .build(),
        )
        .await;
        Ok(())
    }

    /// Tags a machine with an operator-visible service state.
    pub async fn set_service_state(&self, id: &MachineId, state: ServiceState) -> PoolResult<()> {
        let mut lifecycle = self.inner.lifecycle.lock().await;
        lifecycle.configured_mut()?;

        self.inner.driver.set_service_state(id, state).await?;
        self.publish(
            Alert::builder(topics::MACHINE_SERVICE_STATE_CHANGED)
                .message(format!("machine {id} service state set to {state}"))
                .detail("machine_id", id.as_str())
                .detail("service_state", state.to_string())
                .occurred_at(self.inner.clock.now())
                .build(),
        )
        .await;
        Ok(())
    }

    /// Tags a machine with new membership flags. Marking a machine
    /// non-evictable protects it from future victim selection.
    pub async fn set_membership_status(
        &self,
        id: &MachineId,
        status: MembershipStatus,
    ) -> PoolResult<()> {
        let mut lifecycle = self.inner.lifecycle.lock().await;
        lifecycle.configured_mut()?;

        self.inner.driver.set_membership_status(id, status).await?;
        self.publish(
            Alert::builder(topics::MACHINE_MEMBERSHIP_CHANGED)
                .message(format!(
                    "machine {id} membership set to active={} evictable={}",
                    status.active, status.evictable
                ))
                .detail("machine_id", id.as_str())
                .detail("active", status.active)
                .detail("evictable", status.evictable)
                .occurred_at(self.inner.clock.now())
                .build(),
        )
        .await;
        Ok(())
    }

    /// Stops the periodic worker and retires the manager. Idempotent;
    /// an in-flight pass runs to completion.
    pub async fn close(&self) {
        let mut worker = self.inner.worker.lock().await;
        if let Some(handle) = worker.take() {
            handle.stop();
        }
        drop(worker);

        let mut lifecycle = self.inner.lifecycle.lock().await;
        if !matches!(*lifecycle, Lifecycle::Stopped) {
            info!("pool manager stopped");
            *lifecycle = Lifecycle::Stopped;
        }
    }

    pub(crate) async fn publish(&self, alert: Alert) {
        self.inner.alerts.publish(alert).await;
    }
}
