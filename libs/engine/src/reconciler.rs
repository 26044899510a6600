//! The reconciliation pass.
//!
//! One pass, always under the per-instance lock:
//!
//! 1. Fetch a fresh pool snapshot from the driver. On failure: alert and
//!    abort the pass; the next scheduled pass retries.
//! 2. Drop queue entries for machines no longer in the pool.
//! 3. Pop overdue terminations and execute them through the driver. A
//!    failed termination is alerted and skipped, never re-queued; the
//!    machine is naturally re-offered by a later snapshot if it is still
//!    around and evictable.
//! 4. Plan the resize.
//! 5. Request new machines, tolerating partial starts.
//! 6. Queue the planned terminations, executing any that are already
//!    due.
//! 7. Publish a summary alert when anything happened.

use serde::Serialize;
use skypool_alerts::{topics, Alert, AlertSeverity};
use skypool_model::{MachineId, ScheduledTermination};
use tracing::{debug, info, warn};

use crate::error::{PoolError, PoolResult};
use crate::manager::{PoolManager, PoolState};

/// What one reconciliation pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickSummary {
    /// Machines successfully requested from the driver.
    pub requested: u32,
    /// Machines the driver failed to deliver on a scale-out.
    pub start_shortfall: u32,
    /// Terminations newly queued.
    pub scheduled: usize,
    /// Queue entries cancelled to satisfy growth.
    pub spared: usize,
    /// Terminations executed through the driver.
    pub terminated: usize,
    /// Terminations the driver refused.
    pub failed_terminations: usize,
}

impl TickSummary {
    /// True if the pass neither acted nor failed.
    #[must_use]
    pub fn is_quiet(&self) -> bool {
        *self == Self::default()
    }
}

impl PoolManager {
    /// Runs one reconciliation pass under the instance lock.
    pub(crate) async fn run_tick(&self) -> PoolResult<TickSummary> {
        let mut lifecycle = self.inner.lifecycle.lock().await;
        let state = lifecycle.configured_mut()?;
        self.tick(state).await
    }

    async fn tick(&self, state: &mut PoolState) -> PoolResult<TickSummary> {
        let mut summary = TickSummary::default();

        // Step 1: fetch the pool snapshot.
        let pool = match self.inner.driver.list_machines().await {
            Ok(pool) => pool,
            Err(e) => {
                warn!(error = %e, "failed to fetch machine pool, aborting pass");
                self.publish(
                    Alert::builder(topics::POOL_FETCH_FAILED)
                        .severity(AlertSeverity::Error)
                        .message(format!("failed to fetch machine pool: {e}"))
                        .occurred_at(self.inner.clock.now())
                        .build(),
                )
                .await;
                return Err(e);
            }
        };
        state.last_pool = Some(pool.clone());

        let desired = match state.desired_size {
            Some(desired) => desired,
            None => {
                // First successful pass with no operator-set size:
                // adopt the observed size rather than resizing a pool
                // we have never been told a target for.
                let observed = pool.machines.iter().filter(|m| m.is_active()).count() as u32;
                info!(observed, "no desired size set, adopting observed pool size");
                state.desired_size = Some(observed);
                observed
            }
        };

        // Step 2: drop stale queue entries.
        state.queue.retain_members(&pool.member_ids());

        // Step 3: execute overdue terminations. Machines terminated here
        // leave the working snapshot so the planner does not count them
        // as capacity or select them again.
        let mut working_pool = pool;
        let due = state.queue.pop_overdue();
        let terminated = self.execute_terminations(due, &mut summary).await;
        working_pool
            .machines
            .retain(|m| !terminated.contains(&m.id));

        // Step 4: plan.
        let margin = state.config.scale_in.instance_hour_margin();
        let plan = match state.planner.plan(
            &working_pool,
            &mut state.queue,
            desired,
            &state.selector,
            margin,
        ) {
            Ok(plan) => plan,
            Err(e) => {
                warn!(error = %e, "resize planning failed");
                self.publish(
                    Alert::builder(topics::RESIZE_PLANNED)
                        .severity(AlertSeverity::Warn)
                        .message(format!("resize planning failed: {e}"))
                        .occurred_at(self.inner.clock.now())
                        .build(),
                )
                .await;
                return Err(e);
            }
        };
        summary.spared = plan.spared.len();
        let plan_was_noop = plan.is_noop();

        // Step 5: request new capacity, tolerating partial starts.
        if plan.to_request > 0 {
            match self.inner.driver.start_machines(plan.to_request).await {
                Ok(machines) => {
                    summary.requested = machines.len() as u32;
                    debug!(count = machines.len(), "started machines");
                    self.publish(
                        Alert::builder(topics::RESIZE_STARTED)
                            .message(format!("started {} machines", machines.len()))
                            .detail("requested", plan.to_request)
                            .detail(
                                "machine_ids",
                                machines
                                    .iter()
                                    .map(|m| m.id.as_str())
                                    .collect::<Vec<_>>(),
                            )
                            .occurred_at(self.inner.clock.now())
                            .build(),
                    )
                    .await;
                }
                Err(PoolError::PartialStart {
                    requested,
                    started,
                    reason,
                }) => {
                    summary.requested = started.len() as u32;
                    summary.start_shortfall = requested.saturating_sub(started.len() as u32);
                    warn!(
                        requested,
                        started = started.len(),
                        %reason,
                        "scale-out fell short"
                    );
                    self.publish(
                        Alert::builder(topics::MACHINE_START_FAILED)
                            .severity(AlertSeverity::Error)
                            .message(format!(
                                "started only {} of {} machines: {}",
                                started.len(),
                                requested,
                                reason
                            ))
                            .detail("requested", requested)
                            .detail("started", started.len())
                            .occurred_at(self.inner.clock.now())
                            .build(),
                    )
                    .await;
                }
                Err(e) => {
                    summary.start_shortfall = plan.to_request;
                    warn!(error = %e, requested = plan.to_request, "scale-out failed");
                    self.publish(
                        Alert::builder(topics::MACHINE_START_FAILED)
                            .severity(AlertSeverity::Error)
                            .message(format!(
                                "failed to start {} machines: {e}",
                                plan.to_request
                            ))
                            .detail("requested", plan.to_request)
                            .occurred_at(self.inner.clock.now())
                            .build(),
                    )
                    .await;
                }
            }
        }

        // Step 6: queue the planned terminations; anything already due
        // executes in this pass.
        summary.scheduled = plan.to_terminate.len();
        state.queue.add_all(plan.to_terminate);
        let due_now = state.queue.pop_overdue();
        self.execute_terminations(due_now, &mut summary).await;

        // Step 7: summarize the pass.
        let had_errors = summary.start_shortfall > 0 || summary.failed_terminations > 0;
        if !plan_was_noop || had_errors {
            let severity = if had_errors {
                AlertSeverity::Warn
            } else {
                AlertSeverity::Info
            };
            self.publish(
                Alert::builder(topics::RESIZE_PLANNED)
                    .severity(severity)
                    .message(format!(
                        "resize pass: requested {}, scheduled {}, spared {}, terminated {}",
                        summary.requested,
                        summary.scheduled,
                        summary.spared,
                        summary.terminated
                    ))
                    .detail("requested", summary.requested)
                    .detail("start_shortfall", summary.start_shortfall)
                    .detail("scheduled", summary.scheduled)
                    .detail("spared", summary.spared)
                    .detail("terminated", summary.terminated)
                    .detail("failed_terminations", summary.failed_terminations)
                    .occurred_at(self.inner.clock.now())
                    .build(),
            )
            .await;
        }

        Ok(summary)
    }

    /// Terminates each entry through the driver, best effort: one
    /// failure is alerted and does not block the rest. Returns the ids
    /// that were actually terminated.
    async fn execute_terminations(
        &self,
        entries: Vec<ScheduledTermination>,
        summary: &mut TickSummary,
    ) -> Vec<MachineId> {
        let mut terminated = Vec::with_capacity(entries.len());
        for entry in entries {
            let id = entry.machine.id;
            match self.inner.driver.terminate_machine(&id).await {
                Ok(()) => {
                    summary.terminated += 1;
                    self.publish(
                        Alert::builder(topics::MACHINE_TERMINATED)
                            .severity(AlertSeverity::Notice)
                            .message(format!("terminated machine {id}"))
                            .detail("machine_id", id.as_str())
                            .occurred_at(self.inner.clock.now())
                            .build(),
                    )
                    .await;
                    terminated.push(id);
                }
                Err(e) => {
                    summary.failed_terminations += 1;
                    warn!(machine_id = %id, error = %e, "termination failed");
                    self.publish(
                        Alert::builder(topics::MACHINE_TERMINATION_FAILED)
                            .severity(AlertSeverity::Error)
                            .message(format!("failed to terminate machine {id}: {e}"))
                            .detail("machine_id", id.as_str())
                            .occurred_at(self.inner.clock.now())
                            .build(),
                    )
                    .await;
                }
            }
        }
        terminated
    }
}
