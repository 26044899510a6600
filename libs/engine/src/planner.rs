//! Resize planning.
//!
//! One planning pass compares the pool's effective size against the
//! desired size and produces a [`ResizePlan`]: how many machines to
//! request, or which existing members to schedule for termination, and
//! when. A single pass never grows and shrinks at the same time.
//!
//! Effective size counts members that supply or will supply capacity
//! (requested, pending, running) and are not already queued for
//! termination. Machines being terminated, already gone, or rejected
//! never count.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use skypool_model::{Machine, MachinePool, MachineState, ResizePlan, ScheduledTermination};
use tracing::debug;

use crate::clock::Clock;
use crate::error::PoolResult;
use crate::queue::TerminationQueue;
use crate::selector::VictimSelector;
use crate::strategy::prepaid_time_left;

/// Produces resize plans from pool snapshots.
#[derive(Debug, Clone)]
pub struct ResizePlanner {
    clock: Arc<dyn Clock>,
}

impl ResizePlanner {
    /// Creates a planner reading time from `clock`.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Plans one resize pass.
    ///
    /// Growth prefers cancelling pending scale-downs over requesting
    /// fresh capacity: queued terminations whose time has not yet come
    /// are spared (removed from `queue`) before any machines are
    /// requested. Shrink selects victims through `selector` from the
    /// running, evictable, not-yet-queued pool members and assigns each
    /// a termination time: immediate, or just before its next billing
    /// hour when the policy is billing-hour-aware.
    ///
    /// Callers should extract overdue queue entries before planning;
    /// the planner will not spare entries that are already due.
    pub fn plan(
        &self,
        pool: &MachinePool,
        queue: &mut TerminationQueue,
        desired_size: u32,
        selector: &VictimSelector,
        instance_hour_margin: chrono::Duration,
    ) -> PoolResult<ResizePlan> {
        let now = self.clock.now();
        let effective_size = effective_size(pool, queue);

        debug!(
            desired_size,
            effective_size,
            queued = queue.len(),
            policy = %selector.policy(),
            "planning resize pass"
        );

        if desired_size > effective_size {
            let shortfall = desired_size - effective_size;
            let spared = self.spare_pending(queue, shortfall, now)?;
            let to_request = shortfall - spared.len() as u32;
            return Ok(ResizePlan {
                to_request,
                to_terminate: Vec::new(),
                spared,
            });
        }

        if desired_size < effective_size {
            let excess = (effective_size - desired_size) as usize;
            let candidates = victim_candidates(pool, queue, selector);
            let victims = selector.select_victims(&candidates, excess, queue)?;

            let entries = victims
                .into_iter()
                .map(|victim| {
                    let time = self.termination_time(&victim, now, selector, instance_hour_margin);
                    ScheduledTermination::new(victim, time)
                })
                .collect();
            return Ok(ResizePlan::terminate(entries));
        }

        Ok(ResizePlan::noop())
    }

    /// Cancels up to `wanted` not-yet-due queue entries, earliest first.
    fn spare_pending(
        &self,
        queue: &mut TerminationQueue,
        wanted: u32,
        now: DateTime<Utc>,
    ) -> PoolResult<Vec<ScheduledTermination>> {
        let pending = queue.pending_count(now);
        // Overdue entries still queued belong to the executor, not the
        // planner; sparing takes the earliest entries, so only touch the
        // queue when every entry is still in the future.
        if pending == 0 || pending < queue.len() {
            return Ok(Vec::new());
        }
        let n = (wanted as usize).min(pending);
        queue.spare(n)
    }

    /// When to terminate a chosen victim.
    fn termination_time(
        &self,
        victim: &Machine,
        now: DateTime<Utc>,
        selector: &VictimSelector,
        instance_hour_margin: chrono::Duration,
    ) -> DateTime<Utc> {
        if selector.policy().is_billing_hour_aware() {
            if let Some(launch_time) = victim.launch_time {
                return now + prepaid_time_left(launch_time, now, instance_hour_margin);
            }
        }
        now
    }
}

/// Pool members that supply (or will supply) capacity and are not queued
/// for termination.
fn effective_size(pool: &MachinePool, queue: &TerminationQueue) -> u32 {
    pool.machines
        .iter()
        .filter(|m| m.state.is_active() && !queue.contains(&m.id))
        .count() as u32
}

/// Machines eligible for victim selection: running, evictable, not
/// queued. A machine still requested or pending is effective capacity
/// but not a meaningful termination target. Under a billing-hour-aware
/// policy, machines without a launch time are excluded as well.
fn victim_candidates(
    pool: &MachinePool,
    queue: &TerminationQueue,
    selector: &VictimSelector,
) -> Vec<Machine> {
    pool.machines
        .iter()
        .filter(|m| {
            m.state == MachineState::Running && m.is_evictable() && !queue.contains(&m.id)
        })
        .filter(|m| !selector.policy().is_billing_hour_aware() || m.launch_time.is_some())
        .cloned()
        .collect()
}
