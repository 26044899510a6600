//! Scheduled terminations and resize plans.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::machine::Machine;

/// A machine marked for removal at a future (or past) point in time.
///
/// Created by the planner when a scale-in victim is chosen; owned by the
/// termination queue until it becomes due, is spared, or its machine
/// disappears from the pool. Entries order by termination time, with ties
/// broken by machine id so the ordering is stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledTermination {
    /// The machine to terminate.
    pub machine: Machine,

    /// When to terminate it.
    pub termination_time: DateTime<Utc>,
}

impl ScheduledTermination {
    /// Schedules `machine` for termination at `termination_time`.
    #[must_use]
    pub fn new(machine: Machine, termination_time: DateTime<Utc>) -> Self {
        Self {
            machine,
            termination_time,
        }
    }

    /// True if the entry is due at `now`.
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.termination_time <= now
    }
}

/// The outcome of one resize-planning pass.
///
/// A single pass either grows the pool (`to_request > 0`), shrinks it
/// (`to_terminate` non-empty), or does nothing; it never does both.
/// `spared` lists the already-queued terminations the planner cancelled to
/// satisfy growth without requesting fresh capacity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResizePlan {
    /// Number of new machines to request from the driver.
    pub to_request: u32,

    /// Machines to add to the termination queue.
    pub to_terminate: Vec<ScheduledTermination>,

    /// Queue entries cancelled in favor of keeping their machines.
    pub spared: Vec<ScheduledTermination>,
}

impl ResizePlan {
    /// A plan that takes no action.
    #[must_use]
    pub fn noop() -> Self {
        Self::default()
    }

    /// A plan that requests `count` new machines.
    #[must_use]
    pub fn request(count: u32) -> Self {
        Self {
            to_request: count,
            ..Self::default()
        }
    }

    /// A plan that schedules the given terminations.
    #[must_use]
    pub fn terminate(entries: Vec<ScheduledTermination>) -> Self {
        Self {
            to_terminate: entries,
            ..Self::default()
        }
    }

    /// True if the plan neither requests, schedules, nor spares anything.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.to_request == 0 && self.to_terminate.is_empty() && self.spared.is_empty()
    }
}
