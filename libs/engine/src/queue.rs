//! The termination queue.
//!
//! A time-ordered collection of machines already marked for future
//! removal. Entries are keyed by `(termination_time, machine_id)` in an
//! ordered map, which gives deterministic iteration, cheap extraction of
//! the earliest entries, and an id tie-break for equal times.
//!
//! Entries leave the queue in exactly three ways: they become due
//! ([`TerminationQueue::pop_overdue`]), they are rescued
//! ([`TerminationQueue::spare`]), or their machine disappears from the
//! pool ([`TerminationQueue::retain_members`]).

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use skypool_model::{Machine, MachineId, ScheduledTermination};

use crate::clock::Clock;
use crate::error::{PoolError, PoolResult};

/// Time-ordered queue of scheduled terminations.
#[derive(Debug)]
pub struct TerminationQueue {
    entries: BTreeMap<(DateTime<Utc>, MachineId), ScheduledTermination>,
    clock: Arc<dyn Clock>,
}

impl TerminationQueue {
    /// Creates an empty queue reading time from `clock`.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: BTreeMap::new(),
            clock,
        }
    }

    /// Number of queued entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True if the machine is already queued for termination.
    #[must_use]
    pub fn contains(&self, id: &MachineId) -> bool {
        self.entries.keys().any(|(_, queued)| queued == id)
    }

    /// Inserts one entry. Re-adding the same machine at the same time is
    /// a no-op.
    pub fn add(&mut self, entry: ScheduledTermination) {
        self.entries
            .insert((entry.termination_time, entry.machine.id.clone()), entry);
    }

    /// Inserts several entries.
    pub fn add_all(&mut self, entries: impl IntoIterator<Item = ScheduledTermination>) {
        for entry in entries {
            self.add(entry);
        }
    }

    /// All queued machines in increasing order of termination time. Does
    /// not mutate the queue.
    #[must_use]
    pub fn queued_machines(&self) -> Vec<Machine> {
        self.entries.values().map(|e| e.machine.clone()).collect()
    }

    /// Removes and returns the `n` entries with the earliest termination
    /// times: the machines nearest to being terminated are rescued
    /// first, keeping the most recent scale-down decisions reversible.
    ///
    /// Fails with `InvalidArgument` if `n` exceeds the queue size.
    pub fn spare(&mut self, n: usize) -> PoolResult<Vec<ScheduledTermination>> {
        if n > self.entries.len() {
            return Err(PoolError::invalid_argument(format!(
                "cannot spare {} machines, only {} queued",
                n,
                self.entries.len()
            )));
        }
        let mut spared = Vec::with_capacity(n);
        for _ in 0..n {
            if let Some((_, entry)) = self.entries.pop_first() {
                spared.push(entry);
            }
        }
        Ok(spared)
    }

    /// Removes and returns every entry due at the current time, earliest
    /// first. Entries with a termination time in the future stay queued.
    pub fn pop_overdue(&mut self) -> Vec<ScheduledTermination> {
        let now = self.clock.now();
        let mut due = Vec::new();
        while let Some(first) = self.entries.first_entry() {
            if first.key().0 > now {
                break;
            }
            due.push(first.remove());
        }
        due
    }

    /// Number of queued entries not yet due at `now`.
    #[must_use]
    pub fn pending_count(&self, now: DateTime<Utc>) -> usize {
        self.entries
            .keys()
            .filter(|(time, _)| *time > now)
            .count()
    }

    /// Drops every entry whose machine is not among `members`: stale
    /// entries for machines that vanished from the pool through external
    /// action (terminated by a third party, lost by the provider).
    /// Idempotent.
    pub fn retain_members(&mut self, members: &HashSet<MachineId>) {
        self.entries.retain(|(_, id), _| members.contains(id));
    }

    /// Removes the entry for one machine, if queued. Used when an
    /// operator terminates or detaches a machine by hand.
    pub fn remove(&mut self, id: &MachineId) -> Option<ScheduledTermination> {
        let key = self
            .entries
            .keys()
            .find(|(_, queued)| queued == id)
            .cloned()?;
        self.entries.remove(&key)
    }
}
