//! Point-in-time pool snapshots.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::machine::{Machine, MachineId};

/// An immutable snapshot of the machine pool at a given time.
///
/// One snapshot is produced per reconciliation pass by the driver's list
/// operation. Snapshots are never merged: a newer snapshot replaces the
/// previous one wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachinePool {
    /// All machines the driver reported, in driver order.
    pub machines: Vec<Machine>,

    /// When the snapshot was taken.
    pub timestamp: DateTime<Utc>,
}

impl MachinePool {
    /// Creates a snapshot from a list of machines.
    #[must_use]
    pub fn new(machines: Vec<Machine>, timestamp: DateTime<Utc>) -> Self {
        Self {
            machines,
            timestamp,
        }
    }

    /// An empty snapshot.
    #[must_use]
    pub fn empty(timestamp: DateTime<Utc>) -> Self {
        Self::new(Vec::new(), timestamp)
    }

    /// Number of machines in the snapshot, regardless of state.
    #[must_use]
    pub fn len(&self) -> usize {
        self.machines.len()
    }

    /// True if the snapshot holds no machines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.machines.is_empty()
    }

    /// Looks up a machine by id.
    #[must_use]
    pub fn get(&self, id: &MachineId) -> Option<&Machine> {
        self.machines.iter().find(|m| &m.id == id)
    }

    /// True if a machine with the given id is present.
    #[must_use]
    pub fn contains(&self, id: &MachineId) -> bool {
        self.get(id).is_some()
    }

    /// The ids of all machines in the snapshot.
    #[must_use]
    pub fn member_ids(&self) -> HashSet<MachineId> {
        self.machines.iter().map(|m| m.id.clone()).collect()
    }

    /// Machines in an active state (requested, pending, or running).
    pub fn active_machines(&self) -> impl Iterator<Item = &Machine> {
        self.machines.iter().filter(|m| m.is_active())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::{Machine, MachineState};

    fn machine(id: &str, state: MachineState) -> Machine {
        Machine::builder().id(id).state(state).build()
    }

    #[test]
    fn lookup_and_membership() {
        let pool = MachinePool::new(
            vec![
                machine("i-1", MachineState::Running),
                machine("i-2", MachineState::Terminated),
            ],
            Utc::now(),
        );

        assert_eq!(pool.len(), 2);
        assert!(pool.contains(&MachineId::new("i-1")));
        assert!(!pool.contains(&MachineId::new("i-3")));
        assert_eq!(
            pool.get(&MachineId::new("i-2")).unwrap().state,
            MachineState::Terminated
        );
    }

    #[test]
    fn active_machines_excludes_terminal_states() {
        let pool = MachinePool::new(
            vec![
                machine("i-1", MachineState::Requested),
                machine("i-2", MachineState::Pending),
                machine("i-3", MachineState::Running),
                machine("i-4", MachineState::Terminating),
                machine("i-5", MachineState::Terminated),
                machine("i-6", MachineState::Rejected),
            ],
            Utc::now(),
        );

        let active: Vec<_> = pool.active_machines().map(|m| m.id.as_str()).collect();
        assert_eq!(active, vec!["i-1", "i-2", "i-3"]);
    }
}
