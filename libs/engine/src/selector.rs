//! Victim selection over a candidate set.
//!
//! Combines a [`VictimSelectionPolicy`] with the termination queue: a
//! machine already queued for termination is never selected again, and
//! within one call the same machine cannot be picked twice.

use std::sync::Arc;

use skypool_model::Machine;

use crate::clock::Clock;
use crate::error::{PoolError, PoolResult};
use crate::queue::TerminationQueue;
use crate::strategy::VictimSelectionPolicy;

/// Picks scale-in victims according to a bound policy.
#[derive(Debug, Clone)]
pub struct VictimSelector {
    policy: VictimSelectionPolicy,
    clock: Arc<dyn Clock>,
}

impl VictimSelector {
    /// Creates a selector bound to `policy`.
    #[must_use]
    pub fn new(policy: VictimSelectionPolicy, clock: Arc<dyn Clock>) -> Self {
        Self { policy, clock }
    }

    /// The bound policy.
    #[must_use]
    pub fn policy(&self) -> VictimSelectionPolicy {
        self.policy
    }

    /// Selects `n` victims from `candidates`, excluding machines already
    /// tracked by `queue`.
    ///
    /// The returned list reflects selection order (policy order), not id
    /// order. Fails with `InvalidArgument` if `n` exceeds the number of
    /// not-yet-queued candidates.
    pub fn select_victims(
        &self,
        candidates: &[Machine],
        n: usize,
        queue: &TerminationQueue,
    ) -> PoolResult<Vec<Machine>> {
        let mut remaining: Vec<Machine> = candidates
            .iter()
            .filter(|m| !queue.contains(&m.id))
            .cloned()
            .collect();

        if n > remaining.len() {
            return Err(PoolError::invalid_argument(format!(
                "cannot select {} victims from {} eligible candidates",
                n,
                remaining.len()
            )));
        }

        let now = self.clock.now();
        let mut victims = Vec::with_capacity(n);
        for _ in 0..n {
            let victim = self.policy.select_victim(&remaining, now)?.clone();
            remaining.retain(|m| m.id != victim.id);
            victims.push(victim);
        }
        Ok(victims)
    }
}
