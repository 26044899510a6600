//! Victim-selection policies.
//!
//! A policy picks the single best machine to remove from a candidate set.
//! Policies are pure: no side effects, deterministic for identical
//! inputs, with every ordering ending in a machine-id tie-break.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use skypool_model::{Machine, MachineId};

use crate::error::{PoolError, PoolResult};

/// Length of a cloud billing hour.
const BILLING_HOUR_SECS: i64 = 3600;

/// Policy for choosing which machine to evict during a scale-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VictimSelectionPolicy {
    /// Evict the machine that has run the longest. Machines without a
    /// launch time sort last (only just requested, lifecycle data may be
    /// incomplete).
    Oldest,

    /// Evict the machine that launched most recently. Machines without a
    /// launch time sort first (treated as youngest).
    Newest,

    /// Evict the machine closest to entering a new, to-be-paid-for
    /// billing hour, maximizing use of compute time already paid for.
    /// Requires a launch time on every candidate.
    #[default]
    ClosestToNextBillingHour,
}

impl VictimSelectionPolicy {
    /// True if the policy reasons about billing-hour boundaries, in which
    /// case scale-in victims are kept running until shortly before their
    /// next boundary.
    #[must_use]
    pub fn is_billing_hour_aware(&self) -> bool {
        matches!(self, Self::ClosestToNextBillingHour)
    }

    /// Picks one victim from a non-empty candidate set.
    ///
    /// Fails with `InvalidArgument` on an empty set. Under
    /// [`VictimSelectionPolicy::ClosestToNextBillingHour`] it also fails
    /// when a candidate has no launch time (such machines must be
    /// excluded by the caller first).
    pub fn select_victim<'a>(
        &self,
        candidates: &'a [Machine],
        now: DateTime<Utc>,
    ) -> PoolResult<&'a Machine> {
        let victim = match self {
            // min by (launch time, id): missing launch time sorts last.
            Self::Oldest => candidates.iter().min_by(|a, b| age_key(a).cmp(&age_key(b))),

            // max by (launch time, id): missing launch time wins, and the
            // id tie-break picks the greater id.
            Self::Newest => candidates.iter().max_by(|a, b| age_key(a).cmp(&age_key(b))),

            Self::ClosestToNextBillingHour => {
                let mut best: Option<(i64, &Machine)> = None;
                for machine in candidates {
                    let Some(launch_time) = machine.launch_time else {
                        return Err(PoolError::invalid_argument(format!(
                            "machine {} has no launch time; not a meaningful \
                             billing-hour candidate",
                            machine.id
                        )));
                    };
                    let left = seconds_to_next_billing_hour(launch_time, now);
                    let better = match best {
                        None => true,
                        Some((best_left, best_machine)) => {
                            (left, &machine.id) < (best_left, &best_machine.id)
                        }
                    };
                    if better {
                        best = Some((left, machine));
                    }
                }
                best.map(|(_, m)| m)
            }
        };

        victim.ok_or_else(|| {
            PoolError::invalid_argument("victim selection requires at least one candidate")
        })
    }
}

impl std::fmt::Display for VictimSelectionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            VictimSelectionPolicy::Oldest => "oldest",
            VictimSelectionPolicy::Newest => "newest",
            VictimSelectionPolicy::ClosestToNextBillingHour => "closest_to_next_billing_hour",
        };
        write!(f, "{}", s)
    }
}

/// Age ordering key: launch time with "missing" sorting as the far
/// future, then machine id.
fn age_key(machine: &Machine) -> (DateTime<Utc>, &MachineId) {
    (
        machine.launch_time.unwrap_or(DateTime::<Utc>::MAX_UTC),
        &machine.id,
    )
}

/// Seconds the machine has spent in its current (already paid) billing
/// hour.
#[must_use]
pub fn seconds_into_billing_hour(launch_time: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - launch_time).num_seconds().rem_euclid(BILLING_HOUR_SECS)
}

/// Seconds until the machine crosses into a new billing hour. Always in
/// `1..=3600`.
#[must_use]
pub fn seconds_to_next_billing_hour(launch_time: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    BILLING_HOUR_SECS - seconds_into_billing_hour(launch_time, now)
}

/// The remaining prepaid time for a machine, less a safety margin, never
/// negative. A machine about to cross its boundary gets `zero` (terminate
/// immediately).
#[must_use]
pub fn prepaid_time_left(
    launch_time: DateTime<Utc>,
    now: DateTime<Utc>,
    margin: Duration,
) -> Duration {
    let left = seconds_to_next_billing_hour(launch_time, now) - margin.num_seconds();
    Duration::seconds(left.max(0))
}
