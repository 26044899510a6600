//! Pool manager configuration.
//!
//! The shape the REST/CLI layer hands to [`PoolManager::configure`];
//! parsing the operator's file format is that layer's concern. Durations
//! are plain second counts with `_secs` suffixes.
//!
//! [`PoolManager::configure`]: crate::manager::PoolManager::configure

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PoolError, PoolResult};
use crate::strategy::VictimSelectionPolicy;

/// Default reconciliation period.
pub const DEFAULT_POOL_UPDATE_PERIOD_SECS: u64 = 60;

/// Default safety margin before a billing-hour boundary.
pub const DEFAULT_INSTANCE_HOUR_MARGIN_SECS: u64 = 300;

/// Full configuration for one managed pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Initial desired pool size. When absent, the engine adopts the
    /// pool's observed size on its first successful reconciliation pass.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub desired_capacity: Option<u32>,

    /// Driver-specific provisioning template (machine image, size,
    /// credentials reference, ...), passed through to the driver's
    /// `configure` untouched.
    #[serde(default)]
    pub scale_out: serde_json::Value,

    /// Scale-in behavior.
    #[serde(default)]
    pub scale_in: ScaleInConfig,

    /// Seconds between reconciliation passes.
    #[serde(default = "default_pool_update_period_secs")]
    pub pool_update_period_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            desired_capacity: None,
            scale_out: serde_json::Value::Null,
            scale_in: ScaleInConfig::default(),
            pool_update_period_secs: DEFAULT_POOL_UPDATE_PERIOD_SECS,
        }
    }
}

impl PoolConfig {
    /// Checks the configuration for values the engine cannot run with.
    pub fn validate(&self) -> PoolResult<()> {
        if self.pool_update_period_secs == 0 {
            return Err(PoolError::invalid_argument(
                "pool_update_period_secs must be positive",
            ));
        }
        self.scale_in.validate()
    }

    /// The reconciliation period as a [`Duration`].
    #[must_use]
    pub fn pool_update_period(&self) -> Duration {
        Duration::from_secs(self.pool_update_period_secs)
    }
}

/// Scale-in behavior: which machines to evict, and how close to their
/// billing-hour boundary to keep them running.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleInConfig {
    /// Policy used to pick scale-in victims.
    #[serde(default)]
    pub victim_selection_policy: VictimSelectionPolicy,

    /// Safety buffer in seconds subtracted from the time remaining in a
    /// victim's prepaid billing hour, so termination lands shortly before
    /// the boundary rather than exactly on it. Only meaningful with a
    /// billing-hour-aware policy.
    #[serde(default = "default_instance_hour_margin_secs")]
    pub instance_hour_margin_secs: u64,
}

impl Default for ScaleInConfig {
    fn default() -> Self {
        Self {
            victim_selection_policy: VictimSelectionPolicy::default(),
            instance_hour_margin_secs: DEFAULT_INSTANCE_HOUR_MARGIN_SECS,
        }
    }
}

impl ScaleInConfig {
    fn validate(&self) -> PoolResult<()> {
        if self.instance_hour_margin_secs >= 3600 {
            return Err(PoolError::invalid_argument(
                "instance_hour_margin_secs must be below one hour",
            ));
        }
        Ok(())
    }

    /// The margin as a signed chrono duration for time arithmetic.
    #[must_use]
    pub fn instance_hour_margin(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.instance_hour_margin_secs as i64)
    }
}

fn default_pool_update_period_secs() -> u64 {
    DEFAULT_POOL_UPDATE_PERIOD_SECS
}

fn default_instance_hour_margin_secs() -> u64 {
    DEFAULT_INSTANCE_HOUR_MARGIN_SECS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = PoolConfig::default();
        config.validate().unwrap();
        assert_eq!(config.pool_update_period(), Duration::from_secs(60));
        assert_eq!(
            config.scale_in.victim_selection_policy,
            VictimSelectionPolicy::ClosestToNextBillingHour
        );
    }

    #[test]
    fn rejects_zero_update_period() {
        let config = PoolConfig {
            pool_update_period_secs: 0,
            ..PoolConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PoolError::InvalidArgument(_))
        ));
    }

    #[test]
    fn rejects_margin_of_an_hour_or_more() {
        let config = PoolConfig {
            scale_in: ScaleInConfig {
                instance_hour_margin_secs: 3600,
                ..ScaleInConfig::default()
            },
            ..PoolConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PoolError::InvalidArgument(_))
        ));
    }

    #[test]
    fn deserializes_from_operator_shape() {
        let config: PoolConfig = serde_json::from_str(
            r#"{
                "desired_capacity": 4,
                "scale_out": {"image": "ubuntu-24.04", "size": "m5.large"},
                "scale_in": {
                    "victim_selection_policy": "oldest",
                    "instance_hour_margin_secs": 120
                },
                "pool_update_period_secs": 30
            }"#,
        )
        .unwrap();

        config.validate().unwrap();
        assert_eq!(config.desired_capacity, Some(4));
        assert_eq!(
            config.scale_in.victim_selection_policy,
            VictimSelectionPolicy::Oldest
        );
        assert_eq!(config.scale_out["image"], "ubuntu-24.04");
    }
}
