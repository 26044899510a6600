//! Machine identity, lifecycle state, and membership metadata.
//!
//! ## Lifecycle
//!
//! ```text
//! requested -> pending -> running -> terminating -> terminated
//!     |
//!     +-> rejected
//! ```
//!
//! A machine's state is reported by the driver on every pool refresh; the
//! engine never advances it locally.

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a machine within a pool.
///
/// Machine ids are assigned by the cloud provider (an EC2 instance id, an
/// OpenStack server UUID, a Kubernetes pod name) and are treated as opaque
/// strings. They are unique within a single pool.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MachineId(String);

impl MachineId {
    /// Wraps a provider-assigned identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MachineId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for MachineId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for MachineId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Execution state of a machine, as reported by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MachineState {
    /// Requested from the provider but not yet provisioned.
    Requested,
    /// Provisioned and booting.
    Pending,
    /// Up and running.
    Running,
    /// Shutdown in progress.
    Terminating,
    /// Shut down.
    Terminated,
    /// The provider rejected the request.
    Rejected,
}

impl MachineState {
    /// Returns true for states that supply (or will supply) pool capacity:
    /// requested, pending, or running.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Requested | Self::Pending | Self::Running)
    }

    /// Returns true for states the machine cannot leave: terminated or
    /// rejected.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminated | Self::Rejected)
    }
}

impl std::fmt::Display for MachineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MachineState::Requested => "requested",
            MachineState::Pending => "pending",
            MachineState::Running => "running",
            MachineState::Terminating => "terminating",
            MachineState::Terminated => "terminated",
            MachineState::Rejected => "rejected",
        };
        write!(f, "{}", s)
    }
}

/// Pool membership flags for a machine.
///
/// `active` marks the machine as a proper pool member; `evictable` marks it
/// as eligible for automatic termination during a scale-in. A machine that
/// an operator has attached by hand is typically kept non-evictable so the
/// engine never selects it as a victim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipStatus {
    /// The machine is a pool member.
    pub active: bool,
    /// The machine may be chosen as a scale-in victim.
    pub evictable: bool,
}

impl MembershipStatus {
    /// Membership protected from automatic termination.
    #[must_use]
    pub const fn protected() -> Self {
        Self {
            active: true,
            evictable: false,
        }
    }
}

impl Default for MembershipStatus {
    fn default() -> Self {
        Self {
            active: true,
            evictable: true,
        }
    }
}

/// Operator-visible service state of a machine.
///
/// Carried through to the driver as a tag; it has no effect on the engine's
/// own decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    /// No service state has been reported.
    #[default]
    Unknown,
    /// The machine is booting its service.
    Booting,
    /// The service is up and taking traffic.
    InService,
    /// The service is up but failing health checks.
    Unhealthy,
    /// The machine has been taken out of service by an operator.
    OutOfService,
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ServiceState::Unknown => "unknown",
            ServiceState::Booting => "booting",
            ServiceState::InService => "in_service",
            ServiceState::Unhealthy => "unhealthy",
            ServiceState::OutOfService => "out_of_service",
        };
        write!(f, "{}", s)
    }
}

/// A single compute instance as reported by a cloud driver.
///
/// Immutable value type: a fresh `Machine` is produced on every pool
/// refresh, never mutated in place. A missing `launch_time` means the
/// machine is not running yet (or the provider did not report one) and is
/// treated as "youngest" by age-ordered policies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Machine {
    /// Provider-assigned identifier, unique within the pool.
    pub id: MachineId,

    /// Execution state.
    pub state: MachineState,

    /// Pool membership flags.
    pub membership: MembershipStatus,

    /// Operator-visible service state.
    pub service_state: ServiceState,

    /// When the machine was requested from the provider, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_time: Option<DateTime<Utc>>,

    /// When the machine started running, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub launch_time: Option<DateTime<Utc>>,

    /// Public IP addresses.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub public_ips: Vec<IpAddr>,

    /// Private IP addresses.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub private_ips: Vec<IpAddr>,

    /// Opaque provider metadata, passed through uninterpreted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl Machine {
    /// Creates a new machine builder.
    pub fn builder() -> MachineBuilder {
        MachineBuilder::new()
    }

    /// True if the machine supplies (or will supply) pool capacity.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    /// True if the machine may be selected as a scale-in victim.
    #[must_use]
    pub fn is_evictable(&self) -> bool {
        self.membership.evictable
    }
}

/// Builder for [`Machine`] values.
#[derive(Debug, Default)]
pub struct MachineBuilder {
    id: Option<MachineId>,
    state: Option<MachineState>,
    membership: MembershipStatus,
    service_state: ServiceState,
    request_time: Option<DateTime<Utc>>,
    launch_time: Option<DateTime<Utc>>,
    public_ips: Vec<IpAddr>,
    private_ips: Vec<IpAddr>,
    metadata: Option<serde_json::Value>,
}

impl MachineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: impl Into<MachineId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn state(mut self, state: MachineState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn membership(mut self, membership: MembershipStatus) -> Self {
        self.membership = membership;
        self
    }

    pub fn service_state(mut self, service_state: ServiceState) -> Self {
        self.service_state = service_state;
        self
    }

    pub fn request_time(mut self, ts: DateTime<Utc>) -> Self {
        self.request_time = Some(ts);
        self
    }

    pub fn launch_time(mut self, ts: DateTime<Utc>) -> Self {
        self.launch_time = Some(ts);
        self
    }

    pub fn public_ip(mut self, ip: IpAddr) -> Self {
        self.public_ips.push(ip);
        self
    }

    pub fn private_ip(mut self, ip: IpAddr) -> Self {
        self.private_ips.push(ip);
        self
    }

    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Builds the machine.
    ///
    /// # Panics
    ///
    /// Panics if `id` or `state` is not set.
    pub fn build(self) -> Machine {
        Machine {
            id: self.id.expect("id is required"),
            state: self.state.expect("state is required"),
            membership: self.membership,
            service_state: self.service_state,
            request_time: self.request_time,
            launch_time: self.launch_time,
            public_ips: self.public_ips,
            private_ips: self.private_ips,
            metadata: self.metadata,
        }
    }
}
