//! The driver seam: the only place real cloud I/O happens.
//!
//! A driver translates the engine's primitive operations into vendor SDK
//! calls for one backend (EC2, Azure VM scale sets, GCE instance groups,
//! OpenStack, Kubernetes, vSphere, ...). Drivers are mechanically similar
//! adapters; everything with real invariants lives on the engine side of
//! this trait.
//!
//! The engine treats a driver as stateless: connection pooling,
//! credentials and per-call timeouts are the driver's own concern, and
//! any failure is reported as one of the [`PoolError`] kinds.

use async_trait::async_trait;
use skypool_model::{Machine, MachineId, MachinePool, MembershipStatus, ServiceState};

use crate::error::PoolResult;

/// Provider-specific adapter for one cloud backend.
#[async_trait]
pub trait CloudPoolDriver: Send + Sync {
    /// Applies driver-specific provisioning settings (machine image,
    /// size, credentials reference, ...). The engine passes the
    /// `scale_out` block of its configuration through untouched.
    async fn configure(&self, settings: serde_json::Value) -> PoolResult<()>;

    /// Lists the current pool members.
    ///
    /// Fails with [`PoolError::Driver`] on backend failure.
    ///
    /// [`PoolError::Driver`]: crate::error::PoolError::Driver
    async fn list_machines(&self) -> PoolResult<MachinePool>;

    /// Requests `count` new machines.
    ///
    /// May fail with [`PoolError::PartialStart`] carrying the subset of
    /// machines that did start; the engine accepts those into the pool
    /// and alerts on the shortfall.
    ///
    /// [`PoolError::PartialStart`]: crate::error::PoolError::PartialStart
    async fn start_machines(&self, count: u32) -> PoolResult<Vec<Machine>>;

    /// Terminates a machine.
    ///
    /// Fails with [`PoolError::NotFound`] if the backend does not know
    /// the id.
    ///
    /// [`PoolError::NotFound`]: crate::error::PoolError::NotFound
    async fn terminate_machine(&self, id: &MachineId) -> PoolResult<()>;

    /// Adopts an existing machine into the pool without recreating it.
    async fn attach_machine(&self, id: &MachineId) -> PoolResult<()>;

    /// Releases a machine from the pool without destroying it.
    async fn detach_machine(&self, id: &MachineId) -> PoolResult<()>;

    /// Tags a machine with an operator-visible service state.
    async fn set_service_state(&self, id: &MachineId, state: ServiceState) -> PoolResult<()>;

    /// Tags a machine with new membership flags.
    async fn set_membership_status(
        &self,
        id: &MachineId,
        status: MembershipStatus,
    ) -> PoolResult<()>;
}
