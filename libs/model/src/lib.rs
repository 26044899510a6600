//! Provider-independent data model for cloud machine pools.
//!
//! These are the value types exchanged between the reconciliation engine
//! and the cloud drivers:
//!
//! - [`Machine`]: a single compute instance as reported by a driver.
//! - [`MachinePool`]: an immutable point-in-time snapshot of the pool.
//! - [`ScheduledTermination`]: a machine marked for removal at a given time.
//! - [`ResizePlan`]: the outcome of one planning pass.
//!
//! All types are plain values: no I/O, no clocks, no interior mutability.
//! A pool snapshot is replaced wholesale on every refresh and never merged
//! with a previous one.

mod machine;
mod pool;
mod termination;

pub use machine::{
    Machine, MachineBuilder, MachineId, MachineState, MembershipStatus, ServiceState,
};
pub use pool::MachinePool;
pub use termination::{ResizePlan, ScheduledTermination};
