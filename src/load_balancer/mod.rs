//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Proxied request
//!     → registry.rs (snapshot of eligible machines)
//!     → least_load.rs (lowest connections/max_connections, then fastest)
//!     → machine.rs (acquire connection guard)
//!     → dispatch
//! ```
//!
//! # Design Decisions
//! - Selection is stateless; machines track their own load
//! - Eligibility (status + circuit state) is decided by the registry snapshot
//! - Per-machine synchronization only, no registry-wide lock

pub mod least_load;
pub mod machine;
pub mod registry;

use std::sync::Arc;

pub use least_load::LeastLoad;
pub use machine::{Machine, MachineConnectionGuard, MachineId, MachineSnapshot};
pub use registry::{Deregistration, MachineRegistry, Registration};

/// A machine selection strategy.
pub trait LoadBalancer: Send + Sync + std::fmt::Debug {
    /// Pick one of `machines`, or `None` if none can take the request.
    fn next_server(&self, machines: &[Arc<Machine>]) -> Option<Arc<Machine>>;
}
