//! # Fleet
//!
//! Fans declarative convergence out across many hosts.
//!
//! ## Core Concepts
//!
//! - **Inventory**: Hosts and groups, with tag and group indices; group
//!   membership is closed over inheritance
//! - **Target**: A compiled selector such as `@web,tag:prod,!web-03`
//! - **Transport**: Connectivity check and command dispatch per host
//! - **FleetExecutor**: Plans or converges a step set on every selected
//!   host under a [`Strategy`], with bounded concurrency and per-host
//!   timeouts
//!
//! ## Example
//!
//! ```ignore
//! use fleet::{FleetExecutor, FleetExecutorConfig, Inventory, SshTransport, Target};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! let inventory = Inventory::from_spec(spec)?;
//! let hosts: Vec<_> = Target::parse("@web,!tag:canary")?
//!     .select(&inventory)
//!     .into_iter()
//!     .cloned()
//!     .collect();
//!
//! let executor = FleetExecutor::new(FleetExecutorConfig::default(), Arc::new(SshTransport::new()))?;
//! let result = executor.execute(&hosts, &steps, &CancellationToken::new()).await?;
//! if !result.all_successful() {
//!     for host in result.failed_hosts() {
//!         eprintln!("{}: {:?}", host.host_id, host.error);
//!     }
//! }
//! ```
//!
//! Partial failure is data, not an error: `execute` only fails when the
//! steps themselves are invalid.

pub mod error;
pub mod executor;
pub mod glob;
pub mod inventory;
pub mod selector;
pub mod transport;

mod serde_ms;

// Re-export main types at crate root
pub use error::{FleetError, GlobError, InventoryError, SelectorError};
pub use executor::{
    FleetExecutor, FleetExecutorConfig, FleetPlan, FleetProgress, FleetResult, FleetSummary,
    HostError, HostOutcome, HostPlan, HostResult, NoProgress, Strategy,
};
pub use glob::Glob;
pub use inventory::{
    Group, GroupName, GroupSpec, Host, HostId, HostSpec, HostStatus, Inventory, InventoryDefaults,
    InventorySpec, SshConfig, Tag,
};
pub use selector::{Matcher, Selection, SelectorToken, Target};
pub use transport::{HostSession, LocalTransport, Session, SshTransport, Transport, TransportError};
