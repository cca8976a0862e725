//! Common infrastructure for SONiC configuration manager daemons.
//!
//! This crate provides shared functionality for the cfgmgr daemons
//! (portmgrd, teammgrd):
//!
//! - [`shell`]: Safe shell command execution with proper quoting
//! - [`CfgMgr`]: Base trait extending `Orch` for config managers
//! - [`error`]: Error types for cfgmgr operations
//! - [`store`]: Table access over Redis or memory
//! - [`readiness`], [`tracking`], [`propagate`]: Reconciliation building blocks
//! - [`link_event`], [`netlink`]: Kernel link event delivery
//! - [`daemon`]: The event loop every daemon runs
//!
//! # Architecture
//!
//! Configuration managers follow this pattern:
//!
//! 1. Subscribe to CONFIG_DB tables for configuration changes
//! 2. Monitor STATE_DB to track port/LAG readiness
//! 3. Execute shell commands to configure the Linux network stack
//! 4. Write processed configuration to APPL_DB for orchagent
//!
//! # Example
//!
//! ```ignore
//! use sonic_cfgmgr_common::{
//!     commands::build_set_link_mtu_cmd,
//!     shell::ShellExecutor,
//!     error::CfgMgrResult,
//! };
//!
//! async fn set_mtu(shell: &dyn ShellExecutor, alias: &str, mtu: &str) -> CfgMgrResult<()> {
//!     shell.exec_or_throw(&build_set_link_mtu_cmd(alias, mtu)).await?;
//!     Ok(())
//! }
//! ```

pub mod commands;
pub mod config;
pub mod daemon;
pub mod error;
pub mod link_event;
pub mod logging;
pub mod manager;
pub mod netlink;
pub mod propagate;
pub mod readiness;
pub mod shell;
pub mod store;
pub mod tables;
pub mod tracking;

// Re-export commonly used items at crate root
pub use config::{ConfigOverrides, DaemonConfig};
pub use daemon::{CfgMgrDaemon, RedisStores};
pub use error::{CfgMgrError, CfgMgrResult};
pub use link_event::{LinkEvent, LinkEventBridge, LinkEventHandler, LinkEventType};
pub use manager::{
    defaults, is_admin_up, CfgMgr, DbId, FieldValue, FieldValues, FieldValuesExt, RetryPolicy,
};
pub use propagate::{Attribute, AttributePropagator};
pub use readiness::{EntityKind, ReadinessOracle};
pub use shell::{DryRunShell, ShellExecutor, SystemShell};
pub use store::{MemoryStore, Table, TableStore};
pub use tables::MembershipKey;
pub use tracking::TrackingSet;

// Re-export the Orch trait for convenience
pub use sonic_orch_common::Orch;
