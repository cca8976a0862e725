//! Port configuration manager daemon for SONiC.
//!
//! This crate implements the `portmgrd` daemon, which applies port and LAG
//! configuration from CONFIG_DB to the Linux network stack.
//!
//! # Responsibilities
//!
//! - Set device MTU via `ip link set dev <port> mtu <mtu>`
//! - Set device admin status via `ip link set dev <port> up|down`
//! - Publish MTU to APPL_DB for orchagent, fanned out to LAG members
//! - Apply LAG admin status as soon as the kernel reports the device
//!
//! # Tables
//!
//! | Database | Table | Purpose |
//! |----------|-------|---------|
//! | CONFIG_DB | PORT | Port configuration source |
//! | CONFIG_DB | PORTCHANNEL | LAG configuration source |
//! | CONFIG_DB | PORTCHANNEL_MEMBER | LAG membership for MTU fan-out |
//! | STATE_DB | PORT_TABLE | Port readiness |
//! | STATE_DB | LAG_TABLE | LAG readiness |
//! | APPL_DB | PORT_TABLE | Published port MTU |
//! | APPL_DB | LAG_TABLE | Published LAG MTU |
//!
//! # Example
//!
//! ```ignore
//! use sonic_portmgrd::PortMgr;
//!
//! let (config_db, appl_db, state_db) = stores.as_table_stores();
//! let mgr = PortMgr::new(config_db, appl_db, state_db, Arc::new(SystemShell));
//! serve(mgr, &stores, &config, true).await?;
//! ```

mod port_mgr;

pub use port_mgr::{PortMgr, PortMgrTable};
