//! LAG configuration manager daemon for SONiC.
//!
//! This crate implements the `teammgrd` daemon, which turns PORTCHANNEL and
//! PORTCHANNEL_MEMBER configuration into running `teamd` instances.
//!
//! # Responsibilities
//!
//! - Create a team device per LAG with `teamd -r -t <lag> -c <json> -d`
//! - Destroy it with `teamd -k -t <lag>` and drop its STATE_DB row
//! - Attach and detach members with `teamdctl <lag> port add|remove <port>`
//! - Apply LAG MTU and admin status, fanned out to members in APPL_DB
//! - Attach ports that appear after their membership row was written
//!
//! # Tables
//!
//! | Database | Table | Purpose |
//! |----------|-------|---------|
//! | CONFIG_DB | PORTCHANNEL | LAG configuration source |
//! | CONFIG_DB | PORTCHANNEL_MEMBER | Static LAG membership |
//! | CONFIG_DB | PORT | Member's own MTU and admin status |
//! | CONFIG_DB | DEVICE_METADATA | System MAC used as LAG hwaddr |
//! | STATE_DB | PORT_TABLE | Port readiness and discovery |
//! | STATE_DB | LAG_TABLE | LAG readiness, purged at startup |
//! | APPL_DB | PORT_TABLE | Published member attributes |
//! | APPL_DB | LAG_TABLE | Published LAG attributes |

pub mod commands;
mod team_mgr;

pub use commands::{RunnerConfig, TeamdConfig};
pub use team_mgr::{LagMgr, LagMgrTable};
