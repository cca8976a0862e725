//! Test infrastructure for SONiC configuration managers
//!
//! Provides:
//! - In-memory CONFIG_DB / APPL_DB / STATE_DB and a recording shell
//! - Test fixtures for PORT, PORTCHANNEL and PORTCHANNEL_MEMBER changes
//! - APPL_DB / STATE_DB and command verification helpers

pub mod fixtures;
mod verification;

pub use fixtures::*;
pub use verification::*;
