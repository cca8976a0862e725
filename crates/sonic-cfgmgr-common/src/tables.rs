//! Table name constants and key helpers shared by portmgrd and teammgrd.
//!
//! These match the schema definitions in swss-common.

use crate::error::{CfgMgrError, CfgMgrResult};

/// CONFIG_DB table for port configuration.
pub const CFG_PORT_TABLE_NAME: &str = "PORT";

/// CONFIG_DB table for LAG configuration.
pub const CFG_LAG_TABLE_NAME: &str = "PORTCHANNEL";

/// CONFIG_DB table for static LAG membership (`lag|member`).
pub const CFG_LAG_MEMBER_TABLE_NAME: &str = "PORTCHANNEL_MEMBER";

/// CONFIG_DB table holding the switch MAC.
pub const CFG_DEVICE_METADATA_TABLE_NAME: &str = "DEVICE_METADATA";

/// DEVICE_METADATA row holding the local switch settings.
pub const DEVICE_METADATA_LOCALHOST: &str = "localhost";

/// STATE_DB table for port readiness.
pub const STATE_PORT_TABLE_NAME: &str = "PORT_TABLE";

/// STATE_DB table for LAG readiness.
pub const STATE_LAG_TABLE_NAME: &str = "LAG_TABLE";

/// APPL_DB table for port attributes (read by orchagent).
pub const APP_PORT_TABLE_NAME: &str = "PORT_TABLE";

/// APPL_DB table for LAG attributes (read by orchagent).
pub const APP_LAG_TABLE_NAME: &str = "LAG_TABLE";

/// Alias prefix reserved for LAG devices.
pub const LAG_PREFIX: &str = "PortChannel";

/// Alias prefix of front-panel ports.
pub const ETHERNET_PREFIX: &str = "Ethernet";

/// Separator inside composite CONFIG_DB keys.
pub const CONFIG_KEY_SEPARATOR: char = '|';

/// Field names used in port and LAG tables.
pub mod fields {
    /// MTU field.
    pub const MTU: &str = "mtu";

    /// Admin status field (up/down).
    pub const ADMIN_STATUS: &str = "admin_status";

    /// Minimum number of active members for a LAG.
    pub const MIN_LINKS: &str = "min_links";

    /// LACP fallback flag for a LAG.
    pub const FALLBACK: &str = "fallback";

    /// Switch MAC in DEVICE_METADATA.
    pub const MAC: &str = "mac";
}

/// Returns true if the alias names a LAG device.
pub fn is_lag_alias(alias: &str) -> bool {
    alias.starts_with(LAG_PREFIX)
}

/// Returns true if the alias names a front-panel port.
pub fn is_front_panel_alias(alias: &str) -> bool {
    alias.starts_with(ETHERNET_PREFIX)
}

/// A `PORTCHANNEL_MEMBER` key: `lag|member`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MembershipKey {
    /// LAG alias.
    pub lag: String,
    /// Member port alias.
    pub member: String,
}

impl MembershipKey {
    /// Creates a key from its components.
    pub fn new(lag: impl Into<String>, member: impl Into<String>) -> Self {
        Self {
            lag: lag.into(),
            member: member.into(),
        }
    }

    /// Parses `lag|member`. Both parts must be present and non-empty and
    /// there must be no further separator.
    pub fn parse(key: &str) -> CfgMgrResult<Self> {
        let mut parts = key.split(CONFIG_KEY_SEPARATOR);
        match (parts.next(), parts.next(), parts.next()) {
            (Some(lag), Some(member), None) if !lag.is_empty() && !member.is_empty() => {
                Ok(Self::new(lag, member))
            }
            _ => Err(CfgMgrError::malformed_key(CFG_LAG_MEMBER_TABLE_NAME, key)),
        }
    }

    /// Returns the encoded key.
    pub fn to_key(&self) -> String {
        format!("{}{}{}", self.lag, CONFIG_KEY_SEPARATOR, self.member)
    }
}

impl std::fmt::Display for MembershipKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}{}", self.lag, CONFIG_KEY_SEPARATOR, self.member)
    }
}
