//! teamd and teamdctl command builders

use serde::Serialize;
use sonic_cfgmgr_common::shell::{shellquote, TEAMDCTL_CMD, TEAMD_CMD};
use sonic_cfgmgr_common::{CfgMgrError, CfgMgrResult};

/// Runner section of a teamd configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunnerConfig {
    /// Always `lacp`.
    pub name: &'static str,
    /// Active LACP.
    pub active: bool,
    /// Minimum number of active member ports, from `min_links`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_ports: Option<u32>,
    /// LACP fallback.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub fallback: bool,
}

/// Configuration handed to `teamd -c` when a LAG is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeamdConfig {
    /// Team device name.
    pub device: String,
    /// Hardware address of the team device.
    pub hwaddr: String,
    /// LACP runner.
    pub runner: RunnerConfig,
}

impl TeamdConfig {
    /// Builds an active LACP configuration. A `min_links` of 0 is omitted.
    pub fn lacp(device: &str, hwaddr: &str, min_links: u32, fallback: bool) -> Self {
        Self {
            device: device.to_string(),
            hwaddr: hwaddr.to_string(),
            runner: RunnerConfig {
                name: "lacp",
                active: true,
                min_ports: (min_links > 0).then_some(min_links),
                fallback,
            },
        }
    }

    /// Serializes to the JSON teamd expects.
    pub fn to_json(&self) -> CfgMgrResult<String> {
        serde_json::to_string(self)
            .map_err(|e| CfgMgrError::internal(format!("teamd config for {}: {}", self.device, e)))
    }
}

/// Build teamd command that starts a daemonized team device
pub fn build_teamd_create_cmd(config: &TeamdConfig) -> CfgMgrResult<String> {
    Ok(format!(
        "{} -r -t {} -c {} -d",
        TEAMD_CMD,
        shellquote(&config.device),
        shellquote(&config.to_json()?)
    ))
}

/// Build teamd command that kills a team device
pub fn build_teamd_kill_cmd(alias: &str) -> String {
    format!("{} -k -t {}", TEAMD_CMD, shellquote(alias))
}

/// Build teamdctl port add command
pub fn build_teamdctl_port_add_cmd(lag: &str, member: &str) -> String {
    format!(
        "{} {} port add {}",
        TEAMDCTL_CMD,
        shellquote(lag),
        shellquote(member)
    )
}

/// Build teamdctl port remove command
pub fn build_teamdctl_port_remove_cmd(lag: &str, member: &str) -> String {
    format!(
        "{} {} port remove {}",
        TEAMDCTL_CMD,
        shellquote(lag),
        shellquote(member)
    )
}
