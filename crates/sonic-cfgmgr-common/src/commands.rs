//! Shell command builders for kernel link operations

use crate::shell;

/// Build link admin status command
pub fn build_set_link_admin_cmd(alias: &str, up: bool) -> String {
    format!(
        "{} link set dev {} {}",
        shell::IP_CMD,
        shell::shellquote(alias),
        if up { "up" } else { "down" }
    )
}

/// Build link MTU command
pub fn build_set_link_mtu_cmd(alias: &str, mtu: &str) -> String {
    format!(
        "{} link set dev {} mtu {}",
        shell::IP_CMD,
        shell::shellquote(alias),
        shell::shellquote(mtu)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_set_link_admin_cmd() {
        assert_eq!(
            build_set_link_admin_cmd("Ethernet0", true),
            "/sbin/ip link set dev \"Ethernet0\" up"
        );
        assert_eq!(
            build_set_link_admin_cmd("PortChannel1", false),
            "/sbin/ip link set dev \"PortChannel1\" down"
        );
    }

    #[test]
    fn test_build_set_link_mtu_cmd() {
        let cmd = build_set_link_mtu_cmd("Ethernet4", "9100");
        assert_eq!(cmd, "/sbin/ip link set dev \"Ethernet4\" mtu \"9100\"");
    }

    #[test]
    fn test_build_set_link_mtu_cmd_quotes_value() {
        let cmd = build_set_link_mtu_cmd("Ethernet4", "9100; reboot");
        assert!(cmd.ends_with("mtu \"9100; reboot\""));
    }
}
