//! portmgrd integration tests
//!
//! Drive `PortMgr` through the daemon loop with in-memory databases.

use std::time::Duration;

use sonic_cfgmgr_common::{CfgMgrDaemon, LinkEvent, Orch};
use sonic_cfgmgr_test::{
    lag_fixtures, port_fixtures, CommandVerifier, StoreVerifier, TestBed,
};
use sonic_portmgrd::PortMgr;

fn daemon(bed: &TestBed) -> CfgMgrDaemon<PortMgr> {
    let (config_db, appl_db, state_db) = bed.stores();
    let mgr = PortMgr::new(config_db, appl_db, state_db, bed.shell());
    CfgMgrDaemon::new(mgr, Duration::from_millis(10))
}

/// Port config arriving before the port exists is applied once it shows
/// up in STATE_DB, on the next timer tick.
#[tokio::test]
async fn test_port_config_waits_for_state() {
    let bed = TestBed::new();
    let mut daemon = daemon(&bed);
    let commands = CommandVerifier::new(&bed.shell);

    let change = bed
        .apply(&port_fixtures::port("Ethernet0", "1500", "down"))
        .await
        .unwrap();
    daemon.handle_changes(vec![change]).await;
    commands.assert_not_executed("Ethernet0").unwrap();

    bed.apply(&port_fixtures::port_state_ok("Ethernet0")).await.unwrap();
    daemon.on_timeout().await;

    commands
        .assert_sequence(&["mtu \"1500\"", "\"Ethernet0\" down"])
        .unwrap();
    StoreVerifier::new(&bed.appl_db)
        .assert_field_value("PORT_TABLE", "Ethernet0", "mtu", "1500")
        .unwrap();
    assert!(daemon.manager().ports().contains("Ethernet0"));

    daemon.on_timeout().await;
    commands.assert_executed_once("mtu").unwrap();
}

/// A newer value queued while a record was deferred wins.
#[tokio::test]
async fn test_newer_value_wins_over_deferred_record() {
    let bed = TestBed::new();
    let mut daemon = daemon(&bed);

    let first = bed.apply(&port_fixtures::port_mtu("Ethernet0", "1500")).await.unwrap();
    daemon.handle_changes(vec![first]).await;

    let second = bed.apply(&port_fixtures::port_mtu("Ethernet0", "9000")).await.unwrap();
    let ready = bed.apply(&port_fixtures::port_state_ok("Ethernet0")).await.unwrap();
    daemon.handle_changes(vec![second, ready]).await;

    let commands = CommandVerifier::new(&bed.shell);
    commands.assert_executed_once("mtu \"9000\"").unwrap();
    commands.assert_not_executed("mtu \"1500\"").unwrap();
}

/// Deleting a port before it became ready drops the pending config.
#[tokio::test]
async fn test_delete_supersedes_deferred_set() {
    let bed = TestBed::new();
    let mut daemon = daemon(&bed);

    let set = bed.apply(&port_fixtures::port_mtu("Ethernet0", "1500")).await.unwrap();
    daemon.handle_changes(vec![set]).await;
    let del = bed.apply(&port_fixtures::delete_port("Ethernet0")).await.unwrap();
    daemon.handle_changes(vec![del]).await;

    bed.apply(&port_fixtures::port_state_ok("Ethernet0")).await.unwrap();
    daemon.on_timeout().await;

    assert!(bed.shell.commands().is_empty());
    assert!(!daemon.manager().has_pending_tasks());
}

/// LAG MTU is published for the LAG and each of its static members only.
#[tokio::test]
async fn test_lag_mtu_fans_out_to_members() {
    let bed = TestBed::new();
    let mut daemon = daemon(&bed);

    bed.apply_all(&[
        lag_fixtures::lag_member("PortChannel1", "Ethernet0"),
        lag_fixtures::lag_member("PortChannel1", "Ethernet4"),
        lag_fixtures::lag_member("PortChannel2", "Ethernet8"),
        lag_fixtures::lag_state_ok("PortChannel1"),
    ])
    .await
    .unwrap();

    let change = bed
        .apply(&lag_fixtures::lag_with("PortChannel1", "9000", "up"))
        .await
        .unwrap();
    daemon.handle_changes(vec![change]).await;

    let appl = StoreVerifier::new(&bed.appl_db);
    appl.assert_field_value("LAG_TABLE", "PortChannel1", "mtu", "9000").unwrap();
    appl.assert_field_value("PORT_TABLE", "Ethernet0", "mtu", "9000").unwrap();
    appl.assert_field_value("PORT_TABLE", "Ethernet4", "mtu", "9000").unwrap();
    appl.assert_key_not_exists("PORT_TABLE", "Ethernet8").unwrap();

    let commands = CommandVerifier::new(&bed.shell);
    commands.assert_executed_once("\"PortChannel1\" up").unwrap();
    commands.assert_count("Ethernet", 0).unwrap();
}

/// A LAG device reported by the kernel gets its admin status without
/// waiting for STATE_DB; duplicate reports are ignored.
#[tokio::test]
async fn test_lag_newlink_applies_admin_status() {
    let bed = TestBed::new();
    let mut daemon = daemon(&bed);
    bed.apply(&lag_fixtures::lag_with("PortChannel1", "9100", "down"))
        .await
        .unwrap();

    daemon.handle_link_event(LinkEvent::new_link("PortChannel1")).await;
    daemon.handle_link_event(LinkEvent::new_link("PortChannel1")).await;
    daemon.handle_link_event(LinkEvent::new_link("Ethernet0")).await;

    let commands = CommandVerifier::new(&bed.shell);
    commands.assert_executed_once("\"PortChannel1\" down").unwrap();
    commands.assert_not_executed("mtu").unwrap();
    assert_eq!(bed.shell.commands().len(), 1);

    daemon.handle_link_event(LinkEvent::del_link("PortChannel1")).await;
    assert!(!daemon.manager().ports().contains("PortChannel1"));

    daemon.handle_link_event(LinkEvent::new_link("PortChannel1")).await;
    commands.assert_count("\"PortChannel1\" down", 2).unwrap();
}

/// Existing rows are picked up at startup.
#[tokio::test]
async fn test_initial_load() {
    let bed = TestBed::new();
    bed.apply_all(&[
        port_fixtures::port("Ethernet0", "9100", "up"),
        port_fixtures::port_state_ok("Ethernet0"),
        port_fixtures::port("Ethernet4", "9100", "up"),
    ])
    .await
    .unwrap();

    let mut daemon = daemon(&bed);
    daemon
        .load_initial(&bed.config_db, &bed.state_db)
        .await
        .unwrap();
    daemon.on_timeout().await;

    let commands = CommandVerifier::new(&bed.shell);
    commands.assert_count("\"Ethernet0\"", 2).unwrap();
    commands.assert_not_executed("Ethernet4").unwrap();
    assert!(daemon.manager().has_pending_tasks());
}
