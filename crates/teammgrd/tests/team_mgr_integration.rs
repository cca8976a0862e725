//! teammgrd integration tests
//!
//! Drive `LagMgr` through the daemon loop with in-memory databases.

use std::time::Duration;

use pretty_assertions::assert_eq;
use sonic_cfgmgr_common::{defaults, CfgMgrDaemon, LinkEvent, Orch};
use sonic_cfgmgr_test::{
    lag_fixtures, port_fixtures, CommandVerifier, ConfigChange, StoreVerifier, TestBed,
};
use sonic_teammgrd::LagMgr;

async fn daemon(bed: &TestBed) -> CfgMgrDaemon<LagMgr> {
    let (config_db, appl_db, state_db) = bed.stores();
    let mgr = LagMgr::new(
        config_db,
        appl_db,
        state_db,
        bed.shell(),
        defaults::DEFAULT_LAG_MAC,
    )
    .await
    .unwrap();
    CfgMgrDaemon::new(mgr, Duration::from_millis(10))
}

/// Writes the rows without delivering notifications.
async fn seed(bed: &TestBed, changes: &[ConfigChange]) {
    bed.apply_all(changes).await.unwrap();
}

/// Repeating a LAG SET creates the team device once.
#[tokio::test]
async fn test_repeated_lag_set_creates_once() {
    let bed = TestBed::new();
    let mut daemon = daemon(&bed).await;

    for _ in 0..3 {
        let change = bed.apply(&lag_fixtures::lag("PortChannel1")).await.unwrap();
        daemon.handle_changes(vec![change]).await;
    }

    let commands = CommandVerifier::new(&bed.shell);
    commands.assert_executed_once("teamd -r").unwrap();
    commands.assert_executed_once("\"PortChannel1\" up").unwrap();
    assert_eq!(daemon.manager().lags().len(), 1);
}

/// A membership row waits until both the port and the LAG are in
/// STATE_DB, then attaches once.
#[tokio::test]
async fn test_member_attaches_when_ready() {
    let bed = TestBed::new();
    let mut daemon = daemon(&bed).await;
    let commands = CommandVerifier::new(&bed.shell);

    let changes = bed
        .apply_all(&[
            lag_fixtures::lag("PortChannel1"),
            lag_fixtures::lag_member("PortChannel1", "Ethernet4"),
        ])
        .await
        .unwrap();
    daemon.handle_changes(changes).await;
    commands.assert_not_executed("port add").unwrap();
    assert!(daemon.manager().has_pending_tasks());

    seed(&bed, &[port_fixtures::port_state_ok("Ethernet4")]).await;
    daemon.on_timeout().await;
    commands.assert_not_executed("port add").unwrap();

    seed(&bed, &[lag_fixtures::lag_state_ok("PortChannel1")]).await;
    daemon.on_timeout().await;
    commands
        .assert_executed_once("teamdctl \"PortChannel1\" port add \"Ethernet4\"")
        .unwrap();
    assert!(!daemon.manager().has_pending_tasks());

    daemon.on_timeout().await;
    commands.assert_executed_once("port add").unwrap();
    StoreVerifier::new(&bed.appl_db)
        .assert_fields(
            "PORT_TABLE",
            "Ethernet4",
            &[("admin_status", "up"), ("mtu", "9100")],
        )
        .unwrap();
}

/// LAG MTU reaches the LAG and its own members only.
#[tokio::test]
async fn test_lag_mtu_fans_out_to_members() {
    let bed = TestBed::new();
    let mut daemon = daemon(&bed).await;
    seed(
        &bed,
        &[
            lag_fixtures::lag_member("PortChannel1", "Ethernet0"),
            lag_fixtures::lag_member("PortChannel1", "Ethernet4"),
            lag_fixtures::lag_member("PortChannel2", "Ethernet8"),
        ],
    )
    .await;

    let change = bed
        .apply(&lag_fixtures::lag_with("PortChannel1", "9000", "up"))
        .await
        .unwrap();
    daemon.handle_changes(vec![change]).await;

    let appl = StoreVerifier::new(&bed.appl_db);
    appl.assert_fields("LAG_TABLE", "PortChannel1", &[("mtu", "9000"), ("admin_status", "up")])
        .unwrap();
    appl.assert_fields("PORT_TABLE", "Ethernet0", &[("mtu", "9000"), ("admin_status", "up")])
        .unwrap();
    appl.assert_field_value("PORT_TABLE", "Ethernet4", "mtu", "9000").unwrap();
    appl.assert_key_not_exists("PORT_TABLE", "Ethernet8").unwrap();

    let commands = CommandVerifier::new(&bed.shell);
    commands
        .assert_sequence(&["teamd -r", "\"PortChannel1\" up", "\"PortChannel1\" mtu \"9000\""])
        .unwrap();
    commands.assert_not_executed("Ethernet").unwrap();
}

/// `min_links` is only read when the LAG is created.
#[tokio::test]
async fn test_min_links_fixed_at_creation() {
    let bed = TestBed::new();
    let mut daemon = daemon(&bed).await;

    let change = bed.apply(&lag_fixtures::lag_min_links("PortChannel1", 2)).await.unwrap();
    daemon.handle_changes(vec![change]).await;
    let change = bed.apply(&lag_fixtures::lag_min_links("PortChannel1", 4)).await.unwrap();
    daemon.handle_changes(vec![change]).await;

    let commands = CommandVerifier::new(&bed.shell);
    commands.assert_executed_once("teamd -r").unwrap();
    commands.assert_executed_once("min_ports\\\":2").unwrap();
    commands.assert_not_executed("min_ports\\\":4").unwrap();
}

/// Stale LAG state is removed before any config is processed.
#[tokio::test]
async fn test_startup_purges_lag_state() {
    let bed = TestBed::new();
    seed(
        &bed,
        &[
            lag_fixtures::lag_state_ok("PortChannel1"),
            lag_fixtures::lag_state_ok("PortChannel2"),
            lag_fixtures::lag("PortChannel1"),
            lag_fixtures::lag_member("PortChannel1", "Ethernet0"),
            port_fixtures::port_state_ok("Ethernet0"),
        ],
    )
    .await;

    let mut daemon = daemon(&bed).await;
    assert!(bed.state_db.is_empty("LAG_TABLE"));

    daemon
        .load_initial(&bed.config_db, &bed.state_db)
        .await
        .unwrap();
    daemon.on_timeout().await;

    let commands = CommandVerifier::new(&bed.shell);
    commands.assert_executed_once("teamd -r").unwrap();
    // Neither the port row nor the membership row attaches before the LAG
    // reports state.
    commands.assert_not_executed("port add").unwrap();
    assert!(daemon.manager().has_pending_tasks());

    seed(&bed, &[lag_fixtures::lag_state_ok("PortChannel1")]).await;
    daemon.on_timeout().await;
    commands.assert_executed_once("port add \"Ethernet0\"").unwrap();
    assert!(!daemon.manager().has_pending_tasks());
}

/// Detaching a member restores its own MTU and admin status.
#[tokio::test]
async fn test_member_detach_restores_port_config() {
    let bed = TestBed::new();
    let mut daemon = daemon(&bed).await;
    seed(
        &bed,
        &[
            port_fixtures::port("Ethernet0", "1500", "down"),
            port_fixtures::port_state_ok("Ethernet0"),
            lag_fixtures::lag_state_ok("PortChannel1"),
        ],
    )
    .await;

    let changes = bed
        .apply_all(&[
            lag_fixtures::lag_with("PortChannel1", "9000", "up"),
            lag_fixtures::lag_member("PortChannel1", "Ethernet0"),
        ])
        .await
        .unwrap();
    daemon.handle_changes(changes).await;

    let appl = StoreVerifier::new(&bed.appl_db);
    appl.assert_fields("PORT_TABLE", "Ethernet0", &[("admin_status", "down"), ("mtu", "9000")])
        .unwrap();
    bed.shell.clear();

    let change = bed
        .apply(&lag_fixtures::delete_lag_member("PortChannel1", "Ethernet0"))
        .await
        .unwrap();
    daemon.handle_changes(vec![change]).await;

    CommandVerifier::new(&bed.shell)
        .assert_sequence(&[
            "teamdctl \"PortChannel1\" port remove \"Ethernet0\"",
            "\"Ethernet0\" down",
            "\"Ethernet0\" mtu \"1500\"",
        ])
        .unwrap();
    appl.assert_fields("PORT_TABLE", "Ethernet0", &[("admin_status", "down"), ("mtu", "1500")])
        .unwrap();
    assert!(!daemon.manager().members().contains("Ethernet0"));
}

/// Deleting a LAG kills teamd and clears its STATE_DB row.
#[tokio::test]
async fn test_lag_delete() {
    let bed = TestBed::new();
    let mut daemon = daemon(&bed).await;

    let change = bed.apply(&lag_fixtures::lag("PortChannel1")).await.unwrap();
    daemon.handle_changes(vec![change]).await;
    seed(&bed, &[lag_fixtures::lag_state_ok("PortChannel1")]).await;

    let change = bed.apply(&lag_fixtures::delete_lag("PortChannel1")).await.unwrap();
    daemon.handle_changes(vec![change]).await;

    CommandVerifier::new(&bed.shell)
        .assert_executed_once("teamd -k -t \"PortChannel1\"")
        .unwrap();
    StoreVerifier::new(&bed.state_db)
        .assert_key_not_exists("LAG_TABLE", "PortChannel1")
        .unwrap();
    assert!(daemon.manager().lags().is_empty());
}

/// A front panel port reported by the kernel joins its LAG once the LAG is
/// created and ready.
#[tokio::test]
async fn test_newlink_attaches_member() {
    let bed = TestBed::new();
    let mut daemon = daemon(&bed).await;
    seed(
        &bed,
        &[
            lag_fixtures::lag_member("PortChannel1", "Ethernet4"),
            port_fixtures::port_state_ok("Ethernet4"),
        ],
    )
    .await;

    daemon.handle_link_event(LinkEvent::new_link("Ethernet4")).await;
    assert!(bed.shell.commands().is_empty());

    let change = bed.apply(&lag_fixtures::lag("PortChannel1")).await.unwrap();
    daemon.handle_changes(vec![change]).await;

    daemon.handle_link_event(LinkEvent::new_link("Ethernet4")).await;
    CommandVerifier::new(&bed.shell).assert_not_executed("port add").unwrap();

    seed(&bed, &[lag_fixtures::lag_state_ok("PortChannel1")]).await;
    daemon.handle_link_event(LinkEvent::new_link("Ethernet4")).await;
    daemon.handle_link_event(LinkEvent::new_link("Ethernet4")).await;
    daemon.handle_link_event(LinkEvent::new_link("PortChannel1")).await;

    let commands = CommandVerifier::new(&bed.shell);
    commands.assert_executed_once("port add \"Ethernet4\"").unwrap();
    assert!(daemon.manager().members().contains("Ethernet4"));

    daemon.handle_link_event(LinkEvent::del_link("Ethernet4")).await;
    assert!(daemon.manager().members().is_empty());
}

/// A port row arriving before the LAG is ready does not attach the member.
#[tokio::test]
async fn test_port_state_waits_for_lag_state() {
    let bed = TestBed::new();
    let mut daemon = daemon(&bed).await;

    let changes = bed
        .apply_all(&[
            lag_fixtures::lag("PortChannel1"),
            lag_fixtures::lag_member("PortChannel1", "Ethernet4"),
            port_fixtures::port_state_ok("Ethernet4"),
        ])
        .await
        .unwrap();
    daemon.handle_changes(changes).await;

    let commands = CommandVerifier::new(&bed.shell);
    commands.assert_not_executed("port add").unwrap();
    assert!(daemon.manager().members().is_empty());

    seed(&bed, &[lag_fixtures::lag_state_ok("PortChannel1")]).await;
    daemon.on_timeout().await;
    commands.assert_executed_once("port add \"Ethernet4\"").unwrap();
}

/// Members of a deleted LAG rejoin when the LAG is created again.
#[tokio::test]
async fn test_recreated_lag_gets_members_back() {
    let bed = TestBed::new();
    let mut daemon = daemon(&bed).await;
    seed(
        &bed,
        &[
            port_fixtures::port_state_ok("Ethernet4"),
            lag_fixtures::lag_state_ok("PortChannel1"),
        ],
    )
    .await;

    let changes = bed
        .apply_all(&[
            lag_fixtures::lag("PortChannel1"),
            lag_fixtures::lag_member("PortChannel1", "Ethernet4"),
        ])
        .await
        .unwrap();
    daemon.handle_changes(changes).await;
    let commands = CommandVerifier::new(&bed.shell);
    commands.assert_executed_once("port add").unwrap();

    let change = bed.apply(&lag_fixtures::delete_lag("PortChannel1")).await.unwrap();
    daemon.handle_changes(vec![change]).await;
    assert!(daemon.manager().members().is_empty());

    let change = bed.apply(&lag_fixtures::lag("PortChannel1")).await.unwrap();
    daemon.handle_changes(vec![change]).await;
    seed(&bed, &[lag_fixtures::lag_state_ok("PortChannel1")]).await;
    daemon.on_timeout().await;

    commands.assert_count("port add", 2).unwrap();
    assert_eq!(daemon.manager().lag_of("Ethernet4"), Some("PortChannel1"));

    let change = bed
        .apply(&lag_fixtures::delete_lag_member("PortChannel1", "Ethernet4"))
        .await
        .unwrap();
    daemon.handle_changes(vec![change]).await;
    commands.assert_executed_once("port remove \"Ethernet4\"").unwrap();
}
