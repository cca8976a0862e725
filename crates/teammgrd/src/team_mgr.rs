//! LagMgr implementation - the LAG lifecycle manager.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info, instrument, warn};

use sonic_cfgmgr_common::commands::{build_set_link_admin_cmd, build_set_link_mtu_cmd};
use sonic_cfgmgr_common::config::is_valid_mac;
use sonic_cfgmgr_common::tables::{self, fields, is_front_panel_alias, MembershipKey};
use sonic_cfgmgr_common::{
    defaults, is_admin_up, Attribute, AttributePropagator, CfgMgr, CfgMgrError, CfgMgrResult,
    DbId, FieldValuesExt, LinkEvent, LinkEventHandler, LinkEventType, Orch, ReadinessOracle,
    RetryPolicy, ShellExecutor, Table, TableStore, TrackingSet,
};
use sonic_orch_common::{Consumer, ConsumerConfig, KeyOpFieldsValues, Operation, TaskStatus};

use crate::commands::{
    build_teamd_create_cmd, build_teamd_kill_cmd, build_teamdctl_port_add_cmd,
    build_teamdctl_port_remove_cmd, TeamdConfig,
};

/// Tables watched by teammgrd.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LagMgrTable {
    /// CONFIG_DB `PORTCHANNEL`
    Lag,
    /// CONFIG_DB `PORTCHANNEL_MEMBER`
    LagMember,
    /// STATE_DB `PORT_TABLE`
    PortState,
}

impl LagMgrTable {
    /// Every watched table, in processing order.
    pub const ALL: [LagMgrTable; 3] = [
        LagMgrTable::Lag,
        LagMgrTable::LagMember,
        LagMgrTable::PortState,
    ];

    /// Maps a database and table name to its variant.
    pub fn from_name(db: DbId, table: &str) -> Option<Self> {
        match (db, table) {
            (DbId::ConfigDb, tables::CFG_LAG_TABLE_NAME) => Some(LagMgrTable::Lag),
            (DbId::ConfigDb, tables::CFG_LAG_MEMBER_TABLE_NAME) => Some(LagMgrTable::LagMember),
            (DbId::StateDb, tables::STATE_PORT_TABLE_NAME) => Some(LagMgrTable::PortState),
            _ => None,
        }
    }

    /// Returns the database the table lives in.
    pub fn db(&self) -> DbId {
        match self {
            LagMgrTable::Lag | LagMgrTable::LagMember => DbId::ConfigDb,
            LagMgrTable::PortState => DbId::StateDb,
        }
    }

    /// Returns the table name.
    pub fn name(&self) -> &'static str {
        match self {
            LagMgrTable::Lag => tables::CFG_LAG_TABLE_NAME,
            LagMgrTable::LagMember => tables::CFG_LAG_MEMBER_TABLE_NAME,
            LagMgrTable::PortState => tables::STATE_PORT_TABLE_NAME,
        }
    }
}

fn admin_status_str(up: bool) -> &'static str {
    if up {
        "up"
    } else {
        "down"
    }
}

/// LAG lifecycle manager.
///
/// Creates and destroys team devices through `teamd`, attaches and detaches
/// members through `teamdctl`, and keeps LAG MTU and admin status in sync
/// in the kernel and APPL_DB.
///
/// A LAG is created on the first SET for its alias; `min_links` and
/// `fallback` are only read then. A member is attached once both the member
/// port and the LAG have STATE_DB rows; until then the membership record
/// stays queued. Ports that appear later (STATE_DB `PORT_TABLE` or a kernel
/// NEWLINK) are attached to the LAG named by their membership row under the
/// same conditions.
///
/// Destroying a LAG detaches its members; their membership rows are queued
/// again so they rejoin if the LAG comes back.
pub struct LagMgr {
    shell: Arc<dyn ShellExecutor>,

    cfg_port_table: Table,
    cfg_lag_table: Table,
    cfg_lag_member_table: Table,
    app_port_table: Table,
    app_lag_table: Table,
    state_lag_table: Table,

    readiness: ReadinessOracle,
    propagator: AttributePropagator,

    lag_consumer: Consumer,
    lag_member_consumer: Consumer,
    port_state_consumer: Consumer,

    /// LAGs with a running teamd instance.
    lag_list: TrackingSet,

    /// Ports attached to a LAG.
    port_list: TrackingSet,

    /// LAG each port in `port_list` is attached to.
    member_lags: HashMap<String, String>,

    /// Hardware address given to every team device.
    hwaddr: String,

    retry_policy: RetryPolicy,
}

impl LagMgr {
    /// Creates a manager over the three databases.
    ///
    /// Deletes every STATE_DB `LAG_TABLE` row, since no team device survives
    /// a restart, and picks the LAG hardware address from
    /// `DEVICE_METADATA|localhost`, falling back to `default_mac`.
    pub async fn new(
        config_db: Arc<dyn TableStore>,
        appl_db: Arc<dyn TableStore>,
        state_db: Arc<dyn TableStore>,
        shell: Arc<dyn ShellExecutor>,
        default_mac: &str,
    ) -> CfgMgrResult<Self> {
        let device_metadata = Table::new(config_db.clone(), tables::CFG_DEVICE_METADATA_TABLE_NAME);
        let hwaddr = resolve_hwaddr(&device_metadata, default_mac).await?;

        let mgr = Self {
            shell,
            cfg_port_table: Table::new(config_db.clone(), tables::CFG_PORT_TABLE_NAME),
            cfg_lag_table: Table::new(config_db.clone(), tables::CFG_LAG_TABLE_NAME),
            cfg_lag_member_table: Table::new(
                config_db.clone(),
                tables::CFG_LAG_MEMBER_TABLE_NAME,
            ),
            app_port_table: Table::new(appl_db.clone(), tables::APP_PORT_TABLE_NAME),
            app_lag_table: Table::new(appl_db.clone(), tables::APP_LAG_TABLE_NAME),
            state_lag_table: Table::new(state_db.clone(), tables::STATE_LAG_TABLE_NAME),
            readiness: ReadinessOracle::new(state_db),
            propagator: AttributePropagator::new(config_db, appl_db),
            lag_consumer: Consumer::new(ConsumerConfig::new(tables::CFG_LAG_TABLE_NAME)),
            lag_member_consumer: Consumer::new(ConsumerConfig::new(
                tables::CFG_LAG_MEMBER_TABLE_NAME,
            )),
            port_state_consumer: Consumer::new(ConsumerConfig::new(tables::STATE_PORT_TABLE_NAME)),
            lag_list: TrackingSet::new("lag_list"),
            port_list: TrackingSet::new("port_list"),
            member_lags: HashMap::new(),
            hwaddr,
            retry_policy: RetryPolicy::default(),
        };

        let purged = mgr.purge_lag_state().await?;
        info!("Removed {} stale LAG state rows, LAG MAC {}", purged, mgr.hwaddr);

        Ok(mgr)
    }

    /// Sets the handling of records whose command failed.
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Returns the LAGs with a running teamd instance.
    pub fn lags(&self) -> &TrackingSet {
        &self.lag_list
    }

    /// Returns the ports attached to a LAG.
    pub fn members(&self) -> &TrackingSet {
        &self.port_list
    }

    /// Returns the LAG `member` is attached to.
    pub fn lag_of(&self, member: &str) -> Option<&str> {
        self.member_lags.get(member).map(String::as_str)
    }

    /// Returns the hardware address used for new LAGs.
    pub fn hwaddr(&self) -> &str {
        &self.hwaddr
    }

    /// Returns the number of queued records across all tables.
    pub fn pending_count(&self) -> usize {
        self.lag_consumer.pending_count()
            + self.lag_member_consumer.pending_count()
            + self.port_state_consumer.pending_count()
    }

    fn consumer(&self, table: LagMgrTable) -> &Consumer {
        match table {
            LagMgrTable::Lag => &self.lag_consumer,
            LagMgrTable::LagMember => &self.lag_member_consumer,
            LagMgrTable::PortState => &self.port_state_consumer,
        }
    }

    fn consumer_mut(&mut self, table: LagMgrTable) -> &mut Consumer {
        match table {
            LagMgrTable::Lag => &mut self.lag_consumer,
            LagMgrTable::LagMember => &mut self.lag_member_consumer,
            LagMgrTable::PortState => &mut self.port_state_consumer,
        }
    }

    fn track_member(&mut self, lag: &str, member: &str) {
        self.port_list.insert(member);
        self.member_lags.insert(member.to_string(), lag.to_string());
    }

    fn untrack_member(&mut self, member: &str) -> bool {
        self.member_lags.remove(member);
        self.port_list.remove(member)
    }

    /// Untracks every member of a destroyed LAG and queues its membership
    /// row again. Returns the number of members released.
    async fn release_members(&mut self, lag: &str) -> CfgMgrResult<usize> {
        let members: Vec<String> = self
            .member_lags
            .iter()
            .filter(|(_, l)| l.as_str() == lag)
            .map(|(m, _)| m.clone())
            .collect();

        let mut requeued = Vec::new();
        for member in &members {
            self.untrack_member(member);
            let key = MembershipKey::new(lag, member.as_str()).to_key();
            if let Some(fvs) = self.cfg_lag_member_table.get(&key).await? {
                requeued.push(KeyOpFieldsValues::set(key, fvs));
            }
        }
        self.lag_member_consumer.add_to_sync(requeued);

        Ok(members.len())
    }

    /// Deletes every STATE_DB `LAG_TABLE` row. Returns the number removed.
    pub async fn purge_lag_state(&self) -> CfgMgrResult<usize> {
        let keys = self.state_lag_table.keys().await?;
        for alias in &keys {
            self.state_lag_table.del(alias).await?;
            debug!("Removed stale LAG state for {}", alias);
        }
        Ok(keys.len())
    }

    /// Starts a teamd instance for `alias`.
    #[instrument(skip(self), fields(lag = %alias))]
    pub async fn add_lag(&self, alias: &str, min_links: u32, fallback: bool) -> CfgMgrResult<()> {
        let config = TeamdConfig::lacp(alias, &self.hwaddr, min_links, fallback);
        self.shell
            .exec_or_throw(&build_teamd_create_cmd(&config)?)
            .await?;

        info!("Created LAG {} (min_links {}, fallback {})", alias, min_links, fallback);
        Ok(())
    }

    /// Stops the teamd instance for `alias` and drops its STATE_DB row.
    #[instrument(skip(self), fields(lag = %alias))]
    pub async fn remove_lag(&self, alias: &str) -> CfgMgrResult<()> {
        self.shell.exec_or_throw(&build_teamd_kill_cmd(alias)).await?;
        self.state_lag_table.del(alias).await?;

        info!("Removed LAG {}", alias);
        Ok(())
    }

    /// Sets LAG admin status in the kernel and publishes it for the LAG and
    /// its members.
    #[instrument(skip(self), fields(lag = %alias, up = %up))]
    pub async fn set_lag_admin_status(&self, alias: &str, up: bool) -> CfgMgrResult<()> {
        let status = admin_status_str(up);
        self.shell
            .exec_or_throw(&build_set_link_admin_cmd(alias, up))
            .await?;

        self.app_lag_table
            .set(alias, &[(fields::ADMIN_STATUS.to_string(), status.to_string())])
            .await?;
        self.propagator
            .propagate(alias, Attribute::AdminStatus, status)
            .await?;

        info!("Set admin status for {} to {}", alias, status);
        Ok(())
    }

    /// Sets LAG MTU in the kernel and publishes it for the LAG and its
    /// members.
    #[instrument(skip(self), fields(lag = %alias, mtu = %mtu))]
    pub async fn set_lag_mtu(&self, alias: &str, mtu: &str) -> CfgMgrResult<()> {
        self.shell
            .exec_or_throw(&build_set_link_mtu_cmd(alias, mtu))
            .await?;

        self.app_lag_table
            .set(alias, &[(fields::MTU.to_string(), mtu.to_string())])
            .await?;
        self.propagator.propagate(alias, Attribute::Mtu, mtu).await?;

        info!("Set MTU for {} to {}", alias, mtu);
        Ok(())
    }

    /// Attaches `member` to `lag`.
    ///
    /// The member is taken down while it joins, then gets its own admin
    /// status back, also when the join fails. APPL_DB receives that status
    /// with the LAG MTU.
    #[instrument(skip(self), fields(lag = %lag, member = %member))]
    pub async fn add_lag_member(&self, lag: &str, member: &str) -> CfgMgrResult<()> {
        let port_cfg = self.cfg_port_table.get(member).await?.unwrap_or_default();
        let up = is_admin_up(
            port_cfg.get_field_or(fields::ADMIN_STATUS, defaults::DEFAULT_ADMIN_STATUS),
        );

        self.shell
            .exec_or_throw(&build_set_link_admin_cmd(member, false))
            .await?;
        if let Err(e) = self
            .shell
            .exec_or_throw(&build_teamdctl_port_add_cmd(lag, member))
            .await
        {
            if let Err(restore) = self
                .shell
                .exec_or_throw(&build_set_link_admin_cmd(member, up))
                .await
            {
                warn!("Failed to restore admin status of {}: {}", member, restore);
            }
            return Err(e);
        }

        let lag_cfg = self.cfg_lag_table.get(lag).await?.unwrap_or_default();
        let mtu = lag_cfg.get_field_or(fields::MTU, defaults::DEFAULT_MTU);

        self.shell
            .exec_or_throw(&build_set_link_admin_cmd(member, up))
            .await?;

        self.app_port_table
            .set(
                member,
                &[
                    (fields::ADMIN_STATUS.to_string(), admin_status_str(up).to_string()),
                    (fields::MTU.to_string(), mtu.to_string()),
                ],
            )
            .await?;

        info!("Added {} to port channel {}", member, lag);
        Ok(())
    }

    /// Detaches `member` from `lag` and restores the member's own admin
    /// status and MTU in the kernel and APPL_DB.
    #[instrument(skip(self), fields(lag = %lag, member = %member))]
    pub async fn remove_lag_member(&self, lag: &str, member: &str) -> CfgMgrResult<()> {
        self.shell
            .exec_or_throw(&build_teamdctl_port_remove_cmd(lag, member))
            .await?;

        let port_cfg = self.cfg_port_table.get(member).await?.unwrap_or_default();
        let up = is_admin_up(
            port_cfg.get_field_or(fields::ADMIN_STATUS, defaults::DEFAULT_ADMIN_STATUS),
        );
        let mtu = port_cfg.get_field_or(fields::MTU, defaults::DEFAULT_MTU);

        self.shell
            .exec_or_throw(&build_set_link_admin_cmd(member, up))
            .await?;
        self.shell
            .exec_or_throw(&build_set_link_mtu_cmd(member, mtu))
            .await?;

        self.app_port_table
            .set(
                member,
                &[
                    (fields::ADMIN_STATUS.to_string(), admin_status_str(up).to_string()),
                    (fields::MTU.to_string(), mtu.to_string()),
                ],
            )
            .await?;

        info!("Removed {} from port channel {}", member, lag);
        Ok(())
    }

    /// Processes a `PORTCHANNEL` record.
    #[instrument(skip(self, entry), fields(lag = %entry.key))]
    pub async fn do_lag_task(&mut self, entry: &KeyOpFieldsValues) -> CfgMgrResult<TaskStatus> {
        let alias = entry.key.as_str();

        match entry.op {
            Operation::Set => {
                let created = if self.lag_list.contains(alias) {
                    false
                } else {
                    let min_links = match entry.get_field(fields::MIN_LINKS) {
                        Some(value) => value.parse::<u32>().map_err(|_| {
                            CfgMgrError::invalid_config(
                                fields::MIN_LINKS,
                                format!("'{}' for {} is not a number", value, alias),
                            )
                        })?,
                        None => 0,
                    };
                    let fallback = entry.get_field(fields::FALLBACK) == Some("true");

                    self.add_lag(alias, min_links, fallback).await?;
                    self.lag_list.insert(alias);
                    true
                };

                match entry.get_field(fields::ADMIN_STATUS) {
                    Some(status) => self.set_lag_admin_status(alias, is_admin_up(status)).await?,
                    None if created => {
                        self.set_lag_admin_status(alias, is_admin_up(defaults::DEFAULT_ADMIN_STATUS))
                            .await?
                    }
                    None => {}
                }

                if let Some(mtu) = entry.get_field(fields::MTU) {
                    self.set_lag_mtu(alias, mtu).await?;
                }

                Ok(TaskStatus::Success)
            }
            Operation::Del => {
                if !self.lag_list.contains(alias) {
                    return Ok(TaskStatus::Ignore);
                }

                self.remove_lag(alias).await?;
                self.lag_list.remove(alias);

                let released = self.release_members(alias).await?;
                if released > 0 {
                    info!("Detached {} members of removed LAG {}", released, alias);
                }
                Ok(TaskStatus::Success)
            }
        }
    }

    /// Processes a `PORTCHANNEL_MEMBER` record.
    #[instrument(skip(self, entry), fields(key = %entry.key))]
    pub async fn do_lag_member_task(
        &mut self,
        entry: &KeyOpFieldsValues,
    ) -> CfgMgrResult<TaskStatus> {
        let membership = match MembershipKey::parse(&entry.key) {
            Ok(membership) => membership,
            Err(e) => {
                warn!("Skipping record: {}", e);
                return Ok(TaskStatus::InvalidEntry);
            }
        };
        let MembershipKey { lag, member } = &membership;

        match entry.op {
            Operation::Set => {
                if let Some(current) = self.lag_of(member) {
                    if current != lag.as_str() {
                        warn!(
                            "{} is already a member of {}, ignoring {}",
                            member, current, membership
                        );
                    }
                    return Ok(TaskStatus::Ignore);
                }

                if !self.readiness.is_port_state_ok(member).await?
                    || !self.readiness.is_lag_state_ok(lag).await?
                {
                    debug!("{} not ready, retrying later", membership);
                    return Ok(TaskStatus::NeedRetry);
                }

                self.add_lag_member(lag, member).await?;
                self.track_member(lag, member);
                Ok(TaskStatus::Success)
            }
            Operation::Del => match self.lag_of(member) {
                Some(current) if current == lag.as_str() => {
                    self.remove_lag_member(lag, member).await?;
                    self.untrack_member(member);
                    Ok(TaskStatus::Success)
                }
                Some(current) => {
                    warn!(
                        "{} is a member of {}, ignoring removal of {}",
                        member, current, membership
                    );
                    Ok(TaskStatus::Ignore)
                }
                None => Ok(TaskStatus::Ignore),
            },
        }
    }

    /// Processes a STATE_DB `PORT_TABLE` record.
    #[instrument(skip(self, entry), fields(port = %entry.key))]
    pub async fn do_port_update_task(
        &mut self,
        entry: &KeyOpFieldsValues,
    ) -> CfgMgrResult<TaskStatus> {
        match entry.op {
            Operation::Set => {
                if self.discover_port(&entry.key).await? {
                    Ok(TaskStatus::Success)
                } else {
                    Ok(TaskStatus::Ignore)
                }
            }
            Operation::Del => Ok(self.forget_port(&entry.key)),
        }
    }

    /// Attaches a newly seen port to its LAG.
    ///
    /// The port is attached only if it is not attached yet, a membership
    /// row names it, its LAG has been created, and both the port and the
    /// LAG have STATE_DB rows. Otherwise the membership record attaches it
    /// later. Returns true if it was attached.
    pub async fn discover_port(&mut self, alias: &str) -> CfgMgrResult<bool> {
        if self.port_list.contains(alias) {
            return Ok(false);
        }

        for membership in self.propagator.memberships().await? {
            if membership.member != alias {
                continue;
            }
            if !self.lag_list.contains(&membership.lag) {
                debug!("{} is not created yet, {} stays detached", membership.lag, alias);
                continue;
            }
            if !self.readiness.is_port_state_ok(alias).await?
                || !self.readiness.is_lag_state_ok(&membership.lag).await?
            {
                debug!("{} not ready, {} stays detached", membership, alias);
                continue;
            }

            self.add_lag_member(&membership.lag, alias).await?;
            self.track_member(&membership.lag, alias);
            return Ok(true);
        }

        Ok(false)
    }

    fn forget_port(&mut self, alias: &str) -> TaskStatus {
        if self.untrack_member(alias) {
            info!("Removed {} from port list", alias);
            TaskStatus::Success
        } else {
            TaskStatus::Ignore
        }
    }

    async fn process_entry(
        &mut self,
        table: LagMgrTable,
        entry: &KeyOpFieldsValues,
    ) -> CfgMgrResult<TaskStatus> {
        match table {
            LagMgrTable::Lag => self.do_lag_task(entry).await,
            LagMgrTable::LagMember => self.do_lag_member_task(entry).await,
            LagMgrTable::PortState => self.do_port_update_task(entry).await,
        }
    }

    /// One pass over a table's queue.
    async fn do_table_task(&mut self, table: LagMgrTable) {
        let entries = self.consumer_mut(table).drain();
        let mut deferred = Vec::new();

        for entry in entries {
            match self.process_entry(table, &entry).await {
                Ok(status) if status.is_retryable() => deferred.push(entry),
                Ok(_) => {}
                Err(e) if self.retry_policy.should_requeue(&e) => {
                    warn!("{}|{} failed, requeued: {}", table.name(), entry.key, e);
                    deferred.push(entry);
                }
                Err(e) => error!("{}|{} failed: {}", table.name(), entry.key, e),
            }
        }

        self.consumer_mut(table).defer(deferred);
    }
}

/// Reads `DEVICE_METADATA|localhost` `mac`, falling back to `default_mac`.
async fn resolve_hwaddr(device_metadata: &Table, default_mac: &str) -> CfgMgrResult<String> {
    let metadata = device_metadata
        .get(tables::DEVICE_METADATA_LOCALHOST)
        .await?
        .unwrap_or_default();

    match metadata.get_field(fields::MAC) {
        Some(mac) if is_valid_mac(mac) => Ok(mac.to_lowercase()),
        Some(mac) => {
            warn!("Ignoring invalid system MAC '{}', using {}", mac, default_mac);
            Ok(default_mac.to_string())
        }
        None => Ok(default_mac.to_string()),
    }
}

#[async_trait]
impl Orch for LagMgr {
    fn name(&self) -> &str {
        "LagMgr"
    }

    async fn do_task(&mut self) {
        for table in LagMgrTable::ALL {
            self.do_table_task(table).await;
        }
    }

    fn has_pending_tasks(&self) -> bool {
        LagMgrTable::ALL
            .iter()
            .any(|t| self.consumer(*t).has_pending())
    }

    fn dump_pending_tasks(&self) -> Vec<String> {
        LagMgrTable::ALL
            .iter()
            .flat_map(|t| self.consumer(*t).dump())
            .collect()
    }
}

impl CfgMgr for LagMgr {
    fn daemon_name(&self) -> &str {
        "teammgrd"
    }

    fn config_table_names(&self) -> &[&str] {
        &[tables::CFG_LAG_TABLE_NAME, tables::CFG_LAG_MEMBER_TABLE_NAME]
    }

    fn state_table_names(&self) -> &[&str] {
        &[tables::STATE_PORT_TABLE_NAME]
    }

    fn add_to_sync(&mut self, db: DbId, table: &str, entries: Vec<KeyOpFieldsValues>) {
        match LagMgrTable::from_name(db, table) {
            Some(t) => self.consumer_mut(t).add_to_sync(entries),
            None => debug!("Ignoring records for {}:{}", db.name(), table),
        }
    }
}

#[async_trait]
impl LinkEventHandler for LagMgr {
    fn handles(&self, ifname: &str) -> bool {
        is_front_panel_alias(ifname)
    }

    #[instrument(skip(self), fields(port = %event.ifname))]
    async fn on_link_event(&mut self, event: &LinkEvent) -> CfgMgrResult<()> {
        match event.event_type {
            LinkEventType::NewLink => {
                self.discover_port(&event.ifname).await?;
            }
            LinkEventType::DelLink => {
                self.forget_port(&event.ifname);
            }
        }
        Ok(())
    }
}
