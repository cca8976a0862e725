//! PortMgr implementation - the port configuration manager.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info, instrument, warn};

use sonic_cfgmgr_common::commands::{build_set_link_admin_cmd, build_set_link_mtu_cmd};
use sonic_cfgmgr_common::tables::{self, fields, is_lag_alias};
use sonic_cfgmgr_common::{
    is_admin_up, Attribute, AttributePropagator, CfgMgr, CfgMgrResult, DbId, EntityKind,
    FieldValuesExt, LinkEvent, LinkEventHandler, LinkEventType, Orch, ReadinessOracle,
    RetryPolicy, ShellExecutor, Table, TableStore, TrackingSet,
};
use sonic_orch_common::{Consumer, ConsumerConfig, KeyOpFieldsValues, Operation, TaskStatus};

/// CONFIG_DB tables watched by portmgrd.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortMgrTable {
    /// `PORT`
    Port,
    /// `PORTCHANNEL`
    Lag,
}

impl PortMgrTable {
    /// Every watched table, in processing order.
    pub const ALL: [PortMgrTable; 2] = [PortMgrTable::Port, PortMgrTable::Lag];

    /// Maps a CONFIG_DB table name to its variant.
    pub fn from_name(table: &str) -> Option<Self> {
        match table {
            tables::CFG_PORT_TABLE_NAME => Some(PortMgrTable::Port),
            tables::CFG_LAG_TABLE_NAME => Some(PortMgrTable::Lag),
            _ => None,
        }
    }

    /// Returns the CONFIG_DB table name.
    pub fn name(&self) -> &'static str {
        match self {
            PortMgrTable::Port => tables::CFG_PORT_TABLE_NAME,
            PortMgrTable::Lag => tables::CFG_LAG_TABLE_NAME,
        }
    }

    fn entity_kind(&self) -> EntityKind {
        match self {
            PortMgrTable::Port => EntityKind::Port,
            PortMgrTable::Lag => EntityKind::Lag,
        }
    }
}

/// Port configuration manager.
///
/// Applies `mtu` and `admin_status` from CONFIG_DB `PORT` and
/// `PORTCHANNEL` to the kernel once the device is ready in STATE_DB, and
/// publishes MTU to APPL_DB. A LAG MTU is also published for every static
/// member of the LAG.
///
/// LAG devices showing up in the kernel get their configured admin status
/// right away, without waiting for STATE_DB.
pub struct PortMgr {
    shell: Arc<dyn ShellExecutor>,

    /// CONFIG_DB `PORTCHANNEL`, read on kernel events.
    cfg_lag_table: Table,

    /// APPL_DB `PORT_TABLE`.
    app_port_table: Table,

    /// APPL_DB `LAG_TABLE`.
    app_lag_table: Table,

    readiness: ReadinessOracle,
    propagator: AttributePropagator,

    port_consumer: Consumer,
    lag_consumer: Consumer,

    /// Ports and LAGs whose configuration has been applied at least once.
    port_list: TrackingSet,

    retry_policy: RetryPolicy,
}

impl PortMgr {
    /// Creates a manager over the three databases.
    pub fn new(
        config_db: Arc<dyn TableStore>,
        appl_db: Arc<dyn TableStore>,
        state_db: Arc<dyn TableStore>,
        shell: Arc<dyn ShellExecutor>,
    ) -> Self {
        Self {
            shell,
            cfg_lag_table: Table::new(config_db.clone(), tables::CFG_LAG_TABLE_NAME),
            app_port_table: Table::new(appl_db.clone(), tables::APP_PORT_TABLE_NAME),
            app_lag_table: Table::new(appl_db.clone(), tables::APP_LAG_TABLE_NAME),
            readiness: ReadinessOracle::new(state_db),
            propagator: AttributePropagator::new(config_db, appl_db),
            port_consumer: Consumer::new(ConsumerConfig::new(tables::CFG_PORT_TABLE_NAME)),
            lag_consumer: Consumer::new(ConsumerConfig::new(tables::CFG_LAG_TABLE_NAME)),
            port_list: TrackingSet::new("port_list"),
            retry_policy: RetryPolicy::default(),
        }
    }

    /// Sets the handling of records whose command failed.
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Returns the set of configured ports and LAGs.
    pub fn ports(&self) -> &TrackingSet {
        &self.port_list
    }

    /// Returns the number of queued records across both tables.
    pub fn pending_count(&self) -> usize {
        self.port_consumer.pending_count() + self.lag_consumer.pending_count()
    }

    fn consumer_mut(&mut self, table: PortMgrTable) -> &mut Consumer {
        match table {
            PortMgrTable::Port => &mut self.port_consumer,
            PortMgrTable::Lag => &mut self.lag_consumer,
        }
    }

    /// Sets the device MTU and publishes it to APPL_DB.
    ///
    /// For a LAG the MTU is published to `LAG_TABLE` and to the
    /// `PORT_TABLE` row of every static member.
    #[instrument(skip(self), fields(port = %alias, mtu = %mtu))]
    pub async fn set_port_mtu(
        &self,
        table: PortMgrTable,
        alias: &str,
        mtu: &str,
    ) -> CfgMgrResult<()> {
        self.shell
            .exec_or_throw(&build_set_link_mtu_cmd(alias, mtu))
            .await?;

        let fvs = vec![(fields::MTU.to_string(), mtu.to_string())];
        match table {
            PortMgrTable::Port => self.app_port_table.set(alias, &fvs).await?,
            PortMgrTable::Lag => {
                self.app_lag_table.set(alias, &fvs).await?;
                let members = self.propagator.propagate(alias, Attribute::Mtu, mtu).await?;
                debug!("MTU {} published for {} members of {}", mtu, members.len(), alias);
            }
        }

        info!("Set MTU for {} to {}", alias, mtu);
        Ok(())
    }

    /// Sets the device admin status in the kernel.
    #[instrument(skip(self), fields(port = %alias, up = %up))]
    pub async fn set_port_admin_status(&self, alias: &str, up: bool) -> CfgMgrResult<()> {
        self.shell
            .exec_or_throw(&build_set_link_admin_cmd(alias, up))
            .await?;

        info!(
            "Set admin status for {} to {}",
            alias,
            if up { "up" } else { "down" }
        );
        Ok(())
    }

    /// Returns true once the port or LAG has a STATE_DB row.
    pub async fn is_ready(&self, table: PortMgrTable, alias: &str) -> CfgMgrResult<bool> {
        self.readiness.is_ready(table.entity_kind(), alias).await
    }

    /// Processes a SET for a port or LAG.
    ///
    /// Fields are applied in record order. The record is left queued while
    /// the device is not ready.
    #[instrument(skip(self, fvs), fields(port = %alias))]
    pub async fn process_set(
        &mut self,
        table: PortMgrTable,
        alias: &str,
        fvs: &[(String, String)],
    ) -> CfgMgrResult<TaskStatus> {
        if !self.is_ready(table, alias).await? {
            debug!("{} is not ready, retrying later", alias);
            return Ok(TaskStatus::NeedRetry);
        }

        for (field, value) in fvs {
            match field.as_str() {
                fields::MTU => self.set_port_mtu(table, alias, value).await?,
                fields::ADMIN_STATUS => {
                    self.set_port_admin_status(alias, is_admin_up(value)).await?
                }
                _ => {}
            }
        }

        self.port_list.insert(alias);
        Ok(TaskStatus::Success)
    }

    /// Processes a DEL for a port or LAG.
    #[instrument(skip(self), fields(port = %alias))]
    pub async fn process_del(&mut self, alias: &str) -> CfgMgrResult<TaskStatus> {
        if self.port_list.remove(alias) {
            info!("Removed {}", alias);
            Ok(TaskStatus::Success)
        } else {
            Ok(TaskStatus::Ignore)
        }
    }

    async fn process_entry(
        &mut self,
        table: PortMgrTable,
        entry: &KeyOpFieldsValues,
    ) -> CfgMgrResult<TaskStatus> {
        match entry.op {
            Operation::Set => self.process_set(table, &entry.key, &entry.fvs).await,
            Operation::Del => self.process_del(&entry.key).await,
        }
    }

    /// One pass over a table's queue.
    async fn do_table_task(&mut self, table: PortMgrTable) {
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

#[async_trait]
impl Orch for PortMgr {
    fn name(&self) -> &str {
        "PortMgr"
    }

    async fn do_task(&mut self) {
        for table in PortMgrTable::ALL {
            self.do_table_task(table).await;
        }
    }

    fn has_pending_tasks(&self) -> bool {
        self.port_consumer.has_pending() || self.lag_consumer.has_pending()
    }

    fn dump_pending_tasks(&self) -> Vec<String> {
        let mut tasks = self.port_consumer.dump();
        tasks.extend(self.lag_consumer.dump());
        tasks
    }
}

impl CfgMgr for PortMgr {
    fn daemon_name(&self) -> &str {
        "portmgrd"
    }

    fn config_table_names(&self) -> &[&str] {
        &[tables::CFG_PORT_TABLE_NAME, tables::CFG_LAG_TABLE_NAME]
    }

    fn add_to_sync(&mut self, db: DbId, table: &str, entries: Vec<KeyOpFieldsValues>) {
        if db != DbId::ConfigDb {
            debug!("Ignoring {} records for {}:{}", entries.len(), db.name(), table);
            return;
        }

        match PortMgrTable::from_name(table) {
            Some(t) => self.consumer_mut(t).add_to_sync(entries),
            None => debug!("Ignoring records for unwatched table {}", table),
        }
    }
}

#[async_trait]
impl LinkEventHandler for PortMgr {
    fn handles(&self, ifname: &str) -> bool {
        is_lag_alias(ifname)
    }

    #[instrument(skip(self), fields(port = %event.ifname))]
    async fn on_link_event(&mut self, event: &LinkEvent) -> CfgMgrResult<()> {
        let alias = event.ifname.as_str();

        match event.event_type {
            LinkEventType::NewLink => {
                if self.port_list.contains(alias) {
                    return Ok(());
                }

                if let Some(fvs) = self.cfg_lag_table.get(alias).await? {
                    if let Some(status) = fvs.get_field(fields::ADMIN_STATUS) {
                        self.set_port_admin_status(alias, is_admin_up(status)).await?;
                    }
                }

                self.port_list.insert(alias);
                info!("Discovered {}", alias);
            }
            LinkEventType::DelLink => {
                if self.port_list.remove(alias) {
                    info!("{} removed from kernel", alias);
                }
            }
        }

        Ok(())
    }
}
