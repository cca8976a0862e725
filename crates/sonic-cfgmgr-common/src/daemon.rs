//! Event loop shared by the cfgmgr daemons.
//!
//! One task multiplexes table-change notifications, kernel link events and
//! a fixed retry timer. Every source ends in a call into the manager, so
//! the manager state is only ever touched from this task.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use sonic_orch_common::{KeyOpFieldsValues, RedisConfig, RedisDatabase, RedisDb, TableChange};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::DaemonConfig;
use crate::error::{CfgMgrError, CfgMgrResult};
use crate::link_event::{LinkEvent, LinkEventBridge, LinkEventHandler};
use crate::manager::{CfgMgr, DbId};
use crate::netlink::spawn_link_listener;
use crate::store::TableStore;

/// Redis connections for the three databases a manager touches.
#[derive(Clone)]
pub struct RedisStores {
    /// CONFIG_DB
    pub config_db: RedisDatabase,
    /// APPL_DB
    pub appl_db: RedisDatabase,
    /// STATE_DB
    pub state_db: RedisDatabase,
}

impl RedisStores {
    /// Connects to CONFIG_DB, APPL_DB and STATE_DB.
    pub async fn connect(config: &DaemonConfig) -> CfgMgrResult<Self> {
        let host = config.database.redis_host.as_str();
        let port = config.database.redis_port;

        Ok(Self {
            config_db: RedisDatabase::new(RedisConfig::config_db(host, port)).await?,
            appl_db: RedisDatabase::new(RedisConfig::appl_db(host, port)).await?,
            state_db: RedisDatabase::new(RedisConfig::state_db(host, port)).await?,
        })
    }

    /// Returns the stores as trait objects: (config, appl, state).
    pub fn as_table_stores(
        &self,
    ) -> (Arc<dyn TableStore>, Arc<dyn TableStore>, Arc<dyn TableStore>) {
        (
            Arc::new(self.config_db.clone()),
            Arc::new(self.appl_db.clone()),
            Arc::new(self.state_db.clone()),
        )
    }

    /// Subscribes to keyspace notifications for every table `mgr` watches.
    pub async fn subscribe<M: CfgMgr>(
        &self,
        mgr: &M,
        tx: mpsc::Sender<TableChange>,
    ) -> CfgMgrResult<Vec<JoinHandle<()>>> {
        let mut handles = Vec::new();

        let config_tables = mgr.config_table_names();
        if !config_tables.is_empty() {
            handles.push(self.config_db.subscribe_tables(config_tables, tx.clone()).await?);
        }

        let state_tables = mgr.state_table_names();
        if !state_tables.is_empty() {
            handles.push(self.state_db.subscribe_tables(state_tables, tx).await?);
        }

        Ok(handles)
    }
}

/// Drives one manager.
pub struct CfgMgrDaemon<M> {
    mgr: M,
    select_timeout: Duration,
    bridge: LinkEventBridge,
}

impl<M> CfgMgrDaemon<M>
where
    M: CfgMgr + LinkEventHandler,
{
    /// Wraps `mgr`; deferred records are retried every `select_timeout`.
    pub fn new(mgr: M, select_timeout: Duration) -> Self {
        Self {
            mgr,
            select_timeout,
            bridge: LinkEventBridge::new(),
        }
    }

    /// Returns the manager.
    pub fn manager(&self) -> &M {
        &self.mgr
    }

    /// Returns the manager mutably.
    pub fn manager_mut(&mut self) -> &mut M {
        &mut self.mgr
    }

    /// Consumes the daemon, returning the manager.
    pub fn into_manager(self) -> M {
        self.mgr
    }

    /// Queues every existing row of the watched tables as a SET record.
    pub async fn load_initial(
        &mut self,
        config_db: &dyn TableStore,
        state_db: &dyn TableStore,
    ) -> CfgMgrResult<()> {
        let config_tables: Vec<String> =
            self.mgr.config_table_names().iter().map(|t| t.to_string()).collect();
        let state_tables: Vec<String> =
            self.mgr.state_table_names().iter().map(|t| t.to_string()).collect();

        for (db, store, tables) in [
            (DbId::ConfigDb, config_db, config_tables),
            (DbId::StateDb, state_db, state_tables),
        ] {
            for table in tables {
                let entries = read_table(store, &table).await?;
                debug!("Initial load of {}:{}: {} rows", db.name(), table, entries.len());
                self.mgr.add_to_sync(db, &table, entries);
            }
        }

        Ok(())
    }

    /// Queues a batch of changes and runs one reconciliation pass.
    pub async fn handle_changes(&mut self, changes: Vec<TableChange>) {
        for change in changes {
            self.mgr
                .add_to_sync(DbId::from(change.db), &change.table, vec![change.entry]);
        }
        self.mgr.do_task().await;
    }

    /// Routes a kernel link event to the manager.
    pub async fn handle_link_event(&mut self, event: LinkEvent) {
        let mut handlers: [&mut dyn LinkEventHandler; 1] = [&mut self.mgr];
        self.bridge.dispatch(&event, &mut handlers).await;
    }

    /// Timer tick: retry deferred records.
    pub async fn on_timeout(&mut self) {
        self.mgr.do_task().await;

        if self.mgr.has_pending_tasks() {
            for task in self.mgr.dump_pending_tasks() {
                debug!("{} pending: {}", self.mgr.name(), task);
            }
        }
    }

    /// Runs until `shutdown` resolves.
    ///
    /// Pass `None` for `links` to run without kernel events. Fails if the
    /// table-change channel closes, since no further config would arrive.
    pub async fn run<F>(
        mut self,
        mut changes: mpsc::Receiver<TableChange>,
        mut links: Option<mpsc::Receiver<LinkEvent>>,
        shutdown: F,
    ) -> CfgMgrResult<M>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let mut ticker = tokio::time::interval(self.select_timeout);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "{} event loop started ({}ms timeout)",
            self.mgr.daemon_name(),
            self.select_timeout.as_millis()
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("{} shutting down", self.mgr.daemon_name());
                    return Ok(self.mgr);
                }
                change = changes.recv() => match change {
                    Some(change) => {
                        let mut batch = vec![change];
                        while let Ok(more) = changes.try_recv() {
                            batch.push(more);
                        }
                        self.handle_changes(batch).await;
                    }
                    None => {
                        error!("Table change channel closed");
                        return Err(CfgMgrError::internal("table change channel closed"));
                    }
                },
                event = recv_link_event(&mut links) => match event {
                    Some(event) => self.handle_link_event(event).await,
                    None => {
                        warn!("Link event channel closed, continuing without kernel events");
                        links = None;
                    }
                },
                _ = ticker.tick() => self.on_timeout().await,
            }
        }
    }
}

/// Wires `mgr` to Redis and the kernel and runs it until SIGINT/SIGTERM.
///
/// Keyspace subscriptions are set up before the initial table load so no
/// change falls between the two.
pub async fn serve<M>(
    mgr: M,
    stores: &RedisStores,
    config: &DaemonConfig,
    with_netlink: bool,
) -> CfgMgrResult<M>
where
    M: CfgMgr + LinkEventHandler,
{
    let capacity = config.daemon.channel_capacity;

    let (change_tx, change_rx) = mpsc::channel(capacity);
    let _subscriptions = stores.subscribe(&mgr, change_tx).await?;

    let links = if with_netlink {
        let (link_tx, link_rx) = mpsc::channel(capacity);
        spawn_link_listener(link_tx)?;
        Some(link_rx)
    } else {
        info!("Kernel link events disabled");
        None
    };

    let (config_db, _, state_db) = stores.as_table_stores();
    let mut daemon = CfgMgrDaemon::new(mgr, config.select_timeout());
    daemon.load_initial(config_db.as_ref(), state_db.as_ref()).await?;
    daemon.manager_mut().do_task().await;

    daemon.run(change_rx, links, shutdown_signal()).await
}

async fn recv_link_event(links: &mut Option<mpsc::Receiver<LinkEvent>>) -> Option<LinkEvent> {
    match links {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Reads a whole table as SET records.
pub async fn read_table(store: &dyn TableStore, table: &str) -> CfgMgrResult<Vec<KeyOpFieldsValues>> {
    let mut entries = Vec::new();
    for key in store.keys(table).await? {
        if let Some(fvs) = store.get(table, &key).await? {
            entries.push(KeyOpFieldsValues::set(key, fvs));
        }
    }
    Ok(entries)
}

/// Builds a [`TableChange`] for tests and replay tools.
pub fn table_change(db: DbId, table: &str, entry: KeyOpFieldsValues) -> TableChange {
    TableChange {
        db: RedisDb::from(db),
        table: table.to_string(),
        entry,
    }
}

/// Resolves on SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("Received SIGINT"),
                    _ = term.recv() => info!("Received SIGTERM"),
                }
            }
            Err(e) => {
                warn!("Cannot install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received Ctrl-C");
    }
}
