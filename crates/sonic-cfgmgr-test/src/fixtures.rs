//! Test fixtures for common cfgmgr patterns
//!
//! Provides reusable CONFIG_DB and STATE_DB changes for port and LAG tests,
//! and a [`TestBed`] holding in-memory databases plus a dry-run shell.

use std::sync::Arc;

use sonic_cfgmgr_common::daemon::table_change;
use sonic_cfgmgr_common::{
    CfgMgrResult, DbId, DryRunShell, MemoryStore, ShellExecutor, TableStore,
};
use sonic_orch_common::{KeyOpFieldsValues, Operation, TableChange};

/// Represents a CONFIG_DB or STATE_DB change event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigChange {
    /// Database the row lives in
    pub db: DbId,
    /// Table name (e.g., "PORT", "PORTCHANNEL")
    pub table: String,
    /// Key within the table
    pub key: String,
    /// Operation type
    pub op: Operation,
    /// Field-value pairs in record order (for SET operations)
    pub fields: Vec<(String, String)>,
}

impl ConfigChange {
    /// Create a CONFIG_DB SET operation
    pub fn set(table: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            db: DbId::ConfigDb,
            table: table.into(),
            key: key.into(),
            op: Operation::Set,
            fields: Vec::new(),
        }
    }

    /// Create a CONFIG_DB DEL operation
    pub fn del(table: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            op: Operation::Del,
            ..Self::set(table, key)
        }
    }

    /// Moves the change to another database
    pub fn in_db(mut self, db: DbId) -> Self {
        self.db = db;
        self
    }

    /// Add a field to a SET operation
    pub fn with_field(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((field.into(), value.into()));
        self
    }

    /// Returns the record a consumer would see
    pub fn to_entry(&self) -> KeyOpFieldsValues {
        KeyOpFieldsValues::new(self.key.clone(), self.op, self.fields.clone())
    }

    /// Returns the notification the daemon loop would receive
    pub fn to_table_change(&self) -> TableChange {
        table_change(self.db, &self.table, self.to_entry())
    }

    /// Writes or deletes the row in `store`
    pub async fn write_to(&self, store: &dyn TableStore) -> CfgMgrResult<()> {
        match self.op {
            Operation::Set => store.set(&self.table, &self.key, &self.fields).await,
            Operation::Del => store.del(&self.table, &self.key).await,
        }
    }
}

/// PORT and STATE_DB PORT_TABLE fixtures
pub mod port_fixtures {
    use super::*;

    /// Port with explicit MTU and admin status
    pub fn port(alias: &str, mtu: &str, admin_status: &str) -> ConfigChange {
        ConfigChange::set("PORT", alias)
            .with_field("mtu", mtu)
            .with_field("admin_status", admin_status)
    }

    /// Port with custom MTU
    pub fn port_mtu(alias: &str, mtu: &str) -> ConfigChange {
        ConfigChange::set("PORT", alias).with_field("mtu", mtu)
    }

    /// Port admin status only
    pub fn port_admin(alias: &str, admin_status: &str) -> ConfigChange {
        ConfigChange::set("PORT", alias).with_field("admin_status", admin_status)
    }

    /// Delete port
    pub fn delete_port(alias: &str) -> ConfigChange {
        ConfigChange::del("PORT", alias)
    }

    /// Port became ready
    pub fn port_state_ok(alias: &str) -> ConfigChange {
        ConfigChange::set("PORT_TABLE", alias)
            .in_db(DbId::StateDb)
            .with_field("state", "ok")
    }

    /// Port went away
    pub fn port_state_del(alias: &str) -> ConfigChange {
        ConfigChange::del("PORT_TABLE", alias).in_db(DbId::StateDb)
    }
}

/// PORTCHANNEL, PORTCHANNEL_MEMBER and STATE_DB LAG_TABLE fixtures
pub mod lag_fixtures {
    use super::*;

    /// LAG with no attributes
    pub fn lag(alias: &str) -> ConfigChange {
        ConfigChange::set("PORTCHANNEL", alias)
    }

    /// LAG with `min_links`
    pub fn lag_min_links(alias: &str, min_links: u32) -> ConfigChange {
        lag(alias).with_field("min_links", min_links.to_string())
    }

    /// LAG with MTU and admin status
    pub fn lag_with(alias: &str, mtu: &str, admin_status: &str) -> ConfigChange {
        lag(alias)
            .with_field("admin_status", admin_status)
            .with_field("mtu", mtu)
    }

    /// Delete LAG
    pub fn delete_lag(alias: &str) -> ConfigChange {
        ConfigChange::del("PORTCHANNEL", alias)
    }

    /// Static membership row
    pub fn lag_member(lag: &str, member: &str) -> ConfigChange {
        ConfigChange::set("PORTCHANNEL_MEMBER", format!("{}|{}", lag, member))
    }

    /// Delete membership row
    pub fn delete_lag_member(lag: &str, member: &str) -> ConfigChange {
        ConfigChange::del("PORTCHANNEL_MEMBER", format!("{}|{}", lag, member))
    }

    /// LAG became ready
    pub fn lag_state_ok(alias: &str) -> ConfigChange {
        ConfigChange::set("LAG_TABLE", alias)
            .in_db(DbId::StateDb)
            .with_field("state", "ok")
    }
}

/// In-memory databases and a dry-run shell for driving one manager
#[derive(Debug, Clone)]
pub struct TestBed {
    /// CONFIG_DB
    pub config_db: MemoryStore,
    /// APPL_DB
    pub appl_db: MemoryStore,
    /// STATE_DB
    pub state_db: MemoryStore,
    /// Command recorder
    pub shell: DryRunShell,
}

impl TestBed {
    /// Creates empty databases
    pub fn new() -> Self {
        Self {
            config_db: MemoryStore::new(DbId::ConfigDb),
            appl_db: MemoryStore::new(DbId::ApplDb),
            state_db: MemoryStore::new(DbId::StateDb),
            shell: DryRunShell::new(),
        }
    }

    /// Store handles for a manager constructor: (config, appl, state)
    pub fn stores(&self) -> (Arc<dyn TableStore>, Arc<dyn TableStore>, Arc<dyn TableStore>) {
        (
            Arc::new(self.config_db.clone()),
            Arc::new(self.appl_db.clone()),
            Arc::new(self.state_db.clone()),
        )
    }

    /// Shell handle for a manager constructor
    pub fn shell(&self) -> Arc<dyn ShellExecutor> {
        Arc::new(self.shell.clone())
    }

    /// Returns the store for `db`
    pub fn store(&self, db: DbId) -> &MemoryStore {
        match db {
            DbId::ConfigDb => &self.config_db,
            DbId::ApplDb => &self.appl_db,
            DbId::StateDb => &self.state_db,
        }
    }

    /// Writes the change to its database and returns the notification
    pub async fn apply(&self, change: &ConfigChange) -> CfgMgrResult<TableChange> {
        change.write_to(self.store(change.db)).await?;
        Ok(change.to_table_change())
    }

    /// Writes every change, returning the notifications in order
    pub async fn apply_all(&self, changes: &[ConfigChange]) -> CfgMgrResult<Vec<TableChange>> {
        let mut notifications = Vec::with_capacity(changes.len());
        for change in changes {
            notifications.push(self.apply(change).await?);
        }
        Ok(notifications)
    }
}

impl Default for TestBed {
    fn default() -> Self {
        Self::new()
    }
}
