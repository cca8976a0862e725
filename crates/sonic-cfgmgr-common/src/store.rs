//! Table storage abstraction.
//!
//! Managers read CONFIG_DB and STATE_DB and write APPL_DB and STATE_DB
//! through [`TableStore`]. Production wiring uses
//! [`RedisDatabase`](sonic_orch_common::RedisDatabase); tests use
//! [`MemoryStore`].

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use sonic_orch_common::RedisDatabase;

use crate::error::CfgMgrResult;
use crate::manager::{DbId, FieldValue, FieldValues};

/// Row-level access to one database.
#[async_trait]
pub trait TableStore: Send + Sync {
    /// Returns the database this store is bound to.
    fn db(&self) -> DbId;

    /// Reads a row. `None` when the row does not exist.
    async fn get(&self, table: &str, key: &str) -> CfgMgrResult<Option<FieldValues>>;

    /// Lists the keys of a table.
    async fn keys(&self, table: &str) -> CfgMgrResult<Vec<String>>;

    /// Writes fields into a row, keeping fields not mentioned.
    async fn set(&self, table: &str, key: &str, fvs: &[FieldValue]) -> CfgMgrResult<()>;

    /// Deletes a row.
    async fn del(&self, table: &str, key: &str) -> CfgMgrResult<()>;
}

#[async_trait]
impl TableStore for RedisDatabase {
    fn db(&self) -> DbId {
        RedisDatabase::db(self).into()
    }

    async fn get(&self, table: &str, key: &str) -> CfgMgrResult<Option<FieldValues>> {
        Ok(self.get_entry(table, key).await?)
    }

    async fn keys(&self, table: &str) -> CfgMgrResult<Vec<String>> {
        Ok(self.get_keys(table).await?)
    }

    async fn set(&self, table: &str, key: &str, fvs: &[FieldValue]) -> CfgMgrResult<()> {
        Ok(self.set_entry(table, key, fvs).await?)
    }

    async fn del(&self, table: &str, key: &str) -> CfgMgrResult<()> {
        Ok(self.delete_entry(table, key).await?)
    }
}

type Rows = BTreeMap<String, FieldValues>;

/// In-memory store with the same semantics as the Redis store.
///
/// Cloning yields another handle to the same data.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    db: DbId,
    tables: Arc<Mutex<BTreeMap<String, Rows>>>,
}

impl MemoryStore {
    /// Creates an empty store for `db`.
    pub fn new(db: DbId) -> Self {
        Self {
            db,
            tables: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    /// Returns a snapshot of one row.
    pub fn row(&self, table: &str, key: &str) -> Option<FieldValues> {
        self.tables.lock().get(table).and_then(|rows| rows.get(key)).cloned()
    }

    /// Returns the number of rows in a table.
    pub fn len(&self, table: &str) -> usize {
        self.tables.lock().get(table).map_or(0, |rows| rows.len())
    }

    /// Returns true if the table has no rows.
    pub fn is_empty(&self, table: &str) -> bool {
        self.len(table) == 0
    }
}

#[async_trait]
impl TableStore for MemoryStore {
    fn db(&self) -> DbId {
        self.db
    }

    async fn get(&self, table: &str, key: &str) -> CfgMgrResult<Option<FieldValues>> {
        Ok(self.row(table, key))
    }

    async fn keys(&self, table: &str) -> CfgMgrResult<Vec<String>> {
        Ok(self
            .tables
            .lock()
            .get(table)
            .map(|rows| rows.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn set(&self, table: &str, key: &str, fvs: &[FieldValue]) -> CfgMgrResult<()> {
        let mut tables = self.tables.lock();
        let row = tables
            .entry(table.to_string())
            .or_default()
            .entry(key.to_string())
            .or_default();

        for (field, value) in fvs {
            match row.iter_mut().find(|(f, _)| f == field) {
                Some(existing) => existing.1 = value.clone(),
                None => row.push((field.clone(), value.clone())),
            }
        }
        Ok(())
    }

    async fn del(&self, table: &str, key: &str) -> CfgMgrResult<()> {
        let mut tables = self.tables.lock();
        if let Some(rows) = tables.get_mut(table) {
            rows.remove(key);
        }
        Ok(())
    }
}

/// A store bound to one table name.
#[derive(Clone)]
pub struct Table {
    store: Arc<dyn TableStore>,
    name: String,
}

impl Table {
    /// Binds `store` to table `name`.
    pub fn new(store: Arc<dyn TableStore>, name: impl Into<String>) -> Self {
        Self {
            store,
            name: name.into(),
        }
    }

    /// Returns the table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the database the table lives in.
    pub fn db(&self) -> DbId {
        self.store.db()
    }

    /// Reads a row.
    pub async fn get(&self, key: &str) -> CfgMgrResult<Option<FieldValues>> {
        self.store.get(&self.name, key).await
    }

    /// Returns true if the row exists.
    pub async fn exists(&self, key: &str) -> CfgMgrResult<bool> {
        Ok(self.get(key).await?.is_some())
    }

    /// Lists all keys.
    pub async fn keys(&self) -> CfgMgrResult<Vec<String>> {
        self.store.keys(&self.name).await
    }

    /// Writes fields into a row.
    pub async fn set(&self, key: &str, fvs: &[FieldValue]) -> CfgMgrResult<()> {
        self.store.set(&self.name, key, fvs).await
    }

    /// Deletes a row.
    pub async fn del(&self, key: &str) -> CfgMgrResult<()> {
        self.store.del(&self.name, key).await
    }
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Table({}:{})", self.db().name(), self.name)
    }
}
