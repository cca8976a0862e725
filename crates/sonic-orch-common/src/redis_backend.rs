//! Redis database backend for SONiC orchestration.
//!
//! This module provides Redis connection management and table access for the
//! configuration managers. Tables live in CONFIG_DB, APPL_DB and STATE_DB as
//! hashes keyed `TABLE<sep>key`, where the separator is `|` for CONFIG_DB and
//! STATE_DB and `:` for APPL_DB.
//!
//! Live changes are picked up through Redis keyspace notifications
//! (`__keyspace@<db>__:<TABLE><sep>*`) and forwarded as [`TableChange`]
//! records over a tokio channel.

use crate::{FieldValue, KeyOpFieldsValues};
use futures::StreamExt;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::BTreeMap;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Field written for rows that carry no attributes.
const NULL_FIELD: &str = "NULL";

/// Errors from Redis operations.
#[derive(Error, Debug)]
pub enum RedisBackendError {
    #[error("Redis connection error: {0}")]
    ConnectionError(String),

    #[error("Redis command error: {0}")]
    CommandError(String),

    #[error("Invalid data format: {0}")]
    InvalidData(String),
}

/// Result type for Redis backend operations.
pub type Result<T> = std::result::Result<T, RedisBackendError>;

/// Redis database selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RedisDb {
    /// APPL_DB (database 0) - application state published to orchagent
    ApplDb = 0,
    /// CONFIG_DB (database 4) - switch configuration
    ConfigDb = 4,
    /// STATE_DB (database 6) - operational state
    StateDb = 6,
}

impl RedisDb {
    /// Returns the Redis database index.
    pub fn id(self) -> u8 {
        self as u8
    }

    /// Returns the SONiC database name.
    pub fn name(self) -> &'static str {
        match self {
            RedisDb::ApplDb => "APPL_DB",
            RedisDb::ConfigDb => "CONFIG_DB",
            RedisDb::StateDb => "STATE_DB",
        }
    }

    /// Returns the separator between table name and key.
    pub fn separator(self) -> char {
        match self {
            RedisDb::ApplDb => ':',
            RedisDb::ConfigDb | RedisDb::StateDb => '|',
        }
    }

    /// Builds the Redis key for a table row.
    pub fn row_key(self, table: &str, key: &str) -> String {
        format!("{}{}{}", table, self.separator(), key)
    }
}

impl std::fmt::Display for RedisDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Configuration for Redis connection.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis server hostname or IP
    pub host: String,
    /// Redis server port
    pub port: u16,
    /// Database selector
    pub db: RedisDb,
}

impl RedisConfig {
    /// Creates a new Redis configuration.
    pub fn new(host: impl Into<String>, port: u16, db: RedisDb) -> Self {
        Self {
            host: host.into(),
            port,
            db,
        }
    }

    /// Creates CONFIG_DB connection config.
    pub fn config_db(host: impl Into<String>, port: u16) -> Self {
        Self::new(host, port, RedisDb::ConfigDb)
    }

    /// Creates APPL_DB connection config.
    pub fn appl_db(host: impl Into<String>, port: u16) -> Self {
        Self::new(host, port, RedisDb::ApplDb)
    }

    /// Creates STATE_DB connection config.
    pub fn state_db(host: impl Into<String>, port: u16) -> Self {
        Self::new(host, port, RedisDb::StateDb)
    }

    /// Returns the Redis connection URI.
    fn uri(&self) -> String {
        format!("redis://{}:{}/{}", self.host, self.port, self.db.id())
    }
}

/// A change to one row of a watched table.
#[derive(Debug, Clone)]
pub struct TableChange {
    /// Database the table lives in
    pub db: RedisDb,
    /// Table name without separator
    pub table: String,
    /// The change record (key relative to the table)
    pub entry: KeyOpFieldsValues,
}

/// Redis database connection.
///
/// Cloning is cheap; clones share the underlying multiplexed connection.
#[derive(Clone)]
pub struct RedisDatabase {
    config: RedisConfig,
    client: redis::Client,
    connection: ConnectionManager,
}

impl RedisDatabase {
    /// Creates a new Redis database connection.
    pub async fn new(config: RedisConfig) -> Result<Self> {
        let uri = config.uri();

        let client = redis::Client::open(uri.clone())
            .map_err(|e| RedisBackendError::ConnectionError(format!("{}: {}", uri, e)))?;

        let connection = client.get_connection_manager().await.map_err(|e| {
            RedisBackendError::ConnectionError(format!("Failed to create connection: {}", e))
        })?;

        info!(
            "Connected to Redis: {}:{} ({})",
            config.host, config.port, config.db
        );

        Ok(Self {
            config,
            client,
            connection,
        })
    }

    /// Returns the database configuration.
    pub fn config(&self) -> &RedisConfig {
        &self.config
    }

    /// Returns the database selector.
    pub fn db(&self) -> RedisDb {
        self.config.db
    }

    /// Reads one row. Returns `None` when the row does not exist.
    pub async fn get_entry(&self, table: &str, key: &str) -> Result<Option<Vec<FieldValue>>> {
        let redis_key = self.db().row_key(table, key);
        let mut conn = self.connection.clone();

        let fvs: BTreeMap<String, String> = conn
            .hgetall(&redis_key)
            .await
            .map_err(|e| RedisBackendError::CommandError(format!("HGETALL {}: {}", redis_key, e)))?;

        if fvs.is_empty() {
            return Ok(None);
        }

        Ok(Some(
            fvs.into_iter()
                .filter(|(field, _)| field != NULL_FIELD)
                .collect(),
        ))
    }

    /// Lists the keys of a table, relative to the table name.
    pub async fn get_keys(&self, table: &str) -> Result<Vec<String>> {
        let prefix = self.db().row_key(table, "");
        let pattern = format!("{}*", prefix);
        let mut conn = self.connection.clone();

        let keys: Vec<String> = conn
            .keys(&pattern)
            .await
            .map_err(|e| RedisBackendError::CommandError(format!("KEYS {}: {}", pattern, e)))?;

        let mut keys: Vec<String> = keys
            .into_iter()
            .filter_map(|k| k.strip_prefix(&prefix).map(str::to_string))
            .collect();
        keys.sort();
        Ok(keys)
    }

    /// Writes fields into a row, merging with existing fields.
    pub async fn set_entry(&self, table: &str, key: &str, fvs: &[FieldValue]) -> Result<()> {
        let redis_key = self.db().row_key(table, key);
        let mut conn = self.connection.clone();

        let null_row = [(NULL_FIELD.to_string(), NULL_FIELD.to_string())];
        let items: &[FieldValue] = if fvs.is_empty() { &null_row } else { fvs };

        let _: () = conn
            .hset_multiple(&redis_key, items)
            .await
            .map_err(|e| RedisBackendError::CommandError(format!("HSET {}: {}", redis_key, e)))?;

        Ok(())
    }

    /// Deletes a row.
    pub async fn delete_entry(&self, table: &str, key: &str) -> Result<()> {
        let redis_key = self.db().row_key(table, key);
        let mut conn = self.connection.clone();

        let _: () = conn
            .del(&redis_key)
            .await
            .map_err(|e| RedisBackendError::CommandError(format!("DEL {}: {}", redis_key, e)))?;

        Ok(())
    }

    /// Subscribes to keyspace notifications for the given tables.
    ///
    /// Every change is forwarded to `tx` as a [`TableChange`]. The spawned
    /// task ends when the receiver is dropped or the subscription breaks.
    pub async fn subscribe_tables(
        &self,
        tables: &[&str],
        tx: mpsc::Sender<TableChange>,
    ) -> Result<JoinHandle<()>> {
        let mut pubsub = self.client.get_async_pubsub().await.map_err(|e| {
            RedisBackendError::ConnectionError(format!("Failed to open pubsub: {}", e))
        })?;

        let db = self.db();
        let mut watched = Vec::with_capacity(tables.len());
        for table in tables {
            let pattern = format!("{}{}*", keyspace_prefix(db), db.row_key(table, ""));
            pubsub.psubscribe(&pattern).await.map_err(|e| {
                RedisBackendError::CommandError(format!("PSUBSCRIBE {}: {}", pattern, e))
            })?;
            debug!("Subscribed to {}", pattern);
            watched.push(table.to_string());
        }

        let reader = self.clone();
        let handle = tokio::spawn(async move {
            let mut messages = pubsub.into_on_message();

            while let Some(msg) = messages.next().await {
                let channel = msg.get_channel_name().to_string();
                let event: String = match msg.get_payload() {
                    Ok(event) => event,
                    Err(e) => {
                        warn!("Bad keyspace payload on {}: {}", channel, e);
                        continue;
                    }
                };

                let Some((table, key)) = parse_keyspace_channel(db, &channel) else {
                    warn!("Unexpected keyspace channel: {}", channel);
                    continue;
                };
                if !watched.iter().any(|t| t == table) {
                    continue;
                }

                let entry = match reader.change_for_event(table, key, &event).await {
                    Ok(entry) => entry,
                    Err(e) => {
                        warn!("Failed to read {}{}{}: {}", table, db.separator(), key, e);
                        continue;
                    }
                };

                let change = TableChange {
                    db,
                    table: table.to_string(),
                    entry,
                };
                if tx.send(change).await.is_err() {
                    debug!("Change receiver dropped, stopping {} subscriber", db);
                    break;
                }
            }

            info!("Keyspace subscriber for {} stopped", db);
        });

        Ok(handle)
    }

    async fn change_for_event(&self, table: &str, key: &str, event: &str) -> Result<KeyOpFieldsValues> {
        if is_removal_event(event) {
            return Ok(KeyOpFieldsValues::del(key));
        }

        Ok(match self.get_entry(table, key).await? {
            Some(fvs) => KeyOpFieldsValues::set(key, fvs),
            None => KeyOpFieldsValues::del(key),
        })
    }
}

fn keyspace_prefix(db: RedisDb) -> String {
    format!("__keyspace@{}__:", db.id())
}

/// Splits a keyspace channel name into `(table, key)`.
fn parse_keyspace_channel(db: RedisDb, channel: &str) -> Option<(&str, &str)> {
    let prefix = keyspace_prefix(db);
    let row = channel.strip_prefix(prefix.as_str())?;
    let (table, key) = row.split_once(db.separator())?;
    if table.is_empty() || key.is_empty() {
        return None;
    }
    Some((table, key))
}

fn is_removal_event(event: &str) -> bool {
    matches!(event, "del" | "expired" | "evicted")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redis_config() {
        let config = RedisConfig::config_db("127.0.0.1", 6379);
        assert_eq!(config.db, RedisDb::ConfigDb);
        assert_eq!(config.uri(), "redis://127.0.0.1:6379/4");
        assert_eq!(RedisConfig::appl_db("127.0.0.1", 6379).uri(), "redis://127.0.0.1:6379/0");
    }

    #[test]
    fn test_row_key_separator() {
        assert_eq!(RedisDb::ConfigDb.row_key("PORTCHANNEL", "PortChannel1"), "PORTCHANNEL|PortChannel1");
        assert_eq!(RedisDb::StateDb.row_key("LAG_TABLE", "PortChannel1"), "LAG_TABLE|PortChannel1");
        assert_eq!(RedisDb::ApplDb.row_key("PORT_TABLE", "Ethernet0"), "PORT_TABLE:Ethernet0");
    }

    #[test]
    fn test_parse_keyspace_channel_member_key() {
        let parsed = parse_keyspace_channel(
            RedisDb::ConfigDb,
            "__keyspace@4__:PORTCHANNEL_MEMBER|PortChannel1|Ethernet4",
        );
        assert_eq!(parsed, Some(("PORTCHANNEL_MEMBER", "PortChannel1|Ethernet4")));
    }

    #[test]
    fn test_parse_keyspace_channel_rejects_other_db() {
        assert_eq!(
            parse_keyspace_channel(RedisDb::StateDb, "__keyspace@4__:PORT|Ethernet0"),
            None
        );
        assert_eq!(
            parse_keyspace_channel(RedisDb::StateDb, "__keyspace@6__:PORT_TABLE"),
            None
        );
    }

    #[test]
    fn test_removal_events() {
        assert!(is_removal_event("del"));
        assert!(is_removal_event("expired"));
        assert!(!is_removal_event("hset"));
        assert!(!is_removal_event("hdel"));
    }
}
