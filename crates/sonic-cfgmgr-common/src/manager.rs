//! Configuration manager trait and common abstractions.
//!
//! This module provides the base trait for all cfgmgr daemon managers,
//! extending the `Orch` trait from `sonic-orch-common` with cfgmgr-specific
//! functionality, plus the field-value helpers shared by every manager.

use serde::{Deserialize, Serialize};
use sonic_orch_common::{KeyOpFieldsValues, Orch, RedisDb};

use crate::error::CfgMgrError;

/// Database identifiers used by cfgmgr daemons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DbId {
    /// Configuration database (CONFIG_DB) - source of configuration.
    ConfigDb,
    /// Application database (APPL_DB) - destination for processed config.
    ApplDb,
    /// State database (STATE_DB) - operational state tracking.
    StateDb,
}

impl DbId {
    /// Returns the database name as used in Redis/SONiC.
    pub fn name(&self) -> &'static str {
        match self {
            DbId::ConfigDb => "CONFIG_DB",
            DbId::ApplDb => "APPL_DB",
            DbId::StateDb => "STATE_DB",
        }
    }

    /// Returns the database ID number.
    pub fn id(&self) -> i32 {
        match self {
            DbId::ConfigDb => 4,
            DbId::ApplDb => 0,
            DbId::StateDb => 6,
        }
    }

    /// Returns the separator between table name and key.
    pub fn separator(&self) -> char {
        match self {
            DbId::ApplDb => ':',
            DbId::ConfigDb | DbId::StateDb => '|',
        }
    }
}

impl From<DbId> for RedisDb {
    fn from(db: DbId) -> Self {
        match db {
            DbId::ConfigDb => RedisDb::ConfigDb,
            DbId::ApplDb => RedisDb::ApplDb,
            DbId::StateDb => RedisDb::StateDb,
        }
    }
}

impl From<RedisDb> for DbId {
    fn from(db: RedisDb) -> Self {
        match db {
            RedisDb::ConfigDb => DbId::ConfigDb,
            RedisDb::ApplDb => DbId::ApplDb,
            RedisDb::StateDb => DbId::StateDb,
        }
    }
}

/// Default values for port and LAG configuration.
pub mod defaults {
    /// Admin status restored on a LAG member and applied to a new LAG.
    pub const DEFAULT_ADMIN_STATUS: &str = "up";

    /// Default MTU for ports and LAGs.
    pub const DEFAULT_MTU: &str = "9100";

    /// Default select timeout in milliseconds.
    pub const SELECT_TIMEOUT_MS: u64 = 1000;

    /// Default capacity of the change and link-event channels.
    pub const CHANNEL_CAPACITY: usize = 1024;

    /// Hardware address used for LAGs when DEVICE_METADATA has none.
    pub const DEFAULT_LAG_MAC: &str = "d8:9e:f3:d6:90:e0";
}

/// What happens to a record whose external command failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RetryPolicy {
    /// Log the failure and drop the record.
    #[default]
    AtMostOnce,
    /// Keep the record queued for the next pass when the error is transient.
    RequeueOnFailure,
}

impl RetryPolicy {
    /// Returns true if a record that failed with `err` should stay queued.
    pub fn should_requeue(&self, err: &CfgMgrError) -> bool {
        matches!(self, RetryPolicy::RequeueOnFailure) && err.is_retryable()
    }
}

/// Base trait for configuration manager daemons.
///
/// This trait extends `Orch` with what the daemon runner needs to wire a
/// manager up: the tables it watches and a way to hand it change records.
///
/// # Example
///
/// ```ignore
/// use sonic_cfgmgr_common::{CfgMgr, DbId};
/// use sonic_orch_common::{KeyOpFieldsValues, Orch};
///
/// impl CfgMgr for MyMgr {
///     fn daemon_name(&self) -> &str { "mymgrd" }
///
///     fn config_table_names(&self) -> &[&str] { &["PORT"] }
///
///     fn add_to_sync(&mut self, db: DbId, table: &str, entries: Vec<KeyOpFieldsValues>) {
///         // route to the matching consumer
///     }
/// }
/// ```
pub trait CfgMgr: Orch {
    /// Returns the daemon name (e.g., "portmgrd", "teammgrd").
    fn daemon_name(&self) -> &str;

    /// Returns the subscribed CONFIG_DB table names.
    fn config_table_names(&self) -> &[&str];

    /// Returns the subscribed STATE_DB table names.
    fn state_table_names(&self) -> &[&str] {
        &[]
    }

    /// Queues change records observed on a watched table.
    ///
    /// Records for tables the manager does not watch are ignored.
    fn add_to_sync(&mut self, db: DbId, table: &str, entries: Vec<KeyOpFieldsValues>);
}

/// Returns true if an `admin_status` value means "up".
pub fn is_admin_up(status: &str) -> bool {
    status == "up"
}

/// Key-value tuple representing a field and its value.
pub type FieldValue = (String, String);

/// Collection of field-value pairs for a table entry.
pub type FieldValues = Vec<FieldValue>;

/// Helper trait for working with field-value collections.
pub trait FieldValuesExt {
    /// Gets the value for a field, if present.
    fn get_field(&self, field: &str) -> Option<&str>;

    /// Gets the value for a field, returning the default if not present.
    fn get_field_or<'a>(&'a self, field: &str, default: &'a str) -> &'a str;

    /// Checks if a field exists.
    fn has_field(&self, field: &str) -> bool;
}

impl FieldValuesExt for FieldValues {
    fn get_field(&self, field: &str) -> Option<&str> {
        self.iter()
            .find(|(f, _)| f == field)
            .map(|(_, v)| v.as_str())
    }

    fn get_field_or<'a>(&'a self, field: &str, default: &'a str) -> &'a str {
        self.get_field(field).unwrap_or(default)
    }

    fn has_field(&self, field: &str) -> bool {
        self.iter().any(|(f, _)| f == field)
    }
}

/// Builds a FieldValues collection from key-value pairs.
#[macro_export]
macro_rules! field_values {
    ($($field:expr => $value:expr),* $(,)?) => {
        vec![
            $(($field.to_string(), $value.to_string()),)*
        ]
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_id() {
        assert_eq!(DbId::ConfigDb.name(), "CONFIG_DB");
        assert_eq!(DbId::ConfigDb.id(), 4);
        assert_eq!(DbId::ApplDb.name(), "APPL_DB");
        assert_eq!(DbId::ApplDb.id(), 0);
        assert_eq!(DbId::StateDb.name(), "STATE_DB");
        assert_eq!(DbId::StateDb.id(), 6);
    }

    #[test]
    fn test_db_id_separator() {
        assert_eq!(DbId::ConfigDb.separator(), '|');
        assert_eq!(DbId::StateDb.separator(), '|');
        assert_eq!(DbId::ApplDb.separator(), ':');
        assert_eq!(RedisDb::from(DbId::StateDb), RedisDb::StateDb);
    }

    #[test]
    fn test_retry_policy() {
        let failed = CfgMgrError::ShellCommandFailed {
            command: "/usr/bin/teamdctl \"PortChannel1\" port add \"Ethernet4\"".to_string(),
            exit_code: 1,
            output: "No such device".to_string(),
        };

        assert!(!RetryPolicy::AtMostOnce.should_requeue(&failed));
        assert!(RetryPolicy::RequeueOnFailure.should_requeue(&failed));
        assert!(!RetryPolicy::RequeueOnFailure.should_requeue(&CfgMgrError::internal("bug")));
        assert_eq!(RetryPolicy::default(), RetryPolicy::AtMostOnce);
    }

    #[test]
    fn test_is_admin_up() {
        assert!(is_admin_up("up"));
        assert!(!is_admin_up("down"));
        assert!(!is_admin_up(""));
    }

    #[test]
    fn test_field_values_ext() {
        let fvs: FieldValues = vec![
            ("mtu".to_string(), "9100".to_string()),
            ("admin_status".to_string(), "up".to_string()),
        ];

        assert_eq!(fvs.get_field("mtu"), Some("9100"));
        assert_eq!(fvs.get_field("admin_status"), Some("up"));
        assert_eq!(fvs.get_field("nonexistent"), None);

        assert_eq!(fvs.get_field_or("mtu", "1500"), "9100");
        assert_eq!(fvs.get_field_or("nonexistent", "default"), "default");

        assert!(fvs.has_field("mtu"));
        assert!(!fvs.has_field("nonexistent"));
    }

    #[test]
    fn test_field_values_macro() {
        let fvs = field_values! {
            "mtu" => "9100",
            "admin_status" => "up",
        };

        assert_eq!(fvs.len(), 2);
        assert_eq!(fvs.get_field("mtu"), Some("9100"));
    }
}
