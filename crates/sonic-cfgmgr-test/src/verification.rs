//! Verification helpers for testing configuration managers
//!
//! Assertion helpers over the in-memory databases and the dry-run shell.

use sonic_cfgmgr_common::{DryRunShell, FieldValuesExt, MemoryStore, TableStore};
use thiserror::Error;

/// Verification error types
#[derive(Error, Debug, PartialEq, Eq)]
pub enum VerificationError {
    #[error("Expected key '{table}:{key}' not found in {db}")]
    KeyNotFound {
        db: &'static str,
        table: String,
        key: String,
    },

    #[error("Unexpected key '{table}:{key}' present in {db}")]
    KeyPresent {
        db: &'static str,
        table: String,
        key: String,
    },

    #[error("Expected field '{field}' not found in key '{key}'")]
    FieldNotFound { key: String, field: String },

    #[error("Value mismatch for {key}:{field}: expected '{expected}', got '{actual}'")]
    ValueMismatch {
        key: String,
        field: String,
        expected: String,
        actual: String,
    },

    #[error("Expected {expected} commands matching '{pattern}', found {actual}: {commands:?}")]
    CommandCountMismatch {
        pattern: String,
        expected: usize,
        actual: usize,
        commands: Vec<String>,
    },
}

/// Result type for verification operations
pub type VerifyResult<T> = Result<T, VerificationError>;

/// Row verifier for one in-memory database
pub struct StoreVerifier<'a> {
    store: &'a MemoryStore,
}

impl<'a> StoreVerifier<'a> {
    /// Create a new verifier
    pub fn new(store: &'a MemoryStore) -> Self {
        Self { store }
    }

    fn db_name(&self) -> &'static str {
        self.store.db().name()
    }

    /// Verify that a row exists
    pub fn assert_key_exists(&self, table: &str, key: &str) -> VerifyResult<()> {
        if self.store.row(table, key).is_none() {
            return Err(VerificationError::KeyNotFound {
                db: self.db_name(),
                table: table.to_string(),
                key: key.to_string(),
            });
        }
        Ok(())
    }

    /// Verify that a row does not exist
    pub fn assert_key_not_exists(&self, table: &str, key: &str) -> VerifyResult<()> {
        if self.store.row(table, key).is_some() {
            return Err(VerificationError::KeyPresent {
                db: self.db_name(),
                table: table.to_string(),
                key: key.to_string(),
            });
        }
        Ok(())
    }

    /// Verify that a field has a specific value
    pub fn assert_field_value(
        &self,
        table: &str,
        key: &str,
        field: &str,
        expected: &str,
    ) -> VerifyResult<()> {
        let row = self
            .store
            .row(table, key)
            .ok_or_else(|| VerificationError::KeyNotFound {
                db: self.db_name(),
                table: table.to_string(),
                key: key.to_string(),
            })?;

        match row.get_field(field) {
            None => Err(VerificationError::FieldNotFound {
                key: format!("{}:{}", table, key),
                field: field.to_string(),
            }),
            Some(actual) if actual == expected => Ok(()),
            Some(actual) => Err(VerificationError::ValueMismatch {
                key: format!("{}:{}", table, key),
                field: field.to_string(),
                expected: expected.to_string(),
                actual: actual.to_string(),
            }),
        }
    }

    /// Verify that every listed field matches
    pub fn assert_fields(
        &self,
        table: &str,
        key: &str,
        expected: &[(&str, &str)],
    ) -> VerifyResult<()> {
        for (field, value) in expected {
            self.assert_field_value(table, key, field, value)?;
        }
        Ok(())
    }
}

/// Command verifier over a dry-run shell
pub struct CommandVerifier<'a> {
    shell: &'a DryRunShell,
}

impl<'a> CommandVerifier<'a> {
    /// Create a new command verifier
    pub fn new(shell: &'a DryRunShell) -> Self {
        Self { shell }
    }

    /// Verify that exactly `expected` commands contain `pattern`
    pub fn assert_count(&self, pattern: &str, expected: usize) -> VerifyResult<()> {
        let commands = self.shell.commands_matching(pattern);
        if commands.len() != expected {
            return Err(VerificationError::CommandCountMismatch {
                pattern: pattern.to_string(),
                expected,
                actual: commands.len(),
                commands,
            });
        }
        Ok(())
    }

    /// Verify that exactly one command contains `pattern`
    pub fn assert_executed_once(&self, pattern: &str) -> VerifyResult<()> {
        self.assert_count(pattern, 1)
    }

    /// Verify that no command contains `pattern`
    pub fn assert_not_executed(&self, pattern: &str) -> VerifyResult<()> {
        self.assert_count(pattern, 0)
    }

    /// Verify that the commands containing `pattern` ran in this order
    pub fn assert_sequence(&self, patterns: &[&str]) -> VerifyResult<()> {
        let commands = self.shell.commands();
        let mut position = 0;

        for pattern in patterns {
            match commands[position..].iter().position(|c| c.contains(pattern)) {
                Some(offset) => position += offset + 1,
                None => {
                    return Err(VerificationError::CommandCountMismatch {
                        pattern: pattern.to_string(),
                        expected: 1,
                        actual: 0,
                        commands,
                    })
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sonic_cfgmgr_common::{DbId, ShellExecutor};

    #[tokio::test]
    async fn test_command_verifier() {
        let shell = DryRunShell::new();
        shell.exec_or_throw("/sbin/ip link set dev \"Ethernet0\" down").await.unwrap();
        shell
            .exec_or_throw("/usr/bin/teamdctl \"PortChannel1\" port add \"Ethernet0\"")
            .await
            .unwrap();

        let verifier = CommandVerifier::new(&shell);

        assert!(verifier.assert_executed_once("port add").is_ok());
        assert!(verifier.assert_not_executed("port remove").is_ok());
        assert!(verifier.assert_count("Ethernet0", 2).is_ok());
        assert!(verifier.assert_sequence(&["down", "port add"]).is_ok());

        assert!(verifier.assert_sequence(&["port add", "down"]).is_err());
        assert!(verifier.assert_executed_once("Ethernet0").is_err());
    }

    #[tokio::test]
    async fn test_store_verifier() {
        let store = MemoryStore::new(DbId::ApplDb);
        store
            .set("PORT_TABLE", "Ethernet0", &[("mtu".to_string(), "9100".to_string())])
            .await
            .unwrap();

        let verifier = StoreVerifier::new(&store);

        assert!(verifier.assert_key_exists("PORT_TABLE", "Ethernet0").is_ok());
        assert!(verifier.assert_key_not_exists("PORT_TABLE", "Ethernet4").is_ok());
        assert!(verifier.assert_fields("PORT_TABLE", "Ethernet0", &[("mtu", "9100")]).is_ok());

        assert_eq!(
            verifier.assert_field_value("PORT_TABLE", "Ethernet0", "mtu", "1500"),
            Err(VerificationError::ValueMismatch {
                key: "PORT_TABLE:Ethernet0".to_string(),
                field: "mtu".to_string(),
                expected: "1500".to_string(),
                actual: "9100".to_string(),
            })
        );
        assert!(matches!(
            verifier.assert_key_exists("LAG_TABLE", "PortChannel1"),
            Err(VerificationError::KeyNotFound { db: "APPL_DB", .. })
        ));
    }
}
