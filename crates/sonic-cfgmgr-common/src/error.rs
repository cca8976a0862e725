//! Error type shared by the cfgmgr crates.

use std::io;

use sonic_orch_common::RedisBackendError;
use thiserror::Error;

/// Result alias used across the cfgmgr crates.
pub type CfgMgrResult<T> = Result<T, CfgMgrError>;

#[derive(Debug, Error)]
pub enum CfgMgrError {
    /// `/bin/sh` could not be spawned.
    #[error("Failed to execute shell command '{command}': {source}")]
    ShellExec {
        command: String,
        #[source]
        source: io::Error,
    },

    /// A command ran and exited non-zero.
    #[error("Shell command failed: '{command}' (exit code {exit_code}): {output}")]
    ShellCommandFailed {
        command: String,
        exit_code: i32,
        /// stderr, or stdout when stderr was empty.
        output: String,
    },

    /// Redis read, write or subscription failure.
    #[error("Database operation failed: {operation}: {message}")]
    Database { operation: String, message: String },

    /// A configuration value (file, CLI or table field) was rejected.
    #[error("Invalid configuration for {field}: {message}")]
    InvalidConfig { field: String, message: String },

    /// Composite key could not be split into its components.
    #[error("Malformed key '{key}' in {table}")]
    MalformedKey { table: String, key: String },

    #[error("Netlink operation failed: {operation}: {message}")]
    Netlink { operation: String, message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl CfgMgrError {
    pub fn database(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Database {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn invalid_config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn malformed_key(table: impl Into<String>, key: impl Into<String>) -> Self {
        Self::MalformedKey {
            table: table.into(),
            key: key.into(),
        }
    }

    pub fn netlink(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Netlink {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// True for failures that may clear up on their own: database errors
    /// and commands that exited non-zero.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CfgMgrError::Database { .. } | CfgMgrError::ShellCommandFailed { .. }
        )
    }
}

impl From<RedisBackendError> for CfgMgrError {
    fn from(err: RedisBackendError) -> Self {
        let operation = match &err {
            RedisBackendError::ConnectionError(_) => "connect",
            RedisBackendError::CommandError(_) => "command",
            RedisBackendError::InvalidData(_) => "decode",
        };
        Self::database(operation, err.to_string())
    }
}
