//! STATE_DB readiness checks.
//!
//! A port or LAG is ready once a row for it exists in the STATE_DB table
//! written by the component that created it. Results are never cached.

use std::sync::Arc;

use tracing::{debug, instrument};

use crate::error::CfgMgrResult;
use crate::store::{Table, TableStore};
use crate::tables::{STATE_LAG_TABLE_NAME, STATE_PORT_TABLE_NAME};

/// Kind of entity whose readiness row is looked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    /// Front-panel port, STATE_DB `PORT_TABLE`.
    Port,
    /// LAG device, STATE_DB `LAG_TABLE`.
    Lag,
}

/// Read-only readiness queries against STATE_DB.
#[derive(Debug, Clone)]
pub struct ReadinessOracle {
    state_port_table: Table,
    state_lag_table: Table,
}

impl ReadinessOracle {
    /// Creates an oracle over the given STATE_DB store.
    pub fn new(state_db: Arc<dyn TableStore>) -> Self {
        Self {
            state_port_table: Table::new(state_db.clone(), STATE_PORT_TABLE_NAME),
            state_lag_table: Table::new(state_db, STATE_LAG_TABLE_NAME),
        }
    }

    /// Returns true if the port has a STATE_DB row.
    pub async fn is_port_state_ok(&self, alias: &str) -> CfgMgrResult<bool> {
        self.is_ready(EntityKind::Port, alias).await
    }

    /// Returns true if the LAG has a STATE_DB row.
    pub async fn is_lag_state_ok(&self, alias: &str) -> CfgMgrResult<bool> {
        self.is_ready(EntityKind::Lag, alias).await
    }

    /// Returns true if the entity has a STATE_DB row.
    #[instrument(skip(self))]
    pub async fn is_ready(&self, kind: EntityKind, alias: &str) -> CfgMgrResult<bool> {
        let table = match kind {
            EntityKind::Port => &self.state_port_table,
            EntityKind::Lag => &self.state_lag_table,
        };

        let ready = table.exists(alias).await?;
        if !ready {
            debug!("{:?} {} is not ready", kind, alias);
        }
        Ok(ready)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::DbId;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_readiness_follows_state_rows() {
        let state = MemoryStore::new(DbId::StateDb);
        let oracle = ReadinessOracle::new(Arc::new(state.clone()));

        assert!(!oracle.is_port_state_ok("Ethernet4").await.unwrap());
        assert!(!oracle.is_lag_state_ok("PortChannel1").await.unwrap());

        state
            .set(STATE_PORT_TABLE_NAME, "Ethernet4", &[("state".to_string(), "ok".to_string())])
            .await
            .unwrap();
        state.set(STATE_LAG_TABLE_NAME, "PortChannel1", &[]).await.unwrap();

        assert!(oracle.is_port_state_ok("Ethernet4").await.unwrap());
        assert!(oracle.is_lag_state_ok("PortChannel1").await.unwrap());
        // Tables are not interchangeable.
        assert!(!oracle.is_ready(EntityKind::Lag, "Ethernet4").await.unwrap());

        state.del(STATE_LAG_TABLE_NAME, "PortChannel1").await.unwrap();
        assert!(!oracle.is_lag_state_ok("PortChannel1").await.unwrap());
    }
}
