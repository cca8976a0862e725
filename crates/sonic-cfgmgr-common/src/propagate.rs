//! LAG to member attribute fan-out.

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::error::CfgMgrResult;
use crate::store::{Table, TableStore};
use crate::tables::{fields, MembershipKey, APP_PORT_TABLE_NAME, CFG_LAG_MEMBER_TABLE_NAME};

/// Attribute mirrored from a LAG onto its members.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attribute {
    /// `mtu`
    Mtu,
    /// `admin_status`
    AdminStatus,
}

impl Attribute {
    /// Returns the table field name.
    pub fn field(&self) -> &'static str {
        match self {
            Attribute::Mtu => fields::MTU,
            Attribute::AdminStatus => fields::ADMIN_STATUS,
        }
    }
}

/// Republishes LAG attributes to the APPL_DB rows of its static members.
///
/// Membership comes from CONFIG_DB `PORTCHANNEL_MEMBER`; whether a member
/// is attached yet does not matter. No readiness gating is done here.
#[derive(Debug, Clone)]
pub struct AttributePropagator {
    cfg_lag_member_table: Table,
    app_port_table: Table,
}

impl AttributePropagator {
    /// Creates a propagator reading `config_db` and writing `appl_db`.
    pub fn new(config_db: Arc<dyn TableStore>, appl_db: Arc<dyn TableStore>) -> Self {
        Self {
            cfg_lag_member_table: Table::new(config_db, CFG_LAG_MEMBER_TABLE_NAME),
            app_port_table: Table::new(appl_db, APP_PORT_TABLE_NAME),
        }
    }

    /// Returns every well-formed membership row. Malformed keys are logged
    /// and skipped.
    pub async fn memberships(&self) -> CfgMgrResult<Vec<MembershipKey>> {
        let mut memberships = Vec::new();
        for key in self.cfg_lag_member_table.keys().await? {
            match MembershipKey::parse(&key) {
                Ok(membership) => memberships.push(membership),
                Err(e) => warn!("Skipping membership row: {}", e),
            }
        }
        Ok(memberships)
    }

    /// Returns the static members of `lag`.
    pub async fn members_of(&self, lag: &str) -> CfgMgrResult<Vec<String>> {
        Ok(self
            .memberships()
            .await?
            .into_iter()
            .filter(|m| m.lag == lag)
            .map(|m| m.member)
            .collect())
    }

    /// Publishes `{attribute: value}` for every static member of `lag`.
    ///
    /// Returns the members that were written.
    #[instrument(skip(self), fields(lag = %lag))]
    pub async fn propagate(
        &self,
        lag: &str,
        attribute: Attribute,
        value: &str,
    ) -> CfgMgrResult<Vec<String>> {
        let members = self.members_of(lag).await?;
        let fvs = vec![(attribute.field().to_string(), value.to_string())];

        for member in &members {
            self.app_port_table.set(member, &fvs).await?;
            debug!("Propagated {}={} to {}", attribute.field(), value, member);
        }

        Ok(members)
    }
}
