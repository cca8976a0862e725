//! Kernel link event routing.
//!
//! The netlink listener turns `RTM_NEWLINK`/`RTM_DELLINK` messages into
//! [`LinkEvent`]s; [`LinkEventBridge`] filters them by alias naming
//! convention and hands them to every [`LinkEventHandler`] that wants them.

use async_trait::async_trait;
use tracing::{error, trace};

use crate::error::CfgMgrResult;
use crate::tables::{is_front_panel_alias, is_lag_alias};

/// Kind of kernel link notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEventType {
    /// RTM_NEWLINK: device created or changed.
    NewLink,
    /// RTM_DELLINK: device removed.
    DelLink,
}

/// A decoded kernel link notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkEvent {
    /// Notification kind.
    pub event_type: LinkEventType,
    /// Kernel interface name.
    pub ifname: String,
}

impl LinkEvent {
    /// Creates a NEWLINK event.
    pub fn new_link(ifname: impl Into<String>) -> Self {
        Self {
            event_type: LinkEventType::NewLink,
            ifname: ifname.into(),
        }
    }

    /// Creates a DELLINK event.
    pub fn del_link(ifname: impl Into<String>) -> Self {
        Self {
            event_type: LinkEventType::DelLink,
            ifname: ifname.into(),
        }
    }
}

/// A manager that reacts to kernel link events.
#[async_trait]
pub trait LinkEventHandler: Send {
    /// Returns true if the handler wants events for `ifname`.
    fn handles(&self, ifname: &str) -> bool;

    /// Applies one event. Implementations must tolerate duplicates.
    async fn on_link_event(&mut self, event: &LinkEvent) -> CfgMgrResult<()>;
}

/// Routes link events to handlers.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinkEventBridge;

impl LinkEventBridge {
    /// Creates a bridge.
    pub fn new() -> Self {
        Self
    }

    /// Returns true for aliases the managers care about at all.
    pub fn accepts(&self, ifname: &str) -> bool {
        is_lag_alias(ifname) || is_front_panel_alias(ifname)
    }

    /// Delivers `event` to every handler that claims it.
    ///
    /// Handler errors are logged and do not stop delivery. Returns the
    /// number of handlers the event reached.
    pub async fn dispatch(
        &self,
        event: &LinkEvent,
        handlers: &mut [&mut dyn LinkEventHandler],
    ) -> usize {
        if !self.accepts(&event.ifname) {
            trace!("Ignoring link event for {}", event.ifname);
            return 0;
        }

        let mut delivered = 0;
        for handler in handlers.iter_mut() {
            if !handler.handles(&event.ifname) {
                continue;
            }
            delivered += 1;
            if let Err(e) = handler.on_link_event(event).await {
                error!("Failed to handle {:?} for {}: {}", event.event_type, event.ifname, e);
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CfgMgrError;

    #[derive(Default)]
    struct Recorder {
        prefix: &'static str,
        seen: Vec<LinkEvent>,
        fail: bool,
    }

    #[async_trait]
    impl LinkEventHandler for Recorder {
        fn handles(&self, ifname: &str) -> bool {
            ifname.starts_with(self.prefix)
        }

        async fn on_link_event(&mut self, event: &LinkEvent) -> CfgMgrResult<()> {
            self.seen.push(event.clone());
            if self.fail {
                return Err(CfgMgrError::internal("boom"));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_dispatch_routes_by_prefix() {
        let bridge = LinkEventBridge::new();
        let mut lags = Recorder { prefix: "PortChannel", ..Default::default() };
        let mut ports = Recorder { prefix: "Ethernet", ..Default::default() };

        {
            let mut handlers: [&mut dyn LinkEventHandler; 2] = [&mut lags, &mut ports];
            assert_eq!(bridge.dispatch(&LinkEvent::new_link("PortChannel1"), &mut handlers).await, 1);
            assert_eq!(bridge.dispatch(&LinkEvent::del_link("Ethernet4"), &mut handlers).await, 1);
            assert_eq!(bridge.dispatch(&LinkEvent::new_link("docker0"), &mut handlers).await, 0);
        }

        assert_eq!(lags.seen, vec![LinkEvent::new_link("PortChannel1")]);
        assert_eq!(ports.seen, vec![LinkEvent::del_link("Ethernet4")]);
    }

    #[tokio::test]
    async fn test_dispatch_survives_handler_error() {
        let bridge = LinkEventBridge::new();
        let mut failing = Recorder { prefix: "PortChannel", fail: true, ..Default::default() };
        let mut healthy = Recorder { prefix: "PortChannel", ..Default::default() };

        {
            let mut handlers: [&mut dyn LinkEventHandler; 2] = [&mut failing, &mut healthy];
            let delivered = bridge
                .dispatch(&LinkEvent::new_link("PortChannel1"), &mut handlers)
                .await;
            assert_eq!(delivered, 2);
        }

        assert_eq!(healthy.seen.len(), 1);
    }
}
