//! Netlink listener for kernel link events.
//!
//! Subscribes to `RTNLGRP_LINK` on a `NETLINK_ROUTE` socket and forwards
//! every `RTM_NEWLINK`/`RTM_DELLINK` as a [`LinkEvent`] through a tokio
//! channel. Non-Linux builds get a listener that never yields.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::error::CfgMgrResult;
use crate::link_event::LinkEvent;

#[cfg(target_os = "linux")]
mod linux {
    use netlink_packet_core::{NetlinkMessage, NetlinkPayload};
    use netlink_packet_route::link::{LinkAttribute, LinkMessage};
    use netlink_packet_route::RouteNetlinkMessage;
    use netlink_sys::{protocols::NETLINK_ROUTE, Socket, SocketAddr};
    use tokio::io::unix::AsyncFd;
    use tracing::{debug, instrument, trace};

    use crate::error::{CfgMgrError, CfgMgrResult};
    use crate::link_event::{LinkEvent, LinkEventType};

    /// Netlink group for link notifications (RTNLGRP_LINK = 1)
    const RTNLGRP_LINK: u32 = 1;

    /// Receive buffer size
    const RECV_BUFFER_SIZE: usize = 65536;

    /// Async netlink socket bound to link notifications.
    pub struct LinkEventSocket {
        inner: AsyncFd<Socket>,
        buffer: Vec<u8>,
    }

    impl LinkEventSocket {
        /// Creates and binds the socket.
        #[instrument]
        pub fn new() -> CfgMgrResult<Self> {
            let mut socket = Socket::new(NETLINK_ROUTE)
                .map_err(|e| CfgMgrError::netlink("socket", e.to_string()))?;

            let groups = 1 << (RTNLGRP_LINK - 1);
            let addr = SocketAddr::new(0, groups);
            socket
                .bind(&addr)
                .map_err(|e| CfgMgrError::netlink("bind", e.to_string()))?;
            socket
                .set_non_blocking(true)
                .map_err(|e| CfgMgrError::netlink("set_non_blocking", e.to_string()))?;

            let inner =
                AsyncFd::new(socket).map_err(|e| CfgMgrError::netlink("async_fd", e.to_string()))?;

            debug!("Netlink socket bound to RTNLGRP_LINK");

            Ok(Self {
                inner,
                buffer: Vec::with_capacity(RECV_BUFFER_SIZE),
            })
        }

        /// Waits for the next datagram and decodes the link events in it.
        pub async fn recv_events(&mut self) -> CfgMgrResult<Vec<LinkEvent>> {
            loop {
                let mut guard = self
                    .inner
                    .readable()
                    .await
                    .map_err(|e| CfgMgrError::netlink("readable", e.to_string()))?;

                self.buffer.clear();
                let buffer = &mut self.buffer;
                match guard.try_io(|socket| socket.get_ref().recv(buffer, 0)) {
                    Ok(Ok(len)) => return parse_link_messages(&self.buffer[..len]),
                    Ok(Err(e)) => return Err(CfgMgrError::netlink("recv", e.to_string())),
                    Err(_would_block) => continue,
                }
            }
        }
    }

    /// Decodes every link message in a netlink datagram.
    pub fn parse_link_messages(buffer: &[u8]) -> CfgMgrResult<Vec<LinkEvent>> {
        let mut events = Vec::new();
        let mut offset = 0;

        while offset < buffer.len() {
            let msg = NetlinkMessage::<RouteNetlinkMessage>::deserialize(&buffer[offset..])
                .map_err(|e| CfgMgrError::netlink("parse", e.to_string()))?;

            let length = msg.header.length as usize;
            if length == 0 {
                break;
            }
            offset += length;
            // Align to 4 bytes (netlink alignment requirement)
            offset = (offset + 3) & !3;

            let (event_type, link) = match msg.payload {
                NetlinkPayload::InnerMessage(RouteNetlinkMessage::NewLink(link)) => {
                    (LinkEventType::NewLink, link)
                }
                NetlinkPayload::InnerMessage(RouteNetlinkMessage::DelLink(link)) => {
                    (LinkEventType::DelLink, link)
                }
                _ => continue,
            };

            match link_name(&link) {
                Some(ifname) => events.push(LinkEvent { event_type, ifname }),
                None => trace!("Link message without IFLA_IFNAME"),
            }
        }

        Ok(events)
    }

    fn link_name(link: &LinkMessage) -> Option<String> {
        link.attributes.iter().find_map(|attr| match attr {
            LinkAttribute::IfName(name) => Some(name.clone()),
            _ => None,
        })
    }

}

#[cfg(target_os = "linux")]
pub use linux::*;

/// Placeholder listener for non-Linux platforms (development only)
#[cfg(not(target_os = "linux"))]
mod mock {
    use crate::error::CfgMgrResult;
    use crate::link_event::LinkEvent;

    pub struct LinkEventSocket;

    impl LinkEventSocket {
        pub fn new() -> CfgMgrResult<Self> {
            Ok(Self)
        }

        pub async fn recv_events(&mut self) -> CfgMgrResult<Vec<LinkEvent>> {
            std::future::pending().await
        }
    }
}

#[cfg(not(target_os = "linux"))]
pub use mock::*;

/// Opens the link-event socket and forwards events to `tx` from a spawned
/// task. The task ends when the receiver is dropped or the socket fails.
pub fn spawn_link_listener(tx: mpsc::Sender<LinkEvent>) -> CfgMgrResult<JoinHandle<()>> {
    let mut socket = LinkEventSocket::new()?;
    info!("Listening for kernel link events");

    Ok(tokio::spawn(async move {
        loop {
            let events = match socket.recv_events().await {
                Ok(events) => events,
                Err(e) => {
                    error!("Link event listener stopped: {}", e);
                    return;
                }
            };

            for event in events {
                if tx.send(event).await.is_err() {
                    debug!("Link event receiver dropped");
                    return;
                }
            }
        }
    }))
}
