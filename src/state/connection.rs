//! Transport connection state.
//!
//! The peer-to-peer channel itself is external; this module models what the
//! session needs from it: an ordered, reliable, message-oriented link with
//! `open`/`data`/`close`/`error` events, a `send` that fails unless open,
//! and a release that happens exactly once.
//!
//! A [`Link`] is split into the [`Connection`] (send half, owned by the
//! session) and [`Events`] (receive half, polled by the runtime loop).
//! [`MemoryNetwork`] is an in-process transport for tests and loopback play.

use crate::state::protocol::{self, Message, ProtocolError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Default deadline for a join attempt to report open.
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Something the transport reports about a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Open,
    Data(String),
    Close,
    Error(String),
}

/// Connection status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Dialed, not yet reported open
    Connecting,

    /// Messages may be sent
    Open,

    /// Released or lost; nothing more is delivered
    Closed,
}

impl ConnectionStatus {
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

/// Send half of a link.
#[derive(Debug)]
pub struct Connection {
    /// Remote address
    pub peer: String,

    status: ConnectionStatus,

    outbound: mpsc::UnboundedSender<TransportEvent>,

    /// When the transport reported open
    pub opened_at: Option<DateTime<Utc>>,

    /// Messages sent so far
    pub sent: u64,
}

impl Connection {
    pub fn new(peer: impl Into<String>, outbound: mpsc::UnboundedSender<TransportEvent>) -> Self {
        Self {
            peer: peer.into(),
            status: ConnectionStatus::Connecting,
            outbound,
            opened_at: None,
            sent: 0,
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }

    /// Record that the transport reported open.
    pub fn mark_open(&mut self) {
        if self.status == ConnectionStatus::Connecting {
            self.status = ConnectionStatus::Open;
            self.opened_at = Some(Utc::now());
        }
    }

    /// Track status changes carried by an inbound event.
    pub fn observe(&mut self, event: &TransportEvent) {
        match event {
            TransportEvent::Open => self.mark_open(),
            TransportEvent::Close | TransportEvent::Error(_) => {
                self.status = ConnectionStatus::Closed;
            }
            TransportEvent::Data(_) => {}
        }
    }

    /// Encode and send one message.
    pub fn send(&mut self, message: &Message) -> Result<(), SendError> {
        if !self.is_open() {
            return Err(SendError::NotOpen);
        }

        let text = protocol::encode(message)?;
        if self.outbound.send(TransportEvent::Data(text)).is_err() {
            self.status = ConnectionStatus::Closed;
            return Err(SendError::ChannelGone);
        }

        self.sent += 1;
        debug!(peer = %self.peer, kind = message.kind(), seq = self.sent, "sent message");
        Ok(())
    }

    /// Release the connection. Returns true only for the call that closed it.
    pub fn close(&mut self) -> bool {
        if self.status.is_closed() {
            return false;
        }

        // Peer may already be gone; nothing to report either way.
        let _ = self.outbound.send(TransportEvent::Close);
        self.status = ConnectionStatus::Closed;
        info!(peer = %self.peer, sent = self.sent, "connection closed");
        true
    }
}

/// Receive half of a link.
#[derive(Debug)]
pub struct Events {
    inbound: mpsc::UnboundedReceiver<TransportEvent>,
}

impl Events {
    pub fn new(inbound: mpsc::UnboundedReceiver<TransportEvent>) -> Self {
        Self { inbound }
    }

    /// Next event; `None` once the peer side has been dropped.
    pub async fn next(&mut self) -> Option<TransportEvent> {
        self.inbound.recv().await
    }

    /// Next event if one is already queued.
    pub fn try_next(&mut self) -> Option<TransportEvent> {
        self.inbound.try_recv().ok()
    }
}

/// Both halves of one connection.
#[derive(Debug)]
pub struct Link {
    pub connection: Connection,
    pub events: Events,
}

/// Wire two links together. Neither side is open yet.
fn cross_link(a_peer: &str, b_peer: &str) -> (Link, Link) {
    let (to_a, a_inbound) = mpsc::unbounded_channel();
    let (to_b, b_inbound) = mpsc::unbounded_channel();

    let a = Link {
        connection: Connection::new(a_peer, to_b),
        events: Events::new(a_inbound),
    };
    let b = Link {
        connection: Connection::new(b_peer, to_a),
        events: Events::new(b_inbound),
    };
    (a, b)
}

/// Two links already open to each other. `a` talks to `b_address` and vice versa.
pub fn linked_pair(a_address: &str, b_address: &str) -> (Link, Link) {
    let (mut a, mut b) = cross_link(b_address, a_address);
    a.connection.mark_open();
    b.connection.mark_open();
    (a, b)
}

/// Point-to-point transport capability.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Address a guest uses to reach us.
    fn local_address(&self) -> &str;

    /// Dial a host. The returned link is not open until the transport says so.
    async fn connect(&self, remote: &str) -> Result<Link, ConnectError>;

    /// Wait for the next guest to dial us. The returned link is open.
    async fn accept(&self) -> Result<Link, ConnectError>;
}

/// Connect to `remote` and wait up to `timeout` for it to open.
///
/// On timeout or early close the half-built connection is released before
/// returning the error.
pub async fn join<T: Transport + ?Sized>(
    transport: &T,
    remote: &str,
    timeout: Duration,
) -> Result<Link, ConnectError> {
    let mut link = transport.connect(remote).await?;

    match tokio::time::timeout(timeout, wait_for_open(&mut link)).await {
        Ok(Ok(())) => {
            info!(peer = %remote, "joined host");
            Ok(link)
        }
        Ok(Err(err)) => {
            warn!(peer = %remote, error = %err, "join failed");
            link.connection.close();
            Err(err)
        }
        Err(_) => {
            warn!(peer = %remote, ?timeout, "join timed out");
            link.connection.close();
            Err(ConnectError::Timeout(timeout))
        }
    }
}

async fn wait_for_open(link: &mut Link) -> Result<(), ConnectError> {
    loop {
        match link.events.next().await {
            Some(TransportEvent::Open) => {
                link.connection.mark_open();
                return Ok(());
            }
            Some(TransportEvent::Data(_)) => debug!("dropping data received before open"),
            Some(TransportEvent::Error(detail)) => return Err(ConnectError::Failed(detail)),
            Some(TransportEvent::Close) | None => return Err(ConnectError::Closed),
        }
    }
}

type Registry = Arc<Mutex<HashMap<String, mpsc::UnboundedSender<Link>>>>;

/// In-process address registry.
#[derive(Debug, Clone, Default)]
pub struct MemoryNetwork {
    registry: Registry,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an endpoint at `address`, replacing any previous one.
    pub fn endpoint(&self, address: impl Into<String>) -> MemoryEndpoint {
        let address = address.into();
        let (tx, rx) = mpsc::unbounded_channel();
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(address.clone(), tx);

        MemoryEndpoint {
            address,
            registry: Arc::clone(&self.registry),
            incoming: tokio::sync::Mutex::new(rx),
        }
    }

    /// Number of registered endpoints.
    pub fn endpoint_count(&self) -> usize {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// One addressable participant on a [`MemoryNetwork`].
#[derive(Debug)]
pub struct MemoryEndpoint {
    address: String,
    registry: Registry,
    incoming: tokio::sync::Mutex<mpsc::UnboundedReceiver<Link>>,
}

#[async_trait]
impl Transport for MemoryEndpoint {
    fn local_address(&self) -> &str {
        &self.address
    }

    async fn connect(&self, remote: &str) -> Result<Link, ConnectError> {
        let host = self
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(remote)
            .cloned()
            .ok_or_else(|| ConnectError::Unreachable(remote.to_string()))?;

        let (host_side, guest_side) = cross_link(&self.address, remote);
        host.send(host_side)
            .map_err(|_| ConnectError::Unreachable(remote.to_string()))?;

        debug!(from = %self.address, to = %remote, "dialed");
        Ok(guest_side)
    }

    async fn accept(&self) -> Result<Link, ConnectError> {
        let mut incoming = self.incoming.lock().await;
        loop {
            let mut link = incoming.recv().await.ok_or(ConnectError::Closed)?;

            // A dialer that gave up has dropped its half; release and wait for the next.
            if link.connection.outbound.send(TransportEvent::Open).is_err() {
                link.connection.close();
                debug!(address = %self.address, peer = %link.connection.peer, "skipped abandoned dial");
                continue;
            }

            link.connection.mark_open();
            info!(address = %self.address, peer = %link.connection.peer, "accepted guest");
            return Ok(link);
        }
    }
}

impl Drop for MemoryEndpoint {
    fn drop(&mut self) {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.address);
    }
}

/// Errors sending on a connection.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("Connection is not open")]
    NotOpen,
    #[error("Peer channel is gone")]
    ChannelGone,
    #[error(transparent)]
    Encode(#[from] ProtocolError),
}

/// Errors establishing a connection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectError {
    #[error("No peer at {0}")]
    Unreachable(String),
    #[error("Peer did not open within {0:?}")]
    Timeout(Duration),
    #[error("Connection closed before it opened")]
    Closed,
    #[error("Transport error: {0}")]
    Failed(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::game::Edge;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_linked_pair_delivers_in_order() {
        let (mut a, mut b) = linked_pair("host", "guest");
        assert!(a.connection.is_open());
        assert_eq!(a.connection.peer, "guest");

        a.connection.send(&Message::GuestReady).unwrap();
        a.connection.send(&Message::Move(Edge::horizontal(0, 0))).unwrap();
        assert_eq!(a.connection.sent, 2);

        let first = b.events.try_next().unwrap();
        let second = b.events.try_next().unwrap();
        assert_eq!(first, TransportEvent::Data(r#"{"type":"guestReady"}"#.to_string()));
        let TransportEvent::Data(text) = second else {
            panic!("expected data");
        };
        assert_eq!(protocol::decode(&text).unwrap(), Message::Move(Edge::horizontal(0, 0)));
        assert!(b.events.try_next().is_none());
    }

    #[test]
    fn test_send_requires_open() {
        let (mut a, _b) = cross_link("x", "y");
        assert_eq!(a.connection.status(), ConnectionStatus::Connecting);
        assert!(matches!(a.connection.send(&Message::GuestReady), Err(SendError::NotOpen)));
    }

    #[test]
    fn test_close_exactly_once() {
        let (mut a, mut b) = linked_pair("host", "guest");

        assert!(a.connection.close());
        assert!(!a.connection.close());
        assert!(matches!(a.connection.send(&Message::GuestReady), Err(SendError::NotOpen)));

        assert_eq!(b.events.try_next(), Some(TransportEvent::Close));
        assert_eq!(b.events.try_next(), None);
    }

    #[test]
    fn test_send_after_peer_dropped() {
        let (mut a, b) = linked_pair("host", "guest");
        drop(b);
        assert!(matches!(a.connection.send(&Message::GuestReady), Err(SendError::ChannelGone)));
        assert!(a.connection.status().is_closed());
    }

    #[test]
    fn test_observe_events() {
        let (mut a, _b) = cross_link("x", "y");
        a.connection.observe(&TransportEvent::Open);
        assert!(a.connection.is_open());
        assert!(a.connection.opened_at.is_some());

        a.connection.observe(&TransportEvent::Error("ice failed".into()));
        assert!(a.connection.status().is_closed());
    }

    #[tokio::test]
    async fn test_join_and_accept() {
        let network = MemoryNetwork::new();
        let host = network.endpoint("host-1");
        let guest = network.endpoint("guest-1");

        let (accepted, joined) =
            tokio::join!(host.accept(), join(&guest, "host-1", DEFAULT_JOIN_TIMEOUT));
        let mut host_link = accepted.unwrap();
        let mut guest_link = joined.unwrap();

        assert!(host_link.connection.is_open());
        assert!(guest_link.connection.is_open());
        assert_eq!(host_link.connection.peer, "guest-1");
        assert_eq!(guest_link.connection.peer, "host-1");

        guest_link.connection.send(&Message::GuestReady).unwrap();
        let event = host_link.events.next().await.unwrap();
        assert_eq!(event, TransportEvent::Data(r#"{"type":"guestReady"}"#.to_string()));
    }

    #[tokio::test]
    async fn test_join_unreachable() {
        let network = MemoryNetwork::new();
        let guest = network.endpoint("guest-1");

        let err = join(&guest, "nobody", DEFAULT_JOIN_TIMEOUT).await.unwrap_err();
        assert_eq!(err, ConnectError::Unreachable("nobody".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_join_timeout_releases_connection() {
        let network = MemoryNetwork::new();
        let host = network.endpoint("host-1");
        let guest = network.endpoint("guest-1");

        let err = join(&guest, "host-1", Duration::from_secs(3)).await.unwrap_err();
        assert_eq!(err, ConnectError::Timeout(Duration::from_secs(3)));

        // The abandoned dial is never handed out; the next guest is.
        let retry = network.endpoint("guest-2");
        let (accepted, joined) =
            tokio::join!(host.accept(), join(&retry, "host-1", Duration::from_secs(3)));
        let mut host_link = accepted.unwrap();
        let mut guest_link = joined.unwrap();
        assert_eq!(host_link.connection.peer, "guest-2");

        host_link.connection.send(&Message::GuestReady).unwrap();
        assert_eq!(
            guest_link.events.next().await,
            Some(TransportEvent::Data(r#"{"type":"guestReady"}"#.to_string()))
        );
    }

    #[test]
    fn test_endpoint_drop_unregisters() {
        let network = MemoryNetwork::new();
        let host = network.endpoint("host-1");
        assert_eq!(network.endpoint_count(), 1);
        assert_eq!(host.local_address(), "host-1");

        drop(host);
        assert_eq!(network.endpoint_count(), 0);
    }
}
