//! Routing of readable sockets to read entry points.
//!
//! The event loop owns sockets; the engine only tells it which read entry
//! point a `(port, handler tag)` pair maps to. The port table is populated at
//! server startup; the per-socket tag is the one piece of state the engine
//! mutates, atomically, when a handshake succeeds.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};

use parking_lot::RwLock;

/// Which read entry point a socket's next readable event routes to.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    /// Plain HTTP request/response.
    HttpRead = 0,
    /// HTTP request expected to be a WebSocket upgrade.
    WsUpgrade = 1,
    /// WebSocket frames.
    WsMessage = 2,
}

impl HandlerKind {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::WsUpgrade,
            2 => Self::WsMessage,
            _ => Self::HttpRead,
        }
    }
}

/// Per-socket routing state, owned by the event loop.
///
/// The handshake bridge swaps the tag from [`HandlerKind::WsUpgrade`] to
/// [`HandlerKind::WsMessage`]; the swap is atomic because the accept exchange
/// and the first frame read may run on different workers.
#[derive(Debug)]
pub struct ConnectionSlot {
    port: u16,
    kind: AtomicU8,
}

impl ConnectionSlot {
    /// Creates a slot for a freshly accepted socket.
    #[must_use]
    pub fn new(port: u16, kind: HandlerKind) -> Self {
        Self {
            port,
            kind: AtomicU8::new(kind as u8),
        }
    }

    /// The listening port this socket was accepted on.
    #[inline]
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// The current handler tag.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> HandlerKind {
        HandlerKind::from_u8(self.kind.load(Ordering::Acquire))
    }

    /// Re-tags the socket; the next readable event routes accordingly.
    #[inline]
    pub fn set_kind(&self, kind: HandlerKind) {
        self.kind.store(kind as u8, Ordering::Release);
    }
}

/// Port-to-handler-kind table, populated at startup.
#[derive(Debug, Default)]
pub struct DispatchTable {
    ports: RwLock<HashMap<u16, HandlerKind>>,
}

impl DispatchTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the handler kind for sockets accepted on `port`.
    pub fn register(&self, port: u16, kind: HandlerKind) {
        self.ports.write().insert(port, kind);
    }

    /// Builds the slot for a socket accepted on `port`. Unregistered ports
    /// default to plain HTTP.
    #[must_use]
    pub fn slot_for(&self, port: u16) -> ConnectionSlot {
        let kind = self
            .ports
            .read()
            .get(&port)
            .copied()
            .unwrap_or(HandlerKind::HttpRead);
        ConnectionSlot::new(port, kind)
    }

    /// Resolves the read entry point for a readable event: the slot's tag,
    /// which started as the port default and may have been re-tagged.
    #[must_use]
    pub fn resolve(&self, slot: &ConnectionSlot) -> HandlerKind {
        slot.kind()
    }
}
