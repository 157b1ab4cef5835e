//! Transport abstraction layer for Kestrel.
//!
//! Provides the [`Transport`] and [`Connection`] traits that abstract over
//! the wire a client or peer server arrives on. Everything above this crate
//! deals in whole protocol lines: a transport hands out connections, a
//! connection reads and writes one line at a time.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket transport via `tokio-tungstenite`,
//!   one protocol line per text frame
//!
//! Plain TCP ([`TcpLineTransport`]) is always available.

use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

mod error;
mod tcp;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
pub use tcp::{TcpLineConnection, TcpLineTransport};
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnection, WebSocketTransport};

/// Longest line accepted from the wire, terminator excluded.
///
/// Anything past this is truncated; the classic protocol limit is 512
/// bytes but message tags and long channel lists push real clients over.
pub const MAX_LINE_LEN: usize = 8191;

/// Counter shared by every transport so IDs never collide across listeners.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Allocates the next process-wide connection ID.
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Accepts new incoming connections.
pub trait Transport: Send + Sync + 'static {
    /// The connection type produced by this transport.
    type Connection: Connection;

    /// Waits for and accepts the next incoming connection.
    fn accept(
        &mut self,
    ) -> impl Future<Output = Result<Self::Connection, TransportError>> + Send;

    /// Returns the address the transport is listening on.
    fn local_addr(&self) -> std::io::Result<SocketAddr>;
}

/// A single connection that carries protocol lines in both directions.
///
/// Reads and writes are independently locked, so one task may sit in
/// [`recv_line`](Connection::recv_line) while another writes.
pub trait Connection: Send + Sync + 'static {
    /// Writes one line. The implementation appends the line terminator.
    fn send_line(
        &self,
        line: &str,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Receives the next line with its terminator stripped.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    fn recv_line(
        &self,
    ) -> impl Future<Output = Result<Option<String>, TransportError>> + Send;

    /// Closes the connection.
    fn close(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;

    /// Returns the remote address.
    fn peer_addr(&self) -> SocketAddr;

    /// Whether the listener this connection arrived on is marked secure.
    fn is_secure(&self) -> bool;
}

/// Strips a trailing `\n` or `\r\n` and truncates to [`MAX_LINE_LEN`].
pub(crate) fn trim_line(raw: &[u8]) -> String {
    let mut end = raw.len();
    while end > 0 && matches!(raw[end - 1], b'\n' | b'\r') {
        end -= 1;
    }
    let end = end.min(MAX_LINE_LEN);
    String::from_utf8_lossy(&raw[..end]).into_owned()
}
