//! Plain TCP transport: `\r\n`-terminated lines over a socket.

use std::net::SocketAddr;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

use crate::{trim_line, Connection, ConnectionId, Transport, TransportError};

/// A TCP [`Transport`] that listens for incoming line-oriented connections.
pub struct TcpLineTransport {
    listener: TcpListener,
    secure: bool,
}

impl TcpLineTransport {
    /// Binds a new TCP transport to the given address.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!(addr, "TCP transport listening");
        Ok(Self {
            listener,
            secure: false,
        })
    }

    /// Marks every connection accepted by this transport as secure.
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }
}

impl Transport for TcpLineTransport {
    type Connection = TcpLineConnection;

    async fn accept(&mut self) -> Result<Self::Connection, TransportError> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;
        // Line-at-a-time traffic; don't sit on small writes.
        let _ = stream.set_nodelay(true);

        let id = ConnectionId::next();
        tracing::debug!(%id, %addr, "accepted TCP connection");

        let (read, write) = stream.into_split();
        Ok(TcpLineConnection {
            id,
            addr,
            secure: self.secure,
            reader: Mutex::new(BufReader::new(read)),
            writer: Mutex::new(write),
        })
    }

    fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

/// A single TCP connection.
pub struct TcpLineConnection {
    id: ConnectionId,
    addr: SocketAddr,
    secure: bool,
    reader: Mutex<BufReader<OwnedReadHalf>>,
    writer: Mutex<OwnedWriteHalf>,
}

impl Connection for TcpLineConnection {
    async fn send_line(&self, line: &str) -> Result<(), TransportError> {
        let mut buf = Vec::with_capacity(line.len() + 2);
        buf.extend_from_slice(line.as_bytes());
        buf.extend_from_slice(b"\r\n");
        let mut writer = self.writer.lock().await;
        writer
            .write_all(&buf)
            .await
            .map_err(TransportError::SendFailed)
    }

    async fn recv_line(&self) -> Result<Option<String>, TransportError> {
        let mut reader = self.reader.lock().await;
        let mut raw = Vec::new();
        let read = reader
            .read_until(b'\n', &mut raw)
            .await
            .map_err(TransportError::ReceiveFailed)?;
        if read == 0 {
            return Ok(None);
        }
        Ok(Some(trim_line(&raw)))
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.writer
            .lock()
            .await
            .shutdown()
            .await
            .map_err(TransportError::SendFailed)
    }

    fn id(&self) -> ConnectionId {
        self.id
    }

    fn peer_addr(&self) -> SocketAddr {
        self.addr
    }

    fn is_secure(&self) -> bool {
        self.secure
    }
}
