//! A linked server connection.

use std::sync::atomic::{AtomicBool, Ordering};

use kestrel_liveness::{LivenessAction, LivenessConfig, LivenessState};
use kestrel_transport::ConnectionId;
use parking_lot::{Mutex, RwLock};
use tokio::time::Instant;

use crate::{LineSender, Outbound};

/// Link handshake state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    /// Connected, `SERVER` not yet verified.
    PreAuth,
    /// Credentials verified; the link may carry state.
    Auth,
}

struct PeerInner {
    name: Option<String>,
    sid: Option<String>,
    description: String,
    state: PeerState,
    capab_sent: bool,
}

/// A server-to-server link.
pub struct Peer {
    id: ConnectionId,
    sender: LineSender,
    inner: RwLock<PeerInner>,
    liveness: Mutex<LivenessState>,
    liveness_config: LivenessConfig,
    disconnecting: AtomicBool,
}

impl Peer {
    /// Creates an unauthenticated link for a freshly accepted connection.
    pub fn new(id: ConnectionId, sender: LineSender, liveness: &LivenessConfig) -> Self {
        Self {
            id,
            sender,
            inner: RwLock::new(PeerInner {
                name: None,
                sid: None,
                description: String::new(),
                state: PeerState::PreAuth,
                capab_sent: false,
            }),
            liveness: Mutex::new(LivenessState::new(liveness)),
            liveness_config: liveness.clone(),
            disconnecting: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn name(&self) -> Option<String> {
        self.inner.read().name.clone()
    }

    pub fn sid(&self) -> Option<String> {
        self.inner.read().sid.clone()
    }

    pub fn description(&self) -> String {
        self.inner.read().description.clone()
    }

    pub fn state(&self) -> PeerState {
        self.inner.read().state
    }

    pub fn is_authenticated(&self) -> bool {
        self.state() == PeerState::Auth
    }

    /// Marks the link verified. From here on the link is probed with its
    /// own SID as the cookie.
    pub fn authenticate(&self, name: &str, sid: &str, description: &str) {
        {
            let mut inner = self.inner.write();
            inner.name = Some(name.to_owned());
            inner.sid = Some(sid.to_owned());
            inner.description = description.to_owned();
            inner.state = PeerState::Auth;
        }
        *self.liveness.lock() = LivenessState::with_fixed_cookie(&self.liveness_config, sid);
        tracing::info!(conn_id = %self.id, %name, %sid, "link authenticated");
    }

    /// Records that our own `CAPAB` went out; returns `true` the first time.
    pub fn mark_capab_sent(&self) -> bool {
        let mut inner = self.inner.write();
        !std::mem::replace(&mut inner.capab_sent, true)
    }

    /// Queues a line. Returns whether it was queued.
    pub fn send(&self, line: impl Into<String>) -> bool {
        self.sender.send(Outbound::Line(line.into())).is_ok()
    }

    /// Asks the writer to flush and close the link.
    pub fn close(&self) {
        let _ = self.sender.send(Outbound::Close);
    }

    pub fn check_liveness(&self, now: Instant) -> LivenessAction {
        self.liveness.lock().check(now)
    }

    pub fn pong(&self, cookie: &str) -> bool {
        self.liveness.lock().pong(cookie, Instant::now())
    }

    /// Returns `true` only for the first caller.
    pub fn begin_disconnect(&self) -> bool {
        !self.disconnecting.swap(true, Ordering::AcqRel)
    }

    pub fn is_disconnecting(&self) -> bool {
        self.disconnecting.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for Peer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Peer")
            .field("id", &self.id)
            .field("sid", &self.sid())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;

    fn peer() -> (Peer, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Peer::new(ConnectionId::next(), tx, &LivenessConfig::default()),
            rx,
        )
    }

    #[test]
    fn test_authenticate_sets_identity_and_state() {
        let (peer, _rx) = peer();
        assert_eq!(peer.state(), PeerState::PreAuth);
        peer.authenticate("hub.test", "042", "Hub");
        assert!(peer.is_authenticated());
        assert_eq!(peer.sid().as_deref(), Some("042"));
        assert_eq!(peer.name().as_deref(), Some("hub.test"));
    }

    #[test]
    fn test_authenticated_peer_is_probed_with_sid() {
        let (peer, _rx) = peer();
        peer.authenticate("hub.test", "042", "Hub");
        assert_eq!(
            peer.check_liveness(Instant::now()),
            LivenessAction::Probe("042".into())
        );
        assert!(peer.pong("042"));
    }

    #[test]
    fn test_mark_capab_sent_once() {
        let (peer, _rx) = peer();
        assert!(peer.mark_capab_sent());
        assert!(!peer.mark_capab_sent());
    }
}
