//! The client connection object: identity, registration, liveness.
//!
//! A [`Client`] is the server's record of one user, whether the user is
//! connected here (local) or was introduced by a linked server (remote).
//! It is shared as `Arc<Client>` between the connection's own tasks, every
//! channel it sits in, and the network [`Directory`](crate::Directory).
//!
//! # Registration
//!
//! ```text
//!   PreAuth ──(nick + ident set, CAP not pending)──→ Auth
//! ```
//!
//! The transition is one-way. Remote clients are born in `Auth`.

use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use kestrel_liveness::{LivenessAction, LivenessConfig, LivenessState};
use kestrel_protocol::irc_lower;
use kestrel_transport::ConnectionId;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::{CapReply, CapSet, Peer, SessionError};

// ---------------------------------------------------------------------------
// Outbound queue
// ---------------------------------------------------------------------------

/// An item on a connection's outbound queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// One formatted protocol line (no terminator).
    Line(String),
    /// Flush what's queued, then close the socket.
    Close,
}

/// Channel sender for delivering outbound lines to a connection's writer.
pub type LineSender = mpsc::UnboundedSender<Outbound>;

// ---------------------------------------------------------------------------
// RegistrationState
// ---------------------------------------------------------------------------

/// Where a connection is in the registration handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    /// Connected, identity incomplete.
    PreAuth,
    /// Nickname and ident set, welcome burst sent.
    Auth,
}

/// Identity of a user announced by a linked server.
#[derive(Debug, Clone)]
pub struct RemoteIdentity {
    pub uuid: String,
    pub nick: String,
    pub ident: String,
    pub host: String,
    pub realname: String,
    pub signon: i64,
    pub modes: String,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

struct ClientInner {
    nick: Option<String>,
    ident: Option<String>,
    realname: String,
    host: String,
    uuid: Option<String>,
    state: RegistrationState,
    modes: BTreeSet<char>,
    away: Option<String>,
    invites: HashSet<String>,
    caps: CapSet,
    last_active: Instant,
}

/// A user on the network.
pub struct Client {
    id: ConnectionId,
    secure: bool,
    signon: i64,
    /// `None` for remote clients; lines for them travel via their link.
    sender: Option<LineSender>,
    origin: Option<Arc<Peer>>,
    inner: RwLock<ClientInner>,
    /// `None` for remote clients; their link is probed instead.
    liveness: Option<Mutex<LivenessState>>,
    disconnecting: AtomicBool,
}

impl Client {
    /// Creates a client for a freshly accepted local connection.
    pub fn local(
        id: ConnectionId,
        host: impl Into<String>,
        secure: bool,
        sender: LineSender,
        liveness: &LivenessConfig,
    ) -> Self {
        let mut modes = BTreeSet::new();
        if secure {
            modes.insert('z');
        }
        Self {
            id,
            secure,
            signon: Utc::now().timestamp(),
            sender: Some(sender),
            origin: None,
            inner: RwLock::new(ClientInner {
                nick: None,
                ident: None,
                realname: String::new(),
                host: host.into(),
                uuid: None,
                state: RegistrationState::PreAuth,
                modes,
                away: None,
                invites: HashSet::new(),
                caps: CapSet::default(),
                last_active: Instant::now(),
            }),
            liveness: Some(Mutex::new(LivenessState::new(liveness))),
            disconnecting: AtomicBool::new(false),
        }
    }

    /// Creates an already-registered client introduced by `origin`.
    pub fn remote(id: ConnectionId, origin: Arc<Peer>, identity: RemoteIdentity) -> Self {
        let modes: BTreeSet<char> = identity
            .modes
            .chars()
            .filter(|c| c.is_ascii_alphabetic())
            .collect();
        Self {
            id,
            secure: modes.contains(&'z'),
            signon: identity.signon,
            sender: None,
            origin: Some(origin),
            inner: RwLock::new(ClientInner {
                nick: Some(identity.nick),
                ident: Some(identity.ident),
                realname: identity.realname,
                host: identity.host,
                uuid: Some(identity.uuid),
                state: RegistrationState::Auth,
                modes,
                away: None,
                invites: HashSet::new(),
                caps: CapSet::default(),
                last_active: Instant::now(),
            }),
            liveness: None,
            disconnecting: AtomicBool::new(false),
        }
    }

    // -- Identity ---------------------------------------------------------

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn nick(&self) -> Option<String> {
        self.inner.read().nick.clone()
    }

    /// Nickname, or `*` before one is set (the reply target convention).
    pub fn nick_or_star(&self) -> String {
        self.nick().unwrap_or_else(|| "*".to_owned())
    }

    pub fn ident(&self) -> Option<String> {
        self.inner.read().ident.clone()
    }

    pub fn host(&self) -> String {
        self.inner.read().host.clone()
    }

    pub fn realname(&self) -> String {
        self.inner.read().realname.clone()
    }

    /// Full network identifier (SID + UID), assigned at registration.
    pub fn uuid(&self) -> Option<String> {
        self.inner.read().uuid.clone()
    }

    pub fn set_uuid(&self, uuid: impl Into<String>) {
        self.inner.write().uuid = Some(uuid.into());
    }

    /// `nick!ident@host`.
    pub fn mask(&self) -> String {
        let inner = self.inner.read();
        format!(
            "{}!{}@{}",
            inner.nick.as_deref().unwrap_or("*"),
            inner.ident.as_deref().unwrap_or("*"),
            inner.host
        )
    }

    /// Unix time the client connected (or was introduced).
    pub fn signon(&self) -> i64 {
        self.signon
    }

    /// Replaces the nickname, returning the old one. Uniqueness is the
    /// [`Directory`](crate::Directory)'s job; call it through there.
    pub(crate) fn replace_nick(&self, nick: &str) -> Option<String> {
        self.inner.write().nick.replace(nick.to_owned())
    }

    /// Sets ident and real name from `USER`.
    ///
    /// # Errors
    /// [`SessionError::AlreadyRegistered`] once the client is `Auth`.
    pub fn set_user(&self, ident: &str, realname: &str) -> Result<(), SessionError> {
        let mut inner = self.inner.write();
        if inner.state == RegistrationState::Auth {
            return Err(SessionError::AlreadyRegistered);
        }
        inner.ident = Some(ident.to_owned());
        inner.realname = realname.to_owned();
        Ok(())
    }

    // -- Registration -----------------------------------------------------

    pub fn state(&self) -> RegistrationState {
        self.inner.read().state
    }

    pub fn is_registered(&self) -> bool {
        self.state() == RegistrationState::Auth
    }

    /// Moves `PreAuth → Auth` if nickname and ident are both set and no
    /// capability negotiation is pending.
    ///
    /// Returns `true` exactly once: on the call that performed the
    /// transition. The caller sends the welcome burst on `true`.
    pub fn try_register(&self) -> bool {
        let mut inner = self.inner.write();
        let ready = inner.state == RegistrationState::PreAuth
            && inner.nick.as_deref().is_some_and(|n| !n.is_empty())
            && inner.ident.as_deref().is_some_and(|i| !i.is_empty())
            && !inner.caps.is_stalled();
        if ready {
            inner.state = RegistrationState::Auth;
            tracing::info!(conn_id = %self.id, nick = ?inner.nick, "client registered");
        }
        ready
    }

    // -- Capabilities -----------------------------------------------------

    /// Puts registration on hold (`CAP LS` / `CAP REQ`).
    pub fn cap_stall(&self) {
        self.inner.write().caps.stall();
    }

    /// Releases registration (`CAP END`, or a bad `CAP` subcommand).
    pub fn cap_end(&self) {
        self.inner.write().caps.end();
    }

    pub fn cap_request(&self, list: &str) -> CapReply {
        self.inner.write().caps.request(list)
    }

    pub fn has_cap(&self, name: &str) -> bool {
        self.inner.read().caps.has(name)
    }

    pub fn caps_list(&self) -> String {
        self.inner.read().caps.enabled_list()
    }

    // -- User modes -------------------------------------------------------

    pub fn has_mode(&self, mode: char) -> bool {
        self.inner.read().modes.contains(&mode)
    }

    /// Sets or clears a user mode; `false` if nothing changed.
    pub fn set_mode(&self, mode: char, on: bool) -> bool {
        let mut inner = self.inner.write();
        if on {
            inner.modes.insert(mode)
        } else {
            inner.modes.remove(&mode)
        }
    }

    /// `+` followed by the enabled user modes, e.g. `+iz`.
    pub fn mode_string(&self) -> String {
        let inner = self.inner.read();
        std::iter::once('+').chain(inner.modes.iter().copied()).collect()
    }

    pub fn is_oper(&self) -> bool {
        self.has_mode('o')
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    // -- Away / invites / idle -------------------------------------------

    pub fn away(&self) -> Option<String> {
        self.inner.read().away.clone()
    }

    pub fn set_away(&self, message: Option<String>) {
        self.inner.write().away = message.filter(|m| !m.is_empty());
    }

    pub fn add_invite(&self, channel: &str) {
        self.inner.write().invites.insert(irc_lower(channel));
    }

    pub fn is_invited(&self, channel: &str) -> bool {
        self.inner.read().invites.contains(&irc_lower(channel))
    }

    /// Consumes a pending invite; `true` if there was one.
    pub fn take_invite(&self, channel: &str) -> bool {
        self.inner.write().invites.remove(&irc_lower(channel))
    }

    /// Records activity for idle time reporting.
    pub fn touch(&self) {
        self.inner.write().last_active = Instant::now();
    }

    pub fn idle(&self) -> Duration {
        self.inner.read().last_active.elapsed()
    }

    // -- Link -------------------------------------------------------------

    /// The linked server that introduced this client, `None` if local.
    pub fn origin(&self) -> Option<&Arc<Peer>> {
        self.origin.as_ref()
    }

    pub fn is_local(&self) -> bool {
        self.origin.is_none()
    }

    // -- Output -----------------------------------------------------------

    /// Queues a line for this client. Remote clients and closed queues
    /// drop it silently; returns whether it was queued.
    pub fn send(&self, line: impl Into<String>) -> bool {
        let Some(sender) = &self.sender else {
            return false;
        };
        let mut line = line.into();
        if self.has_cap("server-time") {
            let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
            line = format!("@time={now} {line}");
        }
        sender.send(Outbound::Line(line)).is_ok()
    }

    /// Asks the writer to flush and close the connection.
    pub fn close(&self) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(Outbound::Close);
        }
    }

    // -- Liveness ---------------------------------------------------------

    /// Always [`LivenessAction::Idle`] for remote clients.
    pub fn check_liveness(&self, now: Instant) -> LivenessAction {
        match &self.liveness {
            Some(liveness) => liveness.lock().check(now),
            None => LivenessAction::Idle,
        }
    }

    /// Records a `PONG`; `true` if the cookie matched.
    pub fn pong(&self, cookie: &str) -> bool {
        self.liveness
            .as_ref()
            .is_some_and(|l| l.lock().pong(cookie, Instant::now()))
    }

    // -- Teardown ---------------------------------------------------------

    /// Marks the client as going away. Returns `true` only for the first
    /// caller, so the disconnect path runs once even when a failed write
    /// during disconnect tries to start it again.
    pub fn begin_disconnect(&self) -> bool {
        !self.disconnecting.swap(true, Ordering::AcqRel)
    }

    pub fn is_disconnecting(&self) -> bool {
        self.disconnecting.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("id", &self.id)
            .field("nick", &self.nick())
            .field("state", &self.state())
            .finish()
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // -- Helpers ----------------------------------------------------------

    fn local_client() -> (Client, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let client = Client::local(
            ConnectionId::next(),
            "127.0.0.1",
            false,
            tx,
            &LivenessConfig::default(),
        );
        (client, rx)
    }

    // =====================================================================
    // try_register()
    // =====================================================================

    #[test]
    fn test_try_register_needs_nick_and_ident() {
        let (client, _rx) = local_client();
        assert!(!client.try_register());

        client.replace_nick("alice");
        assert!(!client.try_register());
        assert_eq!(client.state(), RegistrationState::PreAuth);

        client.set_user("alice", "Alice").unwrap();
        assert!(client.try_register());
        assert_eq!(client.state(), RegistrationState::Auth);
    }

    #[test]
    fn test_try_register_only_fires_once() {
        let (client, _rx) = local_client();
        client.replace_nick("alice");
        client.set_user("alice", "Alice").unwrap();
        assert!(client.try_register());
        assert!(!client.try_register());
        assert!(client.is_registered());
    }

    #[test]
    fn test_try_register_waits_for_cap_end() {
        let (client, _rx) = local_client();
        client.cap_stall();
        client.replace_nick("alice");
        client.set_user("alice", "Alice").unwrap();
        assert!(!client.try_register());

        client.cap_end();
        assert!(client.try_register());
    }

    #[test]
    fn test_set_user_after_auth_returns_already_registered() {
        let (client, _rx) = local_client();
        client.replace_nick("alice");
        client.set_user("alice", "Alice").unwrap();
        client.try_register();

        assert_eq!(
            client.set_user("other", "Other"),
            Err(SessionError::AlreadyRegistered)
        );
        assert_eq!(client.ident().as_deref(), Some("alice"));
    }

    // =====================================================================
    // Identity and modes
    // =====================================================================

    #[test]
    fn test_mask_uses_star_placeholders() {
        let (client, _rx) = local_client();
        assert_eq!(client.mask(), "*!*@127.0.0.1");
        client.replace_nick("bob");
        client.set_user("b", "Bob").unwrap();
        assert_eq!(client.mask(), "bob!b@127.0.0.1");
    }

    #[test]
    fn test_secure_local_client_gets_z_mode() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let client = Client::local(
            ConnectionId::next(),
            "::1",
            true,
            tx,
            &LivenessConfig::default(),
        );
        assert!(client.is_secure());
        assert_eq!(client.mode_string(), "+z");
    }

    #[test]
    fn test_set_mode_reports_change() {
        let (client, _rx) = local_client();
        assert!(client.set_mode('i', true));
        assert!(!client.set_mode('i', true));
        assert!(client.set_mode('i', false));
    }

    #[test]
    fn test_invites_are_case_insensitive_and_consumed() {
        let (client, _rx) = local_client();
        client.add_invite("#Rust");
        assert!(client.is_invited("#rust"));
        assert!(client.take_invite("#RUST"));
        assert!(!client.take_invite("#rust"));
    }

    // =====================================================================
    // send() / close()
    // =====================================================================

    #[test]
    fn test_send_queues_line() {
        let (client, mut rx) = local_client();
        assert!(client.send("PING :x"));
        assert_eq!(rx.try_recv().unwrap(), Outbound::Line("PING :x".into()));
    }

    #[test]
    fn test_send_with_server_time_prefixes_tag() {
        let (client, mut rx) = local_client();
        client.cap_request("server-time");
        client.send("PING :x");
        match rx.try_recv().unwrap() {
            Outbound::Line(line) => {
                assert!(line.starts_with("@time="));
                assert!(line.ends_with(" PING :x"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_send_after_receiver_dropped_returns_false() {
        let (client, rx) = local_client();
        drop(rx);
        assert!(!client.send("PING :x"));
    }

    #[test]
    fn test_close_queues_close_marker() {
        let (client, mut rx) = local_client();
        client.close();
        assert_eq!(rx.try_recv().unwrap(), Outbound::Close);
    }

    // =====================================================================
    // begin_disconnect()
    // =====================================================================

    #[test]
    fn test_begin_disconnect_is_true_once() {
        let (client, _rx) = local_client();
        assert!(client.begin_disconnect());
        assert!(!client.begin_disconnect());
        assert!(client.is_disconnecting());
    }

    // =====================================================================
    // check_liveness() / pong()
    // =====================================================================

    #[test]
    fn test_check_liveness_local_client_is_probed() {
        let (client, _rx) = local_client();
        assert!(matches!(
            client.check_liveness(Instant::now()),
            LivenessAction::Probe(_)
        ));
    }

    #[test]
    fn test_check_liveness_remote_client_stays_idle() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let link = Arc::new(Peer::new(ConnectionId::next(), tx, &LivenessConfig::default()));
        let client = Client::remote(
            ConnectionId::next(),
            link,
            RemoteIdentity {
                uuid: "002AAAAAA".into(),
                nick: "carol".into(),
                ident: "carol".into(),
                host: "remote.host".into(),
                realname: "Carol".into(),
                signon: 1_700_000_000,
                modes: "+i".into(),
            },
        );

        assert_eq!(client.check_liveness(Instant::now()), LivenessAction::Idle);
        assert!(!client.pong("002"));
    }
}
