//! Fixtures shared by the unit tests.

use std::sync::Arc;

use kestrel_protocol::Message;
use kestrel_session::{
    Client, ConnectionId, Outbound, Peer, RemoteIdentity, StaticLinkAuthenticator,
};
use tokio::sync::mpsc;

use crate::commands::registration::try_complete_registration;
use crate::config::{Config, LinkConfig};
use crate::dispatch::{Caller, Context};
use crate::server::ServerState;
use crate::CommandError;

pub(crate) type Rx = mpsc::UnboundedReceiver<Outbound>;

/// Server `irc.test` with SID `001` that accepts `hub.test` / `pw`.
pub(crate) fn test_state() -> Arc<ServerState> {
    let mut config = Config::default();
    config.server.host = "irc.test".into();
    config.server.network = "TestNet".into();
    config.server.sid = "001".into();
    config.links.push(LinkConfig {
        host: "hub.test".into(),
        password: "pw".into(),
    });
    let auth = config.link_authenticator();
    ServerState::new(config, Box::new(auth))
}

/// Same, with an explicit authenticator.
pub(crate) fn test_state_with(auth: StaticLinkAuthenticator) -> Arc<ServerState> {
    let mut config = Config::default();
    config.server.host = "irc.test".into();
    config.server.sid = "001".into();
    ServerState::new(config, Box::new(auth))
}

/// A fresh, unregistered local client from `127.0.0.1`.
pub(crate) fn local_client(state: &ServerState) -> (Arc<Client>, Rx) {
    let (tx, rx) = mpsc::unbounded_channel();
    let client = Client::local(ConnectionId::next(), "127.0.0.1", false, tx, state.liveness());
    (Arc::new(client), rx)
}

/// A local client that has completed registration as `nick`, with the
/// welcome burst already drained.
pub(crate) fn registered_client(state: &Arc<ServerState>, nick: &str) -> (Arc<Client>, Rx) {
    let (client, mut rx) = local_client(state);
    state.directory.claim_nick(&client, nick).unwrap();
    client.set_user(nick, "Test User").unwrap();
    assert!(try_complete_registration(state, &client));
    drain(&mut rx);
    (client, rx)
}

/// A link that has connected but not yet sent `SERVER`.
pub(crate) fn unlinked_peer(state: &ServerState) -> (Arc<Peer>, Rx) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Arc::new(Peer::new(ConnectionId::next(), tx, state.liveness())), rx)
}

/// An authenticated link, already in the link table.
pub(crate) fn test_peer(state: &ServerState, name: &str, sid: &str) -> (Arc<Peer>, Rx) {
    let (tx, rx) = mpsc::unbounded_channel();
    let peer = Arc::new(Peer::new(ConnectionId::next(), tx, state.liveness()));
    peer.authenticate(name, sid, "test link");
    state.links.insert(sid.to_owned(), Arc::clone(&peer));
    (peer, rx)
}

/// A user introduced by `peer`, indexed by nick and UUID.
pub(crate) fn remote_client(
    state: &ServerState,
    peer: &Arc<Peer>,
    uuid: &str,
    nick: &str,
) -> Arc<Client> {
    let client = Arc::new(Client::remote(
        ConnectionId::next(),
        Arc::clone(peer),
        RemoteIdentity {
            uuid: uuid.to_owned(),
            nick: nick.to_owned(),
            ident: nick.to_owned(),
            host: "remote.host".into(),
            realname: "Remote User".into(),
            signon: 1_700_000_000,
            modes: "+i".into(),
        },
    ));
    state.directory.force_nick(&client, nick).unwrap();
    state.directory.register_uuid(&client);
    client
}

/// Every line queued so far.
pub(crate) fn drain(rx: &mut Rx) -> Vec<String> {
    let mut lines = Vec::new();
    while let Ok(item) = rx.try_recv() {
        if let Outbound::Line(line) = item {
            lines.push(line);
        }
    }
    lines
}

/// Parses `raw` and dispatches it as `caller`.
pub(crate) fn run(
    state: &Arc<ServerState>,
    caller: &Caller,
    raw: &str,
) -> Result<bool, CommandError> {
    let msg = Message::parse(raw).unwrap();
    state.dispatcher.dispatch(&Context::new(state, caller, &msg))
}

/// Dispatches `raw` from a local client, writing any error reply to it the
/// way the read loop does.
pub(crate) fn send(state: &Arc<ServerState>, client: &Arc<Client>, raw: &str) {
    let caller = Caller::Client(Arc::clone(client));
    if let Err(err) = run(state, &caller, raw) {
        client.send(err.to_reply(state.host(), &client.nick_or_star()));
    }
}
