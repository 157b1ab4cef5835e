//! Server-to-server linking.
//!
//! Kestrel speaks an InspIRCd 2.0 style spanning-tree protocol. Users
//! cross a link as UUIDs (`SID + UID`), never as nicknames:
//!
//! ```text
//! local event ──▶ propagate ──▶ ":001AAAAAA PRIVMSG #rust :hi" ──▶ links
//! link line   ──▶ link.rs   ──▶ translate::to_local ──▶ client handlers
//! ```
//!
//! - [`ident`]: SID derivation and the UID generator
//! - `translate`: nickname ↔ UUID rewriting
//! - `link`: handlers for every peer verb, including the burst

pub mod ident;
mod link;
pub(crate) mod translate;

pub use ident::{generate_sid, UidGenerator, UID_LEN};

use chrono::Utc;
use kestrel_session::{Client, Peer};

use crate::dispatch::Dispatcher;
use crate::server::ServerState;

/// Protocol revision advertised in `CAPAB`.
const PROTOCOL_VERSION: u32 = 1202;

/// Registers every server-class verb.
pub fn register_all(dispatcher: &mut Dispatcher) {
    link::register(dispatcher);
}

/// Sends `line` to every link except the one `source` arrived on.
pub(crate) fn propagate(state: &ServerState, source: &Client, line: &str) -> usize {
    state.send_to_links(line, source.origin().map(|p| p.id()))
}

/// The `UID` line introducing `client`, or `None` before it has a UUID.
pub(crate) fn uid_line(client: &Client) -> Option<String> {
    let uuid = client.uuid()?;
    let sid = uuid.get(..3)?;
    let host = client.host();
    let signon = client.signon();
    Some(format!(
        ":{sid} UID {uuid} {signon} {} {host} {host} {} {host} {signon} {} :{}",
        client.nick_or_star(),
        client.ident().unwrap_or_else(|| "*".to_owned()),
        client.mode_string(),
        client.realname()
    ))
}

/// Announces a newly registered `client` to the network.
pub(crate) fn introduce(state: &ServerState, client: &Client) {
    if let Some(line) = uid_line(client) {
        let sent = propagate(state, client, &line);
        tracing::debug!(conn_id = %client.id(), links = sent, "user introduced");
    }
}

pub(crate) fn send_capab(peer: &Peer) {
    peer.send(format!("CAPAB START {PROTOCOL_VERSION}"));
    peer.send(format!("CAPAB CAPABILITIES :PROTOCOL={PROTOCOL_VERSION}"));
    peer.send("CAPAB END");
}

/// Sends our view of the network to a freshly authenticated link: every
/// user and channel membership that didn't come from that link.
pub(crate) fn burst(state: &ServerState, peer: &Peer) {
    let sid = state.sid();
    let from_peer = |c: &Client| c.origin().is_some_and(|p| p.id() == peer.id());

    peer.send(format!(":{sid} BURST {}", Utc::now().timestamp()));

    let mut users = 0;
    for client in state.directory.clients() {
        if !client.is_registered() || from_peer(&client) {
            continue;
        }
        if let Some(line) = uid_line(&client) {
            peer.send(line);
            users += 1;
        }
    }

    let mut channels = 0;
    for channel in state.channels.list() {
        let entries: Vec<String> = channel
            .burst_members()
            .into_iter()
            .filter(|(_, member)| !from_peer(member))
            .filter_map(|(letters, member)| Some(format!("{letters},{}", member.uuid()?)))
            .collect();
        if entries.is_empty() {
            continue;
        }
        peer.send(format!(
            ":{sid} FJOIN {} {} {} :{}",
            channel.name(),
            channel.created(),
            channel.mode_strings('+'),
            entries.join(" ")
        ));
        channels += 1;
    }

    peer.send(format!(":{sid} ENDBURST"));
    tracing::info!(
        link = %peer.name().unwrap_or_default(),
        users,
        channels,
        "burst sent"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{drain, registered_client, remote_client, test_peer, test_state};

    #[test]
    fn test_uid_line_layout() {
        let state = test_state();
        let (alice, _rx) = registered_client(&state, "alice");
        let line = uid_line(&alice).unwrap();
        let signon = alice.signon();
        assert_eq!(
            line,
            format!(
                ":001 UID 001AAAAAA {signon} alice 127.0.0.1 127.0.0.1 alice 127.0.0.1 {signon} + :Test User"
            )
        );
    }

    #[test]
    fn test_propagate_skips_origin_link() {
        let state = test_state();
        let (hub, mut hub_rx) = test_peer(&state, "hub.test", "002");
        let (_leaf, mut leaf_rx) = test_peer(&state, "leaf.test", "003");
        let carol = remote_client(&state, &hub, "002AAAAAA", "carol");

        assert_eq!(propagate(&state, &carol, ":002AAAAAA AWAY"), 1);
        assert!(drain(&mut hub_rx).is_empty());
        assert_eq!(drain(&mut leaf_rx), vec![":002AAAAAA AWAY"]);
    }

    #[test]
    fn test_burst_excludes_the_receiving_link() {
        let state = test_state();
        let (hub, mut hub_rx) = test_peer(&state, "hub.test", "002");
        let carol = remote_client(&state, &hub, "002AAAAAA", "carol");
        let (alice, _rx) = registered_client(&state, "alice");
        let (channel, _, _) = state.channels.join(&alice, "#rust", None).unwrap();
        state.channels.force_join(&carol, "#rust").unwrap();
        drain(&mut hub_rx);

        burst(&state, &hub);

        let lines = drain(&mut hub_rx);
        assert!(lines[0].starts_with(":001 BURST "));
        assert!(lines[1].starts_with(":001 UID 001AAAAAA "));
        assert_eq!(
            lines[2],
            format!(":001 FJOIN #rust {} +nt :,001AAAAAA", channel.created())
        );
        assert_eq!(lines[3], ":001 ENDBURST");
        assert_eq!(lines.len(), 4);
    }
}
