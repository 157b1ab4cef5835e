//! Connection teardown for clients and links.
//!
//! Both functions are synchronous and idempotent: the first caller wins
//! and later calls (a failed write racing a read-side EOF, the drop guard
//! after an explicit QUIT) return immediately.

use std::collections::HashSet;
use std::sync::Arc;

use kestrel_channel::Departure;
use kestrel_session::{Client, Peer};

use crate::server::ServerState;

/// Removes `client` from the network.
///
/// Every user sharing a channel sees one `QUIT`, however many channels
/// they share. With `notify_self` the client itself gets the `QUIT` line
/// before its queue is closed; after a write failure there is nobody left
/// to tell. Registered clients are also announced to the linked servers,
/// except the one that introduced them.
pub fn disconnect_client(
    state: &Arc<ServerState>,
    client: &Arc<Client>,
    reason: &str,
    notify_self: bool,
) {
    if !client.begin_disconnect() {
        return;
    }
    let mask = client.mask();
    let quit = format!(":{mask} QUIT :{reason}");

    let mut notified = HashSet::from([client.id()]);
    for channel in state.channels.channels_of(client.id()) {
        for member in channel.members() {
            if notified.insert(member.id()) {
                member.send(quit.as_str());
            }
        }
        channel.remove(client, Departure::Silent);
    }
    if notify_self {
        client.send(quit.as_str());
    }

    if client.is_registered() {
        if let Some(uuid) = client.uuid() {
            state.send_to_links(
                &format!(":{uuid} QUIT :{reason}"),
                client.origin().map(|p| p.id()),
            );
        }
    }

    state.directory.release(client);
    client.close();
    if client.is_local() {
        state.deregister(client.id());
    }
    state.channels.reap_empty();

    tracing::info!(
        conn_id = %client.id(),
        nick = %client.nick_or_star(),
        %reason,
        local = client.is_local(),
        "client disconnected"
    );
}

/// Drops a link and every user it introduced.
///
/// With `notice` the link is told why in an `ERROR` line first. The users
/// behind the link quit with the conventional split reason
/// `"<our host> <their name>"`.
pub fn disconnect_peer(state: &Arc<ServerState>, peer: &Arc<Peer>, reason: &str, notice: bool) {
    if !peer.begin_disconnect() {
        return;
    }
    if notice {
        peer.send(format!("ERROR :{reason}"));
    }

    if let Some(sid) = peer.sid() {
        state.links.remove_if(&sid, |_, p| p.id() == peer.id());

        let split = format!(
            "{} {}",
            state.host(),
            peer.name().unwrap_or_else(|| sid.clone())
        );
        let behind: Vec<Arc<Client>> = state
            .directory
            .introduced_by(&sid)
            .into_iter()
            .filter(|c| c.origin().is_some_and(|o| o.id() == peer.id()))
            .collect();
        for client in &behind {
            disconnect_client(state, client, &split, false);
        }
        tracing::debug!(%sid, users = behind.len(), "link users removed");
    }

    peer.close();
    state.deregister(peer.id());

    tracing::info!(
        conn_id = %peer.id(),
        name = ?peer.name(),
        %reason,
        "link disconnected"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{drain, registered_client, remote_client, test_peer, test_state};

    // =====================================================================
    // disconnect_client()
    // =====================================================================

    #[test]
    fn test_disconnect_client_shared_channels_quit_once() {
        let state = test_state();
        let (alice, mut alice_rx) = registered_client(&state, "alice");
        let (bob, mut bob_rx) = registered_client(&state, "bob");
        for name in ["#a", "#b"] {
            state.channels.join(&alice, name, None).unwrap();
            state.channels.join(&bob, name, None).unwrap();
        }
        drain(&mut alice_rx);
        drain(&mut bob_rx);

        disconnect_client(&state, &alice, "bye", true);

        let bob_lines = drain(&mut bob_rx);
        let quits: Vec<_> = bob_lines.iter().filter(|l| l.contains(" QUIT ")).collect();
        assert_eq!(quits.len(), 1);
        assert!(quits[0].starts_with(":alice!"));
        assert!(quits[0].ends_with("QUIT :bye"));

        assert!(drain(&mut alice_rx).iter().any(|l| l.ends_with("QUIT :bye")));
        assert!(state.directory.by_nick("alice").is_none());
        assert!(!state.channels.get("#a").unwrap().is_member(alice.id()));
    }

    #[test]
    fn test_disconnect_client_without_notify_skips_self() {
        let state = test_state();
        let (alice, mut rx) = registered_client(&state, "alice");
        disconnect_client(&state, &alice, "Connection reset by host", false);
        let lines = drain(&mut rx);
        assert!(lines.iter().all(|l| !l.contains("QUIT")));
    }

    #[test]
    fn test_disconnect_client_twice_is_noop() {
        let state = test_state();
        let (alice, mut rx) = registered_client(&state, "alice");
        disconnect_client(&state, &alice, "one", true);
        disconnect_client(&state, &alice, "two", true);
        let quits: Vec<_> = drain(&mut rx).into_iter().filter(|l| l.contains("QUIT")).collect();
        assert_eq!(quits.len(), 1);
        assert!(quits[0].ends_with(":one"));
    }

    #[test]
    fn test_disconnect_client_propagates_to_links() {
        let state = test_state();
        let (_peer, mut link_rx) = test_peer(&state, "hub.test", "002");
        let (alice, _rx) = registered_client(&state, "alice");
        drain(&mut link_rx);

        disconnect_client(&state, &alice, "bye", true);

        let uuid = alice.uuid().unwrap();
        assert_eq!(drain(&mut link_rx), vec![format!(":{uuid} QUIT :bye")]);
    }

    #[test]
    fn test_disconnect_client_empty_channel_is_reaped() {
        let state = test_state();
        let (alice, _rx) = registered_client(&state, "alice");
        state.channels.join(&alice, "#solo", None).unwrap();
        disconnect_client(&state, &alice, "bye", true);
        assert!(state.channels.get("#solo").is_none());
    }

    // =====================================================================
    // disconnect_peer()
    // =====================================================================

    #[test]
    fn test_disconnect_peer_quits_users_behind_link() {
        let state = test_state();
        let (peer, mut link_rx) = test_peer(&state, "hub.test", "002");
        let remote = remote_client(&state, &peer, "002AAAAAA", "carol");
        let (alice, mut alice_rx) = registered_client(&state, "alice");
        state.channels.join(&alice, "#rust", None).unwrap();
        state.channels.force_join(&remote, "#rust").unwrap();
        drain(&mut alice_rx);

        disconnect_peer(&state, &peer, "going away", true);

        assert!(state.directory.by_nick("carol").is_none());
        assert!(!state.links.contains_key("002"));
        let lines = drain(&mut alice_rx);
        assert!(lines.iter().any(|l| l.ends_with("QUIT :irc.test hub.test")));
        assert!(drain(&mut link_rx).iter().any(|l| l == "ERROR :going away"));
    }
}
