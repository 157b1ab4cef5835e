//! Nickname ↔ UUID translation at the link boundary.
//!
//! Links only ever see UUIDs for users; local clients only ever see
//! nicknames. Server names and SIDs pass through untouched in both
//! directions.

use kestrel_protocol::{is_uuid, Message};

use crate::server::ServerState;

fn is_server(state: &ServerState, token: &str) -> bool {
    token == state.host() || token == state.sid()
}

/// The UUID for `token` if it names a known user, otherwise `token`.
pub(crate) fn nick_to_uuid(state: &ServerState, token: &str) -> String {
    if is_server(state, token) {
        return token.to_owned();
    }
    state
        .directory
        .by_nick(token)
        .and_then(|c| c.uuid())
        .unwrap_or_else(|| token.to_owned())
}

/// The nickname for `token` if it is a known UUID, otherwise `token`.
pub(crate) fn uuid_to_nick(state: &ServerState, token: &str) -> String {
    if is_server(state, token) || !is_uuid(token) {
        return token.to_owned();
    }
    state
        .directory
        .by_uuid(token)
        .and_then(|c| c.nick())
        .unwrap_or_else(|| token.to_owned())
}

/// `msg` with every UUID among its middle parameters replaced by the
/// owner's nickname. The prefix and trailer are kept as they are.
pub(crate) fn to_local(state: &ServerState, msg: &Message) -> Message {
    let params = msg.params.iter().map(|p| uuid_to_nick(state, p)).collect();
    msg.rewritten(&msg.verb, params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{registered_client, remote_client, test_peer, test_state};

    #[test]
    fn test_nick_to_uuid_known_user() {
        let state = test_state();
        let (_alice, _rx) = registered_client(&state, "alice");
        assert_eq!(nick_to_uuid(&state, "Alice"), "001AAAAAA");
    }

    #[test]
    fn test_nick_to_uuid_unknown_passes_through() {
        let state = test_state();
        assert_eq!(nick_to_uuid(&state, "ghost"), "ghost");
        assert_eq!(nick_to_uuid(&state, "irc.test"), "irc.test");
    }

    #[test]
    fn test_uuid_to_nick_known_and_unknown() {
        let state = test_state();
        let (peer, _link) = test_peer(&state, "hub.test", "002");
        remote_client(&state, &peer, "002AAAAAA", "carol");
        assert_eq!(uuid_to_nick(&state, "002AAAAAA"), "carol");
        assert_eq!(uuid_to_nick(&state, "002ZZZZZZ"), "002ZZZZZZ");
        assert_eq!(uuid_to_nick(&state, "001"), "001");
    }

    #[test]
    fn test_to_local_rewrites_params_only() {
        let state = test_state();
        let (_alice, _rx) = registered_client(&state, "alice");
        let msg = Message::parse(":002AAAAAA KICK #rust 001AAAAAA :001AAAAAA").unwrap();
        let local = to_local(&state, &msg);
        assert_eq!(local.prefix.as_deref(), Some("002AAAAAA"));
        assert_eq!(local.params, vec!["#rust", "alice"]);
        assert_eq!(local.trailer.as_deref(), Some("001AAAAAA"));
    }
}
