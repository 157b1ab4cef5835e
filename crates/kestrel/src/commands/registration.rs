//! Registration and liveness verbs: `NICK`, `USER`, `CAP`, `PING`, `PONG`,
//! `QUIT`, plus the welcome burst and `MOTD`.

use std::sync::Arc;

use chrono::Utc;
use kestrel_channel::mode::{chanmodes_isupport, prefix_isupport, CATALOGUE};
use kestrel_protocol::Numeric;
use kestrel_session::{CapReply, Client, SUPPORTED_CAPS};

use crate::commands::channel_peers;
use crate::connection::disconnect_client;
use crate::dispatch::{Context, Dispatcher};
use crate::federation;
use crate::server::ServerState;
use crate::CommandError;

pub(crate) fn register(dispatcher: &mut Dispatcher) {
    dispatcher.on_client("NICK", nick);
    dispatcher.on_client("USER", user);
    dispatcher.on_client("CAP", cap);
    dispatcher.on_client("PING", ping);
    dispatcher.on_client("PONG", pong);
    dispatcher.on_client("QUIT", quit);
}

// ---------------------------------------------------------------------------
// NICK / USER
// ---------------------------------------------------------------------------

fn nick(ctx: &Context<'_>, client: &Arc<Client>) -> Result<bool, CommandError> {
    let new = ctx.require(0)?;
    change_nick(ctx.server, client, new, ctx.force)?;
    try_complete_registration(ctx.server, client);
    Ok(true)
}

/// Gives `client` the nickname `nick`.
///
/// Before registration this only claims the name. Afterwards the change
/// is shown to the client and everyone sharing a channel with it, and
/// announced to the linked servers. `force` skips the syntax check (the
/// name came from a linked server).
pub(crate) fn change_nick(
    state: &Arc<ServerState>,
    client: &Arc<Client>,
    nick: &str,
    force: bool,
) -> Result<(), CommandError> {
    let old_mask = client.mask();
    let old = if force {
        state.directory.force_nick(client, nick)?
    } else {
        state.directory.claim_nick(client, nick)?
    };
    if !client.is_registered() || old.as_deref() == Some(nick) {
        return Ok(());
    }

    let line = format!(":{old_mask} NICK :{nick}");
    client.send(line.as_str());
    for peer in channel_peers(state, client) {
        peer.send(line.as_str());
    }
    if let Some(uuid) = client.uuid() {
        federation::propagate(
            state,
            client,
            &format!(":{uuid} NICK {nick} {}", Utc::now().timestamp()),
        );
    }
    tracing::debug!(conn_id = %client.id(), old = ?old, new = %nick, "nick changed");
    Ok(())
}

fn user(ctx: &Context<'_>, client: &Arc<Client>) -> Result<bool, CommandError> {
    if ctx.msg.arg_count() < 4 {
        return Err(CommandError::NeedMoreParams("USER".into()));
    }
    let ident = ctx.require(0)?;
    let realname = ctx.msg.arg(3).unwrap_or_default();
    client.set_user(ident, realname)?;
    try_complete_registration(ctx.server, client);
    Ok(true)
}

/// Finishes registration if the client is ready: assigns its UUID, sends
/// the welcome burst and introduces it to the network. Returns `true` on
/// the call that did so.
pub(crate) fn try_complete_registration(state: &Arc<ServerState>, client: &Arc<Client>) -> bool {
    if !client.try_register() {
        return false;
    }
    client.set_uuid(format!("{}{}", state.sid(), state.uids.next()));
    state.directory.register_uuid(client);
    send_welcome(state, client);
    federation::introduce(state, client);
    true
}

// ---------------------------------------------------------------------------
// Welcome burst
// ---------------------------------------------------------------------------

fn send_welcome(state: &ServerState, client: &Client) {
    let host = state.host();
    let nick = client.nick_or_star();
    let network = &state.config().server.network;
    let version = concat!("kestrel-", env!("CARGO_PKG_VERSION"));
    let chan_letters: String = CATALOGUE.iter().map(|d| d.ch).collect();

    let reply = |numeric: Numeric, rest: &str| {
        client.send(numeric.reply(host, &nick, rest));
    };
    reply(
        Numeric::RplWelcome,
        &format!(":Welcome to the {network} IRC Network {}", client.mask()),
    );
    reply(
        Numeric::RplYourHost,
        &format!(":Your host is {host}, running version {version}"),
    );
    reply(
        Numeric::RplCreated,
        &format!(":This server was created {}", state.created().to_rfc2822()),
    );
    reply(Numeric::RplMyInfo, &format!("{host} {version} ioz {chan_letters}"));
    reply(
        Numeric::RplISupport,
        &format!(
            "CASEMAPPING=rfc1459 PREFIX={} STATUSMSG={} NETWORK={network} MAXTARGETS={} :are supported by this server",
            prefix_isupport(),
            status_symbols(),
            state.config().limits.max_targets,
        ),
    );
    reply(
        Numeric::RplISupport,
        &format!(
            "CHANTYPES=# CHANMODES={} :are supported by this server",
            chanmodes_isupport()
        ),
    );
    send_motd(state, client);
}

/// The symbol half of `PREFIX=`.
fn status_symbols() -> String {
    let prefix = prefix_isupport();
    prefix
        .split_once(')')
        .map(|(_, symbols)| symbols.to_owned())
        .unwrap_or_default()
}

/// Sends the message of the day, or 422 when none is configured.
pub(crate) fn send_motd(state: &ServerState, client: &Client) {
    let host = state.host();
    let nick = client.nick_or_star();
    let motd = &state.config().server.motd;
    if motd.is_empty() {
        client.send(Numeric::ErrNoMotd.reply(host, &nick, ":MOTD File is missing"));
        return;
    }
    client.send(Numeric::RplMotdStart.reply(host, &nick, &format!(":- {host} Message of the day -")));
    for line in motd {
        client.send(Numeric::RplMotd.reply(host, &nick, &format!(":- {line}")));
    }
    client.send(Numeric::RplEndOfMotd.reply(host, &nick, ":End of /MOTD command."));
}

// ---------------------------------------------------------------------------
// CAP
// ---------------------------------------------------------------------------

fn cap(ctx: &Context<'_>, client: &Arc<Client>) -> Result<bool, CommandError> {
    let sub = ctx.require(0)?.to_ascii_uppercase();
    let host = ctx.server.host();
    let nick = client.nick_or_star();
    match sub.as_str() {
        "LS" => {
            client.cap_stall();
            client.send(format!(":{host} CAP {nick} LS :{}", SUPPORTED_CAPS.join(" ")));
        }
        "REQ" => {
            client.cap_stall();
            let list = ctx.msg.arg(1).unwrap_or_default();
            let verdict = match client.cap_request(list) {
                CapReply::Ack => "ACK",
                CapReply::Nak => "NAK",
            };
            client.send(format!(":{host} CAP {nick} {verdict} :{list}"));
        }
        "LIST" => {
            client.send(format!(":{host} CAP {nick} LIST :{}", client.caps_list()));
        }
        "END" => {
            client.cap_end();
            try_complete_registration(ctx.server, client);
        }
        _ => {
            client.cap_end();
            try_complete_registration(ctx.server, client);
            return Err(CommandError::InvalidCapCommand(sub));
        }
    }
    Ok(true)
}

// ---------------------------------------------------------------------------
// PING / PONG / QUIT
// ---------------------------------------------------------------------------

fn ping(ctx: &Context<'_>, client: &Arc<Client>) -> Result<bool, CommandError> {
    let token = ctx.require(0)?;
    let host = ctx.server.host();
    client.send(format!(":{host} PONG {host} :{token}"));
    Ok(true)
}

fn pong(ctx: &Context<'_>, client: &Arc<Client>) -> Result<bool, CommandError> {
    let cookie = ctx
        .msg
        .trailer
        .as_deref()
        .or_else(|| ctx.msg.arg(0))
        .unwrap_or_default();
    if !client.pong(cookie) {
        tracing::trace!(conn_id = %client.id(), "unexpected pong cookie");
    }
    Ok(true)
}

fn quit(ctx: &Context<'_>, client: &Arc<Client>) -> Result<bool, CommandError> {
    let reason = ctx.msg.arg(0).filter(|r| !r.is_empty()).unwrap_or("Client Quit");
    disconnect_client(ctx.server, client, reason, client.is_local());
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{drain, local_client, registered_client, send, test_peer, test_state};

    // =====================================================================
    // Registration
    // =====================================================================

    #[test]
    fn test_nick_and_user_complete_registration_with_welcome() {
        let state = test_state();
        let (client, mut rx) = local_client(&state);
        send(&state, &client, "NICK alice");
        assert!(!client.is_registered());
        send(&state, &client, "USER alice 0 * :Alice Liddell");
        assert!(client.is_registered());
        assert_eq!(client.uuid().as_deref(), Some("001AAAAAA"));

        let lines = drain(&mut rx);
        assert!(lines[0].starts_with(":irc.test 001 alice :Welcome to the TestNet IRC Network alice!alice@"));
        assert!(lines.iter().any(|l| l.contains(" 005 alice CASEMAPPING=rfc1459 PREFIX=(qaohv)~&@%+")));
        assert!(lines.iter().any(|l| l.contains(" 005 alice CHANTYPES=# CHANMODES=b,k,l,")));
        assert!(lines.iter().any(|l| l == ":irc.test 422 alice :MOTD File is missing"));
    }

    #[test]
    fn test_nick_erroneous_is_rejected() {
        let state = test_state();
        let (client, mut rx) = local_client(&state);
        send(&state, &client, "NICK 9lives");
        assert_eq!(
            drain(&mut rx),
            vec![":irc.test 432 * 9lives :Erroneous nickname: Illegal characters"]
        );
    }

    #[test]
    fn test_nick_in_use_case_insensitive_is_rejected() {
        let state = test_state();
        let (_alice, _rx) = registered_client(&state, "alice");
        let (client, mut rx) = local_client(&state);
        send(&state, &client, "NICK ALICE");
        assert_eq!(
            drain(&mut rx),
            vec![":irc.test 433 * ALICE :Nickname is already in use"]
        );
    }

    #[test]
    fn test_nick_change_announced_once_per_peer() {
        let state = test_state();
        let (alice, mut alice_rx) = registered_client(&state, "alice");
        let (bob, mut bob_rx) = registered_client(&state, "bob");
        for name in ["#a", "#b"] {
            state.channels.join(&alice, name, None).unwrap();
            state.channels.join(&bob, name, None).unwrap();
        }
        drain(&mut alice_rx);
        drain(&mut bob_rx);

        send(&state, &alice, "NICK alicia");

        let expected = ":alice!alice@127.0.0.1 NICK :alicia";
        assert_eq!(drain(&mut alice_rx), vec![expected]);
        assert_eq!(drain(&mut bob_rx), vec![expected]);
        assert!(state.directory.by_nick("alice").is_none());
        assert_eq!(state.directory.by_nick("alicia").unwrap().id(), alice.id());
    }

    #[test]
    fn test_nick_change_propagated_to_links() {
        let state = test_state();
        let (_peer, mut link_rx) = test_peer(&state, "hub.test", "002");
        let (alice, _rx) = registered_client(&state, "alice");
        drain(&mut link_rx);

        send(&state, &alice, "NICK alicia");

        let lines = drain(&mut link_rx);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with(":001AAAAAA NICK alicia "));
    }

    #[test]
    fn test_user_after_registration_is_already_registered() {
        let state = test_state();
        let (alice, mut rx) = registered_client(&state, "alice");
        send(&state, &alice, "USER again 0 * :Again");
        assert_eq!(drain(&mut rx), vec![":irc.test 462 alice :You may not reregister"]);
    }

    #[test]
    fn test_user_short_is_need_more_params() {
        let state = test_state();
        let (client, mut rx) = local_client(&state);
        send(&state, &client, "USER alice 0");
        assert_eq!(drain(&mut rx), vec![":irc.test 461 * USER :Not enough parameters"]);
    }

    #[test]
    fn test_registration_introduces_user_to_links() {
        let state = test_state();
        let (_peer, mut link_rx) = test_peer(&state, "hub.test", "002");
        let (_alice, _rx) = registered_client(&state, "alice");
        let lines = drain(&mut link_rx);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with(":001 UID 001AAAAAA "));
        assert!(lines[0].ends_with(":Test User"));
    }

    // =====================================================================
    // CAP
    // =====================================================================

    #[test]
    fn test_cap_ls_holds_registration_until_end() {
        let state = test_state();
        let (client, mut rx) = local_client(&state);
        send(&state, &client, "CAP LS 302");
        send(&state, &client, "NICK alice");
        send(&state, &client, "USER alice 0 * :Alice");
        assert!(!client.is_registered());
        send(&state, &client, "CAP REQ :multi-prefix server-time");
        send(&state, &client, "CAP END");
        assert!(client.is_registered());

        let lines = drain(&mut rx);
        assert_eq!(lines[0], ":irc.test CAP * LS :away-notify multi-prefix server-time");
        assert_eq!(lines[1], ":irc.test CAP alice ACK :multi-prefix server-time");
        assert!(client.has_cap("server-time"));
    }

    #[test]
    fn test_cap_req_unknown_is_nak() {
        let state = test_state();
        let (client, mut rx) = local_client(&state);
        send(&state, &client, "CAP REQ :multi-prefix bogus");
        assert_eq!(drain(&mut rx), vec![":irc.test CAP * NAK :multi-prefix bogus"]);
        assert!(!client.has_cap("multi-prefix"));
    }

    #[test]
    fn test_cap_req_already_enabled_is_acked() {
        let state = test_state();
        let (client, mut rx) = local_client(&state);
        send(&state, &client, "CAP REQ :multi-prefix");
        send(&state, &client, "CAP REQ :multi-prefix");
        let lines = drain(&mut rx);
        assert_eq!(lines[1], ":irc.test CAP * ACK :multi-prefix");
    }

    #[test]
    fn test_cap_unknown_subcommand_unstalls_and_fails() {
        let state = test_state();
        let (client, mut rx) = local_client(&state);
        send(&state, &client, "CAP LS");
        send(&state, &client, "NICK alice");
        send(&state, &client, "USER alice 0 * :Alice");
        drain(&mut rx);
        send(&state, &client, "CAP FROB");
        assert!(client.is_registered());
        let lines = drain(&mut rx);
        assert_eq!(lines.last().unwrap(), ":irc.test 410 alice FROB :Invalid CAP command");
    }

    // =====================================================================
    // PING / QUIT
    // =====================================================================

    #[test]
    fn test_ping_replies_with_pong() {
        let state = test_state();
        let (client, mut rx) = local_client(&state);
        send(&state, &client, "PING :abc123");
        assert_eq!(drain(&mut rx), vec![":irc.test PONG irc.test :abc123"]);
    }

    #[test]
    fn test_quit_default_reason() {
        let state = test_state();
        let (alice, mut rx) = registered_client(&state, "alice");
        send(&state, &alice, "QUIT");
        assert!(alice.is_disconnecting());
        assert_eq!(drain(&mut rx), vec![":alice!alice@127.0.0.1 QUIT :Client Quit"]);
    }
}
