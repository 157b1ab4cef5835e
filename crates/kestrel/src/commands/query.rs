//! Informational verbs: `WHOIS`, `AWAY`, `VERSION`, `MOTD`.

use std::sync::Arc;

use kestrel_protocol::Numeric;
use kestrel_session::Client;

use crate::commands::channel_peers;
use crate::commands::registration::send_motd;
use crate::dispatch::{Context, Dispatcher};
use crate::federation;
use crate::CommandError;

pub(crate) fn register(dispatcher: &mut Dispatcher) {
    dispatcher.on_client("WHOIS", whois);
    dispatcher.on_client("AWAY", away);
    dispatcher.on_client("VERSION", version);
    dispatcher.on_client("MOTD", motd);
}

fn whois(ctx: &Context<'_>, client: &Arc<Client>) -> Result<bool, CommandError> {
    ctx.require(0)?;
    // `WHOIS server nick` and `WHOIS nick` both name the user last.
    let nick = ctx.msg.arg(ctx.msg.arg_count() - 1).unwrap_or_default();
    let state = ctx.server;

    let Some(target) = state.directory.resolve(nick) else {
        ctx.reply(Numeric::ErrNoSuchNick, &format!("{nick} :No such nick/channel"));
        ctx.reply(Numeric::RplEndOfWhois, &format!("{nick} :End of /WHOIS list."));
        return Ok(true);
    };
    let name = target.nick_or_star();

    ctx.reply(
        Numeric::RplWhoisUser,
        &format!(
            "{name} {} {} * :{}",
            target.ident().unwrap_or_default(),
            target.host(),
            target.realname()
        ),
    );

    let channels: Vec<String> = state
        .channels
        .channels_of(target.id())
        .into_iter()
        .filter(|c| !c.has_mode('s') || c.is_member(client.id()))
        .map(|c| {
            let symbol = c.status(target.id()).symbol();
            format!("{}{}", symbol.map(String::from).unwrap_or_default(), c.name())
        })
        .collect();
    if !channels.is_empty() {
        ctx.reply(
            Numeric::RplWhoisChannels,
            &format!("{name} :{}", channels.join(" ")),
        );
    }

    let (server, description) = match target.origin() {
        Some(peer) => (peer.name().unwrap_or_default(), peer.description()),
        None => (
            state.host().to_owned(),
            state.config().server.description.clone(),
        ),
    };
    ctx.reply(
        Numeric::RplWhoisServer,
        &format!("{name} {server} :{description}"),
    );

    if target.is_oper() {
        ctx.reply(Numeric::RplWhoisOperator, &format!("{name} :is an IRC operator"));
    }
    if target.is_secure() {
        ctx.reply(
            Numeric::RplWhoisSecure,
            &format!("{name} :is using a secure connection"),
        );
    }
    if let Some(away) = target.away() {
        ctx.reply(Numeric::RplAway, &format!("{name} :{away}"));
    }
    if target.is_local() {
        ctx.reply(
            Numeric::RplWhoisIdle,
            &format!(
                "{name} {} {} :seconds idle, signon time",
                target.idle().as_secs(),
                target.signon()
            ),
        );
    }
    ctx.reply(Numeric::RplEndOfWhois, &format!("{name} :End of /WHOIS list."));
    Ok(true)
}

fn away(ctx: &Context<'_>, client: &Arc<Client>) -> Result<bool, CommandError> {
    let state = ctx.server;
    let message = ctx.msg.arg(0).filter(|m| !m.is_empty());

    client.set_away(message.map(str::to_owned));
    match message {
        Some(_) => ctx.reply(Numeric::RplNowAway, ":You have been marked as being away"),
        None => ctx.reply(Numeric::RplUnAway, ":You are no longer marked as being away"),
    }

    let suffix = message.map(|m| format!(" :{m}")).unwrap_or_default();
    let notice = format!(":{} AWAY{suffix}", client.mask());
    for peer in channel_peers(state, client) {
        if peer.has_cap("away-notify") {
            peer.send(notice.as_str());
        }
    }
    if let Some(uuid) = client.uuid() {
        federation::propagate(state, client, &format!(":{uuid} AWAY{suffix}"));
    }
    Ok(true)
}

fn version(ctx: &Context<'_>, _client: &Arc<Client>) -> Result<bool, CommandError> {
    ctx.reply(
        Numeric::RplVersion,
        &format!(
            "kestrel-{}. {} :Kestrel IRC daemon",
            env!("CARGO_PKG_VERSION"),
            ctx.server.host()
        ),
    );
    Ok(true)
}

fn motd(ctx: &Context<'_>, client: &Arc<Client>) -> Result<bool, CommandError> {
    send_motd(ctx.server, client);
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{drain, registered_client, remote_client, send, test_peer, test_state};

    // =====================================================================
    // WHOIS
    // =====================================================================

    #[test]
    fn test_whois_local_user() {
        let state = test_state();
        let (alice, mut rx) = registered_client(&state, "alice");
        let (bob, _b) = registered_client(&state, "bob");
        send(&state, &bob, "JOIN #rust");
        send(&state, &alice, "WHOIS bob");

        let lines = drain(&mut rx);
        assert_eq!(lines[0], ":irc.test 311 alice bob bob 127.0.0.1 * :Test User");
        assert_eq!(lines[1], ":irc.test 319 alice bob :@#rust");
        assert!(lines[2].starts_with(":irc.test 312 alice bob irc.test :"));
        assert!(lines[3].starts_with(":irc.test 317 alice bob "));
        assert_eq!(lines[4], ":irc.test 318 alice bob :End of /WHOIS list.");
    }

    #[test]
    fn test_whois_remote_user_names_its_server() {
        let state = test_state();
        let (peer, _link) = test_peer(&state, "hub.test", "002");
        remote_client(&state, &peer, "002AAAAAA", "carol");
        let (alice, mut rx) = registered_client(&state, "alice");
        send(&state, &alice, "WHOIS carol");

        let lines = drain(&mut rx);
        assert_eq!(
            lines,
            vec![
                ":irc.test 311 alice carol carol remote.host * :Remote User",
                ":irc.test 312 alice carol hub.test :test link",
                ":irc.test 318 alice carol :End of /WHOIS list.",
            ]
        );
    }

    #[test]
    fn test_whois_unknown_nick() {
        let state = test_state();
        let (alice, mut rx) = registered_client(&state, "alice");
        send(&state, &alice, "WHOIS ghost");
        assert_eq!(
            drain(&mut rx),
            vec![
                ":irc.test 401 alice ghost :No such nick/channel",
                ":irc.test 318 alice ghost :End of /WHOIS list.",
            ]
        );
    }

    // =====================================================================
    // AWAY
    // =====================================================================

    #[test]
    fn test_away_set_and_clear() {
        let state = test_state();
        let (alice, mut rx) = registered_client(&state, "alice");
        send(&state, &alice, "AWAY :brb");
        assert_eq!(alice.away().as_deref(), Some("brb"));
        assert_eq!(
            drain(&mut rx),
            vec![":irc.test 306 alice :You have been marked as being away"]
        );
        send(&state, &alice, "AWAY");
        assert_eq!(alice.away(), None);
        assert_eq!(
            drain(&mut rx),
            vec![":irc.test 305 alice :You are no longer marked as being away"]
        );
    }

    #[test]
    fn test_away_notify_only_to_capable_peers() {
        let state = test_state();
        let (alice, _a) = registered_client(&state, "alice");
        let (bob, mut bob_rx) = registered_client(&state, "bob");
        let (carol, mut carol_rx) = registered_client(&state, "carol");
        bob.cap_request("away-notify");
        for c in [&alice, &bob, &carol] {
            send(&state, c, "JOIN #rust");
        }
        drain(&mut bob_rx);
        drain(&mut carol_rx);

        send(&state, &alice, "AWAY :gone fishing");

        assert_eq!(
            drain(&mut bob_rx),
            vec![":alice!alice@127.0.0.1 AWAY :gone fishing"]
        );
        assert!(drain(&mut carol_rx).is_empty());
    }

    #[test]
    fn test_version_reply() {
        let state = test_state();
        let (alice, mut rx) = registered_client(&state, "alice");
        send(&state, &alice, "VERSION");
        let lines = drain(&mut rx);
        assert!(lines[0].starts_with(":irc.test 351 alice kestrel-"));
        assert!(lines[0].ends_with("irc.test :Kestrel IRC daemon"));
    }
}
