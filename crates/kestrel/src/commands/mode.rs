//! `MODE` for channels and users.

use std::sync::Arc;

use kestrel_channel::mode::{descriptor, format_changes, parse_changes};
use kestrel_channel::{Channel, ModeCategory, ModeChange, ModeOptions, ModeOutcome, ModeValue};
use kestrel_protocol::Numeric;
use kestrel_session::{Client, ConnectionId};

use crate::commands::report;
use crate::dispatch::{Context, Dispatcher};
use crate::federation::translate;
use crate::server::ServerState;
use crate::CommandError;

pub(crate) fn register(dispatcher: &mut Dispatcher) {
    dispatcher.on_client("MODE", mode);
}

fn mode(ctx: &Context<'_>, client: &Arc<Client>) -> Result<bool, CommandError> {
    let target = ctx.require(0)?;
    if target.starts_with('#') {
        channel_mode(ctx, client, target)
    } else {
        user_mode(ctx, client, target)
    }
}

// ---------------------------------------------------------------------------
// Channel modes
// ---------------------------------------------------------------------------

fn channel_mode(
    ctx: &Context<'_>,
    client: &Arc<Client>,
    name: &str,
) -> Result<bool, CommandError> {
    let state = ctx.server;
    let channel = state
        .channels
        .get(name)
        .ok_or_else(|| CommandError::NoSuchChannel(name.to_owned()))?;

    let Some(modes) = ctx.msg.arg(1) else {
        ctx.reply(
            Numeric::RplChannelModeIs,
            &format!("{} {}", channel.name(), channel.mode_strings('+')),
        );
        ctx.reply(
            Numeric::RplCreationTime,
            &format!("{} {}", channel.name(), channel.created()),
        );
        return Ok(true);
    };

    let args = ctx.msg.args_from(2);
    let (changes, parse_errors) = parse_changes(modes, &args);
    for err in parse_errors {
        report(state, client, &err.into());
    }

    let mut listed = false;
    for change in &changes {
        let is_query = change.arg.is_none()
            && descriptor(change.ch).is_some_and(|d| d.category == ModeCategory::List);
        if is_query && !listed {
            send_list(ctx, &channel, change.ch);
            listed = true;
        }
    }

    let source = client.mask();
    let outcome = apply_channel_modes(
        state,
        Some(client),
        &source,
        &channel,
        &changes,
        ctx.force,
        client.origin().map(|p| p.id()),
    );
    for err in outcome.errors {
        report(state, client, &err.into());
    }
    Ok(true)
}

fn send_list(ctx: &Context<'_>, channel: &Channel, ch: char) {
    if let ModeValue::List(masks) = channel.mode_value(ch) {
        for mask in masks {
            ctx.reply(Numeric::RplBanList, &format!("{} {mask}", channel.name()));
        }
    }
    ctx.reply(
        Numeric::RplEndOfBanList,
        &format!("{} :End of channel ban list", channel.name()),
    );
}

/// Applies `changes` to `channel` and forwards whatever took effect to
/// every link except `except`, as an `FMODE` with per-user arguments
/// translated to UUIDs.
pub(crate) fn apply_channel_modes(
    state: &ServerState,
    setter: Option<&Arc<Client>>,
    source: &str,
    channel: &Channel,
    changes: &[ModeChange],
    force: bool,
    except: Option<ConnectionId>,
) -> ModeOutcome {
    let opts = if force {
        ModeOptions::forced()
    } else {
        ModeOptions::default()
    };
    let outcome = channel.apply_modes(setter, source, &state.directory, changes, opts);
    if outcome.applied.is_empty() {
        return outcome;
    }

    let wire: Vec<ModeChange> = outcome
        .applied
        .iter()
        .map(|change| {
            let per_user = descriptor(change.ch)
                .is_some_and(|d| d.category == ModeCategory::PerUser);
            let arg = match (&change.arg, per_user) {
                (Some(nick), true) => Some(translate::nick_to_uuid(state, nick)),
                (arg, _) => arg.clone(),
            };
            ModeChange {
                adding: change.adding,
                ch: change.ch,
                arg,
            }
        })
        .collect();
    let (modes, params) = format_changes(&wire);

    let origin = setter
        .and_then(|s| s.uuid())
        .unwrap_or_else(|| state.sid().to_owned());
    let mut line = format!(
        ":{origin} FMODE {} {} {modes}",
        channel.name(),
        channel.created()
    );
    for p in params {
        line.push(' ');
        line.push_str(&p);
    }
    state.send_to_links(&line, except);
    outcome
}

// ---------------------------------------------------------------------------
// User modes
// ---------------------------------------------------------------------------

fn user_mode(ctx: &Context<'_>, client: &Arc<Client>, nick: &str) -> Result<bool, CommandError> {
    let target = ctx
        .server
        .directory
        .by_nick(nick)
        .ok_or_else(|| CommandError::NoSuchNick(nick.to_owned()))?;
    if target.id() != client.id() {
        return Err(CommandError::UsersDontMatch);
    }

    let Some(modes) = ctx.msg.arg(1) else {
        ctx.reply(Numeric::RplUModeIs, &client.mode_string());
        return Ok(true);
    };

    let mut adding = true;
    let mut applied = String::new();
    let mut sign = None;
    for ch in modes.chars() {
        match ch {
            '+' => adding = true,
            '-' => adding = false,
            'i' => {
                if client.set_mode('i', adding) {
                    if sign != Some(adding) {
                        applied.push(if adding { '+' } else { '-' });
                        sign = Some(adding);
                    }
                    applied.push('i');
                }
            }
            // Operator and secure flags are not user-settable.
            'o' | 'z' => {}
            other => report(ctx.server, client, &CommandError::UnknownMode(other)),
        }
    }
    if !applied.is_empty() {
        let nick = client.nick_or_star();
        client.send(format!(":{nick} MODE {nick} :{applied}"));
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{drain, registered_client, remote_client, send, test_peer, test_state};
    use kestrel_channel::Privilege;

    // =====================================================================
    // Channel MODE
    // =====================================================================

    #[test]
    fn test_mode_query_reports_modes_and_creation() {
        let state = test_state();
        let (alice, mut rx) = registered_client(&state, "alice");
        send(&state, &alice, "JOIN #rust");
        drain(&mut rx);
        send(&state, &alice, "MODE #rust");

        let created = state.channels.get("#rust").unwrap().created();
        assert_eq!(
            drain(&mut rx),
            vec![
                ":irc.test 324 alice #rust +nt".to_owned(),
                format!(":irc.test 329 alice #rust {created}"),
            ]
        );
    }

    #[test]
    fn test_mode_voice_broadcasts_once_to_room() {
        let state = test_state();
        let (alice, mut alice_rx) = registered_client(&state, "alice");
        let (bob, mut bob_rx) = registered_client(&state, "bob");
        send(&state, &alice, "JOIN #rust");
        send(&state, &bob, "JOIN #rust");
        drain(&mut alice_rx);
        drain(&mut bob_rx);

        send(&state, &alice, "MODE #rust +v bob");

        let line = ":alice!alice@127.0.0.1 MODE #rust +v bob";
        assert_eq!(drain(&mut alice_rx), vec![line]);
        assert_eq!(drain(&mut bob_rx), vec![line]);
        let channel = state.channels.get("#rust").unwrap();
        assert_eq!(channel.status(bob.id()), Privilege::Voice);
    }

    #[test]
    fn test_mode_combined_changes_share_one_line() {
        let state = test_state();
        let (alice, mut rx) = registered_client(&state, "alice");
        send(&state, &alice, "JOIN #rust");
        drain(&mut rx);
        send(&state, &alice, "MODE #rust +kl secret 10");
        assert_eq!(
            drain(&mut rx),
            vec![":alice!alice@127.0.0.1 MODE #rust +kl secret 10"]
        );
        assert_eq!(
            state.channels.get("#rust").unwrap().mode_strings('+'),
            "+klnt secret 10"
        );
    }

    #[test]
    fn test_mode_without_privilege_is_refused() {
        let state = test_state();
        let (alice, _a) = registered_client(&state, "alice");
        let (bob, mut bob_rx) = registered_client(&state, "bob");
        send(&state, &alice, "JOIN #rust");
        send(&state, &bob, "JOIN #rust");
        drain(&mut bob_rx);
        send(&state, &bob, "MODE #rust +i");
        assert_eq!(
            drain(&mut bob_rx),
            vec![":irc.test 482 bob #rust :You're not channel operator"]
        );
        assert!(!state.channels.get("#rust").unwrap().has_mode('i'));
    }

    #[test]
    fn test_mode_unknown_char_reported() {
        let state = test_state();
        let (alice, mut rx) = registered_client(&state, "alice");
        send(&state, &alice, "JOIN #rust");
        drain(&mut rx);
        send(&state, &alice, "MODE #rust +X");
        assert_eq!(
            drain(&mut rx),
            vec![":irc.test 472 alice X :is unknown mode char to me"]
        );
    }

    #[test]
    fn test_mode_ban_list_query() {
        let state = test_state();
        let (alice, mut rx) = registered_client(&state, "alice");
        send(&state, &alice, "JOIN #rust");
        send(&state, &alice, "MODE #rust +b troll!*@*");
        drain(&mut rx);
        send(&state, &alice, "MODE #rust +b");
        assert_eq!(
            drain(&mut rx),
            vec![
                ":irc.test 367 alice #rust troll!*@*",
                ":irc.test 368 alice #rust :End of channel ban list",
            ]
        );
    }

    #[test]
    fn test_mode_per_user_forwarded_with_uuid() {
        let state = test_state();
        let (peer, mut link_rx) = test_peer(&state, "hub.test", "002");
        let carol = remote_client(&state, &peer, "002AAAAAA", "carol");
        let (alice, _rx) = registered_client(&state, "alice");
        send(&state, &alice, "JOIN #rust");
        state.channels.force_join(&carol, "#rust").unwrap();
        drain(&mut link_rx);

        send(&state, &alice, "MODE #rust +o carol");

        let created = state.channels.get("#rust").unwrap().created();
        assert_eq!(
            drain(&mut link_rx),
            vec![format!(":001AAAAAA FMODE #rust {created} +o 002AAAAAA")]
        );
    }

    // =====================================================================
    // User MODE
    // =====================================================================

    #[test]
    fn test_user_mode_query_and_set_invisible() {
        let state = test_state();
        let (alice, mut rx) = registered_client(&state, "alice");
        send(&state, &alice, "MODE alice +i");
        assert_eq!(drain(&mut rx), vec![":alice MODE alice :+i"]);
        send(&state, &alice, "MODE alice");
        assert_eq!(drain(&mut rx), vec![":irc.test 221 alice +i"]);
        send(&state, &alice, "MODE alice +i");
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_user_mode_other_user_refused() {
        let state = test_state();
        let (alice, mut rx) = registered_client(&state, "alice");
        let (_bob, _b) = registered_client(&state, "bob");
        send(&state, &alice, "MODE bob +i");
        assert_eq!(
            drain(&mut rx),
            vec![":irc.test 502 alice :Cant change mode for other users"]
        );
    }
}
