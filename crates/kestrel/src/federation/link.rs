//! Handlers for verbs arriving over a server link.
//!
//! Everything here runs with the link as the caller. State a link
//! describes (users, memberships, modes) is applied forcibly: the remote
//! server already checked privileges. User-level verbs are translated to
//! nicknames and re-dispatched through the client handlers on behalf of
//! the remote user.

use std::sync::Arc;

use kestrel_channel::mode::parse_changes;
use kestrel_channel::{ChannelError, ModeOptions};
use kestrel_protocol::{is_sid, is_uuid};
use kestrel_session::{Client, ConnectionId, Peer, RemoteIdentity};

use crate::commands::mode::apply_channel_modes;
use crate::commands::registration::change_nick;
use crate::connection::{disconnect_client, disconnect_peer};
use crate::dispatch::{Caller, Context, Dispatcher};
use crate::federation::{burst, send_capab, translate};
use crate::CommandError;

/// User verbs a link may relay on a remote user's behalf.
const RELAYED: &[&str] = &[
    "PRIVMSG", "NOTICE", "NICK", "PART", "KICK", "TOPIC", "INVITE", "AWAY",
];

pub(crate) fn register(dispatcher: &mut Dispatcher) {
    dispatcher.on_peer("CAPAB", capab);
    dispatcher.on_peer("SERVER", server);
    dispatcher.on_peer("UID", uid);
    dispatcher.on_peer("FJOIN", fjoin);
    dispatcher.on_peer("FMODE", fmode);
    dispatcher.on_peer("QUIT", quit);
    dispatcher.on_peer("SQUIT", squit);
    dispatcher.on_peer("SVSNICK", svsnick);
    dispatcher.on_peer("PING", ping);
    dispatcher.on_peer("PONG", pong);
    dispatcher.on_peer("BURST", burst_marker);
    dispatcher.on_peer("ENDBURST", burst_marker);
    dispatcher.on_peer("ERROR", error);
    for verb in RELAYED {
        dispatcher.on_peer(verb, relay);
    }
}

fn link_name(peer: &Peer) -> String {
    peer.name()
        .or_else(|| peer.sid())
        .unwrap_or_else(|| peer.id().to_string())
}

/// The remote user named by the line's prefix, if it was introduced by
/// this link.
fn remote_source(ctx: &Context<'_>, peer: &Peer) -> Option<Arc<Client>> {
    let prefix = ctx.msg.prefix.as_deref()?;
    if !is_uuid(prefix) {
        return None;
    }
    ctx.server
        .directory
        .by_uuid(prefix)
        .filter(|c| c.origin().is_some_and(|o| o.id() == peer.id()))
}

// ---------------------------------------------------------------------------
// Handshake
// ---------------------------------------------------------------------------

fn capab(ctx: &Context<'_>, peer: &Arc<Peer>) -> Result<bool, CommandError> {
    match ctx.msg.arg(0).map(str::to_ascii_uppercase).as_deref() {
        Some("START") => {
            if peer.mark_capab_sent() {
                send_capab(peer);
            }
        }
        sub => tracing::trace!(conn_id = %peer.id(), ?sub, "capab"),
    }
    Ok(true)
}

fn server(ctx: &Context<'_>, peer: &Arc<Peer>) -> Result<bool, CommandError> {
    let state = ctx.server;
    if peer.is_authenticated() {
        tracing::debug!(link = %link_name(peer), "SERVER from an authenticated link ignored");
        return Ok(false);
    }

    let malformed = || CommandError::LinkRefused("Malformed SERVER line".into());
    let name = ctx.msg.arg(0).ok_or_else(malformed)?;
    let password = ctx.msg.arg(1).ok_or_else(malformed)?;
    let sid = ctx.msg.arg(3).ok_or_else(malformed)?;
    let description = ctx.msg.arg(4).unwrap_or_default();

    state.link_auth.verify(name, password)?;
    if !is_sid(sid) || sid == state.sid() {
        return Err(CommandError::LinkRefused(format!("Invalid SID {sid}")));
    }

    let existing = state.links.get(sid).map(|e| Arc::clone(e.value()));
    if let Some(old) = existing.filter(|old| old.id() != peer.id()) {
        tracing::warn!(%sid, old = %old.id(), new = %peer.id(), "link replaced");
        disconnect_peer(state, &old, "Replaced by a new connection", true);
    }

    if peer.mark_capab_sent() {
        send_capab(peer);
    }
    peer.authenticate(name, sid, description);
    peer.send(format!(
        "SERVER {} {password} 0 {} :{}",
        state.host(),
        state.sid(),
        state.config().server.description
    ));
    state.links.insert(sid.to_owned(), Arc::clone(peer));
    tracing::info!(conn_id = %peer.id(), link = %name, %sid, "link authenticated");

    burst(state, peer);
    Ok(true)
}

// ---------------------------------------------------------------------------
// Burst state
// ---------------------------------------------------------------------------

fn uid(ctx: &Context<'_>, peer: &Arc<Peer>) -> Result<bool, CommandError> {
    let state = ctx.server;
    let params = &ctx.msg.params;
    if params.len() < 9 {
        tracing::warn!(link = %link_name(peer), line = %ctx.msg, "malformed UID skipped");
        return Ok(true);
    }
    let uuid = params[0].as_str();
    if !is_uuid(uuid) || state.directory.by_uuid(uuid).is_some() {
        tracing::warn!(link = %link_name(peer), %uuid, "UID with bad or duplicate UUID skipped");
        return Ok(true);
    }
    let realname = ctx
        .msg
        .trailer
        .clone()
        .or_else(|| params.last().cloned())
        .unwrap_or_default();

    let client = Arc::new(Client::remote(
        ConnectionId::next(),
        Arc::clone(peer),
        RemoteIdentity {
            uuid: uuid.to_owned(),
            nick: params[2].clone(),
            ident: params[5].clone(),
            host: params[4].clone(),
            realname,
            signon: params[7].parse().unwrap_or_default(),
            modes: params[8].clone(),
        },
    ));
    if let Err(e) = state.directory.force_nick(&client, &params[2]) {
        tracing::warn!(link = %link_name(peer), %uuid, error = %e, "UID nick collision; user skipped");
        return Ok(true);
    }
    state.directory.register_uuid(&client);
    tracing::debug!(link = %link_name(peer), %uuid, nick = %params[2], "remote user introduced");

    state.send_to_links(&ctx.msg.to_string(), Some(peer.id()));
    Ok(true)
}

fn fjoin(ctx: &Context<'_>, peer: &Arc<Peer>) -> Result<bool, CommandError> {
    let state = ctx.server;
    let source = link_name(peer);
    let params = &ctx.msg.params;
    if params.len() < 3 {
        tracing::warn!(link = %source, line = %ctx.msg, "malformed FJOIN skipped");
        return Ok(true);
    }
    let name = params[0].as_str();
    // Without a trailer the member list is the last middle parameter.
    let (mode_args, members) = match &ctx.msg.trailer {
        Some(members) => (&params[3..], members.as_str()),
        None if params.len() > 3 => (&params[3..params.len() - 1], params[params.len() - 1].as_str()),
        None => (&params[3..], ""),
    };

    let (channel, created) = match params[1].parse::<i64>() {
        Ok(ts) => state.channels.get_or_create_at(name, ts),
        Err(_) => {
            tracing::warn!(link = %source, channel = %name, ts = %params[1], "bad FJOIN timestamp");
            state.channels.get_or_create(name)
        }
    };
    if created {
        let args: Vec<&str> = mode_args.iter().map(String::as_str).collect();
        let (changes, errors) = parse_changes(&params[2], &args);
        for e in errors {
            tracing::warn!(link = %source, channel = %name, error = %e, "bad burst mode");
        }
        channel.apply_modes(None, &source, &state.directory, &changes, ModeOptions::silent());
    }

    for entry in members.split_whitespace() {
        let Some((letters, uuid)) = entry.split_once(',') else {
            tracing::warn!(link = %source, channel = %name, %entry, "malformed FJOIN entry skipped");
            continue;
        };
        let Some(member) = state.directory.by_uuid(uuid) else {
            tracing::warn!(link = %source, channel = %name, %uuid, "FJOIN for unknown user skipped");
            continue;
        };
        if !member.origin().is_some_and(|p| p.id() == peer.id()) {
            tracing::warn!(link = %source, channel = %name, %uuid, "FJOIN for user not behind this link skipped");
            continue;
        }
        let channel = match state.channels.force_join(&member, name) {
            Ok((channel, _, _)) => channel,
            Err(ChannelError::AlreadyMember { .. }) => Arc::clone(&channel),
            Err(e) => {
                tracing::warn!(link = %source, channel = %name, %uuid, error = %e, "FJOIN member skipped");
                continue;
            }
        };
        let nick = member.nick_or_star();
        for letter in letters.chars() {
            if let Err(e) = channel.grant(
                None,
                &source,
                &state.directory,
                letter,
                Some(nick.as_str()),
                ModeOptions::forced(),
            ) {
                tracing::warn!(link = %source, channel = %name, %letter, error = %e, "FJOIN mode skipped");
            }
        }
    }

    state.send_to_links(&ctx.msg.to_string(), Some(peer.id()));
    Ok(true)
}

fn fmode(ctx: &Context<'_>, peer: &Arc<Peer>) -> Result<bool, CommandError> {
    let state = ctx.server;
    let (Some(name), Some(modes)) = (ctx.msg.arg(0), ctx.msg.arg(2)) else {
        tracing::warn!(link = %link_name(peer), line = %ctx.msg, "malformed FMODE skipped");
        return Ok(true);
    };
    let Some(channel) = state.channels.get(name) else {
        tracing::debug!(link = %link_name(peer), channel = %name, "FMODE for unknown channel");
        return Ok(true);
    };

    let args: Vec<String> = ctx
        .msg
        .args_from(3)
        .into_iter()
        .map(|a| translate::uuid_to_nick(state, a))
        .collect();
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    let (changes, errors) = parse_changes(modes, &args);
    for e in errors {
        tracing::debug!(link = %link_name(peer), channel = %name, error = %e, "bad FMODE change");
    }

    let setter = remote_source(ctx, peer);
    let source = match &setter {
        Some(client) => client.mask(),
        None => link_name(peer),
    };
    apply_channel_modes(
        state,
        setter.as_ref(),
        &source,
        &channel,
        &changes,
        true,
        Some(peer.id()),
    );
    Ok(true)
}

// ---------------------------------------------------------------------------
// Departures and renames
// ---------------------------------------------------------------------------

fn quit(ctx: &Context<'_>, peer: &Arc<Peer>) -> Result<bool, CommandError> {
    let Some(client) = remote_source(ctx, peer) else {
        tracing::debug!(link = %link_name(peer), line = %ctx.msg, "QUIT for unknown user");
        return Ok(false);
    };
    let reason = ctx.msg.arg(0).unwrap_or("Client Quit");
    disconnect_client(ctx.server, &client, reason, false);
    Ok(true)
}

fn squit(ctx: &Context<'_>, peer: &Arc<Peer>) -> Result<bool, CommandError> {
    let state = ctx.server;
    let target = ctx.require(0)?;
    let reason = ctx.msg.arg(1).unwrap_or("Server quit");

    if peer.sid().as_deref() == Some(target) || peer.name().as_deref() == Some(target) {
        disconnect_peer(state, peer, reason, false);
        return Ok(true);
    }

    // A server further down this link went away.
    let split = format!("{} {target}", link_name(peer));
    let gone: Vec<Arc<Client>> = state
        .directory
        .clients()
        .into_iter()
        .filter(|c| c.origin().is_some_and(|o| o.id() == peer.id()))
        .filter(|c| c.uuid().is_some_and(|u| u.starts_with(target)))
        .collect();
    for client in &gone {
        disconnect_client(state, client, &split, false);
    }
    tracing::info!(link = %link_name(peer), server = %target, users = gone.len(), "remote server split");
    Ok(true)
}

fn svsnick(ctx: &Context<'_>, peer: &Arc<Peer>) -> Result<bool, CommandError> {
    let state = ctx.server;
    let (uuid, nick) = (ctx.require(0)?, ctx.require(1)?);
    let Some(target) = state.directory.by_uuid(uuid) else {
        tracing::debug!(link = %link_name(peer), %uuid, "SVSNICK for unknown user");
        return Ok(false);
    };
    if let Err(e) = change_nick(state, &target, nick, true) {
        tracing::warn!(link = %link_name(peer), %uuid, %nick, error = %e, "SVSNICK failed");
    }
    Ok(true)
}

// ---------------------------------------------------------------------------
// Relay
// ---------------------------------------------------------------------------

/// Runs a user verb from a link through the client handlers as the
/// remote user named in the prefix.
fn relay(ctx: &Context<'_>, peer: &Arc<Peer>) -> Result<bool, CommandError> {
    let Some(source) = remote_source(ctx, peer) else {
        tracing::debug!(link = %link_name(peer), line = %ctx.msg, "relayed verb without a known source");
        return Ok(false);
    };
    let local = translate::to_local(ctx.server, ctx.msg);
    let caller = Caller::Client(source);
    let relayed = Context::new(ctx.server, &caller, &local).forced();
    if let Err(e) = ctx.server.dispatcher.dispatch(&relayed) {
        tracing::debug!(link = %link_name(peer), verb = %local.verb, error = %e, "relayed verb failed");
    }
    Ok(true)
}

// ---------------------------------------------------------------------------
// Liveness and link status
// ---------------------------------------------------------------------------

fn ping(ctx: &Context<'_>, peer: &Arc<Peer>) -> Result<bool, CommandError> {
    let token = ctx.require(0)?;
    let sid = ctx.server.sid();
    peer.send(format!(":{sid} PONG {sid} {token}"));
    Ok(true)
}

fn pong(ctx: &Context<'_>, peer: &Arc<Peer>) -> Result<bool, CommandError> {
    let cookie = ctx.msg.arg(0).unwrap_or_default();
    if !peer.pong(cookie) {
        tracing::debug!(link = %link_name(peer), %cookie, "unexpected PONG cookie");
    }
    Ok(true)
}

fn burst_marker(ctx: &Context<'_>, peer: &Arc<Peer>) -> Result<bool, CommandError> {
    tracing::debug!(link = %link_name(peer), verb = %ctx.msg.verb, "burst marker");
    Ok(true)
}

fn error(ctx: &Context<'_>, peer: &Arc<Peer>) -> Result<bool, CommandError> {
    let reason = ctx.msg.arg(0).unwrap_or("Link closed");
    tracing::warn!(link = %link_name(peer), %reason, "link sent ERROR");
    disconnect_peer(ctx.server, peer, reason, false);
    Ok(true)
}
