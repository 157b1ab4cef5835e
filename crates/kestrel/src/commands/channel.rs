//! Channel verbs: `JOIN`, `PART`, `TOPIC`, `NAMES`, `KICK`, `INVITE`,
//! `LIST`, `WHO`.

use std::sync::Arc;

use kestrel_channel::{Channel, ChannelError, Departure, ModeOptions, Privilege};
use kestrel_protocol::{is_valid_channel, Numeric};
use kestrel_session::Client;

use crate::commands::{report, targets};
use crate::dispatch::{Context, Dispatcher};
use crate::federation;
use crate::server::ServerState;
use crate::CommandError;

/// Longest NAMES payload per 353 line.
const NAMES_CHUNK: usize = 400;

pub(crate) fn register(dispatcher: &mut Dispatcher) {
    dispatcher.on_client("JOIN", join);
    dispatcher.on_client("PART", part);
    dispatcher.on_client("TOPIC", topic);
    dispatcher.on_client("NAMES", names);
    dispatcher.on_client("KICK", kick);
    dispatcher.on_client("INVITE", invite);
    dispatcher.on_client("LIST", list);
    dispatcher.on_client("WHO", who);
}

fn lookup(state: &ServerState, name: &str) -> Result<Arc<Channel>, CommandError> {
    state
        .channels
        .get(name)
        .ok_or_else(|| CommandError::NoSuchChannel(name.to_owned()))
}

/// Membership plus at least `min` privilege, unless `force`.
fn require_privilege(
    channel: &Channel,
    client: &Client,
    min: Privilege,
    force: bool,
) -> Result<(), CommandError> {
    if force {
        return Ok(());
    }
    if !channel.is_member(client.id()) {
        return Err(CommandError::NotOnChannel(channel.name().to_owned()));
    }
    if channel.status(client.id()) < min {
        return Err(CommandError::ChanOpPrivsNeeded(channel.name().to_owned()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// JOIN / PART
// ---------------------------------------------------------------------------

fn join(ctx: &Context<'_>, client: &Arc<Client>) -> Result<bool, CommandError> {
    let list = ctx.require(0)?;
    let keys: Vec<&str> = ctx.msg.arg(1).map(|k| k.split(',').collect()).unwrap_or_default();
    let max = ctx.server.config().limits.max_targets;

    for (i, name) in targets(list).take(max).enumerate() {
        if let Err(err) = join_one(ctx, client, name, keys.get(i).copied()) {
            report(ctx.server, client, &err);
        }
    }
    Ok(true)
}

fn join_one(
    ctx: &Context<'_>,
    client: &Arc<Client>,
    name: &str,
    key: Option<&str>,
) -> Result<(), CommandError> {
    if !is_valid_channel(name) {
        return Err(CommandError::NoSuchChannel(name.to_owned()));
    }
    let state = ctx.server;
    let (channel, count, created) = if ctx.force {
        state.channels.force_join(client, name)?
    } else {
        state.channels.join(client, name, key)?
    };

    let nick = client.nick_or_star();
    if created && client.is_local() {
        if let Err(e) = channel.grant(
            None,
            state.host(),
            &state.directory,
            'o',
            Some(nick.as_str()),
            ModeOptions::silent(),
        ) {
            tracing::debug!(channel = %channel.name(), error = %e, "founder op not granted");
        }
    }

    if client.is_local() {
        send_topic(state, client, &channel, false);
        send_names(state, client, &channel);
    }

    if let Some(uuid) = client.uuid() {
        let letters = channel
            .burst_members()
            .into_iter()
            .find(|(_, m)| m.id() == client.id())
            .map(|(letters, _)| letters)
            .unwrap_or_default();
        federation::propagate(
            state,
            client,
            &format!(
                ":{} FJOIN {} {} {} :{letters},{uuid}",
                state.sid(),
                channel.name(),
                channel.created(),
                channel.mode_strings('+')
            ),
        );
    }
    tracing::debug!(conn_id = %client.id(), %nick, channel = %channel.name(), members = count, "joined");
    Ok(())
}

fn part(ctx: &Context<'_>, client: &Arc<Client>) -> Result<bool, CommandError> {
    let list = ctx.require(0)?;
    let reason = ctx.msg.arg(1).filter(|r| !r.is_empty()).unwrap_or("Leaving");
    let state = ctx.server;

    for name in targets(list) {
        let channel = match lookup(state, name) {
            Ok(channel) => channel,
            Err(err) => {
                report(state, client, &err);
                continue;
            }
        };
        if !channel.remove(client, Departure::Part(Some(reason))) {
            report(state, client, &CommandError::NotOnChannel(channel.name().to_owned()));
            continue;
        }
        if let Some(uuid) = client.uuid() {
            federation::propagate(
                state,
                client,
                &format!(":{uuid} PART {} :{reason}", channel.name()),
            );
        }
    }
    state.channels.reap_empty();
    Ok(true)
}

// ---------------------------------------------------------------------------
// TOPIC / NAMES
// ---------------------------------------------------------------------------

fn topic(ctx: &Context<'_>, client: &Arc<Client>) -> Result<bool, CommandError> {
    let state = ctx.server;
    let channel = lookup(state, ctx.require(0)?)?;

    let Some(text) = ctx.msg.arg(1) else {
        send_topic(state, client, &channel, true);
        return Ok(true);
    };
    channel.set_topic(client, text, ctx.force)?;
    if let Some(uuid) = client.uuid() {
        federation::propagate(
            state,
            client,
            &format!(":{uuid} TOPIC {} :{text}", channel.name()),
        );
    }
    Ok(true)
}

/// 332 + 333 when a topic is set; 331 only when `explicit` (a TOPIC query,
/// not a JOIN).
fn send_topic(state: &ServerState, client: &Client, channel: &Channel, explicit: bool) {
    let host = state.host();
    let nick = client.nick_or_star();
    match channel.topic() {
        Some(topic) => {
            client.send(Numeric::RplTopic.reply(
                host,
                &nick,
                &format!("{} :{}", channel.name(), topic.text),
            ));
            client.send(Numeric::RplTopicWhoTime.reply(
                host,
                &nick,
                &format!("{} {} {}", channel.name(), topic.set_by, topic.set_at),
            ));
        }
        None if explicit => {
            client.send(Numeric::RplNoTopic.reply(
                host,
                &nick,
                &format!("{} :No topic is set.", channel.name()),
            ));
        }
        None => {}
    }
}

fn names(ctx: &Context<'_>, client: &Arc<Client>) -> Result<bool, CommandError> {
    let state = ctx.server;
    let Some(list) = ctx.msg.arg(0).filter(|l| !l.is_empty()) else {
        ctx.reply(Numeric::RplEndOfNames, "* :End of /NAMES list.");
        return Ok(true);
    };
    for name in targets(list).take(state.config().limits.max_targets) {
        match state.channels.get(name) {
            Some(channel) if !channel.has_mode('s') || channel.is_member(client.id()) => {
                send_names(state, client, &channel);
            }
            _ => ctx.reply(Numeric::RplEndOfNames, &format!("{name} :End of /NAMES list.")),
        }
    }
    Ok(true)
}

/// 353 lines (split to fit) followed by 366.
pub(crate) fn send_names(state: &ServerState, client: &Client, channel: &Channel) {
    let host = state.host();
    let nick = client.nick_or_star();
    let symbol = if channel.has_mode('s') { '@' } else { '=' };

    let mut chunk = String::new();
    let flush = |chunk: &str| {
        client.send(Numeric::RplNamReply.reply(
            host,
            &nick,
            &format!("{symbol} {} :{chunk}", channel.name()),
        ));
    };
    for entry in channel.names(client.has_cap("multi-prefix")) {
        if !chunk.is_empty() && chunk.len() + entry.len() + 1 > NAMES_CHUNK {
            flush(&chunk);
            chunk.clear();
        }
        if !chunk.is_empty() {
            chunk.push(' ');
        }
        chunk.push_str(&entry);
    }
    if !chunk.is_empty() {
        flush(&chunk);
    }
    client.send(Numeric::RplEndOfNames.reply(
        host,
        &nick,
        &format!("{} :End of /NAMES list.", channel.name()),
    ));
}

// ---------------------------------------------------------------------------
// KICK / INVITE
// ---------------------------------------------------------------------------

fn kick(ctx: &Context<'_>, client: &Arc<Client>) -> Result<bool, CommandError> {
    let state = ctx.server;
    let channel = lookup(state, ctx.require(0)?)?;
    let target_nick = ctx.require(1)?;
    let kicker = client.nick_or_star();
    let reason = ctx.msg.arg(2).filter(|r| !r.is_empty()).unwrap_or(&kicker);

    require_privilege(&channel, client, Privilege::Op, ctx.force)?;
    let target = state
        .directory
        .resolve(target_nick)
        .ok_or_else(|| CommandError::NoSuchNick(target_nick.to_owned()))?;
    if !channel.is_member(target.id()) {
        return Err(ChannelError::UserNotInChannel {
            nick: target.nick_or_star(),
            channel: channel.name().to_owned(),
        }
        .into());
    }

    let by = client.mask();
    channel.remove(&target, Departure::Kick { by: &by, reason });
    if let (Some(uuid), Some(target_uuid)) = (client.uuid(), target.uuid()) {
        federation::propagate(
            state,
            client,
            &format!(":{uuid} KICK {} {target_uuid} :{reason}", channel.name()),
        );
    }
    tracing::debug!(channel = %channel.name(), %kicker, target = %target.nick_or_star(), "kick");
    state.channels.reap_empty();
    Ok(true)
}

fn invite(ctx: &Context<'_>, client: &Arc<Client>) -> Result<bool, CommandError> {
    let state = ctx.server;
    let target_nick = ctx.require(0)?;
    let target = state
        .directory
        .resolve(target_nick)
        .ok_or_else(|| CommandError::NoSuchNick(target_nick.to_owned()))?;
    let channel = lookup(state, ctx.require(1)?)?;

    require_privilege(&channel, client, Privilege::Op, ctx.force)?;
    let nick = target.nick_or_star();
    if channel.is_member(target.id()) {
        return Err(CommandError::UserOnChannel {
            nick,
            channel: channel.name().to_owned(),
        });
    }

    target.add_invite(channel.name());
    ctx.reply(Numeric::RplInviting, &format!("{nick} {}", channel.name()));

    if target.is_local() {
        target.send(format!(":{} INVITE {nick} :{}", client.mask(), channel.name()));
    } else if let (Some(origin), Some(src), Some(dst)) =
        (target.origin(), client.uuid(), target.uuid())
    {
        origin.send(format!(":{src} INVITE {dst} {}", channel.name()));
    }
    Ok(true)
}

// ---------------------------------------------------------------------------
// LIST / WHO
// ---------------------------------------------------------------------------

fn list(ctx: &Context<'_>, client: &Arc<Client>) -> Result<bool, CommandError> {
    let state = ctx.server;
    let wanted: Option<Vec<&str>> = ctx.msg.arg(0).map(|l| targets(l).collect());

    ctx.reply(Numeric::RplListStart, "Channel :Users  Name");
    let mut channels = state.channels.list();
    channels.sort_by(|a, b| a.name().cmp(b.name()));
    for channel in channels {
        if let Some(wanted) = &wanted {
            if !wanted
                .iter()
                .any(|w| kestrel_protocol::irc_eq(w, channel.name()))
            {
                continue;
            }
        }
        if channel.has_mode('s') && !channel.is_member(client.id()) {
            continue;
        }
        let topic = channel.topic().map(|t| t.text).unwrap_or_default();
        ctx.reply(
            Numeric::RplList,
            &format!(
                "{} {} :[{}] {topic}",
                channel.name(),
                channel.member_count(),
                channel.mode_strings('+')
            ),
        );
    }
    ctx.reply(Numeric::RplListEnd, ":End of channel list.");
    Ok(true)
}

fn who(ctx: &Context<'_>, client: &Arc<Client>) -> Result<bool, CommandError> {
    let state = ctx.server;
    let mask = ctx.require(0)?;

    if mask.starts_with('#') {
        if let Some(channel) = state.channels.get(mask) {
            let visible = channel.is_member(client.id()) || !channel.has_mode('s');
            if visible {
                for member in channel.member_list() {
                    who_reply(ctx, channel.name(), &member.client, member.privilege.symbol());
                }
            }
        }
    } else if let Some(target) = state.directory.by_nick(mask) {
        who_reply(ctx, "*", &target, None);
    }

    ctx.reply(Numeric::RplEndOfWho, &format!("{mask} :End of /WHO list."));
    Ok(true)
}

fn who_reply(ctx: &Context<'_>, channel: &str, target: &Client, symbol: Option<char>) {
    let server = match target.origin() {
        Some(peer) => peer.name().unwrap_or_default(),
        None => ctx.server.host().to_owned(),
    };
    let mut flags = String::from(if target.away().is_some() { 'G' } else { 'H' });
    if target.is_oper() {
        flags.push('*');
    }
    flags.extend(symbol);
    ctx.reply(
        Numeric::RplWhoReply,
        &format!(
            "{channel} {} {} {server} {} {flags} :0 {}",
            target.ident().unwrap_or_default(),
            target.host(),
            target.nick_or_star(),
            target.realname()
        ),
    );
}
