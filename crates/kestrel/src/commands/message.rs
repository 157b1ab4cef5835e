//! `PRIVMSG` and `NOTICE`.
//!
//! Both verbs share one delivery path. NOTICE never produces an error
//! reply; PRIVMSG reports each failed target and carries on with the rest.

use std::sync::Arc;

use kestrel_protocol::Numeric;
use kestrel_session::Client;

use crate::commands::{report, targets};
use crate::dispatch::{Context, Dispatcher};
use crate::federation;
use crate::CommandError;

pub(crate) fn register(dispatcher: &mut Dispatcher) {
    dispatcher.on_client("PRIVMSG", privmsg);
    dispatcher.on_client("NOTICE", notice);
}

fn privmsg(ctx: &Context<'_>, client: &Arc<Client>) -> Result<bool, CommandError> {
    deliver(ctx, client, "PRIVMSG")
}

fn notice(ctx: &Context<'_>, client: &Arc<Client>) -> Result<bool, CommandError> {
    // Errors are never answered for NOTICE.
    let _ = deliver(ctx, client, "NOTICE");
    Ok(true)
}

fn deliver(ctx: &Context<'_>, client: &Arc<Client>, verb: &str) -> Result<bool, CommandError> {
    let list = ctx
        .msg
        .arg(0)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| CommandError::NoRecipient(verb.to_owned()))?;
    let text = ctx
        .msg
        .arg(1)
        .filter(|t| !t.is_empty())
        .ok_or(CommandError::NoTextToSend)?;

    let max = ctx.server.config().limits.max_targets;
    for target in targets(list).take(max) {
        let result = if target.starts_with('#') {
            to_channel(ctx, client, verb, target, text)
        } else {
            to_user(ctx, client, verb, target, text)
        };
        if let Err(err) = result {
            if verb == "PRIVMSG" {
                report(ctx.server, client, &err);
            }
        }
    }
    Ok(true)
}

fn to_channel(
    ctx: &Context<'_>,
    client: &Arc<Client>,
    verb: &str,
    name: &str,
    text: &str,
) -> Result<(), CommandError> {
    let state = ctx.server;
    let channel = state
        .channels
        .get(name)
        .ok_or_else(|| CommandError::NoSuchChannel(name.to_owned()))?;
    if !ctx.force {
        channel.check_can_send(client)?;
    }

    channel.send_to_room(
        Some(client.id()),
        &format!(":{} {verb} {} :{text}", client.mask(), channel.name()),
        false,
    );
    if let Some(uuid) = client.uuid() {
        federation::propagate(
            state,
            client,
            &format!(":{uuid} {verb} {} :{text}", channel.name()),
        );
    }
    Ok(())
}

fn to_user(
    ctx: &Context<'_>,
    client: &Arc<Client>,
    verb: &str,
    nick: &str,
    text: &str,
) -> Result<(), CommandError> {
    let target = ctx
        .server
        .directory
        .resolve(nick)
        .ok_or_else(|| CommandError::NoSuchNick(nick.to_owned()))?;

    if target.is_local() {
        target.send(format!(
            ":{} {verb} {} :{text}",
            client.mask(),
            target.nick_or_star()
        ));
    } else if let (Some(origin), Some(src), Some(dst)) =
        (target.origin(), client.uuid(), target.uuid())
    {
        origin.send(format!(":{src} {verb} {dst} :{text}"));
    }

    if verb == "PRIVMSG" {
        if let Some(away) = target.away() {
            ctx.reply(
                Numeric::RplAway,
                &format!("{} :{away}", target.nick_or_star()),
            );
        }
    }
    Ok(())
}
