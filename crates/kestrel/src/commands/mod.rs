//! The client command catalogue.
//!
//! Each submodule owns a group of verbs and exposes a `register` function;
//! [`register_all`] wires every group into the [`Dispatcher`] once at
//! startup. Handlers are plain functions, synchronous, and never hold a
//! lock while sending.

pub(crate) mod channel;
pub(crate) mod message;
pub(crate) mod mode;
pub(crate) mod query;
pub(crate) mod registration;

use std::collections::HashSet;
use std::sync::Arc;

use kestrel_session::Client;

use crate::dispatch::Dispatcher;
use crate::server::ServerState;
use crate::CommandError;

/// Registers every client-class verb.
pub fn register_all(dispatcher: &mut Dispatcher) {
    registration::register(dispatcher);
    channel::register(dispatcher);
    mode::register(dispatcher);
    message::register(dispatcher);
    query::register(dispatcher);
}

/// Everyone sharing at least one channel with `client`, each listed once,
/// `client` excluded.
pub(crate) fn channel_peers(state: &ServerState, client: &Client) -> Vec<Arc<Client>> {
    let mut seen = HashSet::from([client.id()]);
    let mut peers = Vec::new();
    for channel in state.channels.channels_of(client.id()) {
        for member in channel.members() {
            if seen.insert(member.id()) {
                peers.push(member);
            }
        }
    }
    peers
}

/// Writes the reply for a failure that doesn't stop the rest of the
/// command (one bad target out of several).
pub(crate) fn report(state: &ServerState, client: &Client, err: &CommandError) {
    client.send(err.to_reply(state.host(), &client.nick_or_star()));
}

/// Splits a comma list, dropping empty entries.
pub(crate) fn targets(list: &str) -> impl Iterator<Item = &str> {
    list.split(',').filter(|t| !t.is_empty())
}
