//! Command dispatch: verb → handlers.
//!
//! Every parsed line reaches business logic through [`Dispatcher::dispatch`].
//! Handlers are registered once at startup; the table is read-only after
//! the server is built, so dispatch takes no lock.
//!
//! ```text
//! line → Message → Dispatcher ─┬─ gate (registered? idle clock)
//!                              └─ handlers[verb] where class matches
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use kestrel_protocol::{Message, Numeric};
use kestrel_session::{Client, ConnectionId, Peer};

use crate::server::ServerState;
use crate::CommandError;

/// Verbs a client may send before registration completes.
const PRE_REGISTRATION: &[&str] = &["USER", "NICK", "CAP", "PONG", "PING", "QUIT"];

/// Verbs that don't reset a client's idle time.
const IDLE_EXEMPT: &[&str] = &["PING", "PONG", "WHOIS", "WHO", "NAMES", "AWAY"];

/// Verbs a link may send before it has authenticated.
const PEER_PRE_AUTH: &[&str] = &["CAPAB", "SERVER", "ERROR", "PING", "PONG"];

// ---------------------------------------------------------------------------
// Caller and context
// ---------------------------------------------------------------------------

/// Which side of the protocol a handler serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionClass {
    Client,
    Server,
}

/// Who sent the line being dispatched.
#[derive(Debug, Clone)]
pub enum Caller {
    Client(Arc<Client>),
    Peer(Arc<Peer>),
}

impl Caller {
    pub fn class(&self) -> ConnectionClass {
        match self {
            Self::Client(_) => ConnectionClass::Client,
            Self::Peer(_) => ConnectionClass::Server,
        }
    }

    pub fn id(&self) -> ConnectionId {
        match self {
            Self::Client(c) => c.id(),
            Self::Peer(p) => p.id(),
        }
    }
}

/// Everything a handler gets for one line.
pub struct Context<'a> {
    pub server: &'a Arc<ServerState>,
    pub caller: &'a Caller,
    pub msg: &'a Message,
    /// Set when a linked server acts on a user's behalf. Privilege checks
    /// are skipped.
    pub force: bool,
}

impl<'a> Context<'a> {
    pub fn new(server: &'a Arc<ServerState>, caller: &'a Caller, msg: &'a Message) -> Self {
        Self {
            server,
            caller,
            msg,
            force: false,
        }
    }

    pub fn forced(mut self) -> Self {
        self.force = true;
        self
    }

    /// Positional argument `index`, or [`CommandError::NeedMoreParams`].
    pub fn require(&self, index: usize) -> Result<&'a str, CommandError> {
        self.msg
            .arg(index)
            .filter(|a| !a.is_empty())
            .ok_or_else(|| CommandError::NeedMoreParams(self.msg.verb.clone()))
    }

    /// Sends a numeric reply to the calling client. No-op for peers.
    pub fn reply(&self, numeric: Numeric, rest: &str) {
        if let Caller::Client(client) = self.caller {
            client.send(numeric.reply(self.server.host(), &client.nick_or_star(), rest));
        }
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// A command handler. Returns whether it acted on the line.
pub type Handler = Box<dyn Fn(&Context<'_>) -> Result<bool, CommandError> + Send + Sync>;

/// Handler for client-class verbs, handed the calling client.
pub type ClientHandler = fn(&Context<'_>, &Arc<Client>) -> Result<bool, CommandError>;

/// Handler for server-class verbs, handed the calling link.
pub type PeerHandler = fn(&Context<'_>, &Arc<Peer>) -> Result<bool, CommandError>;

/// The verb → handler table.
#[derive(Default)]
pub struct Dispatcher {
    handlers: HashMap<String, Vec<(ConnectionClass, Handler)>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `handler` for `verb` (case-insensitive) on `class`
    /// connections. Handlers for one verb run in registration order.
    pub fn register(&mut self, verb: &str, class: ConnectionClass, handler: Handler) {
        self.handlers
            .entry(verb.to_ascii_uppercase())
            .or_default()
            .push((class, handler));
    }

    /// Registers a client-class handler.
    pub fn on_client(&mut self, verb: &str, handler: ClientHandler) {
        self.register(
            verb,
            ConnectionClass::Client,
            Box::new(move |ctx| match ctx.caller {
                Caller::Client(client) => handler(ctx, client),
                Caller::Peer(_) => Ok(false),
            }),
        );
    }

    /// Registers a server-class handler.
    pub fn on_peer(&mut self, verb: &str, handler: PeerHandler) {
        self.register(
            verb,
            ConnectionClass::Server,
            Box::new(move |ctx| match ctx.caller {
                Caller::Peer(peer) => handler(ctx, peer),
                Caller::Client(_) => Ok(false),
            }),
        );
    }

    /// Whether anything handles `verb` for `class`.
    pub fn handles(&self, verb: &str, class: ConnectionClass) -> bool {
        self.handlers
            .get(&verb.to_ascii_uppercase())
            .is_some_and(|hs| hs.iter().any(|(c, _)| *c == class))
    }

    /// Runs every handler registered for the line's verb and the caller's
    /// class. Returns `true` if any of them acted.
    ///
    /// # Errors
    /// - [`CommandError::NotRegistered`] for a client that hasn't finished
    ///   registration sending anything outside the allow-list
    /// - [`CommandError::UnknownCommand`] for a local client sending a
    ///   verb nobody handles. Unknown verbs from links are ignored.
    /// - whatever a handler returns; later handlers don't run
    pub fn dispatch(&self, ctx: &Context<'_>) -> Result<bool, CommandError> {
        let verb = ctx.msg.verb.as_str();
        let class = ctx.caller.class();

        match ctx.caller {
            Caller::Client(client) => {
                if !client.is_registered() && !PRE_REGISTRATION.contains(&verb) {
                    return Err(CommandError::NotRegistered);
                }
                if !IDLE_EXEMPT.contains(&verb) {
                    client.touch();
                }
            }
            Caller::Peer(peer) => {
                if !peer.is_authenticated() && !PEER_PRE_AUTH.contains(&verb) {
                    tracing::debug!(conn_id = %peer.id(), %verb, "ignoring verb from unauthenticated link");
                    return Ok(false);
                }
            }
        }

        let handlers: Vec<&Handler> = self
            .handlers
            .get(verb)
            .into_iter()
            .flatten()
            .filter(|(c, _)| *c == class)
            .map(|(_, h)| h)
            .collect();

        if handlers.is_empty() {
            return match ctx.caller {
                Caller::Client(client) if client.is_local() => {
                    Err(CommandError::UnknownCommand(verb.to_owned()))
                }
                _ => {
                    tracing::debug!(conn_id = %ctx.caller.id(), %verb, "no handler; ignored");
                    Ok(false)
                }
            };
        }

        let mut handled = false;
        for handler in handlers {
            handled |= handler(ctx)?;
        }
        Ok(handled)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::testing::{local_client, registered_client, test_state};

    fn line(raw: &str) -> Message {
        Message::parse(raw).unwrap()
    }

    // =====================================================================
    // Gating
    // =====================================================================

    #[test]
    fn test_dispatch_unregistered_client_outside_allow_list_fails() {
        let state = test_state();
        let (client, _rx) = local_client(&state);
        let caller = Caller::Client(client);
        let msg = line("JOIN #rust");
        let err = state.dispatcher.dispatch(&Context::new(&state, &caller, &msg)).unwrap_err();
        assert_eq!(err, CommandError::NotRegistered);
    }

    #[test]
    fn test_dispatch_unregistered_client_allow_listed_verb_runs() {
        let state = test_state();
        let (client, _rx) = local_client(&state);
        let caller = Caller::Client(Arc::clone(&client));
        let msg = line("NICK alice");
        let handled = state.dispatcher.dispatch(&Context::new(&state, &caller, &msg)).unwrap();
        assert!(handled);
        assert_eq!(client.nick().as_deref(), Some("alice"));
    }

    #[test]
    fn test_dispatch_unknown_verb_from_local_client_fails() {
        let state = test_state();
        let (client, _rx) = registered_client(&state, "alice");
        let caller = Caller::Client(client);
        let msg = line("FROBNICATE x");
        let err = state.dispatcher.dispatch(&Context::new(&state, &caller, &msg)).unwrap_err();
        assert_eq!(err, CommandError::UnknownCommand("FROBNICATE".into()));
    }

    // =====================================================================
    // Handler table
    // =====================================================================

    #[test]
    fn test_register_handlers_run_in_order_for_matching_class() {
        static CALLS: AtomicUsize = AtomicUsize::new(0);

        let mut dispatcher = Dispatcher::new();
        dispatcher.register(
            "test",
            ConnectionClass::Client,
            Box::new(|_| {
                assert_eq!(CALLS.fetch_add(1, Ordering::SeqCst), 0);
                Ok(false)
            }),
        );
        dispatcher.register(
            "TEST",
            ConnectionClass::Client,
            Box::new(|_| {
                assert_eq!(CALLS.fetch_add(1, Ordering::SeqCst), 1);
                Ok(true)
            }),
        );
        dispatcher.register("TEST", ConnectionClass::Server, Box::new(|_| panic!("wrong class")));

        let state = test_state();
        let (client, _rx) = registered_client(&state, "alice");
        let caller = Caller::Client(client);
        let msg = line("test");
        let handled = dispatcher.dispatch(&Context::new(&state, &caller, &msg)).unwrap();
        assert!(handled);
        assert_eq!(CALLS.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_handles_distinguishes_classes() {
        let state = test_state();
        assert!(state.dispatcher.handles("privmsg", ConnectionClass::Client));
        assert!(state.dispatcher.handles("PRIVMSG", ConnectionClass::Server));
        assert!(state.dispatcher.handles("FJOIN", ConnectionClass::Server));
        assert!(!state.dispatcher.handles("FJOIN", ConnectionClass::Client));
    }

    #[test]
    fn test_require_missing_arg_is_need_more_params() {
        let state = test_state();
        let (client, _rx) = registered_client(&state, "alice");
        let caller = Caller::Client(client);
        let msg = line("KICK #rust");
        let ctx = Context::new(&state, &caller, &msg);
        assert_eq!(ctx.require(0).unwrap(), "#rust");
        assert_eq!(
            ctx.require(1).unwrap_err(),
            CommandError::NeedMoreParams("KICK".into())
        );
    }
}
