//! Per-connection handler: writer, liveness, and the read/dispatch loop.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Create the `Client` or `Peer` record and register it
//!   2. Spawn the writer, which drains the outbound queue onto the socket
//!   3. Spawn the liveness task, which probes and times out silent links
//!   4. Loop: read a line → parse → dispatch → reply with any error

use std::sync::Arc;

use kestrel_liveness::{LivenessAction, LivenessScheduler};
use kestrel_protocol::{Message, ProtocolError};
use kestrel_session::{Client, Outbound, Peer, RegisteredConnection};
use kestrel_transport::Connection;
use tokio::sync::mpsc;

use crate::config::ListenerKind;
use crate::connection::{disconnect_client, disconnect_peer};
use crate::dispatch::{Caller, Context};
use crate::server::ServerState;
use crate::CommandError;

const WRITE_FAILED: &str = "Connection reset by host";

/// Drop guard that tears the connection down when the handler exits.
///
/// Teardown is idempotent, so this is a no-op when the read loop already
/// ran it, and a safety net when the handler unwinds.
struct ConnectionGuard {
    caller: Caller,
    state: Arc<ServerState>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        teardown(&self.state, &self.caller, "Connection closed", true);
    }
}

fn teardown(state: &Arc<ServerState>, caller: &Caller, reason: &str, notify: bool) {
    match caller {
        Caller::Client(client) => disconnect_client(state, client, reason, notify),
        Caller::Peer(peer) => disconnect_peer(state, peer, reason, notify),
    }
}

fn is_disconnecting(caller: &Caller) -> bool {
    match caller {
        Caller::Client(client) => client.is_disconnecting(),
        Caller::Peer(peer) => peer.is_disconnecting(),
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<C: Connection>(
    conn: C,
    state: Arc<ServerState>,
    listener: usize,
    kind: ListenerKind,
) {
    let conn = Arc::new(conn);
    let conn_id = conn.id();
    let host = conn.peer_addr().ip().to_string();
    tracing::debug!(%conn_id, %host, ?kind, "handling new connection");

    let (tx, rx) = mpsc::unbounded_channel();
    let caller = match kind {
        ListenerKind::Client => Caller::Client(Arc::new(Client::local(
            conn_id,
            host,
            conn.is_secure(),
            tx,
            state.liveness(),
        ))),
        ListenerKind::Server => Caller::Peer(Arc::new(Peer::new(conn_id, tx, state.liveness()))),
    };

    if let Some(registry) = state.registry(listener) {
        registry.lock().insert(match &caller {
            Caller::Client(c) => RegisteredConnection::Client(Arc::clone(c)),
            Caller::Peer(p) => RegisteredConnection::Peer(Arc::clone(p)),
        });
    }
    let _guard = ConnectionGuard {
        caller: caller.clone(),
        state: Arc::clone(&state),
    };

    let writer = tokio::spawn(write_loop(
        Arc::clone(&conn),
        rx,
        Arc::clone(&state),
        caller.clone(),
    ));
    let liveness = tokio::spawn(liveness_loop(Arc::clone(&state), caller.clone()));

    let reason = read_loop(&*conn, &state, &caller).await;

    liveness.abort();
    teardown(&state, &caller, reason, true);
    if let Err(e) = writer.await {
        tracing::debug!(%conn_id, error = %e, "writer task ended abnormally");
    }
    // _guard drops here; teardown already ran, so it does nothing.
}

/// Reads until EOF, error, or teardown. Returns the quit reason.
async fn read_loop<C: Connection>(
    conn: &C,
    state: &Arc<ServerState>,
    caller: &Caller,
) -> &'static str {
    let conn_id = conn.id();
    loop {
        let line = match conn.recv_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                tracing::debug!(%conn_id, "connection closed cleanly");
                return "Connection closed";
            }
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "recv error");
                return WRITE_FAILED;
            }
        };

        let msg = match Message::parse(&line) {
            Ok(msg) => msg,
            Err(ProtocolError::EmptyLine) => continue,
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "unparseable line");
                continue;
            }
        };
        tracing::trace!(%conn_id, verb = %msg.verb, "line received");

        let ctx = Context::new(state, caller, &msg);
        if let Err(err) = state.dispatcher.dispatch(&ctx) {
            report(state, caller, &err);
        }

        if is_disconnecting(caller) {
            return "Connection closed";
        }
    }
}

/// Turns a failed command into whatever the caller should see.
fn report(state: &Arc<ServerState>, caller: &Caller, err: &CommandError) {
    match (caller, err) {
        (Caller::Client(client), _) => {
            client.send(err.to_reply(state.host(), &client.nick_or_star()));
        }
        (Caller::Peer(peer), CommandError::LinkRefused(reason)) => {
            tracing::warn!(conn_id = %peer.id(), %reason, "link refused");
            disconnect_peer(state, peer, reason, true);
        }
        (Caller::Peer(peer), _) => {
            tracing::debug!(conn_id = %peer.id(), error = %err, "link command failed");
        }
    }
}

/// Drains the outbound queue onto the socket. A failed write tears the
/// connection down without trying to tell it.
async fn write_loop<C: Connection>(
    conn: Arc<C>,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
    state: Arc<ServerState>,
    caller: Caller,
) {
    while let Some(item) = rx.recv().await {
        match item {
            Outbound::Line(line) => {
                if let Err(e) = conn.send_line(&line).await {
                    tracing::debug!(conn_id = %conn.id(), error = %e, "send failed");
                    teardown(&state, &caller, WRITE_FAILED, false);
                    break;
                }
            }
            Outbound::Close => break,
        }
    }
    if let Err(e) = conn.close().await {
        tracing::trace!(conn_id = %conn.id(), error = %e, "close failed");
    }
}

/// Runs the periodic liveness check until aborted.
async fn liveness_loop(state: Arc<ServerState>, caller: Caller) {
    let mut scheduler = LivenessScheduler::new(state.liveness().clone());
    loop {
        let info = scheduler.wait_for_check().await;
        let action = match &caller {
            Caller::Client(client) => client.check_liveness(info.at),
            Caller::Peer(peer) => peer.check_liveness(info.at),
        };
        match action {
            LivenessAction::Idle => {}
            LivenessAction::Probe(cookie) => match &caller {
                Caller::Client(client) => {
                    client.send(format!("PING :{cookie}"));
                }
                Caller::Peer(peer) if peer.is_authenticated() => {
                    peer.send(format!(":{} PING {} {}", state.sid(), state.sid(), cookie));
                }
                Caller::Peer(peer) => {
                    peer.send(format!("PING :{cookie}"));
                }
            },
            LivenessAction::TimedOut => {
                tracing::info!(conn_id = %caller.id(), check = info.check, "ping timeout");
                teardown(&state, &caller, "Ping timeout", true);
                return;
            }
        }
    }
}
