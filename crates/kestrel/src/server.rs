//! `Server` builder and accept loops.
//!
//! This is the entry point for running a Kestrel daemon. It ties together
//! all the layers: transport → protocol → session → channel, plus the
//! command catalogue and the server-to-server link controller.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use kestrel_channel::ChannelManager;
use kestrel_liveness::LivenessConfig;
use kestrel_session::{
    ConnectionId, ConnectionRegistry, Directory, LinkAuthenticator, Peer, RegistryStats,
};
use kestrel_transport::{TcpLineTransport, Transport, WebSocketTransport};
use parking_lot::Mutex;
use tokio::task::JoinSet;

use crate::config::{Config, ListenerConfig, ListenerKind, TransportKind};
use crate::dispatch::Dispatcher;
use crate::federation::UidGenerator;
use crate::handler::handle_connection;
use crate::{commands, federation, KestrelError};

/// How often empty channels are reclaimed and listener stats logged.
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// State shared by every connection task.
///
/// Wrapped in `Arc` so it can be cheaply cloned across tasks. Each field
/// that is mutated after startup carries its own synchronization.
pub struct ServerState {
    config: Config,
    sid: String,
    created: DateTime<Utc>,
    liveness: LivenessConfig,
    pub(crate) directory: Arc<Directory>,
    pub(crate) channels: ChannelManager,
    pub(crate) dispatcher: Dispatcher,
    /// Authenticated links by SID.
    pub(crate) links: DashMap<String, Arc<Peer>>,
    pub(crate) uids: UidGenerator,
    pub(crate) link_auth: Box<dyn LinkAuthenticator>,
    /// One registry per configured listener, same order.
    registries: Vec<Mutex<ConnectionRegistry>>,
}

impl ServerState {
    /// Builds the state and registers the full command catalogue.
    pub fn new(config: Config, link_auth: Box<dyn LinkAuthenticator>) -> Arc<Self> {
        let directory = Arc::new(Directory::new());
        let channels = ChannelManager::new(config.auto_modes(), Arc::clone(&directory));

        let mut dispatcher = Dispatcher::new();
        commands::register_all(&mut dispatcher);
        federation::register_all(&mut dispatcher);

        let registries = config
            .listeners
            .iter()
            .map(|l| Mutex::new(ConnectionRegistry::new(l.bind.clone())))
            .collect();

        Arc::new(Self {
            sid: config.resolved_sid(),
            liveness: config.liveness.to_liveness_config(),
            created: Utc::now(),
            directory,
            channels,
            dispatcher,
            links: DashMap::new(),
            uids: UidGenerator::new(),
            link_auth,
            registries,
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Our server name.
    pub fn host(&self) -> &str {
        &self.config.server.host
    }

    pub fn sid(&self) -> &str {
        &self.sid
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    pub fn liveness(&self) -> &LivenessConfig {
        &self.liveness
    }

    pub fn directory(&self) -> &Arc<Directory> {
        &self.directory
    }

    pub fn channels(&self) -> &ChannelManager {
        &self.channels
    }

    pub(crate) fn registry(&self, listener: usize) -> Option<&Mutex<ConnectionRegistry>> {
        self.registries.get(listener)
    }

    /// Forgets `id` on whichever listener it arrived on.
    pub(crate) fn deregister(&self, id: ConnectionId) {
        for registry in &self.registries {
            if registry.lock().remove(id).is_some() {
                return;
            }
        }
    }

    /// Connection counts per listener, labelled by bind address.
    pub fn stats(&self) -> Vec<(String, RegistryStats)> {
        self.registries
            .iter()
            .map(|r| {
                let r = r.lock();
                (r.listener().to_owned(), r.stats())
            })
            .collect()
    }

    /// Sends `line` to every authenticated link except `except`. Returns
    /// how many links queued it.
    pub(crate) fn send_to_links(&self, line: &str, except: Option<ConnectionId>) -> usize {
        let links: Vec<Arc<Peer>> = self
            .links
            .iter()
            .filter(|e| Some(e.value().id()) != except && e.value().is_authenticated())
            .map(|e| Arc::clone(e.value()))
            .collect();
        links.iter().filter(|p| p.send(line)).count()
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for configuring and starting a Kestrel server.
///
/// # Example
///
/// ```rust,ignore
/// let server = ServerBuilder::new()
///     .bind("0.0.0.0:6667")
///     .link_listener("0.0.0.0:7000")
///     .build()
///     .await?;
/// server.run().await
/// ```
pub struct ServerBuilder {
    config: Config,
    link_auth: Option<Box<dyn LinkAuthenticator>>,
}

impl ServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            link_auth: None,
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Adds a plain-TCP client listener.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.listeners.push(ListenerConfig {
            bind: addr.to_owned(),
            ..ListenerConfig::default()
        });
        self
    }

    /// Adds a plain-TCP listener for linking servers.
    pub fn link_listener(mut self, addr: &str) -> Self {
        self.config.listeners.push(ListenerConfig {
            bind: addr.to_owned(),
            kind: ListenerKind::Server,
            ..ListenerConfig::default()
        });
        self
    }

    /// Overrides the link authenticator built from the `links` section.
    pub fn link_authenticator(mut self, auth: impl LinkAuthenticator) -> Self {
        self.link_auth = Some(Box::new(auth));
        self
    }

    /// Binds every listener and builds the shared state.
    pub async fn build(mut self) -> Result<Server, KestrelError> {
        if self.config.listeners.is_empty() {
            self.config.listeners.push(ListenerConfig::default());
        }

        let mut listeners = Vec::with_capacity(self.config.listeners.len());
        for (index, cfg) in self.config.listeners.iter().enumerate() {
            let transport = match cfg.transport {
                TransportKind::Tcp => {
                    Bound::Tcp(TcpLineTransport::bind(&cfg.bind).await?.with_secure(cfg.tls))
                }
                TransportKind::Websocket => Bound::WebSocket(
                    WebSocketTransport::bind(&cfg.bind).await?.with_secure(cfg.tls),
                ),
            };
            listeners.push(Listener {
                index,
                kind: cfg.kind,
                transport,
            });
        }

        let link_auth = self
            .link_auth
            .unwrap_or_else(|| Box::new(self.config.link_authenticator()));
        let state = ServerState::new(self.config, link_auth);
        tracing::info!(host = %state.host(), sid = %state.sid(), "server state ready");

        Ok(Server { listeners, state })
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

enum Bound {
    Tcp(TcpLineTransport),
    WebSocket(WebSocketTransport),
}

struct Listener {
    index: usize,
    kind: ListenerKind,
    transport: Bound,
}

impl Listener {
    fn local_addr(&self) -> std::io::Result<SocketAddr> {
        match &self.transport {
            Bound::Tcp(t) => t.local_addr(),
            Bound::WebSocket(t) => t.local_addr(),
        }
    }
}

/// A bound Kestrel server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct Server {
    listeners: Vec<Listener>,
    state: Arc<ServerState>,
}

impl Server {
    /// Creates a new builder.
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Addresses of every listener, in configuration order.
    pub fn local_addrs(&self) -> std::io::Result<Vec<SocketAddr>> {
        self.listeners.iter().map(Listener::local_addr).collect()
    }

    /// Address of the first listener.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        match self.listeners.first() {
            Some(l) => l.local_addr(),
            None => Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no listeners",
            )),
        }
    }

    pub fn state(&self) -> Arc<ServerState> {
        Arc::clone(&self.state)
    }

    /// Runs every accept loop plus periodic maintenance. Returns only if
    /// all accept loops stop.
    pub async fn run(self) -> Result<(), KestrelError> {
        tracing::info!(listeners = self.listeners.len(), "Kestrel server running");

        let mut loops = JoinSet::new();
        for listener in self.listeners {
            let state = Arc::clone(&self.state);
            let (index, kind) = (listener.index, listener.kind);
            match listener.transport {
                Bound::Tcp(t) => loops.spawn(accept_loop(t, state, index, kind)),
                Bound::WebSocket(t) => loops.spawn(accept_loop(t, state, index, kind)),
            };
        }

        let maintenance = tokio::spawn(maintenance_loop(Arc::clone(&self.state)));
        while let Some(result) = loops.join_next().await {
            if let Err(e) = result {
                tracing::error!(error = %e, "accept loop ended abnormally");
            }
        }
        maintenance.abort();
        Ok(())
    }
}

async fn accept_loop<T: Transport>(
    mut transport: T,
    state: Arc<ServerState>,
    listener: usize,
    kind: ListenerKind,
) {
    loop {
        match transport.accept().await {
            Ok(conn) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    handle_connection(conn, state, listener, kind).await;
                });
            }
            Err(e) => {
                tracing::error!(error = %e, listener, "accept failed");
            }
        }
    }
}

async fn maintenance_loop(state: Arc<ServerState>) {
    let mut ticker = tokio::time::interval(MAINTENANCE_INTERVAL);
    loop {
        ticker.tick().await;
        let reaped = state.channels.reap_empty();
        for (listener, stats) in state.stats() {
            tracing::debug!(
                %listener,
                total = stats.total,
                authenticated = stats.authenticated,
                unauthenticated = stats.unauthenticated(),
                channels = state.channels.len(),
                reaped = reaped.len(),
                "listener stats"
            );
        }
    }
}
