//! Server configuration.
//!
//! Loaded once at startup from a JSON file and never reloaded. Every
//! section has defaults, so an empty object is a valid config that runs a
//! single plain-TCP client listener on `127.0.0.1:6667`.
//!
//! ```json
//! {
//!   "server": { "host": "irc.example.net", "network": "Example" },
//!   "listeners": [
//!     { "bind": "0.0.0.0:6667" },
//!     { "bind": "0.0.0.0:6697", "tls": true },
//!     { "bind": "0.0.0.0:7000", "kind": "server" }
//!   ],
//!   "links": [{ "host": "hub.example.net", "password": "s3cret" }]
//! }
//! ```

use std::path::Path;
use std::time::Duration;

use kestrel_channel::{default_auto_modes, AutoMode};
use kestrel_liveness::LivenessConfig;
use kestrel_session::StaticLinkAuthenticator;
use serde::{Deserialize, Serialize};

use crate::federation::generate_sid;
use crate::KestrelError;

/// The whole configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerSection,
    pub listeners: Vec<ListenerConfig>,
    pub liveness: LivenessSection,
    pub limits: LimitsSection,
    /// Modes set on every newly created channel.
    pub channel_modes: Vec<AutoMode>,
    /// Servers allowed to link to us.
    pub links: Vec<LinkConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub host: String,
    pub description: String,
    pub network: String,
    /// Three-character server ID, or `"auto"` to derive one from host and
    /// description.
    pub sid: String,
    pub motd: Vec<String>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "irc.kestrel.local".into(),
            description: "Kestrel IRC server".into(),
            network: "Kestrel".into(),
            sid: "auto".into(),
            motd: Vec::new(),
        }
    }
}

/// What connects to a listener.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListenerKind {
    #[default]
    Client,
    Server,
}

/// How lines are carried on a listener.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Tcp,
    Websocket,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    pub bind: String,
    pub kind: ListenerKind,
    pub transport: TransportKind,
    /// Marks connections on this listener secure. TLS itself is
    /// terminated in front of the daemon.
    pub tls: bool,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:6667".into(),
            kind: ListenerKind::Client,
            transport: TransportKind::Tcp,
            tls: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LivenessSection {
    pub check_interval_secs: u64,
    pub ping_timeout_secs: u64,
    /// Probe every connection on its first check.
    pub require_pong_cookie: bool,
    pub initial_jitter_ms: u64,
}

impl Default for LivenessSection {
    fn default() -> Self {
        Self {
            check_interval_secs: 60,
            ping_timeout_secs: 120,
            require_pong_cookie: false,
            initial_jitter_ms: 5000,
        }
    }
}

impl LivenessSection {
    pub fn to_liveness_config(&self) -> LivenessConfig {
        LivenessConfig {
            check_interval: Duration::from_secs(self.check_interval_secs),
            timeout: Duration::from_secs(self.ping_timeout_secs),
            require_pong: self.require_pong_cookie,
            initial_jitter: Duration::from_millis(self.initial_jitter_ms),
        }
        .validated()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsSection {
    /// Channels accepted per JOIN / NAMES line.
    pub max_targets: usize,
}

impl Default for LimitsSection {
    fn default() -> Self {
        Self { max_targets: 5 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkConfig {
    pub host: String,
    pub password: String,
}

impl Config {
    /// Parses a JSON document. Missing sections take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, KestrelError> {
        let mut config: Config = serde_json::from_str(json)?;
        config.fill_defaults();
        Ok(config)
    }

    /// Reads and parses the file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, KestrelError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    fn fill_defaults(&mut self) {
        if self.listeners.is_empty() {
            self.listeners.push(ListenerConfig::default());
        }
    }

    /// The configured SID, or one derived from host and description.
    pub fn resolved_sid(&self) -> String {
        if self.server.sid.eq_ignore_ascii_case("auto") || self.server.sid.is_empty() {
            generate_sid(&self.server.host, &self.server.description)
        } else {
            self.server.sid.clone()
        }
    }

    /// Auto modes for new channels; `+nt` when none are configured.
    pub fn auto_modes(&self) -> Vec<AutoMode> {
        if self.channel_modes.is_empty() {
            default_auto_modes()
        } else {
            self.channel_modes.clone()
        }
    }

    pub fn link_authenticator(&self) -> StaticLinkAuthenticator {
        StaticLinkAuthenticator::new(
            self.links
                .iter()
                .map(|l| (l.host.clone(), l.password.clone())),
        )
    }
}
