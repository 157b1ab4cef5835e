//! # Kestrel
//!
//! A federating IRC daemon.
//!
//! Kestrel accepts client and server connections, registers users, keeps
//! channels with per-member privileges and pluggable modes, and links
//! with other servers over an InspIRCd-style spanning-tree protocol that
//! names users by UUID instead of nickname.
//!
//! ```text
//! transport ─▶ protocol ─▶ Dispatcher ─┬─ commands (client verbs)
//!                                      └─ federation (link verbs)
//!                                              │
//!                        session (Client, Peer, Directory)
//!                        channel (Channel, modes, ChannelManager)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use kestrel::{KestrelError, ServerBuilder};
//!
//! # async fn start() -> Result<(), KestrelError> {
//! let server = ServerBuilder::new()
//!     .bind("0.0.0.0:6667")
//!     .link_listener("0.0.0.0:7000")
//!     .build()
//!     .await?;
//! server.run().await
//! # }
//! ```

pub mod commands;
pub mod config;
pub mod connection;
pub mod dispatch;
mod error;
pub mod federation;
mod handler;
pub mod server;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use dispatch::{Caller, ConnectionClass, Context, Dispatcher};
pub use error::{CommandError, KestrelError};
pub use federation::{generate_sid, UidGenerator};
pub use server::{Server, ServerBuilder, ServerState};
