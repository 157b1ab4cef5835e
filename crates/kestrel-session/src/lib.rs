//! Connection state for Kestrel.
//!
//! This crate handles the lifecycle of everything that connects:
//!
//! 1. **Clients**: users, local or introduced by a linked server
//!    ([`Client`]): identity, the `PreAuth → Auth` registration machine,
//!    capability negotiation, user modes, liveness.
//! 2. **Peers**: server-to-server links ([`Peer`]) and the
//!    [`LinkAuthenticator`] that decides which may link.
//! 3. **Bookkeeping**: the per-listener [`ConnectionRegistry`] and the
//!    network-wide nick/UUID [`Directory`].
//!
//! # How it fits in the stack
//!
//! ```text
//! Channel Layer (above)  ← channels hold Arc<Client> members
//!     ↕
//! Session Layer (this crate)  ← who is connected, and as whom
//!     ↕
//! Protocol / Liveness (below)  ← case mapping, PING/PONG state
//! ```

mod auth;
mod caps;
mod client;
mod directory;
mod error;
mod peer;
mod registry;

pub use auth::{LinkAuthenticator, StaticLinkAuthenticator};
pub use caps::{CapReply, CapSet, SUPPORTED_CAPS};
pub use client::{Client, LineSender, Outbound, RegistrationState, RemoteIdentity};
pub use directory::Directory;
pub use error::SessionError;
pub use kestrel_transport::ConnectionId;
pub use peer::{Peer, PeerState};
pub use registry::{ConnectionRegistry, RegisteredConnection, RegistryStats};
