//! Wire protocol for Kestrel.
//!
//! This crate defines the "language" that clients and peer servers speak:
//!
//! - **Messages** ([`Message`]): one inbound line tokenized into prefix,
//!   verb, positional parameters and an optional trailing argument.
//! - **Numerics** ([`Numeric`]): the reply-code catalogue, printed as the
//!   three-digit form that goes on the wire.
//! - **Case mapping** ([`irc_lower`], [`is_valid_nick`], ...): RFC 1459
//!   case folding and the validation rules for names and identifiers.
//! - **Errors** ([`ProtocolError`]): what can go wrong while parsing.
//!
//! # Architecture
//!
//! The protocol layer sits between transport (raw lines) and session
//! (client identity). It doesn't know about connections or channels;
//! it only knows how lines are shaped.
//!
//! ```text
//! Transport (lines) → Protocol (Message) → Dispatch (handlers)
//! ```

// ---------------------------------------------------------------------------
// Module declarations
// ---------------------------------------------------------------------------

mod casemap;
mod error;
mod message;
mod numeric;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use casemap::{
    irc_eq, irc_lower, is_sid, is_uuid, is_valid_channel, is_valid_nick,
    wildcard_match, NICK_MAX_LEN,
};
pub use error::ProtocolError;
pub use message::Message;
pub use numeric::Numeric;
