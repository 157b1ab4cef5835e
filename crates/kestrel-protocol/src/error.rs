//! Error types for the protocol layer.
//!
//! Each crate in Kestrel defines its own error enum. When you see a
//! `ProtocolError`, you know the line itself was malformed, not that a
//! channel or connection refused the command.

/// Errors that can occur while parsing a protocol line.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The line was empty (or only whitespace / message tags).
    #[error("empty line")]
    EmptyLine,

    /// A `:prefix` was present but nothing followed it.
    #[error("line has a prefix but no command")]
    MissingVerb,

    /// The line is invalid at the protocol level.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
