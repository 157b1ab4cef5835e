//! Error types for the session layer.

/// Errors that can occur while registering or renaming a connection, or
/// while authenticating a peer link.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SessionError {
    /// `USER` (or a second registration) after the connection reached
    /// `Auth`. Registration is one-way.
    #[error("connection is already registered")]
    AlreadyRegistered,

    /// The requested nickname contains illegal characters.
    #[error("erroneous nickname: {0}")]
    ErroneousNickname(String),

    /// Another connection already holds this nickname (case-insensitively).
    #[error("nickname {0} is already in use")]
    NicknameInUse(String),

    /// A peer link presented credentials that don't match configuration.
    #[error("link authentication failed: {0}")]
    AuthFailed(String),
}
