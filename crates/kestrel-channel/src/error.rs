//! Error types for the channel layer.

/// Errors from channel membership and mode operations.
///
/// Each variant maps onto one IRC error numeric; the command layer does
/// the formatting.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    /// The channel does not exist.
    #[error("no such channel {0}")]
    NoSuchChannel(String),

    /// A nick named as a mode target or kick victim does not exist.
    #[error("no such nick {0}")]
    NoSuchNick(String),

    /// The acting client is not a member of the channel.
    #[error("not on channel {0}")]
    NotOnChannel(String),

    /// The named target is not a member of the channel.
    #[error("{nick} is not on channel {channel}")]
    UserNotInChannel { nick: String, channel: String },

    /// The client is already a member.
    #[error("{nick} is already on channel {channel}")]
    AlreadyMember { nick: String, channel: String },

    /// The acting client's privilege is below what the action requires.
    #[error("channel operator privileges needed on {0}")]
    ChanOpPrivsNeeded(String),

    /// No mode with this character exists.
    #[error("unknown mode character {0}")]
    UnknownMode(char),

    /// A mode that needs a parameter was given none.
    #[error("mode {0} needs a parameter")]
    NeedsParameter(char),

    // -- Join refusals ----------------------------------------------------
    #[error("channel {0} is full")]
    ChannelFull(String),

    #[error("channel {0} is invite only")]
    InviteOnly(String),

    #[error("banned from channel {0}")]
    Banned(String),

    #[error("bad channel key for {0}")]
    BadKey(String),

    #[error("channel {0} requires a secure connection")]
    SecureOnly(String),

    #[error("channel {0} is for operators only")]
    OperOnly(String),

    /// `+m` is set and the sender has no voice.
    #[error("cannot send to channel {0}")]
    CannotSend(String),
}
