//! Error types for the Kestrel server.
//!
//! Two families live here:
//!
//! - [`KestrelError`] wraps every sub-crate error so server setup and the
//!   connection tasks can use `?` across layers.
//! - [`CommandError`] is what a command handler returns when a client did
//!   something the protocol has a numeric for. The connection boundary
//!   turns it into a reply line with [`CommandError::to_reply`] and keeps
//!   reading; it is never logged as a server fault.

use kestrel_channel::ChannelError;
use kestrel_protocol::{Numeric, ProtocolError};
use kestrel_session::SessionError;
use kestrel_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant auto-generates `From` impls,
/// so the `?` operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum KestrelError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A line that could not be parsed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (registration, link auth).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A channel-level error.
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// The configuration file could not be read.
    #[error("config: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file is not valid JSON for [`Config`](crate::Config).
    #[error("config: {0}")]
    Config(#[from] serde_json::Error),
}

/// A protocol-level failure of one command.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("not registered")]
    NotRegistered,
    #[error("already registered")]
    AlreadyRegistered,
    #[error("unknown command {0}")]
    UnknownCommand(String),
    #[error("{0}: not enough parameters")]
    NeedMoreParams(String),
    #[error("no such nick {0}")]
    NoSuchNick(String),
    #[error("no such channel {0}")]
    NoSuchChannel(String),
    #[error("not on channel {0}")]
    NotOnChannel(String),
    #[error("{nick} is not on {channel}")]
    UserNotInChannel { nick: String, channel: String },
    #[error("{nick} is already on {channel}")]
    UserOnChannel { nick: String, channel: String },
    #[error("channel operator privileges needed on {0}")]
    ChanOpPrivsNeeded(String),
    #[error("erroneous nickname {0}")]
    ErroneousNickname(String),
    #[error("nickname {0} in use")]
    NicknameInUse(String),
    #[error("{0} is invite only")]
    InviteOnlyChan(String),
    #[error("{0} needs a secure connection")]
    SecureOnlyChan(String),
    #[error("{0} is for operators only")]
    OperOnlyChan(String),
    #[error("bad key for {0}")]
    BadChannelKey(String),
    #[error("{0} is full")]
    ChannelIsFull(String),
    #[error("banned from {0}")]
    BannedFromChan(String),
    #[error("cannot send to {0}")]
    CannotSendToChan(String),
    #[error("no recipient for {0}")]
    NoRecipient(String),
    #[error("no text to send")]
    NoTextToSend,
    #[error("unknown mode {0}")]
    UnknownMode(char),
    #[error("cannot change modes of other users")]
    UsersDontMatch,
    #[error("invalid CAP subcommand {0}")]
    InvalidCapCommand(String),
    /// A peer link failed authentication. Answered with `ERROR`.
    #[error("link refused: {0}")]
    LinkRefused(String),
}

impl CommandError {
    /// The reply line for this error, addressed to `nick` (`*` before
    /// registration).
    pub fn to_reply(&self, host: &str, nick: &str) -> String {
        use CommandError::*;
        let (numeric, rest) = match self {
            NotRegistered => (Numeric::ErrNotRegistered, ":You have not registered".to_owned()),
            AlreadyRegistered => (
                Numeric::ErrAlreadyRegistered,
                ":You may not reregister".to_owned(),
            ),
            UnknownCommand(verb) => (Numeric::ErrUnknownCommand, format!("{verb} :Unknown command")),
            NeedMoreParams(cmd) => (
                Numeric::ErrNeedMoreParams,
                format!("{cmd} :Not enough parameters"),
            ),
            NoSuchNick(target) => (Numeric::ErrNoSuchNick, format!("{target} :No such nick/channel")),
            NoSuchChannel(chan) => (Numeric::ErrNoSuchChannel, format!("{chan} :No such channel")),
            NotOnChannel(chan) => (
                Numeric::ErrNotOnChannel,
                format!("{chan} :You're not on that channel"),
            ),
            UserNotInChannel { nick, channel } => (
                Numeric::ErrUserNotInChannel,
                format!("{nick} {channel} :They aren't on that channel"),
            ),
            UserOnChannel { nick, channel } => (
                Numeric::ErrUserOnChannel,
                format!("{nick} {channel} :is already on channel"),
            ),
            ChanOpPrivsNeeded(chan) => (
                Numeric::ErrChanOpPrivsNeeded,
                format!("{chan} :You're not channel operator"),
            ),
            ErroneousNickname(bad) => (
                Numeric::ErrErroneusNickname,
                format!("{bad} :Erroneous nickname: Illegal characters"),
            ),
            NicknameInUse(taken) => (
                Numeric::ErrNicknameInUse,
                format!("{taken} :Nickname is already in use"),
            ),
            InviteOnlyChan(chan) => (
                Numeric::ErrInviteOnlyChan,
                format!("{chan} :Cannot join channel (+i)"),
            ),
            SecureOnlyChan(chan) => (
                Numeric::ErrSecureOnlyChan,
                format!("{chan} :Cannot join channel (+z)"),
            ),
            OperOnlyChan(chan) => (
                Numeric::ErrOperOnlyChan,
                format!("{chan} :Only IRC operators may join {chan} (+O)"),
            ),
            BadChannelKey(chan) => (
                Numeric::ErrBadChannelKey,
                format!("{chan} :Cannot join channel (+k)"),
            ),
            ChannelIsFull(chan) => (
                Numeric::ErrChannelIsFull,
                format!("{chan} :Cannot join channel (+l)"),
            ),
            BannedFromChan(chan) => (
                Numeric::ErrBannedFromChan,
                format!("{chan} :Cannot join channel (+b)"),
            ),
            CannotSendToChan(chan) => (
                Numeric::ErrCannotSendToChan,
                format!("{chan} :Cannot send to channel"),
            ),
            NoRecipient(cmd) => (Numeric::ErrNoRecipient, format!(":No recipient given ({cmd})")),
            NoTextToSend => (Numeric::ErrNoTextToSend, ":No text to send".to_owned()),
            UnknownMode(ch) => (Numeric::ErrUnknownMode, format!("{ch} :is unknown mode char to me")),
            UsersDontMatch => (
                Numeric::ErrUsersDontMatch,
                ":Cant change mode for other users".to_owned(),
            ),
            InvalidCapCommand(sub) => (
                Numeric::ErrInvalidCapCmd,
                format!("{sub} :Invalid CAP command"),
            ),
            LinkRefused(reason) => return format!("ERROR :{reason}"),
        };
        numeric.reply(host, nick, &rest)
    }
}

impl From<ChannelError> for CommandError {
    fn from(e: ChannelError) -> Self {
        match e {
            ChannelError::NoSuchChannel(c) => Self::NoSuchChannel(c),
            ChannelError::NoSuchNick(n) => Self::NoSuchNick(n),
            ChannelError::NotOnChannel(c) => Self::NotOnChannel(c),
            ChannelError::UserNotInChannel { nick, channel } => {
                Self::UserNotInChannel { nick, channel }
            }
            ChannelError::AlreadyMember { nick, channel } => Self::UserOnChannel { nick, channel },
            ChannelError::ChanOpPrivsNeeded(c) => Self::ChanOpPrivsNeeded(c),
            ChannelError::UnknownMode(ch) => Self::UnknownMode(ch),
            ChannelError::NeedsParameter(_) => Self::NeedMoreParams("MODE".into()),
            ChannelError::ChannelFull(c) => Self::ChannelIsFull(c),
            ChannelError::InviteOnly(c) => Self::InviteOnlyChan(c),
            ChannelError::Banned(c) => Self::BannedFromChan(c),
            ChannelError::BadKey(c) => Self::BadChannelKey(c),
            ChannelError::SecureOnly(c) => Self::SecureOnlyChan(c),
            ChannelError::OperOnly(c) => Self::OperOnlyChan(c),
            ChannelError::CannotSend(c) => Self::CannotSendToChan(c),
        }
    }
}

impl From<SessionError> for CommandError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::AlreadyRegistered => Self::AlreadyRegistered,
            SessionError::ErroneousNickname(n) => Self::ErroneousNickname(n),
            SessionError::NicknameInUse(n) => Self::NicknameInUse(n),
            SessionError::AuthFailed(_) => Self::LinkRefused("Invalid credentials".into()),
        }
    }
}
