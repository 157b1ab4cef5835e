//! Reply-code catalogue.
//!
//! Only the codes the daemon actually emits are listed. The enum exists so
//! handlers name replies by meaning; [`Numeric::code`] gives the printable
//! three-digit form.

use std::fmt;

/// A numeric reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Numeric {
    RplWelcome,
    RplYourHost,
    RplCreated,
    RplMyInfo,
    RplISupport,
    RplUModeIs,
    RplAway,
    RplUnAway,
    RplNowAway,
    RplWhoisUser,
    RplWhoisServer,
    RplWhoisOperator,
    RplEndOfWho,
    RplWhoisIdle,
    RplEndOfWhois,
    RplWhoisChannels,
    RplListStart,
    RplList,
    RplListEnd,
    RplChannelModeIs,
    RplCreationTime,
    RplNoTopic,
    RplTopic,
    RplTopicWhoTime,
    RplInviting,
    RplVersion,
    RplWhoReply,
    RplNamReply,
    RplEndOfNames,
    RplBanList,
    RplEndOfBanList,
    RplMotd,
    RplMotdStart,
    RplEndOfMotd,
    RplWhoisSecure,
    ErrNoSuchNick,
    ErrNoSuchChannel,
    ErrCannotSendToChan,
    ErrInvalidCapCmd,
    ErrNoRecipient,
    ErrNoTextToSend,
    ErrUnknownCommand,
    ErrNoMotd,
    ErrErroneusNickname,
    ErrNicknameInUse,
    ErrUserNotInChannel,
    ErrNotOnChannel,
    ErrUserOnChannel,
    ErrNotRegistered,
    ErrNeedMoreParams,
    ErrAlreadyRegistered,
    ErrChannelIsFull,
    ErrUnknownMode,
    ErrInviteOnlyChan,
    ErrBannedFromChan,
    ErrBadChannelKey,
    ErrSecureOnlyChan,
    ErrChanOpPrivsNeeded,
    ErrUsersDontMatch,
    ErrOperOnlyChan,
}

impl Numeric {
    /// The three-digit wire form.
    pub fn code(self) -> &'static str {
        match self {
            Self::RplWelcome => "001",
            Self::RplYourHost => "002",
            Self::RplCreated => "003",
            Self::RplMyInfo => "004",
            Self::RplISupport => "005",
            Self::RplUModeIs => "221",
            Self::RplAway => "301",
            Self::RplUnAway => "305",
            Self::RplNowAway => "306",
            Self::RplWhoisUser => "311",
            Self::RplWhoisServer => "312",
            Self::RplWhoisOperator => "313",
            Self::RplEndOfWho => "315",
            Self::RplWhoisIdle => "317",
            Self::RplEndOfWhois => "318",
            Self::RplWhoisChannels => "319",
            Self::RplListStart => "321",
            Self::RplList => "322",
            Self::RplListEnd => "323",
            Self::RplChannelModeIs => "324",
            Self::RplCreationTime => "329",
            Self::RplNoTopic => "331",
            Self::RplTopic => "332",
            Self::RplTopicWhoTime => "333",
            Self::RplInviting => "341",
            Self::RplVersion => "351",
            Self::RplWhoReply => "352",
            Self::RplNamReply => "353",
            Self::RplEndOfNames => "366",
            Self::RplBanList => "367",
            Self::RplEndOfBanList => "368",
            Self::RplMotd => "372",
            Self::RplMotdStart => "375",
            Self::RplEndOfMotd => "376",
            Self::RplWhoisSecure => "671",
            Self::ErrNoSuchNick => "401",
            Self::ErrNoSuchChannel => "403",
            Self::ErrCannotSendToChan => "404",
            Self::ErrInvalidCapCmd => "410",
            Self::ErrNoRecipient => "411",
            Self::ErrNoTextToSend => "412",
            Self::ErrUnknownCommand => "421",
            Self::ErrNoMotd => "422",
            Self::ErrErroneusNickname => "432",
            Self::ErrNicknameInUse => "433",
            Self::ErrUserNotInChannel => "441",
            Self::ErrNotOnChannel => "442",
            Self::ErrUserOnChannel => "443",
            Self::ErrNotRegistered => "451",
            Self::ErrNeedMoreParams => "461",
            Self::ErrAlreadyRegistered => "462",
            Self::ErrChannelIsFull => "471",
            Self::ErrUnknownMode => "472",
            Self::ErrInviteOnlyChan => "473",
            Self::ErrBannedFromChan => "474",
            Self::ErrBadChannelKey => "475",
            Self::ErrSecureOnlyChan => "489",
            Self::ErrChanOpPrivsNeeded => "482",
            Self::ErrUsersDontMatch => "502",
            Self::ErrOperOnlyChan => "520",
        }
    }

    /// Formats a complete reply line: `:<host> <code> <target> <rest>`.
    ///
    /// `target` is `*` for connections that have no nickname yet.
    pub fn reply(self, host: &str, target: &str, rest: &str) -> String {
        format!(":{host} {} {target} {rest}", self.code())
    }
}

impl fmt::Display for Numeric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_is_three_digits() {
        for n in [
            Numeric::RplWelcome,
            Numeric::RplNamReply,
            Numeric::ErrNotRegistered,
            Numeric::ErrOperOnlyChan,
        ] {
            assert_eq!(n.code().len(), 3);
            assert!(n.code().chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_reply_formats_full_line() {
        let line = Numeric::ErrNoSuchNick.reply("irc.test", "alice", "bob :No such nick/channel");
        assert_eq!(line, ":irc.test 401 alice bob :No such nick/channel");
    }

    #[test]
    fn test_display_matches_code() {
        assert_eq!(Numeric::RplChannelModeIs.to_string(), "324");
    }
}
