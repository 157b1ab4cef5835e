//! Member privilege levels.

use std::fmt;

/// A member's standing in a channel, totally ordered from lowest to
/// highest.
///
/// Every member has exactly one level. It is the highest level granted
/// by any prefix mode the member currently holds, or `Normal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Privilege {
    #[default]
    Normal,
    Voice,
    Halfop,
    Op,
    Admin,
    Owner,
}

impl Privilege {
    /// All levels, highest first. The order used for NAMES prefixes and
    /// the `PREFIX` ISUPPORT token.
    pub const DESCENDING: [Privilege; 5] = [
        Privilege::Owner,
        Privilege::Admin,
        Privilege::Op,
        Privilege::Halfop,
        Privilege::Voice,
    ];

    /// NAMES/WHO prefix symbol. `None` for `Normal`.
    pub fn symbol(self) -> Option<char> {
        match self {
            Privilege::Normal => None,
            Privilege::Voice => Some('+'),
            Privilege::Halfop => Some('%'),
            Privilege::Op => Some('@'),
            Privilege::Admin => Some('&'),
            Privilege::Owner => Some('~'),
        }
    }

    /// The channel mode that grants this level.
    pub fn mode_char(self) -> Option<char> {
        match self {
            Privilege::Normal => None,
            Privilege::Voice => Some('v'),
            Privilege::Halfop => Some('h'),
            Privilege::Op => Some('o'),
            Privilege::Admin => Some('a'),
            Privilege::Owner => Some('q'),
        }
    }
}

impl fmt::Display for Privilege {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Privilege::Normal => "normal",
            Privilege::Voice => "voice",
            Privilege::Halfop => "halfop",
            Privilege::Op => "op",
            Privilege::Admin => "admin",
            Privilege::Owner => "owner",
        };
        f.write_str(name)
    }
}
