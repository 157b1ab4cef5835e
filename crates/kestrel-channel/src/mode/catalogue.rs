//! The standard channel mode catalogue.

use crate::mode::{
    AllSecureMode, BanMode, ChannelMode, FlagMode, KeyMode, LimitMode, ModeCategory,
    ModeDescriptor, ModeMap, PrefixMode,
};
use crate::Privilege;

const fn desc(
    ch: char,
    name: &'static str,
    category: ModeCategory,
    min_privilege: Privilege,
    grants: Option<Privilege>,
) -> ModeDescriptor {
    ModeDescriptor {
        ch,
        name,
        category,
        min_privilege,
        grants,
    }
}

/// Every channel mode the server knows.
pub static CATALOGUE: &[ModeDescriptor] = &[
    desc('b', "ban", ModeCategory::List, Privilege::Halfop, None),
    desc('k', "key", ModeCategory::Param, Privilege::Op, None),
    desc('l', "limit", ModeCategory::ParamOnSet, Privilege::Op, None),
    desc('i', "invite-only", ModeCategory::Flag, Privilege::Op, None),
    desc('m', "moderated", ModeCategory::Flag, Privilege::Halfop, None),
    desc('n', "no-external", ModeCategory::Flag, Privilege::Op, None),
    desc('t', "topic-lock", ModeCategory::Flag, Privilege::Halfop, None),
    desc('s', "secret", ModeCategory::Flag, Privilege::Op, None),
    desc('z', "secure-only", ModeCategory::Flag, Privilege::Op, None),
    desc('Z', "all-secure", ModeCategory::Flag, Privilege::Op, None),
    desc('O', "oper-only", ModeCategory::Flag, Privilege::Op, None),
    desc('P', "permanent", ModeCategory::Flag, Privilege::Op, None),
    desc('v', "voice", ModeCategory::PerUser, Privilege::Halfop, Some(Privilege::Voice)),
    desc('h', "halfop", ModeCategory::PerUser, Privilege::Op, Some(Privilege::Halfop)),
    desc('o', "op", ModeCategory::PerUser, Privilege::Op, Some(Privilege::Op)),
    desc('a', "admin", ModeCategory::PerUser, Privilege::Owner, Some(Privilege::Admin)),
    desc('q', "owner", ModeCategory::PerUser, Privilege::Owner, Some(Privilege::Owner)),
];

/// Looks up a mode by character.
pub fn descriptor(ch: char) -> Option<&'static ModeDescriptor> {
    CATALOGUE.iter().find(|d| d.ch == ch)
}

/// A fresh set of mode objects for a new channel.
pub fn standard() -> ModeMap {
    let mut modes = ModeMap::new();
    for d in CATALOGUE {
        let mode: Box<dyn ChannelMode> = match (d.category, d.ch) {
            (ModeCategory::List, _) => Box::new(BanMode::new(d)),
            (ModeCategory::Param, _) => Box::new(KeyMode::new(d)),
            (ModeCategory::ParamOnSet, _) => Box::new(LimitMode::new(d)),
            (ModeCategory::PerUser, _) => Box::new(PrefixMode::new(d)),
            (ModeCategory::Flag, 'Z') => Box::new(AllSecureMode::new(d)),
            (ModeCategory::Flag, _) => Box::new(FlagMode::new(d)),
        };
        modes.insert(d.ch, mode);
    }
    modes
}

/// `PREFIX=` value, e.g. `(qaohv)~&@%+`.
pub fn prefix_isupport() -> String {
    let (modes, symbols): (String, String) = Privilege::DESCENDING
        .iter()
        .filter_map(|p| Some((p.mode_char()?, p.symbol()?)))
        .unzip();
    format!("({modes}){symbols}")
}

/// `CHANMODES=` value: list, param, param-on-set, flag groups.
pub fn chanmodes_isupport() -> String {
    let group = |category: ModeCategory| -> String {
        CATALOGUE
            .iter()
            .filter(|d| d.category == category)
            .map(|d| d.ch)
            .collect()
    };
    format!(
        "{},{},{},{}",
        group(ModeCategory::List),
        group(ModeCategory::Param),
        group(ModeCategory::ParamOnSet),
        group(ModeCategory::Flag)
    )
}
