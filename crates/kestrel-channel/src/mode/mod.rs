//! The mode policy engine.
//!
//! Every channel mode is a small policy object implementing
//! [`ChannelMode`]. A channel owns one fresh instance of every mode in the
//! [`standard`] catalogue and routes each `+x` / `-x` through the matching
//! object's [`grant`](ChannelMode::grant) or [`revoke`](ChannelMode::revoke).
//!
//! # The contract every mode follows
//!
//! 1. Unless `force` is set, the setter must hold at least the mode's
//!    minimum privilege ([`ModeContext::require_privilege`]).
//! 2. Per-user modes also need both setter and target to be members.
//! 3. Enabling something already enabled (or disabling something already
//!    disabled) is [`ModeEffect::Unchanged`], unless `force` is set.
//! 4. State mutates inside the call; announcing is the channel's job and
//!    happens after its lock is released.
//!
//! Modes run while the channel holds its state lock, so a mode that needs
//! to look at the whole membership (the `Z` gate) sees one consistent
//! snapshot for its entire decision.

mod catalogue;
mod flag;
mod gate;
mod list;
mod param;
mod prefix;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use kestrel_session::{Client, ConnectionId, Directory};

use crate::{ChannelError, Member, Privilege};

pub use catalogue::{chanmodes_isupport, descriptor, prefix_isupport, standard, CATALOGUE};
pub use flag::FlagMode;
pub use gate::AllSecureMode;
pub use list::BanMode;
pub use param::{KeyMode, LimitMode};
pub use prefix::PrefixMode;

/// All modes of one channel, keyed (and therefore serialized) by
/// character.
pub type ModeMap = BTreeMap<char, Box<dyn ChannelMode>>;

// ---------------------------------------------------------------------------
// Descriptors and values
// ---------------------------------------------------------------------------

/// How a mode behaves on the wire. Drives `CHANMODES` grouping and
/// parameter parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeCategory {
    /// Repeatable list; `+b` alone queries it. Always takes a parameter.
    List,
    /// Takes a parameter when set and when unset.
    Param,
    /// Takes a parameter only when set.
    ParamOnSet,
    /// On/off.
    Flag,
    /// Grants a privilege level to one member. Takes a nick.
    PerUser,
}

impl ModeCategory {
    /// Whether a change in this category consumes an argument.
    pub fn takes_param(self, adding: bool) -> bool {
        match self {
            ModeCategory::List | ModeCategory::Param | ModeCategory::PerUser => true,
            ModeCategory::ParamOnSet => adding,
            ModeCategory::Flag => false,
        }
    }
}

/// Static facts about a mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeDescriptor {
    pub ch: char,
    pub name: &'static str,
    pub category: ModeCategory,
    /// Lowest privilege allowed to change it without `force`.
    pub min_privilege: Privilege,
    /// For per-user modes, the level a holder gets.
    pub grants: Option<Privilege>,
}

/// The current value of a mode.
///
/// `Disabled` is an ordinary answer, not an error: "is `+k` set?" is
/// `value() != Disabled`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModeValue {
    Disabled,
    Enabled,
    Param(String),
    List(Vec<String>),
}

/// What a `grant` / `revoke` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModeEffect {
    /// Nothing changed; nothing is announced.
    Unchanged,
    /// State changed. `param` is the argument to announce, normalized
    /// (canonical nick, expanded ban mask).
    Changed { param: Option<String> },
}

impl ModeEffect {
    pub fn changed(&self) -> bool {
        matches!(self, ModeEffect::Changed { .. })
    }
}

// ---------------------------------------------------------------------------
// ChannelMode
// ---------------------------------------------------------------------------

/// A pluggable channel mode.
///
/// `Send + Sync` because channels are shared between connection tasks.
pub trait ChannelMode: Send + Sync {
    fn descriptor(&self) -> &'static ModeDescriptor;

    /// Handles `+x [arg]`.
    fn grant(
        &mut self,
        ctx: &mut ModeContext<'_>,
        arg: Option<&str>,
        force: bool,
    ) -> Result<ModeEffect, ChannelError>;

    /// Handles `-x [arg]`.
    fn revoke(
        &mut self,
        ctx: &mut ModeContext<'_>,
        arg: Option<&str>,
        force: bool,
    ) -> Result<ModeEffect, ChannelError>;

    fn value(&self) -> ModeValue;

    fn is_enabled(&self) -> bool {
        match self.value() {
            ModeValue::Disabled => false,
            ModeValue::List(entries) => !entries.is_empty(),
            ModeValue::Enabled | ModeValue::Param(_) => true,
        }
    }

    /// Per-user modes: whether `id` currently holds this mode.
    fn holds(&self, _id: ConnectionId) -> bool {
        false
    }

    /// Drops any per-member state for a departing member.
    fn forget(&mut self, _id: ConnectionId) {}
}

// ---------------------------------------------------------------------------
// ModeContext
// ---------------------------------------------------------------------------

/// Everything a mode may look at or touch while it runs.
///
/// Built by the channel under its state lock. The mode being applied is
/// temporarily out of `others`, so a mode can read its companions but
/// never itself.
pub struct ModeContext<'a> {
    channel: &'a str,
    setter: Option<&'a Arc<Client>>,
    members: &'a mut HashMap<ConnectionId, Member>,
    others: &'a ModeMap,
    directory: &'a Directory,
}

impl<'a> ModeContext<'a> {
    pub(crate) fn new(
        channel: &'a str,
        setter: Option<&'a Arc<Client>>,
        members: &'a mut HashMap<ConnectionId, Member>,
        others: &'a ModeMap,
        directory: &'a Directory,
    ) -> Self {
        Self {
            channel,
            setter,
            members,
            others,
            directory,
        }
    }

    pub fn channel(&self) -> &str {
        self.channel
    }

    /// The acting client; `None` when a server sets the mode.
    pub fn setter(&self) -> Option<&Arc<Client>> {
        self.setter
    }

    /// Fails unless the setter is a member. Servers always pass.
    pub fn require_setter_member(&self) -> Result<(), ChannelError> {
        match self.setter {
            Some(setter) if !self.members.contains_key(&setter.id()) => {
                Err(ChannelError::NotOnChannel(self.channel.to_owned()))
            }
            _ => Ok(()),
        }
    }

    /// Fails unless the setter's privilege is at least `min`. `force` and
    /// server setters always pass.
    pub fn require_privilege(&self, min: Privilege, force: bool) -> Result<(), ChannelError> {
        if force {
            return Ok(());
        }
        let Some(setter) = self.setter else {
            return Ok(());
        };
        let member = self
            .members
            .get(&setter.id())
            .ok_or_else(|| ChannelError::NotOnChannel(self.channel.to_owned()))?;
        if member.privilege < min {
            return Err(ChannelError::ChanOpPrivsNeeded(self.channel.to_owned()));
        }
        Ok(())
    }

    /// Resolves `nick` (or UUID) to a current member.
    ///
    /// # Errors
    /// - [`ChannelError::NoSuchNick`] if nobody has that name
    /// - [`ChannelError::UserNotInChannel`] if they aren't a member
    pub fn resolve_member(&self, nick: &str) -> Result<Arc<Client>, ChannelError> {
        let client = self
            .directory
            .resolve(nick)
            .ok_or_else(|| ChannelError::NoSuchNick(nick.to_owned()))?;
        if !self.members.contains_key(&client.id()) {
            return Err(ChannelError::UserNotInChannel {
                nick: client.nick().unwrap_or_else(|| nick.to_owned()),
                channel: self.channel.to_owned(),
            });
        }
        Ok(client)
    }

    pub fn privilege_of(&self, id: ConnectionId) -> Privilege {
        self.members
            .get(&id)
            .map(|m| m.privilege)
            .unwrap_or_default()
    }

    /// Sets a member's privilege. No-op for non-members.
    pub fn set_privilege(&mut self, id: ConnectionId, privilege: Privilege) {
        if let Some(member) = self.members.get_mut(&id) {
            member.privilege = privilege;
        }
    }

    /// The highest level `id` still holds through per-user modes other
    /// than the one currently running.
    pub fn recomputed_privilege(&self, id: ConnectionId) -> Privilege {
        self.others
            .values()
            .filter(|m| m.holds(id))
            .filter_map(|m| m.descriptor().grants)
            .max()
            .unwrap_or_default()
    }

    pub fn members(&self) -> impl Iterator<Item = &Member> {
        self.members.values()
    }

    /// Another mode of the same channel.
    pub fn mode(&self, ch: char) -> Option<&dyn ChannelMode> {
        self.others.get(&ch).map(|m| m.as_ref())
    }
}

// ---------------------------------------------------------------------------
// Change parsing
// ---------------------------------------------------------------------------

/// One `+x arg` / `-x` from a MODE line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeChange {
    pub adding: bool,
    pub ch: char,
    pub arg: Option<String>,
}

impl ModeChange {
    pub fn new(adding: bool, ch: char, arg: Option<&str>) -> Self {
        Self {
            adding,
            ch,
            arg: arg.map(str::to_owned),
        }
    }
}

/// Splits `"+ov-k"` plus its arguments into individual changes, pairing
/// arguments by each mode's category.
///
/// Unknown characters come back in the error list. A list mode with no
/// argument left is kept with `arg: None` (a list query). Any other mode
/// that is short of an argument is dropped with
/// [`ChannelError::NeedsParameter`].
pub fn parse_changes(modes: &str, args: &[&str]) -> (Vec<ModeChange>, Vec<ChannelError>) {
    let mut changes = Vec::new();
    let mut errors = Vec::new();
    let mut args = args.iter();
    let mut adding = true;

    for ch in modes.chars() {
        match ch {
            '+' => adding = true,
            '-' => adding = false,
            _ => {
                let Some(desc) = descriptor(ch) else {
                    errors.push(ChannelError::UnknownMode(ch));
                    continue;
                };
                if !desc.category.takes_param(adding) {
                    changes.push(ModeChange::new(adding, ch, None));
                    continue;
                }
                match args.next() {
                    Some(arg) => changes.push(ModeChange::new(adding, ch, Some(arg))),
                    None if desc.category == ModeCategory::List => {
                        changes.push(ModeChange::new(adding, ch, None));
                    }
                    None => errors.push(ChannelError::NeedsParameter(ch)),
                }
            }
        }
    }
    (changes, errors)
}

/// Renders applied changes as one MODE argument run:
/// `("+ov-k", ["alice", "bob", "key"])`.
pub fn format_changes(changes: &[ModeChange]) -> (String, Vec<String>) {
    let mut modes = String::new();
    let mut params = Vec::new();
    let mut current: Option<bool> = None;
    for change in changes {
        if current != Some(change.adding) {
            modes.push(if change.adding { '+' } else { '-' });
            current = Some(change.adding);
        }
        modes.push(change.ch);
        if let Some(arg) = &change.arg {
            params.push(arg.clone());
        }
    }
    (modes, params)
}

#[cfg(test)]
mod tests {
    use super::*;

    // =====================================================================
    // parse_changes()
    // =====================================================================

    #[test]
    fn test_parse_changes_pairs_args_by_category() {
        let (changes, errors) = parse_changes("+ol-k", &["alice", "10", "key"]);
        assert!(errors.is_empty());
        assert_eq!(
            changes,
            vec![
                ModeChange::new(true, 'o', Some("alice")),
                ModeChange::new(true, 'l', Some("10")),
                ModeChange::new(false, 'k', Some("key")),
            ]
        );
    }

    #[test]
    fn test_parse_changes_limit_unset_takes_no_arg() {
        let (changes, _) = parse_changes("-l+v", &["bob"]);
        assert_eq!(
            changes,
            vec![
                ModeChange::new(false, 'l', None),
                ModeChange::new(true, 'v', Some("bob")),
            ]
        );
    }

    #[test]
    fn test_parse_changes_bare_ban_is_query() {
        let (changes, errors) = parse_changes("+b", &[]);
        assert!(errors.is_empty());
        assert_eq!(changes, vec![ModeChange::new(true, 'b', None)]);
    }

    #[test]
    fn test_parse_changes_unknown_and_missing_reported() {
        let (changes, errors) = parse_changes("+Xo", &[]);
        assert!(changes.is_empty());
        assert_eq!(
            errors,
            vec![
                ChannelError::UnknownMode('X'),
                ChannelError::NeedsParameter('o')
            ]
        );
    }

    // =====================================================================
    // format_changes()
    // =====================================================================

    #[test]
    fn test_format_changes_groups_signs() {
        let changes = vec![
            ModeChange::new(true, 'o', Some("alice")),
            ModeChange::new(true, 'v', Some("bob")),
            ModeChange::new(false, 'n', None),
        ];
        let (modes, params) = format_changes(&changes);
        assert_eq!(modes, "+ov-n");
        assert_eq!(params, vec!["alice", "bob"]);
    }
}
