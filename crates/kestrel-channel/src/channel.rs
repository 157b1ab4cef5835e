//! A single channel: members, privileges, topic, and modes.
//!
//! # Locking
//!
//! All mutable state of a channel lives in one `parking_lot::Mutex`. Every
//! operation takes it once, decides and mutates, collects the lines to
//! send and who should get them, and releases it. Only then are lines
//! pushed onto the members' outbound queues, so no lock is ever held while
//! a slow member's writer catches up.
//!
//! ```text
//! lock ─→ check ─→ mutate ─→ snapshot recipients ─→ unlock ─→ send each
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use kestrel_session::{Client, ConnectionId, Directory};
use parking_lot::Mutex;

use crate::mode::{
    self, format_changes, BanMode, ModeChange, ModeContext, ModeEffect, ModeMap, ModeValue,
};
use crate::{ChannelError, Privilege};

// ---------------------------------------------------------------------------
// Public value types
// ---------------------------------------------------------------------------

/// One member of a channel.
#[derive(Debug, Clone)]
pub struct Member {
    pub client: Arc<Client>,
    pub privilege: Privilege,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    pub text: String,
    pub set_by: String,
    pub set_at: i64,
}

/// How a mode change is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeOptions {
    /// Skip privilege and no-op checks.
    pub force: bool,
    /// Broadcast a MODE line for applied changes.
    pub announce: bool,
    /// Include the setter in that broadcast.
    pub notify_setter: bool,
}

impl Default for ModeOptions {
    fn default() -> Self {
        Self {
            force: false,
            announce: true,
            notify_setter: true,
        }
    }
}

impl ModeOptions {
    /// Forced and announced. Used for changes from linked servers.
    pub fn forced() -> Self {
        Self {
            force: true,
            ..Self::default()
        }
    }

    /// Forced and not announced. Used for automatic modes.
    pub fn silent() -> Self {
        Self {
            force: true,
            announce: false,
            notify_setter: false,
        }
    }
}

/// Result of [`Channel::apply_modes`].
#[derive(Debug, Default)]
pub struct ModeOutcome {
    /// Changes that took effect, with normalized arguments.
    pub applied: Vec<ModeChange>,
    /// Per-change failures. Other changes still apply.
    pub errors: Vec<ChannelError>,
}

impl ModeOutcome {
    /// `"+ov alice bob"`, or `None` if nothing changed.
    pub fn mode_args(&self) -> Option<String> {
        if self.applied.is_empty() {
            return None;
        }
        let (modes, params) = format_changes(&self.applied);
        let mut out = modes;
        for p in params {
            out.push(' ');
            out.push_str(&p);
        }
        Some(out)
    }
}

/// How a member leaves.
#[derive(Debug, Clone, Copy)]
pub enum Departure<'a> {
    /// PART, seen by the whole room including the leaver.
    Part(Option<&'a str>),
    /// KICK by `by` (a mask), seen by the whole room including the victim.
    Kick { by: &'a str, reason: &'a str },
    /// No notice. The caller announces (QUIT is sent once per peer, not
    /// once per channel).
    Silent,
}

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

struct ChannelState {
    members: HashMap<ConnectionId, Member>,
    modes: ModeMap,
    topic: Option<Topic>,
    /// Set when the channel is reaped; a closed channel refuses joins.
    closed: bool,
}

impl ChannelState {
    fn recipients(&self, skip: Option<ConnectionId>) -> Vec<Arc<Client>> {
        self.members
            .values()
            .filter(|m| Some(m.client.id()) != skip)
            .map(|m| Arc::clone(&m.client))
            .collect()
    }

    fn value(&self, ch: char) -> ModeValue {
        self.modes
            .get(&ch)
            .map(|m| m.value())
            .unwrap_or(ModeValue::Disabled)
    }

    fn has_mode(&self, ch: char) -> bool {
        self.modes.get(&ch).is_some_and(|m| m.is_enabled())
    }

    fn privilege(&self, id: ConnectionId) -> Privilege {
        self.members
            .get(&id)
            .map(|m| m.privilege)
            .unwrap_or_default()
    }

    fn is_banned(&self, client: &Client) -> bool {
        match self.value('b') {
            ModeValue::List(masks) => BanMode::matches(&masks, &client.mask()),
            _ => false,
        }
    }
}

/// A chat room.
pub struct Channel {
    name: String,
    created: i64,
    state: Mutex<ChannelState>,
}

fn deliver(recipients: &[Arc<Client>], line: &str) -> usize {
    recipients
        .iter()
        .filter(|c| c.send(line.to_owned()))
        .count()
}

impl Channel {
    /// Creates an empty channel with every standard mode disabled.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_created(name, Utc::now().timestamp())
    }

    /// Creates an empty channel with a known creation time (from a burst).
    pub fn with_created(name: impl Into<String>, created: i64) -> Self {
        Self {
            name: name.into(),
            created,
            state: Mutex::new(ChannelState {
                members: HashMap::new(),
                modes: mode::standard(),
                topic: None,
                closed: false,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn created(&self) -> i64 {
        self.created
    }

    // -- Membership -------------------------------------------------------

    /// Adds `client` with no entry checks and announces the JOIN to the
    /// whole room, the joiner included. Returns the member count after.
    ///
    /// # Errors
    /// [`ChannelError::AlreadyMember`]; [`ChannelError::NoSuchChannel`] if
    /// the channel was reaped meanwhile.
    pub fn add(&self, client: &Arc<Client>) -> Result<usize, ChannelError> {
        let (count, recipients) = {
            let mut state = self.state.lock();
            self.insert_locked(&mut state, client)?
        };
        deliver(&recipients, &format!(":{} JOIN :{}", client.mask(), self.name));
        Ok(count)
    }

    /// Adds `client` if the channel's entry modes allow it.
    ///
    /// Checks, in order: `+z` or `+Z`, `+O`, `+b`, `+i` (an invite passes), `+k`,
    /// `+l`. A pending invite is consumed on success.
    pub fn join(&self, client: &Arc<Client>, key: Option<&str>) -> Result<usize, ChannelError> {
        let invited = client.is_invited(&self.name);
        let (count, recipients) = {
            let mut state = self.state.lock();
            let name = || self.name.clone();
            if (state.has_mode('z') || state.has_mode('Z')) && !client.is_secure() {
                return Err(ChannelError::SecureOnly(name()));
            }
            if state.has_mode('O') && !client.is_oper() {
                return Err(ChannelError::OperOnly(name()));
            }
            if state.is_banned(client) && !invited {
                return Err(ChannelError::Banned(name()));
            }
            if state.has_mode('i') && !invited {
                return Err(ChannelError::InviteOnly(name()));
            }
            if let ModeValue::Param(expected) = state.value('k') {
                if key != Some(expected.as_str()) {
                    return Err(ChannelError::BadKey(name()));
                }
            }
            if let ModeValue::Param(limit) = state.value('l') {
                if limit.parse::<usize>().is_ok_and(|l| state.members.len() >= l) {
                    return Err(ChannelError::ChannelFull(name()));
                }
            }
            self.insert_locked(&mut state, client)?
        };
        if invited {
            client.take_invite(&self.name);
        }
        deliver(&recipients, &format!(":{} JOIN :{}", client.mask(), self.name));
        Ok(count)
    }

    fn insert_locked(
        &self,
        state: &mut ChannelState,
        client: &Arc<Client>,
    ) -> Result<(usize, Vec<Arc<Client>>), ChannelError> {
        if state.closed {
            return Err(ChannelError::NoSuchChannel(self.name.clone()));
        }
        if state.members.contains_key(&client.id()) {
            return Err(ChannelError::AlreadyMember {
                nick: client.nick_or_star(),
                channel: self.name.clone(),
            });
        }
        state.members.insert(
            client.id(),
            Member {
                client: Arc::clone(client),
                privilege: Privilege::Normal,
            },
        );
        tracing::debug!(channel = %self.name, conn_id = %client.id(), "member added");
        Ok((state.members.len(), state.recipients(None)))
    }

    /// Removes `client`, dropping its privilege and any per-user mode
    /// state. Returns `false` if it wasn't a member.
    pub fn remove(&self, client: &Client, departure: Departure<'_>) -> bool {
        let recipients = {
            let mut state = self.state.lock();
            let recipients = state.recipients(None);
            if state.members.remove(&client.id()).is_none() {
                return false;
            }
            for mode in state.modes.values_mut() {
                mode.forget(client.id());
            }
            recipients
        };
        tracing::debug!(channel = %self.name, conn_id = %client.id(), "member removed");

        let line = match departure {
            Departure::Part(Some(reason)) => {
                format!(":{} PART {} :{}", client.mask(), self.name, reason)
            }
            Departure::Part(None) => format!(":{} PART {}", client.mask(), self.name),
            Departure::Kick { by, reason } => format!(
                ":{} KICK {} {} :{}",
                by,
                self.name,
                client.nick_or_star(),
                reason
            ),
            Departure::Silent => return true,
        };
        deliver(&recipients, &line);
        true
    }

    /// Sends `line` to every member, optionally skipping `source`. Returns
    /// how many queues accepted it. One member's failure doesn't affect
    /// the rest.
    pub fn send_to_room(
        &self,
        source: Option<ConnectionId>,
        line: &str,
        include_source: bool,
    ) -> usize {
        let skip = if include_source { None } else { source };
        let recipients = self.state.lock().recipients(skip);
        deliver(&recipients, line)
    }

    /// The member's privilege; `Normal` for non-members.
    pub fn status(&self, id: ConnectionId) -> Privilege {
        self.state.lock().privilege(id)
    }

    pub fn is_member(&self, id: ConnectionId) -> bool {
        self.state.lock().members.contains_key(&id)
    }

    pub fn members(&self) -> Vec<Arc<Client>> {
        self.state.lock().recipients(None)
    }

    /// Members with their privileges, highest first and then by nick.
    pub fn member_list(&self) -> Vec<Member> {
        let mut members: Vec<Member> = self.state.lock().members.values().cloned().collect();
        members.sort_by(|a, b| {
            b.privilege
                .cmp(&a.privilege)
                .then_with(|| a.client.nick_or_star().cmp(&b.client.nick_or_star()))
        });
        members
    }

    pub fn member_count(&self) -> usize {
        self.state.lock().members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().members.is_empty()
    }

    /// NAMES entries such as `@alice`. With `multi_prefix`, every level
    /// the member holds is shown (`@+alice`).
    pub fn names(&self, multi_prefix: bool) -> Vec<String> {
        let state = self.state.lock();
        let mut names: Vec<(Privilege, String, String)> = state
            .members
            .values()
            .map(|m| {
                let id = m.client.id();
                let mut prefix = String::new();
                for level in Privilege::DESCENDING {
                    let held = level
                        .mode_char()
                        .and_then(|ch| state.modes.get(&ch))
                        .is_some_and(|mode| mode.holds(id));
                    if held && (multi_prefix || prefix.is_empty()) {
                        prefix.extend(level.symbol());
                    }
                }
                let nick = m.client.nick_or_star();
                (m.privilege, format!("{prefix}{nick}"), nick)
            })
            .collect();
        names.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.2.cmp(&b.2)));
        names.into_iter().map(|(_, entry, _)| entry).collect()
    }

    /// Per-user mode letters each member holds, for bursting: `("o", alice)`.
    pub fn burst_members(&self) -> Vec<(String, Arc<Client>)> {
        let state = self.state.lock();
        state
            .members
            .values()
            .map(|m| {
                let letters: String = state
                    .modes
                    .values()
                    .filter(|mode| mode.holds(m.client.id()))
                    .map(|mode| mode.descriptor().ch)
                    .collect();
                (letters, Arc::clone(&m.client))
            })
            .collect()
    }

    // -- Messaging --------------------------------------------------------

    /// Whether `client` may speak in the channel (`+n`, `+m`, `+b`).
    pub fn check_can_send(&self, client: &Client) -> Result<(), ChannelError> {
        let state = self.state.lock();
        let member = state.members.get(&client.id());
        let voiced = member.is_some_and(|m| m.privilege >= Privilege::Voice);
        let refused = (member.is_none() && state.has_mode('n'))
            || (!voiced && state.has_mode('m'))
            || (!voiced && state.is_banned(client));
        if refused {
            return Err(ChannelError::CannotSend(self.name.clone()));
        }
        Ok(())
    }

    // -- Topic ------------------------------------------------------------

    pub fn topic(&self) -> Option<Topic> {
        self.state.lock().topic.clone()
    }

    /// Sets the topic and announces it to the room. Under `+t` a halfop
    /// or better is required unless `force`.
    pub fn set_topic(
        &self,
        setter: &Arc<Client>,
        text: &str,
        force: bool,
    ) -> Result<(), ChannelError> {
        let recipients = {
            let mut state = self.state.lock();
            if !force {
                let Some(member) = state.members.get(&setter.id()) else {
                    return Err(ChannelError::NotOnChannel(self.name.clone()));
                };
                if state.has_mode('t') && member.privilege < Privilege::Halfop {
                    return Err(ChannelError::ChanOpPrivsNeeded(self.name.clone()));
                }
            }
            state.topic = (!text.is_empty()).then(|| Topic {
                text: text.to_owned(),
                set_by: setter.mask(),
                set_at: Utc::now().timestamp(),
            });
            state.recipients(None)
        };
        deliver(
            &recipients,
            &format!(":{} TOPIC {} :{}", setter.mask(), self.name, text),
        );
        Ok(())
    }

    // -- Modes ------------------------------------------------------------

    pub fn mode_value(&self, ch: char) -> ModeValue {
        self.state.lock().value(ch)
    }

    pub fn has_mode(&self, ch: char) -> bool {
        self.state.lock().has_mode(ch)
    }

    pub fn is_banned(&self, client: &Client) -> bool {
        self.state.lock().is_banned(client)
    }

    /// The enabled flag and parameter modes as one MODE argument run, in
    /// character order: `"+klnt secret 10"`. Lists and per-user modes are
    /// left out. `prefix` is the leading sign, usually `'+'`.
    pub fn mode_strings(&self, prefix: char) -> String {
        let state = self.state.lock();
        let mut letters = String::from(prefix);
        let mut params = Vec::new();
        for (ch, mode) in &state.modes {
            match mode.value() {
                ModeValue::Enabled if mode.descriptor().grants.is_none() => letters.push(*ch),
                ModeValue::Param(p) => {
                    letters.push(*ch);
                    params.push(p);
                }
                _ => {}
            }
        }
        for p in params {
            letters.push(' ');
            letters.push_str(&p);
        }
        letters
    }

    /// Applies a run of mode changes as one atomic step and announces
    /// everything that took effect in a single MODE line from `source`.
    ///
    /// `setter` is `None` for server-originated changes. A bare list mode
    /// (`+b` with no mask) is skipped; listing is the caller's job.
    pub fn apply_modes(
        &self,
        setter: Option<&Arc<Client>>,
        source: &str,
        directory: &Directory,
        changes: &[ModeChange],
        opts: ModeOptions,
    ) -> ModeOutcome {
        let mut outcome = ModeOutcome::default();
        let recipients = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            for change in changes {
                let is_list_query = change.arg.is_none()
                    && mode::descriptor(change.ch)
                        .is_some_and(|d| d.category == mode::ModeCategory::List);
                if is_list_query {
                    continue;
                }
                match self.apply_locked(state, setter, directory, change, opts.force) {
                    Ok(ModeEffect::Changed { param }) => outcome.applied.push(ModeChange {
                        adding: change.adding,
                        ch: change.ch,
                        arg: param,
                    }),
                    Ok(ModeEffect::Unchanged) => {}
                    Err(e) => outcome.errors.push(e),
                }
            }
            let skip = if opts.notify_setter {
                None
            } else {
                setter.map(|s| s.id())
            };
            state.recipients(skip)
        };

        if let Some(args) = outcome.mode_args() {
            tracing::debug!(channel = %self.name, %source, modes = %args, "modes changed");
            if opts.announce {
                deliver(&recipients, &format!(":{source} MODE {} {args}", self.name));
            }
        }
        outcome
    }

    fn apply_locked(
        &self,
        state: &mut ChannelState,
        setter: Option<&Arc<Client>>,
        directory: &Directory,
        change: &ModeChange,
        force: bool,
    ) -> Result<ModeEffect, ChannelError> {
        let mut mode = state
            .modes
            .remove(&change.ch)
            .ok_or(ChannelError::UnknownMode(change.ch))?;
        let result = {
            let mut ctx = ModeContext::new(
                &self.name,
                setter,
                &mut state.members,
                &state.modes,
                directory,
            );
            if change.adding {
                mode.grant(&mut ctx, change.arg.as_deref(), force)
            } else {
                mode.revoke(&mut ctx, change.arg.as_deref(), force)
            }
        };
        state.modes.insert(change.ch, mode);
        result
    }

    /// Grants one mode. `Ok(false)` means nothing changed.
    pub fn grant(
        &self,
        setter: Option<&Arc<Client>>,
        source: &str,
        directory: &Directory,
        ch: char,
        arg: Option<&str>,
        opts: ModeOptions,
    ) -> Result<bool, ChannelError> {
        self.apply_single(setter, source, directory, ModeChange::new(true, ch, arg), opts)
    }

    /// Revokes one mode. `Ok(false)` means nothing changed.
    pub fn revoke(
        &self,
        setter: Option<&Arc<Client>>,
        source: &str,
        directory: &Directory,
        ch: char,
        arg: Option<&str>,
        opts: ModeOptions,
    ) -> Result<bool, ChannelError> {
        self.apply_single(setter, source, directory, ModeChange::new(false, ch, arg), opts)
    }

    fn apply_single(
        &self,
        setter: Option<&Arc<Client>>,
        source: &str,
        directory: &Directory,
        change: ModeChange,
        opts: ModeOptions,
    ) -> Result<bool, ChannelError> {
        let mut outcome = self.apply_modes(setter, source, directory, &[change], opts);
        match outcome.errors.pop() {
            Some(e) => Err(e),
            None => Ok(!outcome.applied.is_empty()),
        }
    }

    // -- Reclamation ------------------------------------------------------

    /// Marks the channel closed if it is empty and not `+P`. A closed
    /// channel refuses new members.
    pub(crate) fn try_close(&self) -> bool {
        let mut state = self.state.lock();
        if state.members.is_empty() && !state.has_mode('P') {
            state.closed = true;
        }
        state.closed
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("name", &self.name)
            .field("members", &self.member_count())
            .field("modes", &self.mode_strings('+'))
            .finish()
    }
}
