//! Channel registry: creates, finds, and reclaims channels.

use std::sync::Arc;

use dashmap::DashMap;
use kestrel_protocol::irc_lower;
use kestrel_session::{Client, ConnectionId, Directory};

use crate::{AutoMode, Channel, ChannelError, ModeOptions};

/// Joins that race a reap retry this many times before giving up.
const JOIN_RETRIES: usize = 3;

/// All channels on this server, keyed by case-folded name.
///
/// This is the entry point for channel operations from the command layer.
pub struct ChannelManager {
    channels: DashMap<String, Arc<Channel>>,
    auto_modes: Vec<AutoMode>,
    directory: Arc<Directory>,
}

impl ChannelManager {
    /// Creates an empty registry. `auto_modes` are applied, silently and
    /// forced, to every channel this manager creates.
    pub fn new(auto_modes: Vec<AutoMode>, directory: Arc<Directory>) -> Self {
        Self {
            channels: DashMap::new(),
            auto_modes,
            directory,
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<Channel>> {
        self.channels.get(&irc_lower(name)).map(|c| Arc::clone(c.value()))
    }

    /// Returns the channel, creating it if needed. The flag is `true` when
    /// this call created it.
    pub fn get_or_create(&self, name: &str) -> (Arc<Channel>, bool) {
        self.get_or_create_with(name, || Channel::new(name))
    }

    /// Like [`get_or_create`](Self::get_or_create), but a channel created
    /// here takes `created` as its creation time (a burst timestamp).
    pub fn get_or_create_at(&self, name: &str, created: i64) -> (Arc<Channel>, bool) {
        self.get_or_create_with(name, || Channel::with_created(name, created))
    }

    fn get_or_create_with(
        &self,
        name: &str,
        make: impl FnOnce() -> Channel,
    ) -> (Arc<Channel>, bool) {
        let entry = self.channels.entry(irc_lower(name));
        let mut created = false;
        let channel = Arc::clone(
            entry
                .or_insert_with(|| {
                    created = true;
                    Arc::new(make())
                })
                .value(),
        );
        if created {
            let changes: Vec<_> = self.auto_modes.iter().map(AutoMode::to_change).collect();
            let server = channel.name().to_owned();
            channel.apply_modes(None, &server, &self.directory, &changes, ModeOptions::silent());
            tracing::info!(
                channel = %channel.name(),
                created = channel.created(),
                modes = %channel.mode_strings('+'),
                "channel created"
            );
        }
        (channel, created)
    }

    /// Joins `client` to `name`, creating the channel if needed and
    /// checking its entry modes. Returns the channel, its member count
    /// after the join, and whether this join created it.
    pub fn join(
        &self,
        client: &Arc<Client>,
        name: &str,
        key: Option<&str>,
    ) -> Result<(Arc<Channel>, usize, bool), ChannelError> {
        for _ in 0..JOIN_RETRIES {
            let (channel, created) = self.get_or_create(name);
            match channel.join(client, key) {
                // Reaped between lookup and join; look it up again.
                Err(ChannelError::NoSuchChannel(_)) => continue,
                Ok(count) => return Ok((channel, count, created)),
                Err(e) => return Err(e),
            }
        }
        Err(ChannelError::NoSuchChannel(name.to_owned()))
    }

    /// Like [`join`](Self::join) but skipping entry checks. Used for
    /// members arriving in a server burst.
    pub fn force_join(
        &self,
        client: &Arc<Client>,
        name: &str,
    ) -> Result<(Arc<Channel>, usize, bool), ChannelError> {
        for _ in 0..JOIN_RETRIES {
            let (channel, created) = self.get_or_create(name);
            match channel.add(client) {
                Err(ChannelError::NoSuchChannel(_)) => continue,
                Ok(count) => return Ok((channel, count, created)),
                Err(e) => return Err(e),
            }
        }
        Err(ChannelError::NoSuchChannel(name.to_owned()))
    }

    /// Removes every empty channel that isn't `+P`. Returns their names.
    pub fn reap_empty(&self) -> Vec<String> {
        let keys: Vec<String> = self.channels.iter().map(|e| e.key().clone()).collect();
        let mut reaped = Vec::new();
        for key in keys {
            if let Some((_, channel)) = self.channels.remove_if(&key, |_, c| c.try_close()) {
                tracing::info!(channel = %channel.name(), "channel destroyed");
                reaped.push(channel.name().to_owned());
            }
        }
        reaped
    }

    /// Every channel `id` is a member of.
    pub fn channels_of(&self, id: ConnectionId) -> Vec<Arc<Channel>> {
        self.channels
            .iter()
            .filter(|e| e.value().is_member(id))
            .map(|e| Arc::clone(e.value()))
            .collect()
    }

    pub fn list(&self) -> Vec<Arc<Channel>> {
        self.channels.iter().map(|e| Arc::clone(e.value())).collect()
    }

    pub fn directory(&self) -> &Arc<Directory> {
        &self.directory
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}
