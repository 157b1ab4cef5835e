//! Network-wide index of users by nickname and by UUID.
//!
//! Every registered client (local or remote) appears here exactly once.
//! Both maps are `DashMap`s so lookups from many connection tasks don't
//! serialize on one lock.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use kestrel_protocol::{irc_lower, is_uuid, is_valid_nick};

use crate::{Client, SessionError};

/// Nick and UUID indices over all known clients.
#[derive(Default)]
pub struct Directory {
    by_nick: DashMap<String, Arc<Client>>,
    by_uuid: DashMap<String, Arc<Client>>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gives `nick` to `client`, atomically with respect to other claims.
    ///
    /// Returns the client's previous nickname (if any). A client may change
    /// the case of its own nickname.
    ///
    /// # Errors
    /// - [`SessionError::ErroneousNickname`]: illegal characters
    /// - [`SessionError::NicknameInUse`]: held by another client
    pub fn claim_nick(
        &self,
        client: &Arc<Client>,
        nick: &str,
    ) -> Result<Option<String>, SessionError> {
        if !is_valid_nick(nick) {
            return Err(SessionError::ErroneousNickname(nick.to_owned()));
        }
        self.insert_nick(client, nick)
    }

    /// Like [`claim_nick`](Self::claim_nick) without the syntax check.
    /// Linked servers are trusted to have validated their own users.
    pub fn force_nick(
        &self,
        client: &Arc<Client>,
        nick: &str,
    ) -> Result<Option<String>, SessionError> {
        self.insert_nick(client, nick)
    }

    fn insert_nick(
        &self,
        client: &Arc<Client>,
        nick: &str,
    ) -> Result<Option<String>, SessionError> {
        let key = irc_lower(nick);
        match self.by_nick.entry(key.clone()) {
            Entry::Occupied(mut e) => {
                if e.get().id() != client.id() {
                    return Err(SessionError::NicknameInUse(nick.to_owned()));
                }
                e.insert(Arc::clone(client));
            }
            Entry::Vacant(e) => {
                e.insert(Arc::clone(client));
            }
        }
        // The entry guard is released above; the old key may live in the
        // same shard.
        let old = client.replace_nick(nick);
        if let Some(old_nick) = &old {
            let old_key = irc_lower(old_nick);
            if old_key != key {
                self.by_nick.remove_if(&old_key, |_, c| c.id() == client.id());
            }
        }
        Ok(old)
    }

    /// Indexes a client under its UUID. No-op if it has none yet.
    pub fn register_uuid(&self, client: &Arc<Client>) {
        if let Some(uuid) = client.uuid() {
            self.by_uuid.insert(uuid, Arc::clone(client));
        }
    }

    /// Removes a client from both indices.
    pub fn release(&self, client: &Client) {
        if let Some(nick) = client.nick() {
            self.by_nick.remove_if(&irc_lower(&nick), |_, c| c.id() == client.id());
        }
        if let Some(uuid) = client.uuid() {
            self.by_uuid.remove_if(&uuid, |_, c| c.id() == client.id());
        }
    }

    pub fn by_nick(&self, nick: &str) -> Option<Arc<Client>> {
        self.by_nick.get(&irc_lower(nick)).map(|e| Arc::clone(e.value()))
    }

    pub fn by_uuid(&self, uuid: &str) -> Option<Arc<Client>> {
        self.by_uuid.get(uuid).map(|e| Arc::clone(e.value()))
    }

    /// Looks `target` up as a UUID if it has that shape, else as a nick.
    pub fn resolve(&self, target: &str) -> Option<Arc<Client>> {
        if is_uuid(target) {
            if let Some(client) = self.by_uuid(target) {
                return Some(client);
            }
        }
        self.by_nick(target)
    }

    /// Snapshot of every indexed client.
    pub fn clients(&self) -> Vec<Arc<Client>> {
        self.by_nick.iter().map(|e| Arc::clone(e.value())).collect()
    }

    /// Remote clients introduced by the link with `sid`.
    pub fn introduced_by(&self, sid: &str) -> Vec<Arc<Client>> {
        self.by_uuid
            .iter()
            .filter(|e| {
                e.value()
                    .origin()
                    .and_then(|p| p.sid())
                    .is_some_and(|s| s == sid)
            })
            .map(|e| Arc::clone(e.value()))
            .collect()
    }

    /// Number of clients with a nickname.
    pub fn len(&self) -> usize {
        self.by_nick.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_nick.is_empty()
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use kestrel_liveness::LivenessConfig;
    use kestrel_transport::ConnectionId;
    use tokio::sync::mpsc;

    use super::*;

    // -- Helpers ----------------------------------------------------------

    fn client() -> Arc<Client> {
        let (tx, _rx) = mpsc::unbounded_channel();
        Arc::new(Client::local(
            ConnectionId::next(),
            "127.0.0.1",
            false,
            tx,
            &LivenessConfig::default(),
        ))
    }

    // =====================================================================
    // claim_nick()
    // =====================================================================

    #[test]
    fn test_claim_nick_free_nick_succeeds() {
        let dir = Directory::new();
        let alice = client();
        assert_eq!(dir.claim_nick(&alice, "alice"), Ok(None));
        assert_eq!(alice.nick().as_deref(), Some("alice"));
        assert!(dir.by_nick("ALICE").is_some());
    }

    #[test]
    fn test_claim_nick_taken_case_insensitively_fails() {
        let dir = Directory::new();
        let alice = client();
        let other = client();
        dir.claim_nick(&alice, "Alice[m]").unwrap();

        assert_eq!(
            dir.claim_nick(&other, "alice{M}"),
            Err(SessionError::NicknameInUse("alice{M}".into()))
        );
        assert_eq!(other.nick(), None);
    }

    #[test]
    fn test_claim_nick_invalid_fails() {
        let dir = Directory::new();
        assert!(matches!(
            dir.claim_nick(&client(), "9bad"),
            Err(SessionError::ErroneousNickname(_))
        ));
    }

    #[test]
    fn test_claim_nick_rename_frees_old_nick() {
        let dir = Directory::new();
        let alice = client();
        dir.claim_nick(&alice, "alice").unwrap();

        assert_eq!(dir.claim_nick(&alice, "alicia"), Ok(Some("alice".into())));
        assert!(dir.by_nick("alice").is_none());
        assert!(dir.by_nick("alicia").is_some());
        assert_eq!(dir.len(), 1);
    }

    #[test]
    fn test_claim_nick_own_case_change_allowed() {
        let dir = Directory::new();
        let alice = client();
        dir.claim_nick(&alice, "alice").unwrap();
        assert!(dir.claim_nick(&alice, "Alice").is_ok());
        assert_eq!(alice.nick().as_deref(), Some("Alice"));
        assert_eq!(dir.len(), 1);
    }

    // =====================================================================
    // UUIDs / release()
    // =====================================================================

    #[test]
    fn test_resolve_prefers_uuid() {
        let dir = Directory::new();
        let alice = client();
        dir.claim_nick(&alice, "alice").unwrap();
        alice.set_uuid("001AAAAAA");
        dir.register_uuid(&alice);

        assert_eq!(dir.resolve("001AAAAAA").map(|c| c.id()), Some(alice.id()));
        assert_eq!(dir.resolve("alice").map(|c| c.id()), Some(alice.id()));
    }

    #[test]
    fn test_release_removes_both_indices() {
        let dir = Directory::new();
        let alice = client();
        dir.claim_nick(&alice, "alice").unwrap();
        alice.set_uuid("001AAAAAA");
        dir.register_uuid(&alice);

        dir.release(&alice);
        assert!(dir.is_empty());
        assert!(dir.by_uuid("001AAAAAA").is_none());
    }
}
