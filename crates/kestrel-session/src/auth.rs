//! Authentication hook for validating peer server links.
//!
//! Kestrel doesn't decide on its own which servers may link. That comes
//! from configuration (or from whatever a deployment plugs in). The
//! [`LinkAuthenticator`] trait is the single seam: given the name and
//! password a peer presented in `SERVER`, accept or reject it.
//!
//! # Why a trait?
//!
//! The server only needs "is this link allowed?". Production reads the
//! configured `links` list ([`StaticLinkAuthenticator`]); tests can
//! accept everything or nothing without touching server code.

use std::collections::HashMap;

use kestrel_protocol::irc_lower;

use crate::SessionError;

/// Validates a peer server's link credentials.
///
/// `Send + Sync + 'static` because one authenticator lives as long as the
/// server and is consulted from every link's task.
///
/// # Example
///
/// ```rust
/// use kestrel_session::{LinkAuthenticator, SessionError};
///
/// /// Accepts any server. Only for local testing.
/// struct OpenLinks;
///
/// impl LinkAuthenticator for OpenLinks {
///     fn verify(&self, _name: &str, _password: &str) -> Result<(), SessionError> {
///         Ok(())
///     }
/// }
/// ```
pub trait LinkAuthenticator: Send + Sync + 'static {
    /// Checks the credentials a peer sent in its `SERVER` line.
    ///
    /// # Errors
    /// [`SessionError::AuthFailed`] if the link is not allowed.
    fn verify(&self, name: &str, password: &str) -> Result<(), SessionError>;
}

/// A fixed table of `server name → password`.
#[derive(Debug, Clone, Default)]
pub struct StaticLinkAuthenticator {
    links: HashMap<String, String>,
}

impl StaticLinkAuthenticator {
    /// Builds the table from `(name, password)` pairs.
    pub fn new<I, S>(links: I) -> Self
    where
        I: IntoIterator<Item = (S, S)>,
        S: Into<String>,
    {
        Self {
            links: links
                .into_iter()
                .map(|(name, pass)| (irc_lower(&name.into()), pass.into()))
                .collect(),
        }
    }
}

impl LinkAuthenticator for StaticLinkAuthenticator {
    fn verify(&self, name: &str, password: &str) -> Result<(), SessionError> {
        match self.links.get(&irc_lower(name)) {
            Some(expected) if expected == password => Ok(()),
            Some(_) => Err(SessionError::AuthFailed(format!("bad password for {name}"))),
            None => Err(SessionError::AuthFailed(format!("{name} is not a configured link"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_configured_link_succeeds() {
        let auth = StaticLinkAuthenticator::new([("hub.test", "s3cret")]);
        assert!(auth.verify("HUB.test", "s3cret").is_ok());
    }

    #[test]
    fn test_verify_wrong_password_fails() {
        let auth = StaticLinkAuthenticator::new([("hub.test", "s3cret")]);
        assert!(matches!(
            auth.verify("hub.test", "guess"),
            Err(SessionError::AuthFailed(_))
        ));
    }

    #[test]
    fn test_verify_unknown_server_fails() {
        let auth = StaticLinkAuthenticator::new([("hub.test", "s3cret")]);
        assert!(auth.verify("leaf.test", "s3cret").is_err());
    }
}
