//! Client capability negotiation state (`CAP`).
//!
//! `CAP LS` and `CAP REQ` put registration on hold until `CAP END`, so a
//! client can finish negotiating before it receives the welcome burst.

use std::collections::BTreeSet;

/// Capabilities this server offers.
pub const SUPPORTED_CAPS: &[&str] = &["away-notify", "multi-prefix", "server-time"];

/// Per-client capability state.
#[derive(Debug, Default, Clone)]
pub struct CapSet {
    enabled: BTreeSet<&'static str>,
    negotiating: bool,
}

/// Result of a `CAP REQ`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapReply {
    /// Every requested change was applied.
    Ack,
    /// At least one requested capability is unknown; nothing was applied.
    Nak,
}

impl CapSet {
    /// Holds registration until [`end`](Self::end).
    pub fn stall(&mut self) {
        self.negotiating = true;
    }

    /// Releases registration.
    pub fn end(&mut self) {
        self.negotiating = false;
    }

    /// Whether registration is on hold for negotiation.
    pub fn is_stalled(&self) -> bool {
        self.negotiating
    }

    /// Whether `name` is enabled.
    pub fn has(&self, name: &str) -> bool {
        self.enabled.contains(name)
    }

    /// Enabled capabilities, space separated.
    pub fn enabled_list(&self) -> String {
        self.enabled.iter().copied().collect::<Vec<_>>().join(" ")
    }

    /// Applies a space separated request like `multi-prefix -server-time`.
    ///
    /// All-or-nothing: one unknown name NAKs the whole request. Asking for
    /// a capability that is already on is ACKed like any other request.
    pub fn request(&mut self, list: &str) -> CapReply {
        let mut changes = Vec::new();
        for token in list.split_whitespace() {
            let (enable, name) = match token.strip_prefix('-') {
                Some(name) => (false, name),
                None => (true, token),
            };
            match SUPPORTED_CAPS.iter().find(|c| **c == name) {
                Some(cap) => changes.push((enable, *cap)),
                None => return CapReply::Nak,
            }
        }
        if changes.is_empty() {
            return CapReply::Nak;
        }
        for (enable, cap) in changes {
            if enable {
                self.enabled.insert(cap);
            } else {
                self.enabled.remove(cap);
            }
        }
        CapReply::Ack
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_supported_caps_acks_and_enables() {
        let mut caps = CapSet::default();
        assert_eq!(caps.request("multi-prefix away-notify"), CapReply::Ack);
        assert!(caps.has("multi-prefix"));
        assert!(caps.has("away-notify"));
        assert_eq!(caps.enabled_list(), "away-notify multi-prefix");
    }

    #[test]
    fn test_request_already_enabled_cap_is_acked() {
        let mut caps = CapSet::default();
        caps.request("server-time");
        assert_eq!(caps.request("server-time"), CapReply::Ack);
        assert!(caps.has("server-time"));
    }

    #[test]
    fn test_request_unknown_cap_naks_whole_request() {
        let mut caps = CapSet::default();
        assert_eq!(caps.request("multi-prefix sasl"), CapReply::Nak);
        assert!(!caps.has("multi-prefix"));
    }

    #[test]
    fn test_request_minus_disables() {
        let mut caps = CapSet::default();
        caps.request("multi-prefix");
        assert_eq!(caps.request("-multi-prefix"), CapReply::Ack);
        assert!(!caps.has("multi-prefix"));
    }

    #[test]
    fn test_stall_and_end() {
        let mut caps = CapSet::default();
        assert!(!caps.is_stalled());
        caps.stall();
        assert!(caps.is_stalled());
        caps.end();
        assert!(!caps.is_stalled());
    }
}
