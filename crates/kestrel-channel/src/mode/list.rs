//! `+b`: the ban list.

use kestrel_protocol::{irc_eq, wildcard_match};

use crate::mode::{ChannelMode, ModeContext, ModeDescriptor, ModeEffect, ModeValue};
use crate::ChannelError;

pub struct BanMode {
    desc: &'static ModeDescriptor,
    masks: Vec<String>,
}

impl BanMode {
    pub fn new(desc: &'static ModeDescriptor) -> Self {
        Self {
            desc,
            masks: Vec::new(),
        }
    }

    /// Whether any ban matches `mask` (`nick!ident@host`).
    pub fn matches(masks: &[String], mask: &str) -> bool {
        masks.iter().any(|ban| wildcard_match(ban, mask))
    }

    fn position(&self, mask: &str) -> Option<usize> {
        self.masks.iter().position(|m| irc_eq(m, mask))
    }
}

/// Expands a partial mask to `nick!ident@host` form.
///
/// `bob` → `bob!*@*`, `*@host` → `*!*@host`, `bob!x` → `bob!x@*`.
pub fn normalize_mask(mask: &str) -> String {
    let (nick, rest) = match mask.split_once('!') {
        Some((nick, rest)) => (nick, Some(rest)),
        None if mask.contains('@') => ("*", Some(mask)),
        None => (mask, None),
    };
    let (ident, host) = match rest {
        Some(rest) => match rest.split_once('@') {
            Some((ident, host)) => (ident, host),
            None => (rest, "*"),
        },
        None => ("*", "*"),
    };
    let or_star = |s: &str| if s.is_empty() { "*".to_owned() } else { s.to_owned() };
    format!("{}!{}@{}", or_star(nick), or_star(ident), or_star(host))
}

impl ChannelMode for BanMode {
    fn descriptor(&self) -> &'static ModeDescriptor {
        self.desc
    }

    fn grant(
        &mut self,
        ctx: &mut ModeContext<'_>,
        arg: Option<&str>,
        force: bool,
    ) -> Result<ModeEffect, ChannelError> {
        let arg = arg.ok_or(ChannelError::NeedsParameter(self.desc.ch))?;
        ctx.require_privilege(self.desc.min_privilege, force)?;
        let mask = normalize_mask(arg);
        if self.position(&mask).is_some() {
            if !force {
                return Ok(ModeEffect::Unchanged);
            }
        } else {
            self.masks.push(mask.clone());
        }
        Ok(ModeEffect::Changed { param: Some(mask) })
    }

    fn revoke(
        &mut self,
        ctx: &mut ModeContext<'_>,
        arg: Option<&str>,
        force: bool,
    ) -> Result<ModeEffect, ChannelError> {
        let arg = arg.ok_or(ChannelError::NeedsParameter(self.desc.ch))?;
        ctx.require_privilege(self.desc.min_privilege, force)?;
        let mask = normalize_mask(arg);
        match self.position(&mask) {
            Some(i) => {
                let removed = self.masks.remove(i);
                Ok(ModeEffect::Changed {
                    param: Some(removed),
                })
            }
            None if force => Ok(ModeEffect::Changed { param: Some(mask) }),
            None => Ok(ModeEffect::Unchanged),
        }
    }

    fn value(&self) -> ModeValue {
        ModeValue::List(self.masks.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_mask_nick_only() {
        assert_eq!(normalize_mask("bob"), "bob!*@*");
    }

    #[test]
    fn test_normalize_mask_host_only() {
        assert_eq!(normalize_mask("*@evil.test"), "*!*@evil.test");
    }

    #[test]
    fn test_normalize_mask_full_unchanged() {
        assert_eq!(normalize_mask("a!b@c"), "a!b@c");
        assert_eq!(normalize_mask("a!b"), "a!b@*");
    }

    #[test]
    fn test_matches_wildcard_ban() {
        let masks = vec!["*!*@evil.test".to_owned()];
        assert!(BanMode::matches(&masks, "bob!bob@evil.test"));
        assert!(!BanMode::matches(&masks, "bob!bob@good.test"));
    }
}
