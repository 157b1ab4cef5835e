//! Parameterized modes: `+k key` and `+l limit`.

use crate::mode::{ChannelMode, ModeContext, ModeDescriptor, ModeEffect, ModeValue};
use crate::ChannelError;

// ---------------------------------------------------------------------------
// KeyMode
// ---------------------------------------------------------------------------

/// `+k <key>`. Unsetting takes a parameter too, but any value is accepted.
pub struct KeyMode {
    desc: &'static ModeDescriptor,
    key: Option<String>,
}

impl KeyMode {
    pub fn new(desc: &'static ModeDescriptor) -> Self {
        Self { desc, key: None }
    }
}

impl ChannelMode for KeyMode {
    fn descriptor(&self) -> &'static ModeDescriptor {
        self.desc
    }

    fn grant(
        &mut self,
        ctx: &mut ModeContext<'_>,
        arg: Option<&str>,
        force: bool,
    ) -> Result<ModeEffect, ChannelError> {
        let key = arg
            .filter(|k| !k.is_empty() && !k.contains(' '))
            .ok_or(ChannelError::NeedsParameter(self.desc.ch))?;
        ctx.require_privilege(self.desc.min_privilege, force)?;
        if self.key.as_deref() == Some(key) && !force {
            return Ok(ModeEffect::Unchanged);
        }
        self.key = Some(key.to_owned());
        Ok(ModeEffect::Changed {
            param: Some(key.to_owned()),
        })
    }

    fn revoke(
        &mut self,
        ctx: &mut ModeContext<'_>,
        _arg: Option<&str>,
        force: bool,
    ) -> Result<ModeEffect, ChannelError> {
        ctx.require_privilege(self.desc.min_privilege, force)?;
        match self.key.take() {
            Some(old) => Ok(ModeEffect::Changed { param: Some(old) }),
            None if force => Ok(ModeEffect::Changed {
                param: Some("*".to_owned()),
            }),
            None => Ok(ModeEffect::Unchanged),
        }
    }

    fn value(&self) -> ModeValue {
        match &self.key {
            Some(key) => ModeValue::Param(key.clone()),
            None => ModeValue::Disabled,
        }
    }
}

// ---------------------------------------------------------------------------
// LimitMode
// ---------------------------------------------------------------------------

/// `+l <n>`: at most `n` members. A non-numeric or zero limit is ignored.
pub struct LimitMode {
    desc: &'static ModeDescriptor,
    limit: Option<usize>,
}

impl LimitMode {
    pub fn new(desc: &'static ModeDescriptor) -> Self {
        Self { desc, limit: None }
    }
}

impl ChannelMode for LimitMode {
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
        let Some(limit) = arg.parse::<usize>().ok().filter(|n| *n > 0) else {
            return Ok(ModeEffect::Unchanged);
        };
        if self.limit == Some(limit) && !force {
            return Ok(ModeEffect::Unchanged);
        }
        self.limit = Some(limit);
        Ok(ModeEffect::Changed {
            param: Some(limit.to_string()),
        })
    }

    fn revoke(
        &mut self,
        ctx: &mut ModeContext<'_>,
        _arg: Option<&str>,
        force: bool,
    ) -> Result<ModeEffect, ChannelError> {
        ctx.require_privilege(self.desc.min_privilege, force)?;
        if self.limit.take().is_none() && !force {
            return Ok(ModeEffect::Unchanged);
        }
        Ok(ModeEffect::Changed { param: None })
    }

    fn value(&self) -> ModeValue {
        match self.limit {
            Some(n) => ModeValue::Param(n.to_string()),
            None => ModeValue::Disabled,
        }
    }
}
