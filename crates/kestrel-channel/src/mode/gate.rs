//! `+Z`: every member is on a secure connection.
//!
//! A gate mode. It can only be set while its companion `+z` is set and
//! every current member is already secure; it can only be removed while
//! some member is not. Both checks read the membership through the
//! [`ModeContext`], which the channel builds under its state lock, so the
//! decision and the mutation see the same members.
//!
//! While `+Z` is set, [`Channel::join`](crate::Channel::join) refuses insecure
//! joiners even if `+z` has since been removed.

use crate::mode::{ChannelMode, ModeContext, ModeDescriptor, ModeEffect, ModeValue};
use crate::ChannelError;

const COMPANION: char = 'z';

pub struct AllSecureMode {
    desc: &'static ModeDescriptor,
    enabled: bool,
}

impl AllSecureMode {
    pub fn new(desc: &'static ModeDescriptor) -> Self {
        Self {
            desc,
            enabled: false,
        }
    }

    fn everyone_secure(ctx: &ModeContext<'_>) -> bool {
        ctx.members().all(|m| m.client.is_secure())
    }
}

impl ChannelMode for AllSecureMode {
    fn descriptor(&self) -> &'static ModeDescriptor {
        self.desc
    }

    fn grant(
        &mut self,
        ctx: &mut ModeContext<'_>,
        _arg: Option<&str>,
        force: bool,
    ) -> Result<ModeEffect, ChannelError> {
        ctx.require_privilege(self.desc.min_privilege, force)?;
        let companion_on = ctx.mode(COMPANION).is_some_and(|m| m.is_enabled());
        if !companion_on {
            return Ok(ModeEffect::Unchanged);
        }
        if self.enabled && !force {
            return Ok(ModeEffect::Unchanged);
        }
        if !Self::everyone_secure(ctx) {
            tracing::debug!(channel = %ctx.channel(), "+Z refused: insecure member present");
            return Ok(ModeEffect::Unchanged);
        }
        self.enabled = true;
        Ok(ModeEffect::Changed { param: None })
    }

    fn revoke(
        &mut self,
        ctx: &mut ModeContext<'_>,
        _arg: Option<&str>,
        force: bool,
    ) -> Result<ModeEffect, ChannelError> {
        ctx.require_setter_member()?;
        ctx.require_privilege(self.desc.min_privilege, force)?;
        if !force && (!self.enabled || Self::everyone_secure(ctx)) {
            return Ok(ModeEffect::Unchanged);
        }
        self.enabled = false;
        Ok(ModeEffect::Changed { param: None })
    }

    fn value(&self) -> ModeValue {
        if self.enabled {
            ModeValue::Enabled
        } else {
            ModeValue::Disabled
        }
    }
}
