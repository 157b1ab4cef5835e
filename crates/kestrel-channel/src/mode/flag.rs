//! Plain on/off channel modes (`i`, `m`, `n`, `t`, `s`, `z`, `O`, `P`).

use crate::mode::{ChannelMode, ModeContext, ModeDescriptor, ModeEffect, ModeValue};
use crate::ChannelError;

pub struct FlagMode {
    desc: &'static ModeDescriptor,
    enabled: bool,
}

impl FlagMode {
    pub fn new(desc: &'static ModeDescriptor) -> Self {
        Self {
            desc,
            enabled: false,
        }
    }

    fn set(
        &mut self,
        ctx: &ModeContext<'_>,
        on: bool,
        force: bool,
    ) -> Result<ModeEffect, ChannelError> {
        ctx.require_privilege(self.desc.min_privilege, force)?;
        if self.enabled == on && !force {
            return Ok(ModeEffect::Unchanged);
        }
        self.enabled = on;
        Ok(ModeEffect::Changed { param: None })
    }
}

impl ChannelMode for FlagMode {
    fn descriptor(&self) -> &'static ModeDescriptor {
        self.desc
    }

    fn grant(
        &mut self,
        ctx: &mut ModeContext<'_>,
        _arg: Option<&str>,
        force: bool,
    ) -> Result<ModeEffect, ChannelError> {
        self.set(ctx, true, force)
    }

    fn revoke(
        &mut self,
        ctx: &mut ModeContext<'_>,
        _arg: Option<&str>,
        force: bool,
    ) -> Result<ModeEffect, ChannelError> {
        self.set(ctx, false, force)
    }

    fn value(&self) -> ModeValue {
        if self.enabled {
            ModeValue::Enabled
        } else {
            ModeValue::Disabled
        }
    }
}
