//! Per-user modes (`v`, `h`, `o`, `a`, `q`): each grants one privilege
//! level and remembers exactly who holds it.

use std::collections::HashSet;

use kestrel_session::ConnectionId;

use crate::mode::{ChannelMode, ModeContext, ModeDescriptor, ModeEffect, ModeValue};
use crate::{ChannelError, Privilege};

pub struct PrefixMode {
    desc: &'static ModeDescriptor,
    affected: HashSet<ConnectionId>,
}

impl PrefixMode {
    pub fn new(desc: &'static ModeDescriptor) -> Self {
        Self {
            desc,
            affected: HashSet::new(),
        }
    }

    fn level(&self) -> Privilege {
        self.desc.grants.unwrap_or_default()
    }
}

impl ChannelMode for PrefixMode {
    fn descriptor(&self) -> &'static ModeDescriptor {
        self.desc
    }

    fn grant(
        &mut self,
        ctx: &mut ModeContext<'_>,
        arg: Option<&str>,
        force: bool,
    ) -> Result<ModeEffect, ChannelError> {
        let nick = arg.ok_or(ChannelError::NeedsParameter(self.desc.ch))?;
        ctx.require_setter_member()?;
        let target = ctx.resolve_member(nick)?;
        ctx.require_privilege(self.desc.min_privilege, force)?;

        let id = target.id();
        if self.affected.contains(&id) && !force {
            return Ok(ModeEffect::Unchanged);
        }
        self.affected.insert(id);
        // Never lowers a higher level held through another mode.
        if ctx.privilege_of(id) < self.level() {
            ctx.set_privilege(id, self.level());
        }
        Ok(ModeEffect::Changed { param: target.nick() })
    }

    fn revoke(
        &mut self,
        ctx: &mut ModeContext<'_>,
        arg: Option<&str>,
        force: bool,
    ) -> Result<ModeEffect, ChannelError> {
        let nick = arg.ok_or(ChannelError::NeedsParameter(self.desc.ch))?;
        ctx.require_setter_member()?;
        let target = ctx.resolve_member(nick)?;
        ctx.require_privilege(self.desc.min_privilege, force)?;

        let id = target.id();
        if !self.affected.remove(&id) && !force {
            return Ok(ModeEffect::Unchanged);
        }
        let remaining = ctx.recomputed_privilege(id);
        ctx.set_privilege(id, remaining.min(ctx.privilege_of(id)));
        Ok(ModeEffect::Changed { param: target.nick() })
    }

    fn value(&self) -> ModeValue {
        if self.affected.is_empty() {
            ModeValue::Disabled
        } else {
            ModeValue::Enabled
        }
    }

    fn holds(&self, id: ConnectionId) -> bool {
        self.affected.contains(&id)
    }

    fn forget(&mut self, id: ConnectionId) {
        self.affected.remove(&id);
    }
}
