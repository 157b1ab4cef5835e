//! Channel configuration.

use serde::{Deserialize, Serialize};

use crate::mode::ModeChange;

/// A mode applied to every newly created channel.
///
/// ```json
/// { "mode": "l", "param": "50" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoMode {
    pub mode: char,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub param: Option<String>,
}

impl AutoMode {
    pub fn flag(mode: char) -> Self {
        Self { mode, param: None }
    }

    pub fn to_change(&self) -> ModeChange {
        ModeChange::new(true, self.mode, self.param.as_deref())
    }
}

/// `+nt`, the usual defaults for new channels.
pub fn default_auto_modes() -> Vec<AutoMode> {
    vec![AutoMode::flag('n'), AutoMode::flag('t')]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_mode_deserialize_without_param() {
        let mode: AutoMode = serde_json::from_str(r#"{"mode":"n"}"#).unwrap();
        assert_eq!(mode, AutoMode::flag('n'));
    }

    #[test]
    fn test_auto_mode_to_change_carries_param() {
        let mode = AutoMode {
            mode: 'l',
            param: Some("50".into()),
        };
        assert_eq!(mode.to_change(), ModeChange::new(true, 'l', Some("50")));
    }
}
