//! Line tokenizer: turns one wire line into a [`Message`].
//!
//! A line looks like this:
//!
//! ```text
//! [@tags] [:prefix] VERB param1 param2 ... [:trailing words here]
//! ```
//!
//! Message tags are accepted and dropped. The verb is upper-cased so
//! handlers never care how a client spelled it.

use std::fmt;

use crate::ProtocolError;

/// One parsed protocol line.
///
/// `params` holds the space-separated middle parameters; `trailer` holds
/// the optional final `:`-prefixed argument, which may contain spaces.
/// Most handlers don't care about the distinction and use
/// [`arg`](Message::arg), which treats the trailer as the last
/// positional parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Source of the line (`nick!user@host`, a server name, a SID/UUID).
    pub prefix: Option<String>,
    /// Upper-cased command or numeric.
    pub verb: String,
    /// Middle parameters, in order.
    pub params: Vec<String>,
    /// Trailing parameter (without its leading `:`).
    pub trailer: Option<String>,
    /// The line exactly as received.
    pub raw: String,
}

impl Message {
    /// Parses a single line (terminator already stripped).
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let raw = line.to_owned();
        let mut rest = line.trim_start_matches(' ');

        // Message tags (`@a=b;c `) are skipped.
        if rest.starts_with('@') {
            rest = match rest.split_once(' ') {
                Some((_, after)) => after.trim_start_matches(' '),
                None => "",
            };
        }
        if rest.trim().is_empty() {
            return Err(ProtocolError::EmptyLine);
        }

        let prefix = if let Some(stripped) = rest.strip_prefix(':') {
            let (prefix, after) = stripped.split_once(' ').unwrap_or((stripped, ""));
            rest = after.trim_start_matches(' ');
            if prefix.is_empty() {
                return Err(ProtocolError::InvalidMessage("empty prefix".into()));
            }
            Some(prefix.to_owned())
        } else {
            None
        };

        // Split off the trailer before tokenizing the middle.
        let (middle, trailer) = match rest.find(" :") {
            Some(idx) => (&rest[..idx], Some(rest[idx + 2..].to_owned())),
            None => match rest.strip_prefix(':') {
                Some(t) => ("", Some(t.to_owned())),
                None => (rest, None),
            },
        };

        let mut tokens = middle.split(' ').filter(|t| !t.is_empty());
        let verb = match tokens.next() {
            Some(v) => v.to_ascii_uppercase(),
            None => return Err(ProtocolError::MissingVerb),
        };
        let params = tokens.map(str::to_owned).collect();

        Ok(Self {
            prefix,
            verb,
            params,
            trailer,
            raw,
        })
    }

    /// Returns positional argument `index`, counting the trailer as the
    /// argument after the last middle parameter.
    pub fn arg(&self, index: usize) -> Option<&str> {
        match self.params.get(index) {
            Some(p) => Some(p.as_str()),
            None if index == self.params.len() => self.trailer.as_deref(),
            None => None,
        }
    }

    /// Number of positional arguments, trailer included.
    pub fn arg_count(&self) -> usize {
        self.params.len() + usize::from(self.trailer.is_some())
    }

    /// All positional arguments from `start` onward, trailer included.
    pub fn args_from(&self, start: usize) -> Vec<&str> {
        (start..self.arg_count()).filter_map(|i| self.arg(i)).collect()
    }

    /// Returns a copy with a different source prefix.
    pub fn with_prefix(&self, prefix: Option<String>) -> Self {
        Self {
            prefix,
            ..self.clone()
        }
    }

    /// Returns a copy with the verb and middle parameters replaced, keeping
    /// prefix and trailer. Used when one verb is re-dispatched as another.
    pub fn rewritten(&self, verb: &str, params: Vec<String>) -> Self {
        let mut msg = Self {
            prefix: self.prefix.clone(),
            verb: verb.to_ascii_uppercase(),
            params,
            trailer: self.trailer.clone(),
            raw: String::new(),
        };
        msg.raw = msg.to_string();
        msg
    }
}

/// Re-serializes the message in wire form (without terminator).
impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(prefix) = &self.prefix {
            write!(f, ":{prefix} ")?;
        }
        f.write_str(&self.verb)?;
        for p in &self.params {
            write!(f, " {p}")?;
        }
        if let Some(t) = &self.trailer {
            write!(f, " :{t}")?;
        }
        Ok(())
    }
}

// =========================================================================
// Tests
// =========================================================================
