//! Command compiler.
//!
//! Turns [`Command`] and [`PassiveCommand`] definitions into reusable
//! matchers ([`ParsedCommand`]).
//!
//! # Active commands
//!
//! The syntax is split on whitespace. Tokens that are keys of the argument
//! map become named capture groups around the argument's fragment; all other
//! tokens are matched literally. The resulting pattern is anchored at both
//! ends, so `ping` matches exactly `"ping"`.
//!
//! ```text
//! "roll $dice $mod"     $dice required ".+?"  $mod optional "[+-]\d+"
//!   ─► ^roll (?P<a0>.+?)(?: (?P<a1>[+-]\d+))?$
//! ```
//!
//! Leading literal tokens form a plain-text prefix that is checked before the
//! regex runs.
//!
//! # Passive commands
//!
//! Passive patterns are compiled un-anchored and report every match in the
//! selected field, optionally gated by a partial-event template.

use std::collections::BTreeMap;

use regex::Regex;
use serde_json::Value;
use tracing::warn;
use weft_core::event::types;
use weft_core::json::left_equals;
use weft_core::{Command, CommandSpec, Event, PassiveCommand};

use crate::error::CompileError;

// ============================================================================
// Compiled forms
// ============================================================================

/// A compiled active command.
#[derive(Debug, Clone)]
pub struct ActiveMatcher {
    syntax: String,
    regex: Regex,
    starts_with: String,
    /// Placeholder keys in capture-group order (`a0`, `a1`, ...).
    placeholders: Vec<String>,
}

/// A compiled passive command.
#[derive(Debug, Clone)]
pub struct PassiveMatcher {
    name: String,
    regex: Regex,
    match_against: String,
    match_event: Option<Value>,
}

/// Compiled form of either command kind.
#[derive(Debug, Clone)]
pub enum ParsedCommand {
    Active(ActiveMatcher),
    Passive(PassiveMatcher),
}

impl ParsedCommand {
    /// The identifier handler chains are keyed by: the syntax of an active
    /// command or the name of a passive one.
    pub fn id(&self) -> &str {
        match self {
            Self::Active(cmd) => &cmd.syntax,
            Self::Passive(cmd) => &cmd.name,
        }
    }

    pub fn is_passive(&self) -> bool {
        matches!(self, Self::Passive(_))
    }
}

/// The active command an event matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandMatch {
    /// Syntax of the matched command.
    pub command: String,
    /// Placeholder key → captured text. Absent optional arguments are omitted.
    pub arguments: BTreeMap<String, String>,
}

impl CommandMatch {
    pub fn argument(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).map(String::as_str)
    }
}

/// All matches of one passive command in one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassiveMatch {
    pub name: String,
    /// One entry per match; each holds the full match followed by every
    /// capture group (empty for groups that did not participate).
    pub captures: Vec<Vec<String>>,
}

/// Everything the composite matched on one event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Matches {
    pub command: Option<CommandMatch>,
    pub passive: Vec<PassiveMatch>,
}

impl Matches {
    pub fn is_empty(&self) -> bool {
        self.command.is_none() && self.passive.is_empty()
    }
}

// ============================================================================
// Compilation
// ============================================================================

impl ActiveMatcher {
    /// Compiles an active command.
    pub fn compile(command: &Command) -> Result<Self, CompileError> {
        let tokens: Vec<&str> = command.syntax.split_whitespace().collect();
        if tokens.is_empty() {
            return Err(CompileError::EmptySyntax);
        }

        let mut pattern = String::from("^");
        let mut placeholders = Vec::new();
        let mut prefix = Vec::new();
        let mut in_prefix = true;
        let mut pending_space = false;

        for (index, token) in tokens.iter().enumerate() {
            let Some(argument) = command.arguments.get(*token) else {
                if in_prefix {
                    prefix.push(*token);
                }
                if pending_space {
                    pattern.push(' ');
                }
                pattern.push_str(&regex::escape(token));
                pending_space = true;
                continue;
            };

            in_prefix = false;
            let group = format!("(?P<a{}>{})", placeholders.len(), argument.matches);
            placeholders.push((*token).to_string());

            if argument.required {
                if pending_space {
                    pattern.push(' ');
                }
                pattern.push_str(&group);
                pending_space = true;
            } else if pending_space {
                // The optional wrapper owns the separating space.
                pattern.push_str("(?: ");
                pattern.push_str(&group);
                pattern.push_str(")?");
            } else if index + 1 == tokens.len() {
                pattern.push_str(&group);
                pattern.push('?');
            } else {
                pattern.push_str("(?:");
                pattern.push_str(&group);
                pattern.push_str(" )?");
            }
        }
        pattern.push('$');

        let regex = Regex::new(&pattern).map_err(|source| CompileError::InvalidPattern {
            command: command.syntax.clone(),
            source,
        })?;

        Ok(Self {
            syntax: command.syntax.clone(),
            regex,
            starts_with: prefix.join(" "),
            placeholders,
        })
    }

    pub fn syntax(&self) -> &str {
        &self.syntax
    }

    /// The literal prefix checked before the regex.
    pub fn starts_with(&self) -> &str {
        &self.starts_with
    }

    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }

    /// Matches a message body against this command.
    pub fn match_text(&self, text: &str) -> Option<CommandMatch> {
        if !text.starts_with(&self.starts_with) {
            return None;
        }
        let captures = self.regex.captures(text)?;
        let arguments = self
            .placeholders
            .iter()
            .enumerate()
            .filter_map(|(i, key)| {
                captures
                    .name(&format!("a{i}"))
                    .map(|m| (key.clone(), m.as_str().to_string()))
            })
            .collect();

        Some(CommandMatch {
            command: self.syntax.clone(),
            arguments,
        })
    }
}

impl PassiveMatcher {
    /// Compiles a passive command.
    pub fn compile(command: &PassiveCommand) -> Result<Self, CompileError> {
        let regex =
            Regex::new(&command.matches).map_err(|source| CompileError::InvalidPattern {
                command: command.name.clone(),
                source,
            })?;

        Ok(Self {
            name: command.name.clone(),
            regex,
            match_against: command.match_against.clone(),
            match_event: command.match_event.clone(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Matches the selected field of `event`.
    ///
    /// Returns `None` if the template rejects the event, the field is missing
    /// or not a string, or the pattern finds nothing.
    pub fn match_event(&self, event: &Event) -> Option<PassiveMatch> {
        if let Some(template) = &self.match_event
            && !left_equals(template, &event.to_value())
        {
            return None;
        }

        let target = match event.content.get(&self.match_against)? {
            Value::String(text) => text,
            _ => return None,
        };

        let captures: Vec<Vec<String>> = self
            .regex
            .captures_iter(&target)
            .map(|caps| {
                caps.iter()
                    .map(|group| group.map(|m| m.as_str().to_string()).unwrap_or_default())
                    .collect()
            })
            .collect();

        (!captures.is_empty()).then(|| PassiveMatch {
            name: self.name.clone(),
            captures,
        })
    }
}

/// Compiles every command of `spec`, actives first, in declaration order.
///
/// Commands that fail to compile are logged and skipped.
pub fn compile_spec(owner: &str, spec: &CommandSpec) -> Vec<ParsedCommand> {
    let active = spec
        .commands
        .iter()
        .filter_map(|cmd| match ActiveMatcher::compile(cmd) {
            Ok(parsed) => Some(ParsedCommand::Active(parsed)),
            Err(e) => {
                warn!(owner, command = %cmd.syntax, error = %e, "Skipping command");
                None
            }
        });

    let passive = spec
        .passive_commands
        .iter()
        .filter_map(|cmd| match PassiveMatcher::compile(cmd) {
            Ok(parsed) => Some(ParsedCommand::Passive(parsed)),
            Err(e) => {
                warn!(owner, command = %cmd.name, error = %e, "Skipping passive command");
                None
            }
        });

    active.chain(passive).collect()
}

/// Runs a composite matcher list against one event.
///
/// Only `m.room.message` events are considered. The first active command that
/// matches wins; every passive command that matches is reported, in list
/// order.
pub fn match_composite(composite: &[ParsedCommand], event: &Event) -> Matches {
    let mut matches = Matches::default();
    if event.event_type != types::ROOM_MESSAGE {
        return matches;
    }
    let body = event.body();

    for parsed in composite {
        match parsed {
            ParsedCommand::Active(cmd) => {
                if matches.command.is_none()
                    && let Some(body) = body
                {
                    matches.command = cmd.match_text(body);
                }
            }
            ParsedCommand::Passive(cmd) => {
                if let Some(found) = cmd.match_event(event) {
                    matches.passive.push(found);
                }
            }
        }
    }

    matches
}
