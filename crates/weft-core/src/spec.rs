//! Declarative command specifications.
//!
//! Each plugin describes the commands it understands as a [`CommandSpec`]
//! and hands it to its account. Specs are plain data: they serialize to the
//! store as JSON and compare structurally, so re-registering an identical
//! spec can be detected and ignored.
//!
//! ```
//! use weft_core::spec::{Argument, Command, CommandSpec, PassiveCommand};
//!
//! let spec = CommandSpec::new()
//!     .command(Command::new("ping").description("Check that the bot is alive"))
//!     .command(
//!         Command::new("echo $text")
//!             .argument("$text", Argument::required(".+").description("Text to echo")),
//!     )
//!     .passive(PassiveCommand::new("issue", r"#(\d+)"));
//!
//! assert_eq!(spec.commands.len(), 2);
//! assert_eq!(spec.passive_commands.len(), 1);
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default passive-command match target.
pub const MATCH_AGAINST_BODY: &str = "body";

/// The full set of commands one plugin registers on one account.
///
/// Equality is order-sensitive: two specs are equal only if their command
/// lists are pairwise equal in order and length.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandSpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<Command>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub passive_commands: Vec<PassiveCommand>,
}

impl CommandSpec {
    /// Creates an empty spec.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an active command.
    pub fn command(mut self, command: Command) -> Self {
        self.commands.push(command);
        self
    }

    /// Appends a passive command.
    pub fn passive(mut self, command: PassiveCommand) -> Self {
        self.passive_commands.push(command);
        self
    }

    /// Returns `true` if the spec declares nothing.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty() && self.passive_commands.is_empty()
    }

    /// Appends all commands of `other`, preserving their order.
    pub fn merge(&mut self, other: &CommandSpec) {
        self.commands.extend(other.commands.iter().cloned());
        self.passive_commands
            .extend(other.passive_commands.iter().cloned());
    }
}

/// An active command: an anchored syntax template with placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    /// Whitespace-separated template, e.g. `"roll $dice"`.
    pub syntax: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Placeholder token → argument definition.
    #[serde(default)]
    pub arguments: BTreeMap<String, Argument>,
}

impl Command {
    pub fn new(syntax: impl Into<String>) -> Self {
        Self {
            syntax: syntax.into(),
            description: String::new(),
            arguments: BTreeMap::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Declares the placeholder `key` (as it appears in the syntax).
    pub fn argument(mut self, key: impl Into<String>, argument: Argument) -> Self {
        self.arguments.insert(key.into(), argument);
        self
    }
}

/// One placeholder of an active command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Argument {
    /// Regular-expression fragment the argument must match.
    pub matches: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl Argument {
    pub fn required(matches: impl Into<String>) -> Self {
        Self {
            matches: matches.into(),
            required: true,
            description: String::new(),
        }
    }

    pub fn optional(matches: impl Into<String>) -> Self {
        Self {
            matches: matches.into(),
            required: false,
            description: String::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// A pattern evaluated against a field of every message event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassiveCommand {
    pub name: String,
    /// Un-anchored regular expression.
    pub matches: String,
    /// Dotted path into the event content, see [`crate::json::resolve`].
    #[serde(default = "default_match_against")]
    pub match_against: String,
    /// Partial event that must be a structural subset of the real event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_event: Option<Value>,
}

fn default_match_against() -> String {
    MATCH_AGAINST_BODY.to_string()
}

impl PassiveCommand {
    pub fn new(name: impl Into<String>, matches: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            matches: matches.into(),
            match_against: default_match_against(),
            match_event: None,
        }
    }

    pub fn match_against(mut self, path: impl Into<String>) -> Self {
        self.match_against = path.into();
        self
    }

    pub fn match_event(mut self, template: Value) -> Self {
        self.match_event = Some(template);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo() -> Command {
        Command::new("echo $text").argument("$text", Argument::required(".+"))
    }

    #[test]
    fn test_equality_is_order_sensitive() {
        let a = CommandSpec::new().command(Command::new("ping")).command(echo());
        let b = CommandSpec::new().command(echo()).command(Command::new("ping"));
        let c = CommandSpec::new().command(Command::new("ping")).command(echo());

        assert_ne!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn test_equality_compares_arguments() {
        let a = CommandSpec::new().command(echo());
        let b = CommandSpec::new()
            .command(Command::new("echo $text").argument("$text", Argument::optional(".+")));
        assert_ne!(a, b);
    }

    #[test]
    fn test_deserialize_defaults() {
        let spec: CommandSpec = serde_json::from_value(json!({
            "commands": [{ "syntax": "ping" }],
            "passive_commands": [{ "name": "url", "matches": "https?://\\S+" }]
        }))
        .unwrap();

        assert!(spec.commands[0].arguments.is_empty());
        assert_eq!(spec.passive_commands[0].match_against, MATCH_AGAINST_BODY);
        assert!(spec.passive_commands[0].match_event.is_none());
    }

    #[test]
    fn test_merge_keeps_order() {
        let mut spec = CommandSpec::new().command(Command::new("a"));
        spec.merge(
            &CommandSpec::new()
                .command(Command::new("b"))
                .passive(PassiveCommand::new("p", "x")),
        );

        let syntaxes: Vec<_> = spec.commands.iter().map(|c| c.syntax.as_str()).collect();
        assert_eq!(syntaxes, ["a", "b"]);
        assert_eq!(spec.passive_commands.len(), 1);
    }
}
