//! # Weft Framework
//!
//! The per-account machinery between the sync loop and plugin code:
//!
//! - **Command compiler**: turns declarative command definitions into
//!   matchers ([`ParsedCommand`])
//! - **Spec multiplexer**: merges every plugin's spec into one cached,
//!   deterministic composite ([`SpecMultiplexer`])
//! - **Dispatcher**: owner-scoped listener and command-handler chains with
//!   short-circuit rules ([`Dispatcher`])
//! - **Account proxy**: the restricted view each plugin works through
//!   ([`AccountProxy`])
//! - **Plugin API**: [`Plugin`], [`PluginDescriptor`], [`PluginRegistry`]

pub mod account;
pub mod command;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod plugin;
pub mod proxy;
pub mod spec;

#[cfg(test)]
pub(crate) mod test_support;

pub use account::AccountHandle;
pub use command::{
    ActiveMatcher, CommandMatch, Matches, ParsedCommand, PassiveMatch, PassiveMatcher,
    compile_spec, match_composite,
};
pub use context::EventContext;
pub use dispatcher::{DispatchOutcome, Dispatcher, WILDCARD};
pub use error::{CompileError, PluginError, PluginResult, RegistryError};
pub use handler::{
    BoxedCommandHandler, BoxedListener, CommandHandler, CommandResult, Listener, Propagation,
};
pub use plugin::{
    BotHandle, Plugin, PluginDescriptor, PluginInit, PluginRegistry, WEFT_PLUGIN_API_VERSION,
};
pub use proxy::AccountProxy;
pub use spec::{SpecMultiplexer, SpecUpdate};
