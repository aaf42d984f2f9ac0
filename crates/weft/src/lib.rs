//! # Weft
//!
//! A chat bot host: one process runs several accounts, each with its own
//! sync loop, and plugins attach commands and listeners to those accounts.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   batch   ┌───────────────┐  event  ┌──────────────────────────┐
//! │ Sync loop    │──────────▶│ Account       │────────▶│ commands  (composite)    │──▶ plugin "ping"
//! │ (per account)│           │ spec mux +    │         │ listeners (typed, "*")   │──▶ plugin "echo"
//! └──────────────┘           │ dispatcher    │         └──────────────────────────┘
//!        ▲                   └───────────────┘
//!        └── transport (homeserver client-server API)
//! ```
//!
//! - **Command specs**: plugins declare commands as syntax strings with typed
//!   arguments (`echo $text`); the account merges every plugin's spec into
//!   one composite and routes matches to the owner's handlers
//! - **Plugins**: compiled in, registered as descriptors, instantiated per
//!   plugin record and scoped to one account through an `AccountProxy`
//! - **Runtime**: configuration, logging, the sync loops and plugin lifecycle
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use weft::prelude::*;
//!
//! struct Ping {
//!     proxy: AccountProxy,
//! }
//!
//! #[async_trait]
//! impl Plugin for Ping {
//!     async fn start(&self) -> PluginResult {
//!         self.proxy
//!             .set_spec(CommandSpec::new().command(Command::new("!ping")))
//!             .await?;
//!         self.proxy.add_command_handler("!ping", |ctx: EventContext| async move {
//!             let _ = ctx.reply("pong").await;
//!             CommandResult::Continue
//!         });
//!         Ok(())
//!     }
//! }
//!
//! static PING: PluginDescriptor = PluginDescriptor {
//!     api_version: WEFT_PLUGIN_API_VERSION,
//!     name: "ping",
//!     version: "1.0.0",
//!     create: |init| Box::new(Ping { proxy: init.proxy }),
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = WeftRuntime::builder().build()?;
//!     runtime.register_plugin(PING)?;
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config` *(default)*: `weft.toml` configuration files
//! - `yaml-config`: `weft.yaml` configuration files
//! - `json-log`: JSON log output
//! - `http-client`: the reqwest-based homeserver transport

pub use weft_core as core;
pub use weft_framework as framework;
pub use weft_runtime as runtime;
pub use weft_transport as transport;

pub use async_trait::async_trait;

/// Commonly used types for writing plugins and host binaries.
///
/// ```rust,ignore
/// use weft::prelude::*;
/// ```
pub mod prelude {
    // Runtime
    pub use weft_runtime::{RuntimeBuilder, WeftConfig, WeftRuntime};

    // Plugin API
    pub use weft_framework::{
        AccountProxy, BotHandle, Plugin, PluginDescriptor, PluginError, PluginInit,
        PluginResult, WEFT_PLUGIN_API_VERSION,
    };

    // Handlers
    pub use weft_framework::{CommandResult, EventContext, Propagation, WILDCARD};

    // Command specs and events
    pub use weft_core::event::types;
    pub use weft_core::{
        Argument, Client, Command, CommandSpec, Event, EventContent, Membership, PassiveCommand,
    };

    pub use async_trait::async_trait;
}
