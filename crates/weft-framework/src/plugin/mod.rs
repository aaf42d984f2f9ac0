//! Plugin API.
//!
//! Plugins are compiled into the host and registered through a
//! [`PluginRegistry`] as [`PluginDescriptor`]s. For every enabled plugin
//! record the runtime calls the descriptor's factory with a [`PluginInit`]
//! and drives the returned instance through [`Plugin::start`] and
//! [`Plugin::stop`].
//!
//! # Example
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
//!             .set_spec(CommandSpec::new().command(Command::new("ping")))
//!             .await?;
//!         self.proxy.add_command_handler("ping", |ctx: EventContext| async move {
//!             let _ = ctx.reply("pong").await;
//!             CommandResult::Continue
//!         });
//!         Ok(())
//!     }
//! }
//!
//! pub static PING: PluginDescriptor = PluginDescriptor {
//!     api_version: WEFT_PLUGIN_API_VERSION,
//!     name: "ping",
//!     version: "1.0.0",
//!     create: |init| Box::new(Ping { proxy: init.proxy }),
//! };
//! ```

// ─── Submodules ──────────────────────────────────────────────────────────────
pub mod descriptor;
pub mod registry;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::Value;
use weft_core::{Client, PluginRecord};

use crate::error::PluginResult;
use crate::proxy::AccountProxy;

pub use descriptor::{PluginDescriptor, WEFT_PLUGIN_API_VERSION};
pub use registry::PluginRegistry;

// ─── Plugin ──────────────────────────────────────────────────────────────────

/// A live plugin instance bound to one account.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Sets the plugin's command spec and registers its handlers.
    ///
    /// An error disables the plugin record.
    async fn start(&self) -> PluginResult;

    /// Called on shutdown or removal. Handlers are unhooked by the host
    /// afterwards.
    async fn stop(&self) {}
}

// ─── PluginInit ──────────────────────────────────────────────────────────────

/// Everything a plugin factory receives.
pub struct PluginInit {
    /// Lookup of every running account.
    pub bot: BotHandle,
    pub record: PluginRecord,
    /// The plugin's scoped view of its account.
    pub proxy: AccountProxy,
    /// The plugin's configuration section (`Null` if absent).
    pub config: Value,
}

impl PluginInit {
    /// Decodes the configuration section, falling back to `T::default()`
    /// when none was given.
    pub fn config<T: DeserializeOwned + Default>(&self) -> serde_json::Result<T> {
        if self.config.is_null() {
            return Ok(T::default());
        }
        serde_json::from_value(self.config.clone())
    }
}

// ─── BotHandle ───────────────────────────────────────────────────────────────

/// Shared lookup of account sessions by user id.
#[derive(Debug, Clone, Default)]
pub struct BotHandle {
    clients: Arc<RwLock<HashMap<String, Client>>>,
}

impl BotHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, client: Client) {
        self.clients
            .write()
            .insert(client.user_id().to_string(), client);
    }

    pub fn remove(&self, user_id: &str) -> Option<Client> {
        self.clients.write().remove(user_id)
    }

    /// The session of another account, if it is running.
    pub fn client(&self, user_id: &str) -> Option<Client> {
        self.clients.read().get(user_id).cloned()
    }

    /// User ids of every running account, sorted.
    pub fn user_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.clients.read().keys().cloned().collect();
        ids.sort();
        ids
    }
}
