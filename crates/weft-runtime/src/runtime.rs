//! Runtime orchestration: accounts, plugins and their sync loops.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use weft_runtime::WeftRuntime;
//!
//! let runtime = WeftRuntime::builder()
//!     .config_file("weft.toml")
//!     .build()?;
//! runtime.register_plugin(ECHO)?;
//! runtime.run().await?;
//! ```
//!
//! Lifecycle:
//!
//! 1. [`init`](WeftRuntime::init) connects every stored account and
//!    instantiates every enabled plugin record. Records naming an unknown
//!    plugin type or a missing account are disabled and persisted.
//! 2. [`start`](WeftRuntime::start) starts each plugin in its own task and
//!    spawns one sync loop per account with sync enabled.
//! 3. [`stop`](WeftRuntime::stop) cancels the sync loops, stops the plugins
//!    whose start succeeded and unhooks every plugin's handlers.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use tokio::signal;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use weft_core::{
    MemoryRoomStateStore, MemoryStore, PluginRecord, RoomStateStore, Store, TransportFactory,
};
use weft_framework::{AccountHandle, BotHandle, Plugin, PluginDescriptor, PluginInit, PluginRegistry};

use crate::account::Account;
use crate::config::{ConfigLoader, WeftConfig};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;
use crate::sync::{SyncProcessor, SyncSettings};

/// A plugin instance bound to its account.
struct LoadedPlugin {
    record: PluginRecord,
    account: AccountHandle,
    instance: Arc<dyn Plugin>,
    /// Set once `start` returned `Ok`; only such plugins get `stop`.
    started: Arc<AtomicBool>,
}

/// Handles of everything [`WeftRuntime::start`] spawned.
#[derive(Default)]
struct Tasks {
    cancel: CancellationToken,
    sync: Vec<(String, JoinHandle<()>)>,
    plugin_starts: Vec<JoinHandle<()>>,
}

/// Counts reported by [`WeftRuntime::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeStats {
    pub accounts: usize,
    pub syncing: usize,
    pub plugins: usize,
    /// Plugins whose `start` has returned `Ok`.
    pub started: usize,
    pub plugin_types: usize,
}

/// The bot host.
pub struct WeftRuntime {
    config: WeftConfig,
    store: Arc<dyn Store>,
    room_state: Arc<dyn RoomStateStore>,
    transports: Option<Arc<dyn TransportFactory>>,
    registry: RwLock<PluginRegistry>,
    bot: BotHandle,
    accounts: Mutex<BTreeMap<String, Account>>,
    plugins: Mutex<Vec<LoadedPlugin>>,
    tasks: Mutex<Option<Tasks>>,
}

impl WeftRuntime {
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Creates a runtime from loaded configuration and initialises logging.
    ///
    /// Accounts and plugins from the configuration seed an in-memory store;
    /// use [`with_store`](Self::with_store) to supply a persistent one.
    pub fn from_config(config: &WeftConfig) -> Self {
        logging::init_from_config(&config.logging);

        let store = MemoryStore::seeded(config.accounts.clone(), config.plugins.clone());
        info!(
            accounts = config.accounts.len(),
            plugins = config.plugins.len(),
            log_level = %config.logging.level,
            "Runtime created from configuration"
        );

        Self {
            config: config.clone(),
            store: Arc::new(store),
            room_state: Arc::new(MemoryRoomStateStore::new()),
            transports: default_transport_factory(),
            registry: RwLock::new(PluginRegistry::new()),
            bot: BotHandle::new(),
            accounts: Mutex::new(BTreeMap::new()),
            plugins: Mutex::new(Vec::new()),
            tasks: Mutex::new(None),
        }
    }

    /// Replaces the persistence store.
    pub fn with_store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = store;
        self
    }

    pub fn with_room_state_store(mut self, room_state: Arc<dyn RoomStateStore>) -> Self {
        self.room_state = room_state;
        self
    }

    /// Replaces the transport used to reach homeservers.
    pub fn with_transport_factory(mut self, factory: Arc<dyn TransportFactory>) -> Self {
        self.transports = Some(factory);
        self
    }

    pub fn config(&self) -> &WeftConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn bot(&self) -> &BotHandle {
        &self.bot
    }

    /// Makes a plugin type available to plugin records.
    pub fn register_plugin(&self, descriptor: PluginDescriptor) -> RuntimeResult<()> {
        self.registry.write().register(descriptor)?;
        Ok(())
    }

    pub async fn account(&self, user_id: &str) -> Option<Account> {
        self.accounts.lock().await.get(user_id).cloned()
    }

    pub async fn is_running(&self) -> bool {
        self.tasks.lock().await.is_some()
    }

    pub async fn stats(&self) -> RuntimeStats {
        let syncing = self
            .tasks
            .lock()
            .await
            .as_ref()
            .map_or(0, |t| t.sync.iter().filter(|(_, h)| !h.is_finished()).count());
        let (plugins, started) = {
            let plugins = self.plugins.lock().await;
            let started = plugins
                .iter()
                .filter(|p| p.started.load(Ordering::SeqCst))
                .count();
            (plugins.len(), started)
        };
        RuntimeStats {
            accounts: self.accounts.lock().await.len(),
            syncing,
            plugins,
            started,
            plugin_types: self.registry.read().len(),
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Connects accounts and instantiates plugins. Idempotent.
    pub async fn init(&self) -> RuntimeResult<()> {
        let mut accounts = self.accounts.lock().await;
        if !accounts.is_empty() {
            debug!("Runtime already initialised");
            return Ok(());
        }
        let factory = self.transports.clone().ok_or(RuntimeError::NoTransport)?;

        for record in self.store.accounts().await? {
            let transport = match factory.connect(&record) {
                Ok(transport) => transport,
                Err(e) => {
                    error!(account = %record.user_id, error = %e, "Cannot connect account, skipping");
                    continue;
                }
            };
            let account = Account::new(record, transport, Arc::clone(&self.store)).await?;
            self.bot.insert(account.client().clone());
            debug!(account = %account.user_id(), "Account ready");
            accounts.insert(account.user_id().to_string(), account);
        }

        let mut plugins = self.plugins.lock().await;
        for record in self.store.plugins().await? {
            if !record.enabled {
                debug!(plugin = %record.id, "Plugin disabled, skipping");
                continue;
            }
            let descriptor = self.registry.read().get(&record.plugin_type).copied();
            let Some(descriptor) = descriptor else {
                warn!(plugin = %record.id, plugin_type = %record.plugin_type, "Unknown plugin type, disabling");
                self.disable_plugin(record).await;
                continue;
            };
            let Some(account) = accounts.get(&record.user_id) else {
                warn!(plugin = %record.id, account = %record.user_id, "Plugin account not available, disabling");
                self.disable_plugin(record).await;
                continue;
            };

            let handle = account.handle().clone();
            let init = PluginInit {
                bot: self.bot.clone(),
                record: record.clone(),
                proxy: handle.proxy(record.id.as_str()),
                config: self
                    .config
                    .plugin_config
                    .get(&record.id)
                    .cloned()
                    .unwrap_or_default(),
            };
            let instance: Arc<dyn Plugin> = Arc::from(descriptor.instantiate(init));
            info!(
                plugin = %record.id,
                plugin_type = descriptor.name,
                version = descriptor.version,
                account = %record.user_id,
                "Plugin instantiated"
            );
            plugins.push(LoadedPlugin {
                record,
                account: handle,
                instance,
                started: Arc::new(AtomicBool::new(false)),
            });
        }

        info!(accounts = accounts.len(), plugins = plugins.len(), "Runtime initialised");
        Ok(())
    }

    async fn disable_plugin(&self, mut record: PluginRecord) {
        record.enabled = false;
        if let Err(e) = self.store.update_plugin(&record).await {
            error!(plugin = %record.id, error = %e, "Failed to persist disabled plugin");
        }
    }

    /// Starts plugins and sync loops.
    pub async fn start(&self) -> RuntimeResult<()> {
        let mut tasks = self.tasks.lock().await;
        if tasks.is_some() {
            warn!("Runtime is already running");
            return Ok(());
        }
        let mut running = Tasks::default();

        for plugin in self.plugins.lock().await.iter() {
            let record = plugin.record.clone();
            let account = plugin.account.clone();
            let instance = Arc::clone(&plugin.instance);
            let started = Arc::clone(&plugin.started);
            let store = Arc::clone(&self.store);
            running.plugin_starts.push(tokio::spawn(async move {
                match instance.start().await {
                    Ok(()) => {
                        started.store(true, Ordering::SeqCst);
                        info!(plugin = %record.id, "Plugin started");
                    }
                    Err(e) => {
                        error!(plugin = %record.id, error = %e, "Plugin failed to start, disabling");
                        account.remove_owner(&record.id).await;
                        let mut record = record;
                        record.enabled = false;
                        if let Err(e) = store.update_plugin(&record).await {
                            error!(plugin = %record.id, error = %e, "Failed to persist disabled plugin");
                        }
                    }
                }
            }));
        }

        let settings = SyncSettings::from(&self.config.sync);
        for (user_id, account) in self.accounts.lock().await.iter() {
            if !account.record().sync {
                info!(account = %user_id, "Sync disabled for account");
                continue;
            }
            let processor = SyncProcessor::new(
                account,
                Arc::clone(&self.store),
                Arc::clone(&self.room_state),
                settings,
            );
            let handle = tokio::spawn(processor.run(running.cancel.child_token()));
            running.sync.push((user_id.clone(), handle));
        }

        info!(syncing = running.sync.len(), "Runtime started");
        *tasks = Some(running);
        Ok(())
    }

    /// Stops sync loops and plugins.
    pub async fn stop(&self) -> RuntimeResult<()> {
        let Some(running) = self.tasks.lock().await.take() else {
            warn!("Runtime is not running");
            return Ok(());
        };
        info!("Stopping Weft runtime");

        running.cancel.cancel();
        for (user_id, handle) in running.sync {
            if let Err(e) = handle.await {
                error!(account = %user_id, error = %e, "Sync task ended abnormally");
            }
        }
        for handle in running.plugin_starts {
            handle.abort();
        }

        for plugin in self.plugins.lock().await.iter() {
            if plugin.started.swap(false, Ordering::SeqCst) {
                plugin.instance.stop().await;
                debug!(plugin = %plugin.record.id, "Plugin stopped");
            }
            plugin.account.remove_owner(&plugin.record.id).await;
        }

        info!("Runtime stopped");
        Ok(())
    }

    /// Runs until Ctrl+C or SIGTERM.
    pub async fn run(&self) -> RuntimeResult<()> {
        self.run_until(wait_for_shutdown()).await
    }

    /// Runs until `shutdown` completes.
    pub async fn run_until<F>(&self, shutdown: F) -> RuntimeResult<()>
    where
        F: std::future::Future<Output = ()>,
    {
        self.init().await?;
        self.start().await?;
        info!("Weft runtime is running");

        shutdown.await;

        self.stop().await
    }
}

#[cfg(feature = "http-client")]
fn default_transport_factory() -> Option<Arc<dyn TransportFactory>> {
    Some(Arc::new(weft_transport::http::HttpTransportFactory::new()))
}

#[cfg(not(feature = "http-client"))]
fn default_transport_factory() -> Option<Arc<dyn TransportFactory>> {
    None
}

/// Waits for Ctrl+C or, on Unix, SIGTERM.
async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = signal::ctrl_c() => info!("Received Ctrl+C, shutting down"),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
                }
                return;
            }
            Err(e) => warn!(error = %e, "Cannot listen for SIGTERM"),
        }
    }

    if let Err(e) = signal::ctrl_c().await {
        error!(error = %e, "Cannot listen for Ctrl+C, shutting down");
        return;
    }
    info!("Received Ctrl+C, shutting down");
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builds a [`WeftRuntime`] from layered configuration.
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
    store: Option<Arc<dyn Store>>,
    room_state: Option<Arc<dyn RoomStateStore>>,
    transports: Option<Arc<dyn TransportFactory>>,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new(),
            store: None,
            room_state: None,
            transports: None,
        }
    }

    pub fn config_file<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    pub fn search_path<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    pub fn with_env(mut self) -> Self {
        self.config_loader = self.config_loader.with_env();
        self
    }

    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    pub fn merge(mut self, config: WeftConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    /// Uses this store instead of one seeded from configuration.
    pub fn store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn room_state_store(mut self, room_state: Arc<dyn RoomStateStore>) -> Self {
        self.room_state = Some(room_state);
        self
    }

    pub fn transport_factory(mut self, factory: Arc<dyn TransportFactory>) -> Self {
        self.transports = Some(factory);
        self
    }

    pub fn build(self) -> RuntimeResult<WeftRuntime> {
        let config = self.config_loader.load()?;
        let mut runtime = WeftRuntime::from_config(&config);
        if let Some(store) = self.store {
            runtime = runtime.with_store(store);
        }
        if let Some(room_state) = self.room_state {
            runtime = runtime.with_room_state_store(room_state);
        }
        if let Some(factory) = self.transports {
            runtime = runtime.with_transport_factory(factory);
        }
        Ok(runtime)
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
