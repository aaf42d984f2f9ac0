//! Per-account spec multiplexer.
//!
//! Every plugin on an account sets its own [`CommandSpec`]. The multiplexer
//! keeps them keyed by owner, persists changes, and hands out one composite
//! matcher list built from all owners in lexicographic order. The list is
//! compiled lazily and cached until the next semantic change.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};
use weft_core::{CommandSpec, CommandSpecRecord, Store, StoreResult};

use crate::command::{ParsedCommand, compile_spec};

/// Outcome of [`SpecMultiplexer::set_spec`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecUpdate {
    /// The spec differed and was stored.
    Changed,
    /// The spec was equal to the stored one; nothing happened.
    Unchanged,
}

#[derive(Default)]
struct State {
    specs: BTreeMap<String, CommandSpec>,
    cache: Option<Arc<[ParsedCommand]>>,
    generation: u64,
}

impl State {
    fn invalidate(&mut self) {
        self.cache = None;
        self.generation += 1;
    }
}

/// Owner → spec map of one account, with the cached composite.
pub struct SpecMultiplexer {
    account: String,
    store: Arc<dyn Store>,
    state: Mutex<State>,
}

impl SpecMultiplexer {
    pub fn new(account: impl Into<String>, store: Arc<dyn Store>) -> Self {
        Self {
            account: account.into(),
            store,
            state: Mutex::new(State::default()),
        }
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    /// Sets the spec of `owner`.
    ///
    /// An equal spec is a no-op. Otherwise the spec is persisted first and
    /// only then installed; if persisting fails the in-memory state is left
    /// as it was.
    pub async fn set_spec(&self, owner: &str, spec: CommandSpec) -> StoreResult<SpecUpdate> {
        let mut state = self.state.lock().await;
        if state.specs.get(owner) == Some(&spec) {
            debug!(account = %self.account, owner, "Command spec unchanged");
            return Ok(SpecUpdate::Unchanged);
        }

        self.store
            .put_command_spec(owner, &self.account, &spec)
            .await?;

        info!(
            account = %self.account,
            owner,
            commands = spec.commands.len(),
            passive = spec.passive_commands.len(),
            "Command spec updated"
        );
        state.specs.insert(owner.to_string(), spec);
        state.invalidate();
        Ok(SpecUpdate::Changed)
    }

    /// Installs persisted specs without writing them back.
    pub async fn load(&self, records: impl IntoIterator<Item = CommandSpecRecord>) {
        let mut state = self.state.lock().await;
        let mut loaded = 0usize;
        for record in records {
            if record.account != self.account {
                continue;
            }
            state.specs.insert(record.owner, record.spec);
            loaded += 1;
        }
        if loaded > 0 {
            debug!(account = %self.account, loaded, "Loaded command specs");
            state.invalidate();
        }
    }

    /// Drops the spec of `owner`. Returns `true` if one was present.
    pub async fn remove(&self, owner: &str) -> bool {
        let mut state = self.state.lock().await;
        let removed = state.specs.remove(owner).is_some();
        if removed {
            state.invalidate();
        }
        removed
    }

    /// The compiled composite: owners in order, each owner's active commands
    /// followed by its passive commands.
    pub async fn composite(&self) -> Arc<[ParsedCommand]> {
        let mut state = self.state.lock().await;
        if let Some(cache) = &state.cache {
            return Arc::clone(cache);
        }

        let compiled: Arc<[ParsedCommand]> = state
            .specs
            .iter()
            .flat_map(|(owner, spec)| compile_spec(owner, spec))
            .collect();
        debug!(
            account = %self.account,
            generation = state.generation,
            commands = compiled.len(),
            "Rebuilt composite command list"
        );
        state.cache = Some(Arc::clone(&compiled));
        compiled
    }

    /// All owners' specs merged into one, in owner order.
    pub async fn merged(&self) -> CommandSpec {
        let state = self.state.lock().await;
        state
            .specs
            .values()
            .fold(CommandSpec::new(), |mut merged, spec| {
                merged.merge(spec);
                merged
            })
    }

    pub async fn spec(&self, owner: &str) -> Option<CommandSpec> {
        self.state.lock().await.specs.get(owner).cloned()
    }

    /// Counter advanced on every semantic change.
    pub async fn generation(&self) -> u64 {
        self.state.lock().await.generation
    }
}

impl std::fmt::Debug for SpecMultiplexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpecMultiplexer")
            .field("account", &self.account)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use weft_core::{
        AccountRecord, Argument, Command, MemoryStore, PassiveCommand, PluginRecord, StoreError,
    };

    fn multiplexer() -> (SpecMultiplexer, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (SpecMultiplexer::new("@bot:hs", store.clone()), store)
    }

    fn ping() -> CommandSpec {
        CommandSpec::new().command(Command::new("ping"))
    }

    #[tokio::test]
    async fn test_equal_spec_is_unchanged() {
        let store = Arc::new(CountingStore::default());
        let mux = SpecMultiplexer::new("@bot:hs", store.clone());

        assert_eq!(mux.set_spec("a", ping()).await.unwrap(), SpecUpdate::Changed);
        let generation = mux.generation().await;
        let composite = mux.composite().await;

        assert_eq!(mux.set_spec("a", ping()).await.unwrap(), SpecUpdate::Unchanged);
        assert_eq!(mux.generation().await, generation);
        assert!(Arc::ptr_eq(&composite, &mux.composite().await));
        assert_eq!(store.puts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_changed_spec_is_persisted() {
        let (mux, store) = multiplexer();
        mux.set_spec("a", ping()).await.unwrap();

        let records = store.command_specs("@bot:hs").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].spec, ping());
    }

    #[tokio::test]
    async fn test_composite_is_independent_of_registration_order() {
        let spec = |name: &str| {
            CommandSpec::new()
                .command(Command::new(name))
                .passive(PassiveCommand::new(format!("{name}-p"), name))
        };

        let (first, _) = multiplexer();
        for owner in ["b", "a", "c"] {
            first.set_spec(owner, spec(owner)).await.unwrap();
        }
        let (second, _) = multiplexer();
        for owner in ["a", "b", "c"] {
            second.set_spec(owner, spec(owner)).await.unwrap();
        }

        let ids = |list: Arc<[ParsedCommand]>| {
            list.iter().map(|c| c.id().to_string()).collect::<Vec<_>>()
        };
        let composite = ids(first.composite().await);
        assert_eq!(composite, ids(second.composite().await));
        assert_eq!(composite, ["a", "a-p", "b", "b-p", "c", "c-p"]);
    }

    #[tokio::test]
    async fn test_composite_is_cached_until_change() {
        let (mux, _) = multiplexer();
        mux.set_spec("a", ping()).await.unwrap();

        let first = mux.composite().await;
        let second = mux.composite().await;
        assert!(Arc::ptr_eq(&first, &second));

        mux.set_spec(
            "a",
            CommandSpec::new()
                .command(Command::new("echo $x").argument("$x", Argument::required(".+"))),
        )
        .await
        .unwrap();
        let third = mux.composite().await;
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(third[0].id(), "echo $x");
    }

    #[tokio::test]
    async fn test_remove_and_load() {
        let (mux, store) = multiplexer();
        mux.set_spec("a", ping()).await.unwrap();
        assert!(mux.remove("a").await);
        assert!(!mux.remove("a").await);
        assert!(mux.composite().await.is_empty());

        let fresh = SpecMultiplexer::new("@bot:hs", store.clone());
        fresh
            .load(store.command_specs("@bot:hs").await.unwrap())
            .await;
        assert_eq!(fresh.spec("a").await, Some(ping()));
        assert_eq!(fresh.merged().await, ping());
    }

    /// Counts spec writes on top of a [`MemoryStore`].
    #[derive(Default)]
    struct CountingStore {
        inner: MemoryStore,
        puts: AtomicUsize,
    }

    #[async_trait]
    impl Store for CountingStore {
        async fn accounts(&self) -> StoreResult<Vec<AccountRecord>> {
            self.inner.accounts().await
        }
        async fn account(&self, user_id: &str) -> StoreResult<AccountRecord> {
            self.inner.account(user_id).await
        }
        async fn update_account(&self, account: &AccountRecord) -> StoreResult<()> {
            self.inner.update_account(account).await
        }
        async fn command_specs(&self, account: &str) -> StoreResult<Vec<CommandSpecRecord>> {
            self.inner.command_specs(account).await
        }
        async fn put_command_spec(
            &self,
            owner: &str,
            account: &str,
            spec: &CommandSpec,
        ) -> StoreResult<()> {
            self.puts.fetch_add(1, Ordering::SeqCst);
            self.inner.put_command_spec(owner, account, spec).await
        }
        async fn plugins(&self) -> StoreResult<Vec<PluginRecord>> {
            self.inner.plugins().await
        }
        async fn update_plugin(&self, plugin: &PluginRecord) -> StoreResult<()> {
            self.inner.update_plugin(plugin).await
        }
    }

    struct FailingStore;

    #[async_trait]
    impl Store for FailingStore {
        async fn accounts(&self) -> StoreResult<Vec<AccountRecord>> {
            Ok(Vec::new())
        }
        async fn account(&self, user_id: &str) -> StoreResult<AccountRecord> {
            Err(StoreError::not_found("account", user_id))
        }
        async fn update_account(&self, _: &AccountRecord) -> StoreResult<()> {
            Ok(())
        }
        async fn command_specs(&self, _: &str) -> StoreResult<Vec<CommandSpecRecord>> {
            Ok(Vec::new())
        }
        async fn put_command_spec(&self, _: &str, _: &str, _: &CommandSpec) -> StoreResult<()> {
            Err(StoreError::Backend("disk full".into()))
        }
        async fn plugins(&self) -> StoreResult<Vec<PluginRecord>> {
            Ok(Vec::new())
        }
        async fn update_plugin(&self, _: &PluginRecord) -> StoreResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_persist_failure_leaves_state_untouched() {
        let mux = SpecMultiplexer::new("@bot:hs", Arc::new(FailingStore));

        assert!(mux.set_spec("a", ping()).await.is_err());
        assert_eq!(mux.spec("a").await, None);
        assert_eq!(mux.generation().await, 0);
    }
}
