//! Persistence collaborator.
//!
//! The host persists three kinds of records: accounts (credentials and the
//! sync cursor), plugin instances, and the command specs each plugin set on
//! each account. [`MemoryStore`] keeps everything in process memory and is
//! what the runtime uses unless a real backend is supplied.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};
use crate::spec::CommandSpec;

// =============================================================================
// Records
// =============================================================================

/// A persisted account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub user_id: String,
    pub homeserver: String,
    pub access_token: String,
    /// Opaque sync cursor; empty until the first batch has been applied.
    #[serde(default)]
    pub next_batch: String,
    /// Feed filter id; empty until one has been created.
    #[serde(default)]
    pub filter_id: String,
    #[serde(default = "default_true")]
    pub sync: bool,
    #[serde(default)]
    pub autojoin: bool,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub avatar_url: String,
}

impl AccountRecord {
    pub fn new(
        user_id: impl Into<String>,
        homeserver: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            homeserver: homeserver.into(),
            access_token: access_token.into(),
            next_batch: String::new(),
            filter_id: String::new(),
            sync: true,
            autojoin: false,
            display_name: String::new(),
            avatar_url: String::new(),
        }
    }

    /// The sync cursor, if any batch has been applied yet.
    pub fn cursor(&self) -> Option<&str> {
        (!self.next_batch.is_empty()).then_some(self.next_batch.as_str())
    }
}

/// A persisted plugin instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginRecord {
    /// Instance id; also the owner id of everything the plugin registers.
    pub id: String,
    /// Name of the registered plugin type.
    #[serde(rename = "type")]
    pub plugin_type: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// The account the instance runs on.
    pub user_id: String,
}

impl PluginRecord {
    pub fn new(
        id: impl Into<String>,
        plugin_type: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            plugin_type: plugin_type.into(),
            enabled: true,
            user_id: user_id.into(),
        }
    }
}

/// A command spec as set by one owner on one account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandSpecRecord {
    pub owner: String,
    pub account: String,
    pub spec: CommandSpec,
}

fn default_true() -> bool {
    true
}

// =============================================================================
// Store
// =============================================================================

/// The persistence backend.
#[async_trait]
pub trait Store: Send + Sync {
    async fn accounts(&self) -> StoreResult<Vec<AccountRecord>>;

    async fn account(&self, user_id: &str) -> StoreResult<AccountRecord>;

    /// Inserts or replaces an account.
    async fn update_account(&self, account: &AccountRecord) -> StoreResult<()>;

    /// All specs set on `account`, any owner.
    async fn command_specs(&self, account: &str) -> StoreResult<Vec<CommandSpecRecord>>;

    /// Inserts or replaces the spec of (`owner`, `account`).
    async fn put_command_spec(
        &self,
        owner: &str,
        account: &str,
        spec: &CommandSpec,
    ) -> StoreResult<()>;

    async fn plugins(&self) -> StoreResult<Vec<PluginRecord>>;

    /// Inserts or replaces a plugin record.
    async fn update_plugin(&self, plugin: &PluginRecord) -> StoreResult<()>;
}

#[derive(Default)]
struct MemoryTables {
    accounts: BTreeMap<String, AccountRecord>,
    plugins: BTreeMap<String, PluginRecord>,
    specs: BTreeMap<(String, String), CommandSpec>,
}

/// In-process [`Store`].
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<MemoryTables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with the given records.
    pub fn seeded(
        accounts: impl IntoIterator<Item = AccountRecord>,
        plugins: impl IntoIterator<Item = PluginRecord>,
    ) -> Self {
        let store = Self::new();
        {
            let mut tables = store.tables.write();
            for account in accounts {
                tables.accounts.insert(account.user_id.clone(), account);
            }
            for plugin in plugins {
                tables.plugins.insert(plugin.id.clone(), plugin);
            }
        }
        store
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn accounts(&self) -> StoreResult<Vec<AccountRecord>> {
        Ok(self.tables.read().accounts.values().cloned().collect())
    }

    async fn account(&self, user_id: &str) -> StoreResult<AccountRecord> {
        self.tables
            .read()
            .accounts
            .get(user_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("account", user_id))
    }

    async fn update_account(&self, account: &AccountRecord) -> StoreResult<()> {
        self.tables
            .write()
            .accounts
            .insert(account.user_id.clone(), account.clone());
        Ok(())
    }

    async fn command_specs(&self, account: &str) -> StoreResult<Vec<CommandSpecRecord>> {
        Ok(self
            .tables
            .read()
            .specs
            .iter()
            .filter(|((_, acc), _)| acc == account)
            .map(|((owner, acc), spec)| CommandSpecRecord {
                owner: owner.clone(),
                account: acc.clone(),
                spec: spec.clone(),
            })
            .collect())
    }

    async fn put_command_spec(
        &self,
        owner: &str,
        account: &str,
        spec: &CommandSpec,
    ) -> StoreResult<()> {
        self.tables
            .write()
            .specs
            .insert((owner.to_string(), account.to_string()), spec.clone());
        Ok(())
    }

    async fn plugins(&self) -> StoreResult<Vec<PluginRecord>> {
        Ok(self.tables.read().plugins.values().cloned().collect())
    }

    async fn update_plugin(&self, plugin: &PluginRecord) -> StoreResult<()> {
        self.tables
            .write()
            .plugins
            .insert(plugin.id.clone(), plugin.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::Command;

    #[tokio::test]
    async fn test_seeded_store_round_trips_accounts() {
        let store = MemoryStore::seeded(
            [AccountRecord::new("@bot:hs", "https://hs", "token")],
            [PluginRecord::new("echo", "weft.echo", "@bot:hs")],
        );

        let mut account = store.account("@bot:hs").await.unwrap();
        assert_eq!(account.cursor(), None);

        account.next_batch = "s1".into();
        store.update_account(&account).await.unwrap();
        assert_eq!(
            store.account("@bot:hs").await.unwrap().cursor(),
            Some("s1")
        );
        assert_eq!(store.plugins().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_account_is_not_found() {
        let store = MemoryStore::new();
        let err = store.account("@nobody:hs").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { kind: "account", .. }));
    }

    #[tokio::test]
    async fn test_command_specs_are_scoped_by_account() {
        let store = MemoryStore::new();
        let spec = CommandSpec::new().command(Command::new("ping"));
        store.put_command_spec("p1", "@a:hs", &spec).await.unwrap();
        store.put_command_spec("p2", "@b:hs", &spec).await.unwrap();

        let specs = store.command_specs("@a:hs").await.unwrap();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].owner, "p1");
    }

    #[test]
    fn test_plugin_record_uses_type_key() {
        let record: PluginRecord = serde_json::from_value(serde_json::json!({
            "id": "echo", "type": "weft.echo", "user_id": "@bot:hs"
        }))
        .unwrap();
        assert_eq!(record.plugin_type, "weft.echo");
        assert!(record.enabled);
    }
}
