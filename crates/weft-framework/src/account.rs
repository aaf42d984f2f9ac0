//! Shared per-account services.

use std::sync::Arc;

use weft_core::{Client, Event, Store};

use crate::command::match_composite;
use crate::dispatcher::{DispatchOutcome, Dispatcher};
use crate::proxy::AccountProxy;
use crate::spec::SpecMultiplexer;

/// The session, spec multiplexer and dispatcher of one account.
///
/// Plugins never see this directly; each gets an [`AccountProxy`] scoped to
/// its own owner id.
#[derive(Debug, Clone)]
pub struct AccountHandle {
    client: Client,
    specs: Arc<SpecMultiplexer>,
    dispatcher: Arc<Dispatcher>,
}

impl AccountHandle {
    pub fn new(client: Client, store: Arc<dyn Store>) -> Self {
        let specs = Arc::new(SpecMultiplexer::new(client.user_id(), store));
        Self {
            client,
            specs,
            dispatcher: Arc::new(Dispatcher::new()),
        }
    }

    pub fn user_id(&self) -> &str {
        self.client.user_id()
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn specs(&self) -> &Arc<SpecMultiplexer> {
        &self.specs
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Creates the restricted view handed to the plugin `owner`.
    pub fn proxy(&self, owner: impl Into<Arc<str>>) -> AccountProxy {
        AccountProxy::new(owner, self.clone())
    }

    /// Matches `event` against the current composite and dispatches it.
    pub async fn dispatch(&self, event: Arc<Event>) -> DispatchOutcome {
        let composite = self.specs.composite().await;
        let matches = match_composite(&composite, &event);
        self.dispatcher
            .dispatch(event, self.client.clone(), matches)
            .await
    }

    /// Unhooks everything `owner` registered and drops its spec from the
    /// composite.
    pub async fn remove_owner(&self, owner: &str) {
        self.dispatcher.remove_owner(owner);
        self.specs.remove(owner).await;
    }
}
