//! A running account: its record plus the per-account services.

use std::sync::Arc;

use tracing::{info, warn};
use weft_core::event::types;
use weft_core::{AccountRecord, BoxedTransport, Client, Membership, Store, StoreResult};
use weft_framework::{AccountHandle, EventContext, Propagation};

/// Owner id of listeners the host registers for itself.
pub const AUTOJOIN_OWNER: &str = "weft.autojoin";

/// One account as seen by the runtime.
#[derive(Debug, Clone)]
pub struct Account {
    record: AccountRecord,
    handle: AccountHandle,
}

impl Account {
    /// Connects the account's services and installs its persisted specs.
    pub async fn new(
        record: AccountRecord,
        transport: BoxedTransport,
        store: Arc<dyn Store>,
    ) -> StoreResult<Self> {
        let client = Client::new(record.user_id.as_str(), transport);
        let handle = AccountHandle::new(client, Arc::clone(&store));

        let specs = store.command_specs(&record.user_id).await?;
        let owners = specs.len();
        handle.specs().load(specs).await;
        if owners > 0 {
            let merged = handle.specs().merged().await;
            info!(
                account = %record.user_id,
                owners,
                commands = merged.commands.len(),
                passive = merged.passive_commands.len(),
                "Loaded persisted command specs"
            );
        }

        let account = Self { record, handle };
        if account.record.autojoin {
            account.install_autojoin();
        }
        Ok(account)
    }

    /// Joins every room this account is invited to.
    ///
    /// Registered straight on the dispatcher: the invite's sender is never
    /// the account itself, so the own-sender filter does not apply. An own
    /// invite ends the `m.room.member` chain whether or not the join worked.
    fn install_autojoin(&self) {
        let client = self.handle.client().clone();
        self.handle.dispatcher().add_listener(
            AUTOJOIN_OWNER,
            types::ROOM_MEMBER,
            move |ctx: EventContext| {
                let client = client.clone();
                async move {
                    let event = ctx.event();
                    if !event.is_membership_of(client.user_id(), Membership::Invite) {
                        return Propagation::Continue;
                    }
                    match client.join_room(&event.room_id).await {
                        Ok(room_id) => {
                            info!(account = %client.user_id(), %room_id, "Joined room on invite");
                        }
                        Err(e) => {
                            warn!(
                                account = %client.user_id(),
                                room_id = %event.room_id,
                                error = %e,
                                "Auto-join failed"
                            );
                        }
                    }
                    Propagation::Stop
                }
            },
        );
    }

    pub fn user_id(&self) -> &str {
        &self.record.user_id
    }

    pub fn record(&self) -> &AccountRecord {
        &self.record
    }

    pub fn handle(&self) -> &AccountHandle {
        &self.handle
    }

    pub fn client(&self) -> &Client {
        self.handle.client()
    }
}
