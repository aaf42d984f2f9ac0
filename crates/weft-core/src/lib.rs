//! # Weft Core
//!
//! Shared data model and collaborator traits of the Weft bot host.
//!
//! ## Contents
//!
//! - **Events**: typed event model with raw-JSON fallback ([`Event`], [`EventContent`])
//! - **Command specs**: the declarative command language plugins speak ([`CommandSpec`])
//! - **Sync batches**: shape of one incremental feed response ([`SyncBatch`])
//! - **Collaborators**: [`Transport`], [`Store`] and [`RoomStateStore`], with
//!   in-memory defaults for the two stores
//! - **Client**: the outbound send/query surface of one account ([`Client`])
//!
//! ## Layering
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────────┐     ┌────────────────┐
//! │  weft-runtime   │────▶│  weft-framework  │────▶│   weft-core    │
//! │ (sync, config)  │     │ (commands, disp.)│     │ (model, traits)│
//! └─────────────────┘     └──────────────────┘     └────────────────┘
//! ```

pub mod client;
pub mod error;
pub mod event;
pub mod json;
pub mod spec;
pub mod state;
pub mod store;
pub mod sync;
pub mod transport;

pub use client::Client;
pub use error::{StoreError, StoreResult, TransportError, TransportResult};
pub use event::{Event, EventContent, MemberContent, Membership, MessageContent, Unsigned};
pub use spec::{Argument, Command, CommandSpec, PassiveCommand};
pub use state::{MemoryRoomStateStore, RoomState, RoomStateStore};
pub use store::{AccountRecord, CommandSpecRecord, MemoryStore, PluginRecord, Store};
pub use sync::{InvitedRoom, JoinedRoom, LeftRoom, Rooms, SyncBatch, Timeline};
pub use transport::{BoxedTransport, Transport, TransportFactory};

/// Prelude for common imports.
pub mod prelude {
    pub use super::event::types;
    pub use super::{
        Argument, Client, Command, CommandSpec, Event, EventContent, Membership, PassiveCommand,
        Transport, TransportError, TransportResult,
    };
}
