//! # Weft Runtime
//!
//! Hosts accounts and plugins:
//!
//! - **Configuration**: figment-layered [`WeftConfig`] (files, `WEFT_*`
//!   environment, programmatic merge)
//! - **Logging**: `tracing-subscriber` setup driven by that configuration
//! - **Sync loop**: one [`SyncProcessor`] per account, applying batches in
//!   order with anti-replay and panic containment
//! - **Orchestration**: [`WeftRuntime`] wires stores, transports and plugin
//!   instances together and drives their lifecycle
//!
//! ## Example
//!
//! ```rust,ignore
//! use weft_runtime::WeftRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = WeftRuntime::builder().config_file("weft.toml").build()?;
//!     runtime.register_plugin(my_plugin::DESCRIPTOR)?;
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```

pub mod account;
pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;
pub mod sync;

pub use account::Account;
pub use config::{ConfigError, ConfigLoader, ConfigResult, WeftConfig};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use runtime::{RuntimeBuilder, RuntimeStats, WeftRuntime};
pub use sync::{BatchReport, SyncError, SyncProcessor, SyncSettings, order_batch};

pub use tracing;

/// Logging macros for plugin code.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
