//! # Weft Transport
//!
//! Homeserver transport implementations for the Weft bot host.
//!
//! This crate provides concrete implementations of the
//! [`Transport`](weft_core::Transport) trait defined in `weft-core`, gated
//! behind feature flags.
//!
//! ## Features
//!
//! - `http-client`: client-server API over HTTP ([`HttpTransport`])
//! - `full`: all transports
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │  weft-runtime       │  (sync loop, plugin host)
//! ├─────────────────────┤
//! │  weft-core          │  (Transport trait)
//! ├─────────────────────┤
//! │  weft-transport     │  <- This crate (implementations)
//! ├─────────────────────┤
//! │  Network (HTTP)     │
//! └─────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use weft_transport::HttpTransport;
//! use weft_core::Transport;
//!
//! let transport = HttpTransport::new("https://matrix.example.org", "syt_token")?;
//! let me = transport.whoami().await?;
//! ```

#[cfg(feature = "http-client")]
pub mod http;

#[cfg(feature = "http-client")]
pub use http::{HttpTransport, HttpTransportFactory};
