//! HTTP transport over the client-server API.

mod client;

pub use client::{HttpTransport, HttpTransportFactory};
