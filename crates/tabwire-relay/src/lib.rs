//! Relay between tool handlers and the browser extension.
//!
//! The extension dials in over WebSocket; [`bridge::SocketBridge`] turns that
//! single connection into concurrent correlated request/response calls.
//! [`port`] clears the listening port before the relay binds it.

pub mod bridge;
pub mod connection;
pub mod metrics;
pub mod port;
pub mod server;

pub use bridge::{BridgeSettings, ConnectPolicy, SendOptions, SocketBridge};
pub use port::{ensure_port_free, platform_port_guard, PortGuard, ReclaimReport};
pub use server::{bind_relay, relay_router, start_relay};
