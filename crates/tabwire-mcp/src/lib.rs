//! MCP server for tabwire.
//!
//! Speaks newline-delimited JSON-RPC 2.0 over any async reader/writer pair
//! (stdio in production) and routes `tools/call` into the tool registry.

pub mod error;
pub mod protocol;
pub mod server;

pub use error::McpError;
pub use server::{serve_stdio, McpServer};
