//! Core types for tabwire: error taxonomy, extension wire protocol, and config.

pub mod config;
pub mod error;
pub mod protocol;

pub use error::{BridgeError, FieldViolation, PortError, TabwireError, ToolError};
