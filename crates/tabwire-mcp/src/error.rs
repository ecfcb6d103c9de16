use thiserror::Error;

use crate::protocol::JsonRpcError;

#[derive(Debug, Error)]
pub enum McpError {
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<McpError> for JsonRpcError {
    fn from(err: McpError) -> Self {
        let code = match &err {
            McpError::MethodNotFound(_) => JsonRpcError::METHOD_NOT_FOUND,
            McpError::InvalidParams(_) => JsonRpcError::INVALID_PARAMS,
            McpError::Internal(_) | McpError::Io(_) | McpError::Json(_) => {
                JsonRpcError::INTERNAL_ERROR
            }
        };
        JsonRpcError::new(code, err.to_string())
    }
}
