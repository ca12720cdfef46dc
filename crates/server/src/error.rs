//! Structured errors for the waystation server.
//!
//! Worker and cache failures arrive as `waystation_core::Error` and keep their
//! codes; this type adds the failures that only exist at the tool boundary.

use rmcp::model::{ErrorCode, ErrorData as McpError};

/// Errors raised while handling a tool call.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// A tool argument could not be turned into a request.
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// The result could not be rendered as JSON.
    #[error("OUTPUT_FAILED: {0}")]
    OutputFailed(String),

    #[error(transparent)]
    Core(#[from] waystation_core::Error),
}

impl From<ToolError> for McpError {
    fn from(err: ToolError) -> Self {
        let (code, message) = match err {
            ToolError::Core(inner) => return inner.into(),
            ToolError::InvalidInput(msg) => (-32602, msg),
            ToolError::OutputFailed(msg) => (-32000, msg),
        };

        McpError { code: ErrorCode(code), message: message.into(), data: None }
    }
}

/// Render a tool output as pretty JSON.
pub fn to_json<T: serde::Serialize>(output: &T) -> Result<String, ToolError> {
    serde_json::to_string_pretty(output).map_err(|e| ToolError::OutputFailed(e.to_string()))
}
