//! Worker lifecycle tools: worker_install, worker_message, worker_status.

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::to_json;
use crate::host::EdgeHost;

/// Parameters for the worker_install tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WorkerInstallParams {
    /// Version tag; the cache instance is named `<prefix>-<version>`.
    pub version: String,

    /// Keep the new version waiting behind the current controller until a
    /// page posts `{"type": "skipWaiting"}`.
    #[serde(default)]
    pub defer_activation: bool,
}

/// Parameters for the worker_message tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WorkerMessageParams {
    /// Message body as a page would post it.
    #[serde(default)]
    pub payload: serde_json::Value,
}

pub async fn install_impl(host: &EdgeHost, params: WorkerInstallParams) -> Result<CallToolResult, McpError> {
    let report = host.register(params.version.trim(), params.defer_activation).await?;
    Ok(CallToolResult::success(vec![Content::text(to_json(&report)?)]))
}

pub async fn message_impl(host: &EdgeHost, params: WorkerMessageParams) -> Result<CallToolResult, McpError> {
    let report = host.post_message(&params.payload).await?;
    Ok(CallToolResult::success(vec![Content::text(to_json(&report)?)]))
}

pub async fn status_impl(host: &EdgeHost) -> Result<CallToolResult, McpError> {
    let status = host.status().await;
    Ok(CallToolResult::success(vec![Content::text(to_json(&status)?)]))
}
