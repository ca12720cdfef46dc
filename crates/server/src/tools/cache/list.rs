//! cache_list tool implementation.
//!
//! Lists cache instances in creation order with their entry keys.

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use serde::Serialize;
use waystation_core::CacheDb;
use waystation_core::cache::CacheSummary;

use crate::error::{ToolError, to_json};

#[derive(Debug, Clone, Serialize)]
pub struct CacheListing {
    #[serde(flatten)]
    pub summary: CacheSummary,
    /// `METHOD url` of every entry.
    pub keys: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheListOutput {
    pub caches: Vec<CacheListing>,
}

pub(crate) async fn list_caches(db: &CacheDb) -> Result<CacheListOutput, ToolError> {
    let mut caches = Vec::new();
    for summary in db.cache_summaries().await? {
        let keys = db.entry_keys(&summary.name).await?;
        caches.push(CacheListing { summary, keys });
    }
    Ok(CacheListOutput { caches })
}

/// Implementation of the cache_list tool.
pub async fn list_impl(db: &CacheDb) -> Result<CallToolResult, McpError> {
    let output = list_caches(db).await?;
    Ok(CallToolResult::success(vec![Content::text(to_json(&output)?)]))
}
