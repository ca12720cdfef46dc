//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the edge host and the cache store.
use std::sync::Arc;

use crate::host::EdgeHost;
use crate::tools::{
    EdgeFetchParams, WorkerInstallParams, WorkerMessageParams, cache::list_impl, edge_fetch_impl, install_impl,
    message_impl, status_impl,
};

use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};
use waystation_core::CacheDb;

/// The main MCP server handler for waystation.
#[derive(Clone)]
pub struct EdgeServer {
    host: Arc<EdgeHost>,
    db: CacheDb,
    tool_router: ToolRouter<Self>,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl EdgeServer {
    /// Create a new server handler.
    pub fn new(host: Arc<EdgeHost>, db: CacheDb) -> Self {
        Self { host, db, tool_router: Self::tool_router() }
    }

    /// Issue a request through the edge.
    ///
    /// The controlling worker decides between the origin response, the
    /// maintenance page, a cached copy and the offline marker.
    #[tool(
        description = "Fetch a URL or origin path as a controlled page would. Returns status, headers, body and which layer (network, maintenance, cache, offline) answered."
    )]
    async fn edge_fetch(&self, params: Parameters<EdgeFetchParams>) -> Result<CallToolResult, McpError> {
        edge_fetch_impl(&self.host, params.0).await
    }

    #[tool(
        description = "Install a worker version: cache every fallback document, then activate it (or leave it waiting with defer_activation)."
    )]
    async fn worker_install(&self, params: Parameters<WorkerInstallParams>) -> Result<CallToolResult, McpError> {
        install_impl(&self.host, params.0).await
    }

    #[tool(
        description = "Post a page message to the waiting worker, or the active one. {\"type\": \"skipWaiting\"} activates a waiting version."
    )]
    async fn worker_message(&self, params: Parameters<WorkerMessageParams>) -> Result<CallToolResult, McpError> {
        message_impl(&self.host, params.0).await
    }

    #[tool(description = "Show the active and waiting worker versions and their lifecycle states.")]
    async fn worker_status(&self) -> Result<CallToolResult, McpError> {
        status_impl(&self.host).await
    }

    #[tool(description = "List cache instances in creation order with entry counts and stored request keys.")]
    async fn cache_list(&self) -> Result<CallToolResult, McpError> {
        list_impl(&self.db).await
    }
}

impl ServerHandler for EdgeServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "waystation".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}

#[cfg(test)]
mod tests {
    use waystation_core::MemoryRegistry;

    use super::*;
    use crate::host::testing::{SiteOrigin, host};

    #[tokio::test]
    async fn test_router_exposes_every_tool() {
        let host = Arc::new(host(Arc::new(MemoryRegistry::new()), Arc::new(SiteOrigin::new())));
        let server = EdgeServer::new(host, CacheDb::open_in_memory().await.unwrap());

        let mut names: Vec<String> = server.tool_router.list_all().into_iter().map(|t| t.name.to_string()).collect();
        names.sort();
        assert_eq!(names, vec!["cache_list", "edge_fetch", "worker_install", "worker_message", "worker_status"]);
    }

    #[tokio::test]
    async fn test_server_info() {
        let host = Arc::new(host(Arc::new(MemoryRegistry::new()), Arc::new(SiteOrigin::new())));
        let server = EdgeServer::new(host, CacheDb::open_in_memory().await.unwrap());
        assert_eq!(server.get_info().server_info.name, "waystation");
    }
}
