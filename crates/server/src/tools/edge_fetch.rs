//! edge_fetch tool implementation.
//!
//! Issues a request as a controlled page would and reports which layer
//! answered it.

use std::collections::BTreeMap;

use http::Method;
use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use waystation_client::{Source, fetch::resolve};
use waystation_core::{EdgeRequest, Error, RequestMode};

use crate::error::{ToolError, to_json};
use crate::host::EdgeHost;

/// Parameters for the edge_fetch tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct EdgeFetchParams {
    /// Absolute URL, or a path such as `/about` resolved against the origin.
    pub url: String,

    /// HTTP method (default: GET).
    #[serde(default)]
    pub method: Option<String>,

    /// Accept header. `text/html` marks the request as a navigation.
    #[serde(default)]
    pub accept: Option<String>,

    /// Request mode (default: cors).
    #[serde(default)]
    pub mode: Option<RequestMode>,

    /// Extra request headers.
    #[serde(default)]
    pub headers: Option<BTreeMap<String, String>>,
}

/// Output from the edge_fetch tool.
#[derive(Debug, Clone, Serialize)]
pub struct EdgeFetchOutput {
    pub url: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
    /// Which layer produced the response.
    pub source: Source,
    /// Version that intercepted the request, if any.
    pub controlled_by: Option<String>,
}

pub(crate) fn build_request(host: &EdgeHost, params: EdgeFetchParams) -> Result<EdgeRequest, ToolError> {
    if params.url.trim().is_empty() {
        return Err(ToolError::InvalidInput("url cannot be empty".into()));
    }

    let url = resolve(&host.template().origin, &params.url).map_err(|e| Error::InvalidUrl(e.to_string()))?;

    let method = match params.method.as_deref() {
        Some(m) => Method::from_bytes(m.trim().to_ascii_uppercase().as_bytes())
            .map_err(|_| ToolError::InvalidInput(format!("unsupported method: {m}")))?,
        None => Method::GET,
    };

    let mut request = EdgeRequest::get(url).with_method(method).with_mode(params.mode.unwrap_or_default());
    if let Some(accept) = params.accept {
        request = request.with_header("accept", &accept)?;
    }
    for (name, value) in params.headers.unwrap_or_default() {
        request = request.with_header(&name, &value)?;
    }
    Ok(request)
}

pub(crate) async fn edge_fetch(host: &EdgeHost, params: EdgeFetchParams) -> Result<EdgeFetchOutput, ToolError> {
    let request = build_request(host, params)?;
    let result = host.fetch(&request).await?;

    Ok(EdgeFetchOutput {
        url: request.url.to_string(),
        status: result.response.status.as_u16(),
        headers: result
            .response
            .headers
            .iter()
            .map(|(name, value)| (name.to_string(), String::from_utf8_lossy(value.as_bytes()).into_owned()))
            .collect(),
        body: result.response.body_text(),
        source: result.source,
        controlled_by: result.controlled_by,
    })
}

/// Implementation of the edge_fetch tool.
pub async fn edge_fetch_impl(host: &EdgeHost, params: EdgeFetchParams) -> Result<CallToolResult, McpError> {
    let output = edge_fetch(host, params).await?;
    Ok(CallToolResult::success(vec![Content::text(to_json(&output)?)]))
}
