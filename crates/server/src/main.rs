//! waystation server entry point.
//!
//! Boots the edge host, installs the configured worker version and serves the
//! MCP tools on stdio transport.
//! Logging goes to stderr to avoid interfering with the JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::{Context, Result};
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use tracing_subscriber::EnvFilter;
use waystation_client::{FetchClient, FetchConfig, WorkerConfig};
use waystation_core::{AppConfig, CacheDb};

mod error;
mod handler;
mod host;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load().context("loading configuration")?;
    tracing::info!(origin = %config.origin_url, cache = %config.cache_name(), "starting waystation on stdio transport");

    let db = CacheDb::open(&config.db_path)
        .await
        .with_context(|| format!("opening cache store at {}", config.db_path.display()))?;
    let origin = FetchClient::new(FetchConfig::from(&config))?;
    let template = WorkerConfig::from_app_config(&config)?;

    let host = Arc::new(host::EdgeHost::new(template, Arc::new(db.clone()), Arc::new(origin)));
    match host.register(&config.cache_version, false).await {
        Ok(report) => tracing::info!(version = %report.version, stored = report.install.stored, "worker registered"),
        Err(err) => tracing::warn!(error = %err, "initial install failed; serving uncontrolled"),
    }

    let handler = handler::EdgeServer::new(host, db);
    let transport = stdio();
    let server = serve_server(handler, transport).await?;

    server.waiting().await?;

    Ok(())
}
