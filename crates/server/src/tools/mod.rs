//! MCP tool implementations.
//!
//! This module contains all tools exposed by the waystation server.

pub mod cache;
pub mod edge_fetch;
pub mod worker;

pub use edge_fetch::{EdgeFetchParams, edge_fetch_impl};
pub use worker::{WorkerInstallParams, WorkerMessageParams, install_impl, message_impl, status_impl};
