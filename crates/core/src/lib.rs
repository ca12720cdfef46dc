//! Core types and shared functionality for waystation.
//!
//! This crate provides:
//! - Request/response types exchanged between pages, the edge worker and the origin
//! - Versioned cache store with SQLite and in-memory backends
//! - The fallback manifest
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;
pub mod exchange;
pub mod manifest;

pub use cache::{CacheDb, CacheRegistry, MemoryRegistry, RequestKey};
pub use config::AppConfig;
pub use error::Error;
pub use exchange::{EdgeRequest, EdgeResponse, RequestMode};
pub use manifest::FallbackManifest;
