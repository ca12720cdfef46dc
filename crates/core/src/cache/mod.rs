//! Versioned cache store for fallback responses.
//!
//! Cache instances are named per deployed worker version and hold
//! request → response entries. Two backends implement [`CacheRegistry`]:
//!
//! - [`CacheDb`]: SQLite with async access via tokio-rusqlite, WAL mode and
//!   automatic schema migrations
//! - [`MemoryRegistry`]: in-process maps, for tests and embedders

pub mod connection;
pub mod entries;
pub mod hash;
pub mod memory;
pub mod migrations;
pub mod registry;

pub use crate::Error;

pub use connection::CacheDb;
pub use entries::CacheSummary;
pub use hash::RequestKey;
pub use memory::MemoryRegistry;
pub use registry::CacheRegistry;
