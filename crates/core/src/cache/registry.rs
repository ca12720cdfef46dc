//! The cache store capability handed to the edge worker.

use async_trait::async_trait;

use super::hash::RequestKey;
use crate::{EdgeResponse, Error};

/// A registry of named cache instances.
///
/// Every method is a suspension point; implementations must be safe to share
/// between interleaved fetch interceptions.
#[async_trait]
pub trait CacheRegistry: Send + Sync {
    /// Open a cache instance, creating it if absent.
    async fn open(&self, name: &str) -> Result<(), Error>;

    /// Names of all cache instances, oldest first.
    async fn list(&self) -> Result<Vec<String>, Error>;

    /// Delete a cache instance and its entries. Returns false if it did not exist.
    async fn delete(&self, name: &str) -> Result<bool, Error>;

    /// Store a batch of entries in one instance, creating it if absent.
    ///
    /// Either every entry is stored or none is. Existing entries with the same
    /// key are replaced.
    async fn put_all(&self, name: &str, entries: Vec<(RequestKey, EdgeResponse)>) -> Result<(), Error>;

    /// Look up a request in a single instance.
    async fn match_in(&self, name: &str, key: &RequestKey) -> Result<Option<EdgeResponse>, Error>;

    /// Look up a request across every instance, oldest first.
    async fn match_any(&self, key: &RequestKey) -> Result<Option<EdgeResponse>, Error>;
}
