//! In-memory cache registry.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::hash::RequestKey;
use super::registry::CacheRegistry;
use crate::{EdgeResponse, Error};

/// Cache instances kept in process memory, in creation order.
///
/// Uses a tokio RwLock so lookups from interleaved interceptions can share it.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    caches: RwLock<Vec<(String, HashMap<RequestKey, EdgeResponse>)>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries in an instance, or `None` if it does not exist.
    pub async fn entry_count(&self, name: &str) -> Option<usize> {
        let caches = self.caches.read().await;
        caches.iter().find(|(n, _)| n == name).map(|(_, entries)| entries.len())
    }
}

#[async_trait]
impl CacheRegistry for MemoryRegistry {
    async fn open(&self, name: &str) -> Result<(), Error> {
        let mut caches = self.caches.write().await;
        if !caches.iter().any(|(n, _)| n == name) {
            caches.push((name.to_string(), HashMap::new()));
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>, Error> {
        let caches = self.caches.read().await;
        Ok(caches.iter().map(|(name, _)| name.clone()).collect())
    }

    async fn delete(&self, name: &str) -> Result<bool, Error> {
        let mut caches = self.caches.write().await;
        let before = caches.len();
        caches.retain(|(n, _)| n != name);
        Ok(caches.len() != before)
    }

    async fn put_all(&self, name: &str, entries: Vec<(RequestKey, EdgeResponse)>) -> Result<(), Error> {
        let mut caches = self.caches.write().await;
        let index = match caches.iter().position(|(n, _)| n == name) {
            Some(index) => index,
            None => {
                caches.push((name.to_string(), HashMap::new()));
                caches.len() - 1
            }
        };
        caches[index].1.extend(entries);
        Ok(())
    }

    async fn match_in(&self, name: &str, key: &RequestKey) -> Result<Option<EdgeResponse>, Error> {
        let caches = self.caches.read().await;
        Ok(caches
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, entries)| entries.get(key).cloned()))
    }

    async fn match_any(&self, key: &RequestKey) -> Result<Option<EdgeResponse>, Error> {
        let caches = self.caches.read().await;
        Ok(caches.iter().find_map(|(_, entries)| entries.get(key).cloned()))
    }
}
