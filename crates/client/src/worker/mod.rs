//! Edge worker: the fallback layer between pages and the origin.
//!
//! One [`EdgeWorker`] exists per deployed version. The host drives it through
//! install, then activate, then routes every outgoing request of the pages it
//! controls through [`EdgeWorker::on_fetch`]. The worker holds no state beyond
//! its lifecycle position and the cache registry handle it was given.
//!
//! - [`lifecycle`]: install (populate the versioned cache from the fallback
//!   manifest), activate (drop stale versions, claim pages), messages
//! - [`intercept`]: the per-request decision
//! - [`maintenance`]: synthesized 503 responses

pub mod intercept;
pub mod lifecycle;
pub mod maintenance;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use url::Url;
use waystation_core::{AppConfig, CacheRegistry, Error, FallbackManifest, RequestKey};

use crate::fetch::Origin;

pub use intercept::{Interception, Source};
pub use lifecycle::{ActivateReport, InstallOutcome};

/// Everything a worker version needs to know at construction.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Namespace shared by all of this application's cache instances.
    pub cache_prefix: String,
    /// Version tag compiled into this worker.
    pub version: String,
    pub manifest: FallbackManifest,
    /// Path of the cached document used as the maintenance page body.
    pub maintenance_path: String,
    /// Base URL of the origin.
    pub origin: Url,
    /// Largest fallback body install will store.
    pub max_entry_bytes: usize,
}

impl WorkerConfig {
    pub fn from_app_config(config: &AppConfig) -> Result<Self, Error> {
        let origin = Url::parse(&config.origin_url).map_err(|e| Error::InvalidUrl(format!("origin_url: {e}")))?;
        Ok(Self {
            cache_prefix: config.cache_prefix.clone(),
            version: config.cache_version.clone(),
            manifest: FallbackManifest::new(config.fallbacks.iter().cloned())?,
            maintenance_path: config.maintenance_path.clone(),
            origin,
            max_entry_bytes: config.max_bytes,
        })
    }

    /// Same deployment, different version tag.
    pub fn with_version(&self, version: impl Into<String>) -> Self {
        Self { version: version.into(), ..self.clone() }
    }

    pub fn cache_name(&self) -> String {
        format!("{}-{}", self.cache_prefix, self.version)
    }

    /// Whether a cache instance belongs to this application's namespace.
    pub fn owns_cache(&self, name: &str) -> bool {
        name.contains(&self.cache_prefix)
    }
}

/// Lifecycle position of a worker version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
    /// Failed to install or replaced; never used again.
    Redundant,
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            WorkerState::Parsed => "parsed",
            WorkerState::Installing => "installing",
            WorkerState::Installed => "installed",
            WorkerState::Activating => "activating",
            WorkerState::Activated => "activated",
            WorkerState::Redundant => "redundant",
        };
        f.write_str(name)
    }
}

/// Typed payloads a page may post to the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorkerMessage {
    /// Activate the waiting version without waiting for pages to close.
    #[serde(rename = "skipWaiting")]
    SkipWaiting,
}

/// What the host should do after delivering a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageEffect {
    SkipWaiting,
    Ignored,
}

/// One deployed worker version.
pub struct EdgeWorker {
    config: WorkerConfig,
    cache_name: String,
    /// Manifest paths paired with their resolved origin URLs.
    fallbacks: Vec<(String, Url)>,
    maintenance_key: RequestKey,
    registry: Arc<dyn CacheRegistry>,
    origin: Arc<dyn Origin>,
    state: RwLock<WorkerState>,
    skip_waiting: AtomicBool,
}

impl EdgeWorker {
    /// Create a worker version in the `parsed` state.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidUrl` if a manifest or maintenance path cannot be
    /// resolved against the origin.
    pub fn new(config: WorkerConfig, registry: Arc<dyn CacheRegistry>, origin: Arc<dyn Origin>) -> Result<Self, Error> {
        let urls = config.manifest.resolve(&config.origin)?;
        let fallbacks = config.manifest.paths().iter().cloned().zip(urls).collect();

        let maintenance_url = config
            .origin
            .join(&config.maintenance_path)
            .map_err(|e| Error::InvalidUrl(format!("{}: {e}", config.maintenance_path)))?;

        Ok(Self {
            cache_name: config.cache_name(),
            fallbacks,
            maintenance_key: RequestKey::get(&maintenance_url),
            config,
            registry,
            origin,
            state: RwLock::new(WorkerState::Parsed),
            skip_waiting: AtomicBool::new(false),
        })
    }

    pub fn version(&self) -> &str {
        &self.config.version
    }

    pub fn cache_name(&self) -> &str {
        &self.cache_name
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub async fn state(&self) -> WorkerState {
        *self.state.read().await
    }

    /// Whether this version asked to activate without waiting.
    pub fn skip_waiting_requested(&self) -> bool {
        self.skip_waiting.load(Ordering::SeqCst)
    }

    /// Move from `expected` to `next`, or fail without changing state.
    async fn transition(&self, expected: WorkerState, next: WorkerState) -> Result<(), Error> {
        let mut state = self.state.write().await;
        if *state != expected {
            return Err(Error::InvalidState(format!(
                "worker {} cannot enter {next} from {}",
                self.config.version, *state
            )));
        }
        *state = next;
        Ok(())
    }

    async fn set_state(&self, next: WorkerState) {
        *self.state.write().await = next;
    }
}

impl std::fmt::Debug for EdgeWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EdgeWorker")
            .field("version", &self.config.version)
            .field("cache_name", &self.cache_name)
            .field("skip_waiting", &self.skip_waiting_requested())
            .finish()
    }
}
