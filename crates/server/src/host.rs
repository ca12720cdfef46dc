//! Host runtime adapter.
//!
//! Owns the deployed worker versions and delivers install, activate, fetch and
//! message events to them. At most one version controls pages (the active
//! slot) and at most one installed version waits behind it. Lifecycle events
//! are serialized; fetches only take a read lock on the slots and may
//! interleave freely.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use waystation_client::{
    ActivateReport, EdgeWorker, InstallOutcome, MessageEffect, Origin, Source, WorkerConfig, WorkerState,
};
use waystation_core::{CacheRegistry, EdgeRequest, EdgeResponse, Error};

#[derive(Default)]
struct Slots {
    active: Option<Arc<EdgeWorker>>,
    waiting: Option<Arc<EdgeWorker>>,
}

/// Summary of one worker slot.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerSummary {
    pub version: String,
    pub cache_name: String,
    pub state: WorkerState,
    pub skip_waiting: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct HostStatus {
    pub active: Option<WorkerSummary>,
    pub waiting: Option<WorkerSummary>,
}

/// Outcome of registering a worker version.
#[derive(Debug, Clone, Serialize)]
pub struct RegisterReport {
    pub version: String,
    pub install: InstallOutcome,
    /// Present when the version went straight to controlling pages.
    pub activation: Option<ActivateReport>,
    pub installed_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageReport {
    /// Version the message was delivered to.
    pub version: String,
    pub effect: MessageEffect,
    pub activation: Option<ActivateReport>,
}

/// A response handed back to a page.
#[derive(Debug, Clone)]
pub struct HostResponse {
    pub response: EdgeResponse,
    pub source: Source,
    /// Version that intercepted the request, if any.
    pub controlled_by: Option<String>,
}

pub struct EdgeHost {
    template: WorkerConfig,
    registry: Arc<dyn CacheRegistry>,
    origin: Arc<dyn Origin>,
    slots: RwLock<Slots>,
    lifecycle: Mutex<()>,
}

impl EdgeHost {
    pub fn new(template: WorkerConfig, registry: Arc<dyn CacheRegistry>, origin: Arc<dyn Origin>) -> Self {
        Self { template, registry, origin, slots: RwLock::new(Slots::default()), lifecycle: Mutex::new(()) }
    }

    /// Deployment settings shared by every version.
    pub fn template(&self) -> &WorkerConfig {
        &self.template
    }

    /// Install a worker version and activate it when allowed.
    ///
    /// The version activates right away when it asked to skip waiting or when
    /// nothing controls pages yet. With `defer_activation` it waits behind the
    /// current controller until a page posts a skip-waiting message.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` for a blank or whitespace-bearing version.
    /// A failed install is returned and the version is discarded; the slots
    /// are left exactly as they were.
    pub async fn register(&self, version: &str, defer_activation: bool) -> Result<RegisterReport, Error> {
        if version.is_empty() || version.chars().any(char::is_whitespace) {
            return Err(Error::InvalidInput(format!("invalid worker version {version:?}")));
        }

        let _guard = self.lifecycle.lock().await;

        let worker = Arc::new(EdgeWorker::new(
            self.template.with_version(version),
            self.registry.clone(),
            self.origin.clone(),
        )?);
        let install = worker.on_install().await?;
        let installed_at = chrono::Utc::now().to_rfc3339();

        let uncontrolled = self.slots.read().await.active.is_none();
        let activation = if uncontrolled || (install.skip_waiting && !defer_activation) {
            Some(self.activate(worker).await?)
        } else {
            let mut slots = self.slots.write().await;
            if let Some(previous) = slots.waiting.replace(worker) {
                tracing::info!(version = %previous.version(), "waiting worker replaced by newer install");
                previous.retire().await;
            }
            tracing::info!(version = %version, "worker installed and waiting");
            None
        };

        Ok(RegisterReport { version: version.to_string(), install, activation, installed_at })
    }

    /// Run activation, then hand page control to the worker.
    ///
    /// The displaced controller and any other waiting version become
    /// redundant.
    async fn activate(&self, worker: Arc<EdgeWorker>) -> Result<ActivateReport, Error> {
        let report = worker.on_activate().await?;

        let mut slots = self.slots.write().await;
        if let Some(waiting) = slots.waiting.take()
            && !Arc::ptr_eq(&waiting, &worker)
        {
            tracing::info!(version = %waiting.version(), "waiting worker superseded by activation");
            waiting.retire().await;
        }
        if let Some(previous) = slots.active.replace(worker) {
            tracing::info!(previous = %previous.version(), "controller replaced");
            previous.retire().await;
        }
        Ok(report)
    }

    /// Deliver a page message to the waiting worker, or the active one.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidState` when no worker is registered.
    pub async fn post_message(&self, payload: &serde_json::Value) -> Result<MessageReport, Error> {
        let _guard = self.lifecycle.lock().await;

        let (worker, waiting) = {
            let slots = self.slots.read().await;
            match (&slots.waiting, &slots.active) {
                (Some(waiting), _) => (waiting.clone(), true),
                (None, Some(active)) => (active.clone(), false),
                (None, None) => return Err(Error::InvalidState("no worker registered".into())),
            }
        };

        let effect = worker.on_message(payload);
        let activation = if waiting && effect == MessageEffect::SkipWaiting {
            Some(self.activate(worker.clone()).await?)
        } else {
            None
        };

        Ok(MessageReport { version: worker.version().to_string(), effect, activation })
    }

    /// Route a page request through the controlling worker.
    ///
    /// # Errors
    ///
    /// Returns `Error::NetworkError` when the request was not intercepted and
    /// the origin could not be reached.
    pub async fn fetch(&self, request: &EdgeRequest) -> Result<HostResponse, Error> {
        let controller = self.slots.read().await.active.clone();

        if let Some(worker) = controller
            && let Some(interception) = worker.on_fetch(request).await
        {
            return Ok(HostResponse {
                source: interception.source(),
                response: interception.into_response(),
                controlled_by: Some(worker.version().to_string()),
            });
        }

        tracing::debug!(method = %request.method, url = %request.url, "passing request to origin");
        let response = self
            .origin
            .fetch(request)
            .await
            .map_err(|e| Error::NetworkError(format!("{}: {e}", request.url)))?;

        Ok(HostResponse { response, source: Source::Network, controlled_by: None })
    }

    pub async fn status(&self) -> HostStatus {
        let (active, waiting) = {
            let slots = self.slots.read().await;
            (slots.active.clone(), slots.waiting.clone())
        };
        HostStatus { active: summarize(active.as_deref()).await, waiting: summarize(waiting.as_deref()).await }
    }
}

async fn summarize(worker: Option<&EdgeWorker>) -> Option<WorkerSummary> {
    let worker = worker?;
    Some(WorkerSummary {
        version: worker.version().to_string(),
        cache_name: worker.cache_name().to_string(),
        state: worker.state().await,
        skip_waiting: worker.skip_waiting_requested(),
    })
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use http::StatusCode;
    use url::Url;
    use waystation_client::FetchError;
    use waystation_core::FallbackManifest;

    use super::*;

    pub(crate) const MAINTENANCE_HTML: &str = "<p>Back in five</p>";

    /// Origin with a fixed route table that can be switched off.
    #[derive(Default)]
    pub(crate) struct SiteOrigin {
        routes: HashMap<String, EdgeResponse>,
        offline: AtomicBool,
    }

    impl SiteOrigin {
        pub(crate) fn new() -> Self {
            let mut routes = HashMap::new();
            routes.insert("/maintenance.html".to_string(), EdgeResponse::new(StatusCode::OK, MAINTENANCE_HTML));
            routes.insert("/404.html".to_string(), EdgeResponse::new(StatusCode::OK, "<p>Nothing here</p>"));
            routes.insert("/".to_string(), EdgeResponse::new(StatusCode::OK, "<h1>Home</h1>"));
            Self { routes, offline: AtomicBool::new(false) }
        }

        pub(crate) fn set_offline(&self, offline: bool) {
            self.offline.store(offline, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl Origin for SiteOrigin {
        async fn fetch(&self, request: &EdgeRequest) -> Result<EdgeResponse, FetchError> {
            if self.offline.load(Ordering::SeqCst) {
                return Err(FetchError::Network("connection refused".into()));
            }
            Ok(self
                .routes
                .get(request.url.path())
                .cloned()
                .unwrap_or_else(|| EdgeResponse::new(StatusCode::NOT_FOUND, "missing")))
        }
    }

    pub(crate) fn template() -> WorkerConfig {
        WorkerConfig {
            cache_prefix: "waystation".into(),
            version: "v1".into(),
            manifest: FallbackManifest::default(),
            maintenance_path: "/maintenance.html".into(),
            origin: Url::parse("https://site.example/").unwrap(),
            max_entry_bytes: 64 * 1024,
        }
    }

    pub(crate) fn host(registry: Arc<dyn CacheRegistry>, origin: Arc<SiteOrigin>) -> EdgeHost {
        EdgeHost::new(template(), registry, origin)
    }
}
