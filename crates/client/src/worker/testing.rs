//! Test doubles for the origin and the cache registry.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, HeaderValue};
use url::Url;
use waystation_core::{CacheRegistry, EdgeRequest, EdgeResponse, Error, FallbackManifest, MemoryRegistry, RequestKey};

use super::WorkerConfig;
use crate::fetch::{FetchError, Origin};

pub(crate) const MAINTENANCE_HTML: &str = "<html><body>Scheduled maintenance</body></html>";
pub(crate) const NOT_FOUND_HTML: &str = "<html><body>Not found</body></html>";

pub(crate) fn origin_url() -> Url {
    Url::parse("https://site.example/").unwrap()
}

pub(crate) fn worker_config(version: &str) -> WorkerConfig {
    WorkerConfig {
        cache_prefix: "waystation".into(),
        version: version.into(),
        manifest: FallbackManifest::default(),
        maintenance_path: "/maintenance.html".into(),
        origin: origin_url(),
        max_entry_bytes: 64 * 1024,
    }
}

pub(crate) fn html(status: StatusCode, body: &str) -> EdgeResponse {
    EdgeResponse::new(status, body.to_string())
        .with_header(CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8"))
}

/// Origin serving a fixed set of paths; anything else is a 404.
#[derive(Default)]
pub(crate) struct StubOrigin {
    routes: HashMap<String, EdgeResponse>,
    offline: AtomicBool,
    calls: AtomicUsize,
}

impl StubOrigin {
    /// Serves both default fallback documents.
    pub(crate) fn site() -> Self {
        Self::default()
            .route("/maintenance.html", html(StatusCode::OK, MAINTENANCE_HTML))
            .route("/404.html", html(StatusCode::OK, NOT_FOUND_HTML))
    }

    pub(crate) fn route(mut self, path: &str, response: EdgeResponse) -> Self {
        self.routes.insert(path.to_string(), response);
        self
    }

    pub(crate) fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Origin for StubOrigin {
    async fn fetch(&self, request: &EdgeRequest) -> Result<EdgeResponse, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(FetchError::Network("dns error: no such host".into()));
        }
        Ok(self
            .routes
            .get(request.url.path())
            .cloned()
            .unwrap_or_else(|| html(StatusCode::NOT_FOUND, "<h1>404</h1>")))
    }
}

/// Memory registry that counts calls and can be told to fail.
#[derive(Default)]
pub(crate) struct FlakyRegistry {
    pub(crate) inner: MemoryRegistry,
    failing_deletes: HashSet<String>,
    failing_reads: AtomicBool,
    calls: AtomicUsize,
}

impl FlakyRegistry {
    pub(crate) fn fail_delete(mut self, name: &str) -> Self {
        self.failing_deletes.insert(name.to_string());
        self
    }

    pub(crate) fn set_failing_reads(&self, failing: bool) {
        self.failing_reads.store(failing, Ordering::SeqCst);
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn record(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    fn check_read(&self) -> Result<(), Error> {
        if self.failing_reads.load(Ordering::SeqCst) {
            return Err(Error::CorruptEntry("simulated read failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl CacheRegistry for FlakyRegistry {
    async fn open(&self, name: &str) -> Result<(), Error> {
        self.record();
        self.inner.open(name).await
    }

    async fn list(&self) -> Result<Vec<String>, Error> {
        self.record();
        self.inner.list().await
    }

    async fn delete(&self, name: &str) -> Result<bool, Error> {
        self.record();
        if self.failing_deletes.contains(name) {
            return Err(Error::CorruptEntry(format!("simulated delete failure for {name}")));
        }
        self.inner.delete(name).await
    }

    async fn put_all(&self, name: &str, entries: Vec<(RequestKey, EdgeResponse)>) -> Result<(), Error> {
        self.record();
        self.inner.put_all(name, entries).await
    }

    async fn match_in(&self, name: &str, key: &RequestKey) -> Result<Option<EdgeResponse>, Error> {
        self.record();
        self.check_read()?;
        self.inner.match_in(name, key).await
    }

    async fn match_any(&self, key: &RequestKey) -> Result<Option<EdgeResponse>, Error> {
        self.record();
        self.check_read()?;
        self.inner.match_any(key).await
    }
}
