//! Per-request fallback decision.

use reqwest::Method;
use serde::Serialize;
use waystation_core::{EdgeRequest, EdgeResponse, RequestKey};

use super::maintenance::{maintenance_response, offline_response};
use super::{EdgeWorker, WorkerState};

/// The response chosen for an intercepted request, tagged with where it came from.
#[derive(Debug, Clone, PartialEq)]
pub enum Interception {
    /// The origin's response, unmodified.
    Network(EdgeResponse),
    /// Synthesized 503 for a failed navigation.
    Maintenance(EdgeResponse),
    /// A stored copy of the asset.
    Cached(EdgeResponse),
    /// 503 `Offline` for an asset with no network and no cached copy.
    Offline(EdgeResponse),
}

/// Short label for logs and tool output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Network,
    Maintenance,
    Cache,
    Offline,
}

impl Interception {
    pub fn source(&self) -> Source {
        match self {
            Interception::Network(_) => Source::Network,
            Interception::Maintenance(_) => Source::Maintenance,
            Interception::Cached(_) => Source::Cache,
            Interception::Offline(_) => Source::Offline,
        }
    }

    pub fn response(&self) -> &EdgeResponse {
        match self {
            Interception::Network(r) | Interception::Maintenance(r) | Interception::Cached(r) | Interception::Offline(r) => r,
        }
    }

    pub fn into_response(self) -> EdgeResponse {
        match self {
            Interception::Network(r) | Interception::Maintenance(r) | Interception::Cached(r) | Interception::Offline(r) => r,
        }
    }
}

impl EdgeWorker {
    /// Decide the response for an outgoing request.
    ///
    /// Returns `None` when the request is not intercepted: any method other
    /// than `GET`, or a worker that is not active. The host then sends the
    /// request to the origin itself, untouched.
    ///
    /// For intercepted requests exactly one network attempt is made:
    /// - a navigation answered with 404 or 5xx gets the maintenance page
    /// - any other answer is returned unmodified
    /// - a navigation with no answer gets the maintenance page
    /// - an asset with no answer is served from any cache, else `Offline`
    pub async fn on_fetch(&self, request: &EdgeRequest) -> Option<Interception> {
        if request.method != Method::GET {
            tracing::debug!(method = %request.method, url = %request.url, "not intercepting non-GET request");
            return None;
        }

        if *self.state.read().await != WorkerState::Activated {
            tracing::debug!(version = %self.config.version, url = %request.url, "worker not active; not intercepting");
            return None;
        }

        let interception = self.intercept(request).await;
        tracing::debug!(
            url = %request.url,
            status = interception.response().status.as_u16(),
            source = ?interception.source(),
            "request intercepted"
        );
        Some(interception)
    }

    async fn intercept(&self, request: &EdgeRequest) -> Interception {
        let navigation = request.is_navigation();

        match self.origin.fetch(request).await {
            Ok(response) if navigation && response.is_error_status() => {
                tracing::info!(url = %request.url, status = response.status.as_u16(), "origin error on navigation");
                Interception::Maintenance(self.maintenance().await)
            }
            Ok(response) => Interception::Network(response),
            Err(err) if navigation => {
                tracing::warn!(url = %request.url, error = %err, "origin unreachable on navigation");
                Interception::Maintenance(self.maintenance().await)
            }
            Err(err) => {
                tracing::warn!(url = %request.url, error = %err, "origin unreachable for asset");
                let key = RequestKey::new(&request.method, &request.url);
                match self.registry.match_any(&key).await {
                    Ok(Some(cached)) => Interception::Cached(cached),
                    Ok(None) => Interception::Offline(offline_response()),
                    Err(err) => {
                        tracing::warn!(key = %key, error = %err, "cache lookup failed; treating as miss");
                        Interception::Offline(offline_response())
                    }
                }
            }
        }
    }

    async fn maintenance(&self) -> EdgeResponse {
        maintenance_response(self.registry.as_ref(), &self.cache_name, &self.maintenance_key).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use reqwest::StatusCode;
    use reqwest::header::RETRY_AFTER;
    use url::Url;
    use waystation_core::{CacheRegistry, MemoryRegistry, RequestMode};

    use super::*;
    use crate::worker::maintenance::INLINE_MAINTENANCE_HTML;
    use crate::worker::testing::{FlakyRegistry, MAINTENANCE_HTML, StubOrigin, html, origin_url, worker_config};

    fn url(path: &str) -> Url {
        origin_url().join(path).unwrap()
    }

    fn png(body: &str) -> EdgeResponse {
        EdgeResponse::new(StatusCode::OK, body.to_string())
    }

    async fn active_worker(registry: Arc<dyn CacheRegistry>, origin: Arc<StubOrigin>) -> EdgeWorker {
        let worker = EdgeWorker::new(worker_config("v1"), registry, origin).unwrap();
        worker.on_install().await.unwrap();
        worker.on_activate().await.unwrap();
        worker
    }

    fn page(path: &str) -> EdgeRequest {
        EdgeRequest::get(url(path)).with_header("accept", "text/html").unwrap()
    }

    fn image(path: &str) -> EdgeRequest {
        EdgeRequest::get(url(path)).with_header("accept", "image/png").unwrap()
    }

    #[tokio::test]
    async fn test_navigation_404_becomes_maintenance() {
        let worker = active_worker(Arc::new(MemoryRegistry::new()), Arc::new(StubOrigin::site())).await;

        let result = worker.on_fetch(&page("/any-page")).await.unwrap();
        assert_eq!(result.source(), Source::Maintenance);

        let response = result.into_response();
        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.header(RETRY_AFTER), Some("3600"));
        assert_eq!(response.body_text(), MAINTENANCE_HTML);
    }

    #[tokio::test]
    async fn test_navigate_mode_500_becomes_maintenance() {
        let origin = StubOrigin::site().route("/dashboard", html(StatusCode::INTERNAL_SERVER_ERROR, "boom"));
        let worker = active_worker(Arc::new(MemoryRegistry::new()), Arc::new(origin)).await;

        let result = worker.on_fetch(&EdgeRequest::navigate(url("/dashboard"))).await.unwrap();
        assert_eq!(result.source(), Source::Maintenance);
        assert_eq!(result.response().body_text(), MAINTENANCE_HTML);
    }

    #[tokio::test]
    async fn test_navigation_offline_becomes_maintenance() {
        let origin = Arc::new(StubOrigin::site());
        let worker = active_worker(Arc::new(MemoryRegistry::new()), origin.clone()).await;
        origin.set_offline(true);

        let result = worker.on_fetch(&EdgeRequest::navigate(url("/any-page"))).await.unwrap();
        let response = result.into_response();
        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.header(RETRY_AFTER), Some("3600"));
        assert_eq!(response.body_text(), MAINTENANCE_HTML);
    }

    #[tokio::test]
    async fn test_navigation_success_passes_through() {
        let origin = StubOrigin::site().route("/", html(StatusCode::OK, "<h1>home</h1>"));
        let worker = active_worker(Arc::new(MemoryRegistry::new()), Arc::new(origin)).await;

        let result = worker.on_fetch(&EdgeRequest::navigate(url("/"))).await.unwrap();
        assert_eq!(result, Interception::Network(html(StatusCode::OK, "<h1>home</h1>")));
    }

    #[tokio::test]
    async fn test_asset_error_status_passes_through() {
        let broken = EdgeResponse::new(StatusCode::INTERNAL_SERVER_ERROR, "upstream exploded");
        let origin = StubOrigin::site().route("/logo.png", broken.clone());
        let worker = active_worker(Arc::new(MemoryRegistry::new()), Arc::new(origin)).await;

        let result = worker.on_fetch(&image("/logo.png")).await.unwrap();
        assert_eq!(result, Interception::Network(broken));
    }

    #[tokio::test]
    async fn test_asset_404_passes_through_even_if_cached() {
        let registry = Arc::new(MemoryRegistry::new());
        let worker = active_worker(registry.clone(), Arc::new(StubOrigin::site())).await;
        registry
            .put_all("legacy", vec![(RequestKey::get(&url("/logo.png")), png("stale"))])
            .await
            .unwrap();

        let result = worker.on_fetch(&image("/logo.png")).await.unwrap();
        assert_eq!(result.source(), Source::Network);
        assert_eq!(result.response().status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_large_responses_pass_through() {
        let bundle = EdgeResponse::new(StatusCode::OK, vec![b'x'; 4 * 1024 * 1024]);
        let page = html(StatusCode::OK, &"<p>long</p>".repeat(100_000));
        let origin = StubOrigin::site().route("/bundle.js", bundle.clone()).route("/archive", page.clone());
        let worker = active_worker(Arc::new(MemoryRegistry::new()), Arc::new(origin)).await;

        let asset = worker.on_fetch(&EdgeRequest::get(url("/bundle.js"))).await.unwrap();
        assert_eq!(asset, Interception::Network(bundle));

        let navigation = worker.on_fetch(&EdgeRequest::navigate(url("/archive"))).await.unwrap();
        assert_eq!(navigation, Interception::Network(page));
    }

    #[tokio::test]
    async fn test_asset_offline_without_cache_is_offline_marker() {
        let origin = Arc::new(StubOrigin::site());
        let worker = active_worker(Arc::new(MemoryRegistry::new()), origin.clone()).await;
        origin.set_offline(true);

        let result = worker.on_fetch(&image("/logo.png")).await.unwrap();
        assert_eq!(result.source(), Source::Offline);
        let response = result.into_response();
        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.body_text(), "Offline");
    }

    #[tokio::test]
    async fn test_asset_offline_served_from_any_cache() {
        let registry = Arc::new(MemoryRegistry::new());
        let origin = Arc::new(StubOrigin::site());
        let worker = active_worker(registry.clone(), origin.clone()).await;
        registry
            .put_all("shared-assets", vec![(RequestKey::get(&url("/logo.png")), png("cached-png"))])
            .await
            .unwrap();
        origin.set_offline(true);

        let result = worker.on_fetch(&image("/logo.png#hero")).await.unwrap();
        assert_eq!(result, Interception::Cached(png("cached-png")));
    }

    #[tokio::test]
    async fn test_asset_offline_serves_fallback_entry() {
        let origin = Arc::new(StubOrigin::site());
        let worker = active_worker(Arc::new(MemoryRegistry::new()), origin.clone()).await;
        origin.set_offline(true);

        let request = EdgeRequest::get(url("/404.html")).with_mode(RequestMode::NoCors);
        let result = worker.on_fetch(&request).await.unwrap();
        assert_eq!(result.source(), Source::Cache);
        assert_eq!(result.response().status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_asset_cache_error_is_offline_marker() {
        let registry = Arc::new(FlakyRegistry::default());
        let origin = Arc::new(StubOrigin::site());
        let worker = active_worker(registry.clone(), origin.clone()).await;
        origin.set_offline(true);
        registry.set_failing_reads(true);

        let result = worker.on_fetch(&EdgeRequest::get(url("/404.html"))).await.unwrap();
        assert_eq!(result.source(), Source::Offline);
    }

    #[tokio::test]
    async fn test_maintenance_without_cached_document_is_inline() {
        let registry = Arc::new(MemoryRegistry::new());
        let origin = Arc::new(StubOrigin::site());
        let worker = active_worker(registry.clone(), origin.clone()).await;
        registry.delete("waystation-v1").await.unwrap();
        origin.set_offline(true);

        let result = worker.on_fetch(&page("/any-page")).await.unwrap();
        assert_eq!(result.response().body_text(), INLINE_MAINTENANCE_HTML);
    }

    #[tokio::test]
    async fn test_non_get_is_never_intercepted() {
        let registry = Arc::new(FlakyRegistry::default());
        let origin = Arc::new(StubOrigin::site());
        let worker = active_worker(registry.clone(), origin.clone()).await;
        let registry_calls = registry.calls();
        let origin_calls = origin.calls();
        origin.set_offline(true);

        for method in [Method::POST, Method::PUT, Method::DELETE, Method::HEAD] {
            let request = page("/form").with_method(method).with_mode(RequestMode::Navigate);
            assert!(worker.on_fetch(&request).await.is_none());
        }

        assert_eq!(registry.calls(), registry_calls);
        assert_eq!(origin.calls(), origin_calls);
    }

    #[tokio::test]
    async fn test_inactive_worker_does_not_intercept() {
        let origin = Arc::new(StubOrigin::site());
        let worker = EdgeWorker::new(worker_config("v1"), Arc::new(MemoryRegistry::new()), origin.clone()).unwrap();
        worker.on_install().await.unwrap();

        assert!(worker.on_fetch(&page("/any-page")).await.is_none());
        assert_eq!(origin.calls(), 2);
    }

    #[tokio::test]
    async fn test_single_network_attempt_per_request() {
        let origin = Arc::new(StubOrigin::site());
        let worker = active_worker(Arc::new(MemoryRegistry::new()), origin.clone()).await;
        let before = origin.calls();
        origin.set_offline(true);

        worker.on_fetch(&page("/any-page")).await.unwrap();
        worker.on_fetch(&image("/logo.png")).await.unwrap();
        assert_eq!(origin.calls(), before + 2);
    }
}
