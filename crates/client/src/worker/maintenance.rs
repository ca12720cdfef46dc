//! Synthesized "service unavailable" responses.

use bytes::Bytes;
use reqwest::StatusCode;
use reqwest::header::{CACHE_CONTROL, CONTENT_TYPE, HeaderValue, RETRY_AFTER};
use waystation_core::{CacheRegistry, EdgeResponse, RequestKey};

/// Seconds a client should wait before retrying a navigation.
pub const RETRY_AFTER_SECS: &str = "3600";

/// Body used when no maintenance document is cached.
pub const INLINE_MAINTENANCE_HTML: &str = "<h1>Under maintenance</h1><p>We will be back shortly.</p>";

/// Body of the marker returned for assets with neither network nor cache.
pub const OFFLINE_BODY: &str = "Offline";

/// Build the maintenance response for a failed navigation.
///
/// The body is the cached maintenance document when `cache_name` holds one,
/// otherwise [`INLINE_MAINTENANCE_HTML`]. Lookup errors count as a miss. The
/// headers are fixed, so equal cache state yields equal responses.
pub async fn maintenance_response(registry: &dyn CacheRegistry, cache_name: &str, key: &RequestKey) -> EdgeResponse {
    let body = match registry.match_in(cache_name, key).await {
        Ok(Some(document)) => document.body,
        Ok(None) => {
            tracing::debug!(cache = %cache_name, key = %key, "maintenance document not cached; using inline page");
            Bytes::from_static(INLINE_MAINTENANCE_HTML.as_bytes())
        }
        Err(err) => {
            tracing::warn!(cache = %cache_name, error = %err, "maintenance lookup failed; using inline page");
            Bytes::from_static(INLINE_MAINTENANCE_HTML.as_bytes())
        }
    };

    EdgeResponse::new(StatusCode::SERVICE_UNAVAILABLE, body)
        .with_header(CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8"))
        .with_header(RETRY_AFTER, HeaderValue::from_static(RETRY_AFTER_SECS))
        .with_header(CACHE_CONTROL, HeaderValue::from_static("no-cache, must-revalidate"))
}

/// 503 with the bare `Offline` body.
pub fn offline_response() -> EdgeResponse {
    EdgeResponse::new(StatusCode::SERVICE_UNAVAILABLE, OFFLINE_BODY)
}
