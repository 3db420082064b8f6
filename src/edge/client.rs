// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Edge cache client.
//!
//! The edge is a read-through HTTP proxy in front of the remote store. Every
//! read is classified (see [`super::classify`]); a failed read is never
//! surfaced past the aggregation layer, which falls back to the remote store.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Method;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{EdgeError, SyncError};
use crate::model::{CollectionWithItems, Movie, Profile, UserStatistics};
use super::classify::{classify_list, classify_object};
use super::diagnostics::DiagnosticsReport;

/// A cached resource on the edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheResource {
    Movies,
    Lists(Uuid),
    Statistics(Uuid),
    Profile(Uuid),
}

impl CacheResource {
    /// Resource name; also the envelope key the edge may wrap payloads in.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Movies => "movies",
            Self::Lists(_) => "lists",
            Self::Statistics(_) => "statistics",
            Self::Profile(_) => "profile",
        }
    }

    /// Resolve a configured resource name for a user.
    #[must_use]
    pub fn from_name(name: &str, user_id: Uuid) -> Option<Self> {
        match name {
            "movies" => Some(Self::Movies),
            "lists" => Some(Self::Lists(user_id)),
            "statistics" => Some(Self::Statistics(user_id)),
            "profile" => Some(Self::Profile(user_id)),
            _ => None,
        }
    }

    /// Path segment without the leading slash, e.g. `lists/<uuid>`.
    #[must_use]
    pub fn pattern(&self) -> String {
        match self {
            Self::Movies => "movies".to_string(),
            Self::Lists(user) | Self::Statistics(user) | Self::Profile(user) => {
                format!("{}/{}", self.name(), user)
            }
        }
    }

    #[must_use]
    pub fn path(&self) -> String {
        format!("/{}", self.pattern())
    }

    /// `/cache/*/<pattern>*`: drops every cached variant of the resource.
    #[must_use]
    pub fn invalidation_path(&self) -> String {
        format!("/cache/*/{}*", self.pattern())
    }

    /// Resources a structural collection write makes stale.
    #[must_use]
    pub fn after_collection_write(user_id: Uuid) -> [Self; 2] {
        [Self::Lists(user_id), Self::Statistics(user_id)]
    }
}

impl std::fmt::Display for CacheResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path())
    }
}

/// Read-through cache in front of the remote store.
#[async_trait]
pub trait EdgeCache: Send + Sync {
    async fn movies(&self) -> Result<Vec<Movie>, EdgeError>;

    /// Collections with embedded items for a user.
    async fn lists(&self, user_id: Uuid) -> Result<Vec<CollectionWithItems>, EdgeError>;

    async fn statistics(&self, user_id: Uuid) -> Result<UserStatistics, EdgeError>;

    async fn profile(&self, user_id: Uuid) -> Result<Profile, EdgeError>;

    /// Drop every cached variant of a resource.
    async fn invalidate(&self, resource: &CacheResource) -> Result<(), EdgeError>;

    /// Informational health/latency report. `None` when unsupported.
    async fn diagnostics(&self, _resources: &[CacheResource]) -> Option<DiagnosticsReport> {
        None
    }
}

/// Raw edge response before classification.
#[derive(Debug, Clone)]
pub struct EdgeResponse {
    pub status: u16,
    pub body: String,
    pub cache_hit: bool,
    pub latency: Duration,
}

impl EdgeResponse {
    #[must_use]
    pub fn bytes(&self) -> usize {
        self.body.len()
    }
}

/// HTTP binding of [`EdgeCache`].
///
/// # Example
///
/// ```
/// use reel_sync::edge::{CacheResource, HttpEdgeCache};
///
/// let edge = HttpEdgeCache::new("https://edge.example.test/", None, "x-cache").unwrap();
/// assert_eq!(edge.url(&CacheResource::Movies), "https://edge.example.test/movies");
/// ```
#[derive(Clone)]
pub struct HttpEdgeCache {
    client: reqwest::Client,
    base_url: String,
    headers: HeaderMap,
    cache_hit_header: String,
}

impl HttpEdgeCache {
    pub fn new(base_url: &str, token: Option<&str>, cache_hit_header: &str) -> Result<Self, SyncError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = token {
            let bearer = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| SyncError::UnsupportedOperation(format!("invalid edge token header: {e}")))?;
            headers.insert(AUTHORIZATION, bearer);
        }
        Ok(Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            headers,
            cache_hit_header: cache_hit_header.to_ascii_lowercase(),
        })
    }

    #[must_use]
    pub fn url(&self, resource: &CacheResource) -> String {
        format!("{}{}", self.base_url, resource.path())
    }

    pub(super) fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send a request and capture status, body and the cache-hit header.
    /// Only transport failures are errors here; classification is separate.
    pub(super) async fn send(&self, method: Method, url: &str) -> Result<EdgeResponse, EdgeError> {
        let start = Instant::now();
        let response = self
            .client
            .request(method, url)
            .headers(self.headers.clone())
            .send()
            .await
            .map_err(|e| EdgeError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        let cache_hit = response
            .headers()
            .get(self.cache_hit_header.as_str())
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.to_ascii_uppercase().contains("HIT"));
        let body = response
            .text()
            .await
            .map_err(|e| EdgeError::Network(e.to_string()))?;

        Ok(EdgeResponse {
            status,
            body,
            cache_hit,
            latency: start.elapsed(),
        })
    }

    pub(super) async fn fetch(&self, resource: &CacheResource) -> Result<EdgeResponse, EdgeError> {
        let response = self.send(Method::GET, &self.url(resource)).await;
        match &response {
            Ok(r) => {
                crate::metrics::record_cache_hit(resource.name(), r.cache_hit);
                crate::metrics::record_edge_bytes(resource.name(), r.bytes());
                crate::metrics::record_latency("edge", resource.name(), r.latency);
                debug!(
                    resource = %resource,
                    status = r.status,
                    cache_hit = r.cache_hit,
                    bytes = r.bytes(),
                    "edge response"
                );
            }
            Err(e) => crate::metrics::record_edge_read(resource.name(), e.reason()),
        }
        response
    }

    fn record<T>(resource: &CacheResource, result: &Result<T, EdgeError>) {
        match result {
            Ok(_) => crate::metrics::record_edge_read(resource.name(), "ok"),
            Err(e) => {
                crate::metrics::record_edge_read(resource.name(), e.reason());
                debug!(resource = %resource, reason = e.reason(), "edge read classified as failure");
            }
        }
    }

    async fn list<T: serde::de::DeserializeOwned>(&self, resource: CacheResource) -> Result<Vec<T>, EdgeError> {
        let response = self.fetch(&resource).await?;
        let result = classify_list(resource.name(), response.status, &response.body);
        Self::record(&resource, &result);
        result
    }

    async fn object<T: serde::de::DeserializeOwned>(&self, resource: CacheResource) -> Result<T, EdgeError> {
        let response = self.fetch(&resource).await?;
        let result = classify_object(resource.name(), response.status, &response.body);
        Self::record(&resource, &result);
        result
    }
}

#[async_trait]
impl EdgeCache for HttpEdgeCache {
    async fn movies(&self) -> Result<Vec<Movie>, EdgeError> {
        self.list(CacheResource::Movies).await
    }

    async fn lists(&self, user_id: Uuid) -> Result<Vec<CollectionWithItems>, EdgeError> {
        self.list(CacheResource::Lists(user_id)).await
    }

    async fn statistics(&self, user_id: Uuid) -> Result<UserStatistics, EdgeError> {
        self.object(CacheResource::Statistics(user_id)).await
    }

    async fn profile(&self, user_id: Uuid) -> Result<Profile, EdgeError> {
        self.object(CacheResource::Profile(user_id)).await
    }

    #[tracing::instrument(skip(self), fields(resource = %resource))]
    async fn invalidate(&self, resource: &CacheResource) -> Result<(), EdgeError> {
        let url = format!("{}{}", self.base_url, resource.invalidation_path());
        let response = self.send(Method::DELETE, &url).await?;
        if (200..300).contains(&response.status) {
            debug!(status = response.status, "edge invalidated");
            Ok(())
        } else {
            warn!(status = response.status, "edge invalidation rejected");
            Err(EdgeError::Server { status: response.status, body: response.body })
        }
    }

    async fn diagnostics(&self, resources: &[CacheResource]) -> Option<DiagnosticsReport> {
        Some(self.run_diagnostics(resources).await)
    }
}
