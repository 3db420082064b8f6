//! Edge diagnostics: a health probe plus timed reads of each resource.

use std::time::{Duration, Instant};

use futures::future::join_all;
use reqwest::Method;
use serde::Serialize;
use tracing::info;

use super::classify::check_response;
use super::client::{CacheResource, HttpEdgeCache};

/// Timing and outcome of one resource read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceTiming {
    pub resource: String,
    pub latency_ms: f64,
    pub status: Option<u16>,
    pub cache_hit: bool,
    pub bytes: usize,
    /// Failure reason when the response would not classify as success.
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagnosticsReport {
    pub health_ok: bool,
    pub health_latency_ms: f64,
    pub resources: Vec<ResourceTiming>,
}

impl DiagnosticsReport {
    /// Fraction of answered reads served from the edge cache.
    #[must_use]
    pub fn cache_hit_ratio(&self) -> f64 {
        let answered: Vec<_> = self.resources.iter().filter(|r| r.status.is_some()).collect();
        if answered.is_empty() {
            return 0.0;
        }
        answered.iter().filter(|r| r.cache_hit).count() as f64 / answered.len() as f64
    }

    #[must_use]
    pub fn total_bytes(&self) -> usize {
        self.resources.iter().map(|r| r.bytes).sum()
    }

    #[must_use]
    pub fn average_latency_ms(&self) -> f64 {
        if self.resources.is_empty() {
            return 0.0;
        }
        self.resources.iter().map(|r| r.latency_ms).sum::<f64>() / self.resources.len() as f64
    }

    #[must_use]
    pub fn all_ok(&self) -> bool {
        self.health_ok && self.resources.iter().all(|r| r.error.is_none())
    }
}

fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

impl HttpEdgeCache {
    /// Probe `/health`, then read every resource concurrently and time it.
    #[tracing::instrument(skip(self, resources), fields(resources = resources.len()))]
    pub async fn run_diagnostics(&self, resources: &[CacheResource]) -> DiagnosticsReport {
        let start = Instant::now();
        let health = self
            .send(Method::GET, &format!("{}/health", self.base_url()))
            .await;
        let health_latency = start.elapsed();
        let health_ok = matches!(&health, Ok(r) if check_response(r.status, &r.body).is_ok());

        let timings = join_all(resources.iter().map(|resource| self.timed(resource))).await;

        let report = DiagnosticsReport {
            health_ok,
            health_latency_ms: millis(health_latency),
            resources: timings,
        };
        info!(
            health_ok = report.health_ok,
            cache_hit_ratio = report.cache_hit_ratio(),
            total_bytes = report.total_bytes(),
            average_latency_ms = report.average_latency_ms(),
            "edge diagnostics complete"
        );
        report
    }

    async fn timed(&self, resource: &CacheResource) -> ResourceTiming {
        let start = Instant::now();
        match self.fetch(resource).await {
            Ok(response) => ResourceTiming {
                resource: resource.name().to_string(),
                latency_ms: millis(response.latency),
                status: Some(response.status),
                cache_hit: response.cache_hit,
                bytes: response.bytes(),
                error: check_response(response.status, &response.body)
                    .err()
                    .map(|e| e.reason().to_string()),
            },
            Err(e) => ResourceTiming {
                resource: resource.name().to_string(),
                latency_ms: millis(start.elapsed()),
                status: None,
                cache_hit: false,
                bytes: 0,
                error: Some(e.reason().to_string()),
            },
        }
    }
}
