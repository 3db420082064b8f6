// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for reel-sync.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The host application is responsible for installing an exporter.
//!
//! # Metric Naming Convention
//! - `reel_sync_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//! - `_bytes` suffix for size histograms
//!
//! # Labels
//! - `tier`: local, edge, remote
//! - `resource`: movies, lists, statistics, profile
//! - `status`: success, error, cancelled

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

/// Record a coordinator write (create/update/delete/add/remove/reorder)
pub fn record_write(operation: &str, status: &str) {
    counter!(
        "reel_sync_writes_total",
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a call against one tier
pub fn record_operation(tier: &str, operation: &str, status: &str) {
    counter!(
        "reel_sync_operations_total",
        "tier" => tier.to_string(),
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record operation latency
pub fn record_latency(tier: &str, operation: &str, duration: Duration) {
    histogram!(
        "reel_sync_operation_seconds",
        "tier" => tier.to_string(),
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record an error by component/operation/kind
pub fn record_error(tier: &str, operation: &str, error_type: &str) {
    counter!(
        "reel_sync_errors_total",
        "tier" => tier.to_string(),
        "operation" => operation.to_string(),
        "error_type" => error_type.to_string()
    )
    .increment(1);
}

// ═══════════════════════════════════════════════════════════════════════════
// Edge cache
// ═══════════════════════════════════════════════════════════════════════════

/// Record a classified edge read (`ok` or the failure reason)
pub fn record_edge_read(resource: &str, outcome: &str) {
    counter!(
        "reel_sync_edge_reads_total",
        "resource" => resource.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record a fall back from the edge to the remote store
pub fn record_edge_fallback(resource: &str, reason: &str) {
    counter!(
        "reel_sync_edge_fallbacks_total",
        "resource" => resource.to_string(),
        "reason" => reason.to_string()
    )
    .increment(1);
}

/// Record whether the edge served a response from its cache
pub fn record_cache_hit(resource: &str, hit: bool) {
    counter!(
        "reel_sync_edge_cache_total",
        "resource" => resource.to_string(),
        "result" => if hit { "hit" } else { "miss" }
    )
    .increment(1);
}

/// Record response size from the edge
pub fn record_edge_bytes(resource: &str, bytes: usize) {
    histogram!(
        "reel_sync_edge_response_bytes",
        "resource" => resource.to_string()
    )
    .record(bytes as f64);
}

/// Record a fire-and-forget invalidation outcome
pub fn record_invalidation(resource: &str, success: bool) {
    counter!(
        "reel_sync_edge_invalidations_total",
        "resource" => resource.to_string(),
        "status" => if success { "success" } else { "error" }
    )
    .increment(1);
}

// ═══════════════════════════════════════════════════════════════════════════
// Aggregation / refresh
// ═══════════════════════════════════════════════════════════════════════════

/// Record the outcome of a synthetic collection refresh
pub fn record_refresh(outcome: &str) {
    counter!(
        "reel_sync_refresh_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

pub fn record_refresh_duration(duration: Duration) {
    histogram!("reel_sync_refresh_seconds").record(duration.as_secs_f64());
}

/// Record a background tick (`ran`, `skipped_unauthenticated`)
pub fn record_background_tick(outcome: &str) {
    counter!(
        "reel_sync_background_ticks_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

pub fn set_synthetic_items(count: usize) {
    gauge!("reel_sync_synthetic_items").set(count as f64);
}

// ═══════════════════════════════════════════════════════════════════════════
// Coordinator
// ═══════════════════════════════════════════════════════════════════════════

pub fn set_collection_count(count: usize) {
    gauge!("reel_sync_collections").set(count as f64);
}

pub fn set_item_count(count: usize) {
    gauge!("reel_sync_collection_items").set(count as f64);
}

/// Record a reconcile pass against the remote store
pub fn record_reconcile(success: bool) {
    counter!(
        "reel_sync_reconcile_total",
        "status" => if success { "success" } else { "error" }
    )
    .increment(1);
}

/// Record a remote snapshot dropped because a local write landed during its fetch
pub fn record_snapshot_superseded(source: &str) {
    counter!(
        "reel_sync_snapshot_superseded_total",
        "source" => source.to_string()
    )
    .increment(1);
}

/// Record a startup phase duration
pub fn record_startup_phase(phase: &str, duration: Duration) {
    histogram!(
        "reel_sync_startup_seconds",
        "phase" => phase.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Track coordinator state transitions
pub fn set_coordinator_state(state: &str) {
    counter!(
        "reel_sync_state_transitions_total",
        "state" => state.to_string()
    )
    .increment(1);
}

/// Latency timer that records on drop
pub struct LatencyTimer {
    tier: &'static str,
    operation: &'static str,
    start: Instant,
}

impl LatencyTimer {
    #[must_use]
    pub fn new(tier: &'static str, operation: &'static str) -> Self {
        Self {
            tier,
            operation,
            start: Instant::now(),
        }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_latency(self.tier, self.operation, self.start.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // These only check the recording calls don't panic without a recorder.

    #[test]
    fn test_record_operation() {
        record_operation("local", "upsert", "success");
        record_operation("remote", "select", "error");
        record_write("add_item", "success");
        record_error("edge", "movies", "malformed_payload");
    }

    #[test]
    fn test_edge_metrics() {
        record_edge_read("movies", "ok");
        record_edge_read("lists", "server_error");
        record_edge_fallback("lists", "server_error");
        record_cache_hit("movies", true);
        record_edge_bytes("movies", 2048);
        record_invalidation("lists", false);
    }

    #[test]
    fn test_refresh_metrics() {
        record_refresh("success");
        record_refresh("cancelled");
        record_refresh_duration(Duration::from_millis(12));
        record_background_tick("skipped_unauthenticated");
        set_synthetic_items(7);
    }

    #[test]
    fn test_coordinator_metrics() {
        set_collection_count(3);
        set_item_count(12);
        record_reconcile(true);
        record_startup_phase("load_local", Duration::from_millis(2));
        set_coordinator_state("Ready");
    }

    #[test]
    fn test_latency_timer() {
        {
            let _timer = LatencyTimer::new("remote", "select");
            std::thread::sleep(Duration::from_micros(10));
        }
    }
}
