// crates/mcs-gateway/src/telemetry.rs
// ============================================================================
// Module: Gateway Telemetry
// Description: Metric hooks for RPC requests and latencies.
// Purpose: Provide metric events and latency buckets without hard deps.
// Dependencies: std
// ============================================================================

//! ## Overview
//! A thin metrics interface for request counters and latency histograms.
//! Deployments plug in their own exporter by implementing
//! [`GatewayMetrics`]. Labels never carry token material or tool arguments.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default latency buckets in milliseconds for request histograms.
pub const RPC_LATENCY_BUCKETS_MS: &[u64] =
    &[1, 2, 5, 10, 25, 50, 100, 250, 500, 1_000, 2_500, 5_000, 10_000, 30_000];

// ============================================================================
// SECTION: Metric Labels
// ============================================================================

/// RPC method classification.
///
/// # Invariants
/// - Variants are stable for telemetry labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcMethod {
    /// Tool enumeration.
    ListTools,
    /// Tool invocation.
    CallTool,
}

impl RpcMethod {
    /// Returns a stable label for the method.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ListTools => "list_tools",
            Self::CallTool => "call_tool",
        }
    }
}

/// RPC outcome classification.
///
/// # Invariants
/// - Variants are stable for telemetry labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcOutcome {
    /// Completed without an in-band error.
    Ok,
    /// Rejected before streaming (not found, bad request, draining).
    Rejected,
    /// Streamed and ended with an error chunk.
    Failed,
    /// Caller went away before the stream finished.
    Cancelled,
}

impl RpcOutcome {
    /// Returns a stable label for the outcome.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Rejected => "rejected",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Request metric event payload.
#[derive(Debug, Clone)]
pub struct RpcMetricEvent {
    /// RPC method.
    pub method: RpcMethod,
    /// Tool name for `CallTool`.
    pub tool: Option<String>,
    /// Request outcome.
    pub outcome: RpcOutcome,
    /// Chunks emitted for `CallTool`.
    pub chunks: u64,
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Metrics sink for gateway requests and latencies.
pub trait GatewayMetrics: Send + Sync {
    /// Records a request counter event.
    fn record_request(&self, event: RpcMetricEvent);
    /// Records a latency observation for the request.
    fn record_latency(&self, event: RpcMetricEvent, latency: Duration);
}

/// No-op metrics sink.
pub struct NoopMetrics;

impl GatewayMetrics for NoopMetrics {
    fn record_request(&self, _event: RpcMetricEvent) {}

    fn record_latency(&self, _event: RpcMetricEvent, _latency: Duration) {}
}
