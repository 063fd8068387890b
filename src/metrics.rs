//! Metrics instrumentation for vpnkit-bridge.
//!
//! All metrics are prefixed with `vpnkit_bridge.`

use metrics::{counter, histogram};
use std::time::Instant;

use crate::bridge::Direction;

/// Record a DNS query.
pub fn record_query(record_type: &str, result: QueryResult, duration: std::time::Duration) {
    let result_str = match result {
        QueryResult::Zone => "zone",
        QueryResult::Delegated => "delegated",
        QueryResult::NxDomain => "nxdomain",
        QueryResult::Ignored => "ignored",
    };

    counter!("vpnkit_bridge.dns.query.count", "type" => record_type.to_string(), "result" => result_str)
        .increment(1);
    histogram!("vpnkit_bridge.dns.query.duration.seconds", "type" => record_type.to_string())
        .record(duration.as_secs_f64());
}

/// Query result type for metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryResult {
    /// Answered from a configured zone.
    Zone,
    /// Answered by the delegate resolver.
    Delegated,
    /// Name does not exist, in a zone or upstream.
    NxDomain,
    /// Record type not served; empty success.
    Ignored,
}

/// Record a failed delegate lookup.
pub fn record_delegate_error(record_type: &str) {
    counter!("vpnkit_bridge.dns.delegate.error.count", "type" => record_type.to_string())
        .increment(1);
}

/// Record one frame forwarded by the bridge.
pub fn record_frame(direction: Direction, len: usize) {
    counter!("vpnkit_bridge.bridge.frames.count", "direction" => direction.as_str()).increment(1);
    counter!("vpnkit_bridge.bridge.bytes.count", "direction" => direction.as_str())
        .increment(len as u64);
}

/// Record a frame the bridge discarded without forwarding.
pub fn record_frame_dropped(reason: &'static str) {
    counter!("vpnkit_bridge.bridge.frames.dropped.count", "reason" => reason).increment(1);
}

/// Record a bridge direction failing.
pub fn record_bridge_error(direction: Direction) {
    counter!("vpnkit_bridge.bridge.error.count", "direction" => direction.as_str()).increment(1);
}

/// Helper for timing operations.
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start a new timer.
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed duration since timer start.
    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }
}
