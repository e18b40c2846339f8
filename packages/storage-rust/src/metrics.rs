//! Metric names and recording helpers.
//!
//! Recorded through the `metrics` facade; nothing is exported unless the
//! embedding process installs a recorder.

use demoday_core::BackendMode;

use crate::error::RemoteError;

pub const REMOTE_REQUESTS_TOTAL: &str = "demoday_kv_remote_requests_total";
pub const FLUSH_TOTAL: &str = "demoday_kv_flush_total";
pub const PENDING_CHANGES: &str = "demoday_kv_pending_changes";
pub const BACKEND_RESOLVED_TOTAL: &str = "demoday_kv_backend_resolved_total";

/// Counts one remote API call by operation and outcome.
pub fn record_remote_request<T>(op: &'static str, result: &Result<T, RemoteError>) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(e) => e.kind(),
    };
    metrics::counter!(REMOTE_REQUESTS_TOTAL, "op" => op, "outcome" => outcome).increment(1);
}

/// Counts one flush attempt that reached the remote.
pub fn record_flush(outcome: &'static str) {
    metrics::counter!(FLUSH_TOTAL, "outcome" => outcome).increment(1);
}

/// Publishes the current pending queue length.
#[allow(clippy::cast_precision_loss)]
pub fn set_pending_changes(count: usize) {
    metrics::gauge!(PENDING_CHANGES).set(count as f64);
}

/// Counts a backend resolution.
pub fn record_backend_resolved(mode: BackendMode) {
    metrics::counter!(BACKEND_RESOLVED_TOTAL, "mode" => mode.as_str()).increment(1);
}
