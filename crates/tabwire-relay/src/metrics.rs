//! Metric recording for the relay and tool dispatch.
//!
//! Without an installed recorder every call here is a no-op.

use std::time::Duration;

/// Record an extension WebSocket connection.
pub fn record_extension_connect() {
    metrics::gauge!("extension_connections_active").increment(1.0);
}

/// Record an extension WebSocket disconnection.
pub fn record_extension_disconnect() {
    metrics::gauge!("extension_connections_active").decrement(1.0);
}

pub fn record_unmatched_reply() {
    metrics::counter!("bridge_unmatched_replies_total").increment(1);
}

pub fn record_malformed_frame() {
    metrics::counter!("bridge_malformed_frames_total").increment(1);
}

/// Record a bridge call that ended without a reply, by error kind.
pub fn record_bridge_failure(kind: &'static str) {
    metrics::counter!("bridge_failures_total", "kind" => kind).increment(1);
}

/// Record one tool invocation with its duration.
pub fn record_tool_call(tool: &str, ok: bool, elapsed: Duration) {
    let labels = [
        ("tool", tool.to_string()),
        ("outcome", if ok { "ok" } else { "error" }.to_string()),
    ];
    metrics::counter!("tool_calls_total", &labels).increment(1);
    metrics::histogram!("tool_call_duration_seconds", &labels).record(elapsed.as_secs_f64());
}

#[cfg(feature = "prometheus")]
mod prometheus {
    use std::sync::OnceLock;

    use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

    static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

    /// Install the process-wide Prometheus recorder. Later calls reuse the first handle.
    pub fn install_prometheus_recorder() -> anyhow::Result<PrometheusHandle> {
        if let Some(handle) = HANDLE.get() {
            return Ok(handle.clone());
        }
        let handle = PrometheusBuilder::new().install_recorder()?;
        Ok(HANDLE.get_or_init(|| handle).clone())
    }

    /// Rendered exposition text, if a recorder was installed.
    pub fn render() -> Option<String> {
        HANDLE.get().map(PrometheusHandle::render)
    }
}

#[cfg(feature = "prometheus")]
pub use prometheus::{install_prometheus_recorder, render};
