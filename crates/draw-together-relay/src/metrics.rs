//! Prometheus metrics recording.
//!
//! Every `record_*` function compiles to nothing without the `metrics`
//! feature.

#[cfg(feature = "metrics")]
use std::sync::OnceLock;

#[cfg(feature = "metrics")]
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

#[cfg(feature = "metrics")]
static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder once per process.
#[cfg(feature = "metrics")]
pub fn install_prometheus_recorder() -> Option<&'static PrometheusHandle> {
    if HANDLE.get().is_none() {
        match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => {
                let _ = HANDLE.set(handle);
            }
            Err(e) => {
                tracing::warn!(%e, "Failed to install Prometheus recorder");
            }
        }
    }
    HANDLE.get()
}

/// Current metrics in Prometheus text format, if a recorder is installed.
#[cfg(feature = "metrics")]
pub fn render() -> Option<String> {
    HANDLE.get().map(|h| h.render())
}

pub fn record_connect() {
    #[cfg(feature = "metrics")]
    metrics::gauge!("relay_connections_active").increment(1.0);
}

pub fn record_disconnect() {
    #[cfg(feature = "metrics")]
    metrics::gauge!("relay_connections_active").decrement(1.0);
}

pub fn record_rejected() {
    #[cfg(feature = "metrics")]
    metrics::counter!("relay_connections_rejected_total").increment(1);
}

pub fn record_line_relayed(_recipients: usize) {
    #[cfg(feature = "metrics")]
    {
        metrics::counter!("relay_lines_total").increment(1);
        metrics::counter!("relay_deliveries_total").increment(_recipients as u64);
    }
}

pub fn record_dropped_delivery() {
    #[cfg(feature = "metrics")]
    metrics::counter!("relay_dropped_deliveries_total").increment(1);
}
