//! Metrics side channel
//!
//! The engine pushes a few gauges to an optional sink. Reporting is best
//! effort: sink errors are logged and otherwise ignored.

use std::error::Error;

/// Gauge: recursive on-disk size of the store directory
pub const STORE_SIZE_BYTES: &str = "store.size_bytes";

/// Gauge: number of open partitions
pub const STORE_PARTITION_COUNT: &str = "store.partition_count";

pub type MetricsResult = std::result::Result<(), Box<dyn Error + Send + Sync>>;

/// Receives gauges from a store engine
pub trait MetricsSink: Send + Sync {
    fn record_gauge(&self, store_name: &str, name: &str, value: u64) -> MetricsResult;
}

/// Report `value` to `sink`, swallowing failures
pub(crate) fn report(sink: Option<&dyn MetricsSink>, store_name: &str, name: &str, value: u64) {
    if let Some(sink) = sink {
        if let Err(e) = sink.record_gauge(store_name, name, value) {
            tracing::debug!(store = store_name, metric = name, error = %e, "Failed to record metric");
        }
    }
}
