// Copyright (c) Venice Contributors
// SPDX-License-Identifier: Apache-2.0

use prometheus::{
    register_histogram_vec_with_registry, register_histogram_with_registry,
    register_int_counter_vec_with_registry, register_int_counter_with_registry,
    register_int_gauge_with_registry, Histogram, HistogramVec, IntCounter, IntCounterVec, IntGauge,
    Registry,
};

/// Handler latency buckets, in seconds. Admin operations run against remote
/// coordination services, so the range is wide.
const LATENCY_SEC_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1., 2.5, 5., 10., 30., 60., 120.,
];

pub(crate) struct Metrics {
    /// Terminal outcomes per operation kind: success, ignored, duplicate.
    pub admin_ops_handled: IntCounterVec,
    /// Retriable handler failures; the head stays in place and is retried.
    pub failed_retriable_admin_consumption: IntCounter,
    /// Fatal handler failures; the worker pool halts.
    pub failed_admin_consumption: IntCounter,
    /// Records the tailer skipped because they could not be decoded.
    pub malformed_admin_records: IntCounter,
    /// Handler execution latency from first dispatch attempt to success,
    /// including in-place retries.
    pub admin_op_execution_latency: HistogramVec,
    /// Latency from the producing controller's write to successful execution
    /// here; dominated by log replication and queueing.
    pub admin_op_e2e_latency: Histogram,
    /// Next offset the tailer will hand to a store queue.
    pub tailer_cursor: IntGauge,
    /// Last offset persisted through the watermark store.
    pub checkpointed_offset: IntGauge,
    /// Operations sitting in store queues, waiting for a worker.
    pub pending_admin_operations: IntGauge,
    /// Store queues currently alive (including empty ones not yet reaped).
    pub live_store_queues: IntGauge,
    /// Workers currently holding a queue lease.
    pub active_workers: IntGauge,
}

impl Metrics {
    pub(crate) fn new(registry: &Registry) -> Self {
        Self {
            admin_ops_handled: register_int_counter_vec_with_registry!(
                "admin_ops_handled",
                "Admin operations that reached a terminal outcome, by kind and outcome",
                &["kind", "outcome"],
                registry
            )
            .unwrap(),
            failed_retriable_admin_consumption: register_int_counter_with_registry!(
                "failed_retriable_admin_consumption",
                "Admin operations that failed with a retriable error and will be retried in place",
                registry
            )
            .unwrap(),
            failed_admin_consumption: register_int_counter_with_registry!(
                "failed_admin_consumption",
                "Admin operations that failed fatally and halted consumption",
                registry
            )
            .unwrap(),
            malformed_admin_records: register_int_counter_with_registry!(
                "malformed_admin_records",
                "Admin log records skipped because they could not be decoded",
                registry
            )
            .unwrap(),
            admin_op_execution_latency: register_histogram_vec_with_registry!(
                "admin_op_execution_latency",
                "Latency from first dispatch attempt to successful execution, in seconds",
                &["kind_class"],
                LATENCY_SEC_BUCKETS.to_vec(),
                registry
            )
            .unwrap(),
            admin_op_e2e_latency: register_histogram_with_registry!(
                "admin_op_e2e_latency",
                "Latency from admin record production to successful execution, in seconds",
                LATENCY_SEC_BUCKETS.to_vec(),
                registry
            )
            .unwrap(),
            tailer_cursor: register_int_gauge_with_registry!(
                "admin_tailer_cursor",
                "Next admin log offset the tailer will hand out",
                registry
            )
            .unwrap(),
            checkpointed_offset: register_int_gauge_with_registry!(
                "admin_checkpointed_offset",
                "Last globally safe admin log offset persisted to the watermark store",
                registry
            )
            .unwrap(),
            pending_admin_operations: register_int_gauge_with_registry!(
                "pending_admin_operations",
                "Decoded admin operations queued and not yet executed",
                registry
            )
            .unwrap(),
            live_store_queues: register_int_gauge_with_registry!(
                "live_store_queues",
                "Store queues currently tracked by the coordinator",
                registry
            )
            .unwrap(),
            active_workers: register_int_gauge_with_registry!(
                "active_admin_workers",
                "Workers currently draining a store queue",
                registry
            )
            .unwrap(),
        }
    }
}

#[cfg(test)]
pub(crate) fn test_metrics() -> std::sync::Arc<Metrics> {
    std::sync::Arc::new(Metrics::new(&Registry::new()))
}
