// Copyright (c) Venice Contributors
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::context::Context;
use crate::dispatch::DispatchTable;
use crate::error::{AdminError, AdminResult, FailureClass};
use crate::operation::{timestamp_utc_ms, AdminOperationKind, ExecutionId};
use crate::store_queue::{OperationWrapper, StoreQueue};
use crate::watermark::WatermarkStore;

/// How one drain of a store queue ended.
#[derive(Debug)]
pub(crate) enum DrainOutcome {
    /// The queue is empty; every head reached a terminal outcome.
    Drained,
    /// Leadership was lost or shutdown began; stopped at an operation
    /// boundary with the head intact.
    Yielded,
    /// The head failed with a retriable error and stays in place. The
    /// coordinator backs the queue off before rescheduling it.
    Retry(AdminError),
    /// Unrecoverable failure; the coordinator halts the pool.
    Fatal(AdminError),
}

/// Drains one leased store queue head-to-tail.
///
/// The queue mutex is held only to peek, stamp and pop; never across the
/// handler call, so the tailer can append to the same queue while its head
/// executes. Per-store serial execution comes from the lease, not from locks.
pub(crate) struct ExecutionWorker {
    context: Arc<Context>,
    dispatch: Arc<DispatchTable>,
    watermark: Arc<dyn WatermarkStore>,
    /// Authoritative in-memory view of last succeeded execution ids, seeded
    /// from the watermark store at startup.
    exec_ids: Arc<DashMap<String, ExecutionId>>,
    leader: watch::Receiver<bool>,
    running: watch::Receiver<bool>,
}

impl ExecutionWorker {
    pub(crate) fn new(
        context: Arc<Context>,
        dispatch: Arc<DispatchTable>,
        watermark: Arc<dyn WatermarkStore>,
        exec_ids: Arc<DashMap<String, ExecutionId>>,
        leader: watch::Receiver<bool>,
        running: watch::Receiver<bool>,
    ) -> Self {
        Self {
            context,
            dispatch,
            watermark,
            exec_ids,
            leader,
            running,
        }
    }

    pub(crate) async fn drain(&self, queue: Arc<parking_lot::Mutex<StoreQueue>>) -> DrainOutcome {
        let store = queue.lock().store().to_string();
        loop {
            if !*self.running.borrow() || !*self.leader.borrow() {
                return DrainOutcome::Yielded;
            }

            let Some(wrapper) = ({
                let mut guard = queue.lock();
                guard.head_mut().map(|head| {
                    if head.first_attempt_at.is_none() {
                        head.first_attempt_at = Some(Instant::now());
                    }
                    head.attempt_count += 1;
                    head.clone()
                })
            }) else {
                return DrainOutcome::Drained;
            };

            let execution_id = wrapper.operation.execution_id;
            let last_succeeded = self.exec_ids.get(&store).map(|id| *id).unwrap_or(0);
            if execution_id <= last_succeeded {
                queue.lock().pop();
                debug!(
                    store = %store,
                    offset = wrapper.offset,
                    execution_id,
                    last_succeeded,
                    "skipping replayed admin operation"
                );
                self.context
                    .metrics
                    .admin_ops_handled
                    .with_label_values(&[wrapper.operation.kind().as_ref(), "duplicate"])
                    .inc();
                continue;
            }

            let outcome = match self.dispatch.dispatch(&wrapper.operation).await {
                Ok(()) => "success",
                Err(err) => match err.classification() {
                    FailureClass::Ignorable => {
                        info!(
                            store = %store,
                            offset = wrapper.offset,
                            execution_id,
                            "operation cannot run in this deployment, counting as done: {err}"
                        );
                        "ignored"
                    }
                    FailureClass::Retriable => {
                        warn!(
                            store = %store,
                            offset = wrapper.offset,
                            execution_id,
                            attempt = wrapper.attempt_count,
                            "retriable failure executing admin operation: {err}"
                        );
                        self.context.metrics.failed_retriable_admin_consumption.inc();
                        return DrainOutcome::Retry(err);
                    }
                    FailureClass::Fatal => {
                        error!(
                            store = %store,
                            offset = wrapper.offset,
                            execution_id,
                            "fatal failure executing admin operation: {err}"
                        );
                        self.context.metrics.failed_admin_consumption.inc();
                        return DrainOutcome::Fatal(err);
                    }
                },
            };

            if let Err(err) = self.commit(&queue, &store, &wrapper, outcome).await {
                return match err.classification() {
                    FailureClass::Retriable => {
                        warn!(
                            store = %store,
                            offset = wrapper.offset,
                            execution_id,
                            "retriable failure committing watermark: {err}"
                        );
                        self.context.metrics.failed_retriable_admin_consumption.inc();
                        DrainOutcome::Retry(err)
                    }
                    _ => {
                        error!(
                            store = %store,
                            offset = wrapper.offset,
                            execution_id,
                            "fatal failure committing watermark: {err}"
                        );
                        self.context.metrics.failed_admin_consumption.inc();
                        DrainOutcome::Fatal(err)
                    }
                };
            }
        }
    }

    /// Makes an outcome durable: bump the execution id, mirror it in memory,
    /// then pop. Popping last keeps the head visible until progress is
    /// persisted, so a crash in between replays instead of losing the commit.
    async fn commit(
        &self,
        queue: &Arc<parking_lot::Mutex<StoreQueue>>,
        store: &str,
        wrapper: &OperationWrapper,
        outcome: &str,
    ) -> AdminResult<()> {
        self.watermark
            .bump_exec_id(
                &self.context.cluster,
                store,
                wrapper.operation.execution_id,
            )
            .await?;
        self.exec_ids
            .insert(store.to_string(), wrapper.operation.execution_id);
        queue.lock().pop();

        let kind = wrapper.operation.kind();
        self.context
            .metrics
            .admin_ops_handled
            .with_label_values(&[kind.as_ref(), outcome])
            .inc();
        if let Some(first_attempt) = wrapper.first_attempt_at {
            let kind_class = if kind == AdminOperationKind::AddVersion {
                "add_version"
            } else {
                "other"
            };
            self.context
                .metrics
                .admin_op_execution_latency
                .with_label_values(&[kind_class])
                .observe(first_attempt.elapsed().as_secs_f64());
        }
        let e2e_ms = timestamp_utc_ms().saturating_sub(wrapper.operation.producer_timestamp_ms);
        self.context
            .metrics
            .admin_op_e2e_latency
            .observe(e2e_ms as f64 / 1000.0);
        Ok(())
    }
}
