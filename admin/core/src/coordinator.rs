// Copyright (c) Venice Contributors
// SPDX-License-Identifier: Apache-2.0

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use admin_config::{ClusterRole, Parameters};
use dashmap::DashMap;
use prometheus::Registry;
use rand::Rng;
use tokio::sync::{oneshot, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::backend::AdminBackend;
use crate::context::Context;
use crate::dispatch::DispatchTable;
use crate::error::{AdminError, AdminResult, FailureClass};
use crate::leader::LeaderOracle;
use crate::log_stream::LogStream;
use crate::metrics::Metrics;
use crate::operation::{ExecutionId, LogOffset};
use crate::store_queue::QueueSet;
use crate::tailer::Tailer;
use crate::watermark::WatermarkStore;
use crate::worker::{DrainOutcome, ExecutionWorker};

/// Owns the whole admin consumption pipeline: the tailer, the worker pool,
/// the leadership gate and checkpointing of the globally safe offset.
///
/// Scheduling hands a queue to at most one worker at a time via the per-queue
/// lease bit, so per-store execution is serial while stores progress in
/// parallel up to `worker_pool_size`.
pub struct Coordinator {
    context: Arc<Context>,
    queues: Arc<QueueSet>,
    watermark: Arc<dyn WatermarkStore>,
    worker: Arc<ExecutionWorker>,
    /// Next offset the tailer will hand out; owned by the tailer, read here.
    cursor: Arc<AtomicU64>,
    leader: watch::Receiver<bool>,
    /// Stop flag polled by the tailer and workers at their loop boundaries.
    running: watch::Sender<bool>,
    tailer_task: JoinHandle<()>,
    /// One entry per leased queue currently being drained.
    inflight: JoinSet<(String, DrainOutcome)>,
    last_checkpoint: Option<LogOffset>,
}

impl Coordinator {
    /// Reads the persisted watermark, positions the log cursor right after it
    /// and starts the pipeline. The returned handle stops it.
    #[allow(clippy::too_many_arguments)]
    pub async fn start(
        cluster: impl Into<String>,
        role: ClusterRole,
        parameters: Parameters,
        registry: &Registry,
        log: Arc<dyn LogStream>,
        backend: Arc<dyn AdminBackend>,
        watermark: Arc<dyn WatermarkStore>,
        leader_oracle: &dyn LeaderOracle,
    ) -> AdminResult<CoordinatorHandle> {
        let cluster = cluster.into();
        let context = Arc::new(Context::new(
            cluster.clone(),
            role,
            parameters,
            Arc::new(Metrics::new(registry)),
        ));
        info!(cluster = %context.cluster, ?role, "starting admin consumption");

        let persisted_offset = watermark.read_offset(&cluster).await?;
        let start_offset = persisted_offset.map_or(0, |offset| offset + 1);
        log.seek(start_offset).await?;

        let exec_ids: Arc<DashMap<String, ExecutionId>> = Arc::new(
            watermark
                .read_exec_ids(&cluster)
                .await?
                .into_iter()
                .collect(),
        );

        let queues = Arc::new(QueueSet::new());
        let cursor = Arc::new(AtomicU64::new(start_offset));
        let (running_tx, running_rx) = watch::channel(true);
        let leader_rx = leader_oracle.subscribe();

        let tailer_task = Tailer::new(
            context.clone(),
            log,
            queues.clone(),
            cursor.clone(),
            leader_rx.clone(),
            running_rx.clone(),
        )
        .start();

        let dispatch = Arc::new(DispatchTable::new(context.clone(), backend));
        let worker = Arc::new(ExecutionWorker::new(
            context.clone(),
            dispatch,
            watermark.clone(),
            exec_ids,
            leader_rx.clone(),
            running_rx,
        ));

        let coordinator = Coordinator {
            context,
            queues,
            watermark,
            worker,
            cursor,
            leader: leader_rx,
            running: running_tx,
            tailer_task,
            inflight: JoinSet::new(),
            last_checkpoint: persisted_offset,
        };

        let (tx_shutdown, rx_shutdown) = oneshot::channel();
        let task = tokio::spawn(coordinator.run(rx_shutdown));
        Ok(CoordinatorHandle { task, tx_shutdown })
    }

    async fn run(mut self, mut rx_shutdown: oneshot::Receiver<()>) -> AdminResult<()> {
        let mut schedule_ticker = tokio::time::interval(self.context.parameters.schedule_interval);
        schedule_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut checkpoint_ticker =
            tokio::time::interval(self.context.parameters.checkpoint_interval);
        checkpoint_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let result = loop {
            tokio::select! {
                _ = schedule_ticker.tick() => {
                    self.schedule_workers();
                }
                _ = checkpoint_ticker.tick() => {
                    if let Err(err) = self.checkpoint().await {
                        break Err(err);
                    }
                    self.reap_queues();
                }
                Some(joined) = self.inflight.join_next(), if !self.inflight.is_empty() => {
                    match joined {
                        Ok((store, outcome)) => {
                            if let Err(err) = self.handle_drain_exit(&store, outcome) {
                                break Err(err);
                            }
                        }
                        Err(err) => {
                            if err.is_panic() {
                                std::panic::resume_unwind(err.into_panic());
                            }
                            break Err(AdminError::Shutdown);
                        }
                    }
                }
                res = self.leader.changed() => {
                    if res.is_err() {
                        break Ok(());
                    }
                    let is_leader = *self.leader.borrow();
                    info!(is_leader, "leadership changed");
                }
                _ = &mut rx_shutdown => {
                    break Ok(());
                }
            }
        };

        if let Err(err) = &result {
            error!("admin consumption halting: {err}");
        }
        self.shutdown(result).await
    }

    /// Hands non-empty, unleased, backoff-expired queues to idle workers.
    fn schedule_workers(&mut self) {
        let metrics = &self.context.metrics;
        if *self.leader.borrow() {
            let now = Instant::now();
            let pool_size = self.context.parameters.worker_pool_size;
            for queue in self.queues.snapshot() {
                if self.inflight.len() >= pool_size {
                    break;
                }
                let store = {
                    let mut guard = queue.lock();
                    if !guard.try_lease(now) {
                        continue;
                    }
                    guard.store().to_string()
                };
                let worker = self.worker.clone();
                self.inflight.spawn(async move {
                    let outcome = worker.drain(queue).await;
                    (store, outcome)
                });
            }
        }

        metrics.active_workers.set(self.inflight.len() as i64);
        metrics
            .pending_admin_operations
            .set(self.queues.pending_operations() as i64);
        metrics.live_store_queues.set(self.queues.len() as i64);
    }

    fn handle_drain_exit(&mut self, store: &str, outcome: DrainOutcome) -> AdminResult<()> {
        let Some(queue) = self.queues.get(store) else {
            // A leased queue is never reaped, so the queue must still exist.
            return Err(AdminError::InvariantViolation(format!(
                "drained queue for store {store} disappeared while leased"
            )));
        };
        let mut guard = queue.lock();
        guard.release_lease();
        match outcome {
            DrainOutcome::Drained => {
                guard.record_progress();
                Ok(())
            }
            DrainOutcome::Yielded => Ok(()),
            DrainOutcome::Retry(_) => {
                let failures = guard.consecutive_failures() + 1;
                let delay = retry_delay(
                    self.context.parameters.retry_backoff_base,
                    self.context.parameters.retry_backoff_max,
                    failures,
                );
                guard.record_failure(Instant::now() + delay);
                debug!(
                    store = %store,
                    failures,
                    ?delay,
                    "backing off store queue after retriable failure"
                );
                Ok(())
            }
            DrainOutcome::Fatal(err) => Err(err),
        }
    }

    /// Persists the globally safe offset: every record at or below it has
    /// succeeded, been skipped as a duplicate, or been durably ignored.
    async fn checkpoint(&mut self) -> AdminResult<()> {
        if !*self.leader.borrow() {
            return Ok(());
        }
        // The cursor must be read before the queue heads. A record routed in
        // between shows up in a queue and can only lower the result; the
        // reverse order could see an empty map plus an advanced cursor and
        // checkpoint past unfinished work.
        let cursor = self.cursor.load(Ordering::SeqCst);
        let Some(safe) = safe_offset(cursor, self.queues.min_head_offset()) else {
            return Ok(());
        };
        if self.last_checkpoint.is_some_and(|last| safe <= last) {
            return Ok(());
        }
        match self
            .watermark
            .write_offset(&self.context.cluster, safe)
            .await
        {
            Ok(()) => {
                self.last_checkpoint = Some(safe);
                self.context.metrics.checkpointed_offset.set(safe as i64);
                debug!(offset = safe, "checkpointed admin log progress");
                Ok(())
            }
            Err(err) if err.classification() == FailureClass::Retriable => {
                warn!("failed to persist checkpoint, will retry: {err}");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn reap_queues(&self) {
        let reaped = self.queues.reap_idle();
        if reaped > 0 {
            debug!(reaped, "reaped idle store queues");
        }
        self.context
            .metrics
            .live_store_queues
            .set(self.queues.len() as i64);
    }

    /// Stops the tailer and workers at their loop boundaries, joins them all
    /// and flushes a final checkpoint. Runs on every exit path.
    async fn shutdown(mut self, result: AdminResult<()>) -> AdminResult<()> {
        info!("admin consumption coordinator shutting down");
        self.running.send_replace(false);

        if let Err(err) = (&mut self.tailer_task).await {
            if err.is_panic() {
                std::panic::resume_unwind(err.into_panic());
            }
        }

        let mut result = result;
        while let Some(joined) = self.inflight.join_next().await {
            match joined {
                Ok((store, outcome)) => {
                    if let Err(err) = self.handle_drain_exit(&store, outcome) {
                        if result.is_ok() {
                            result = Err(err);
                        }
                    }
                }
                Err(err) => {
                    if err.is_panic() {
                        std::panic::resume_unwind(err.into_panic());
                    }
                }
            }
        }

        if let Err(err) = self.checkpoint().await {
            warn!("final checkpoint flush failed: {err}");
        }
        info!("admin consumption coordinator stopped");
        result
    }
}

/// Handle to stop the coordinator and collect its exit result.
pub struct CoordinatorHandle {
    task: JoinHandle<AdminResult<()>>,
    tx_shutdown: oneshot::Sender<()>,
}

impl CoordinatorHandle {
    /// Whether the coordinator loop has already exited, e.g. after a fatal
    /// failure.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub async fn stop(self) -> AdminResult<()> {
        let _ = self.tx_shutdown.send(());
        match self.task.await {
            Ok(result) => result,
            Err(err) => {
                if err.is_panic() {
                    std::panic::resume_unwind(err.into_panic());
                }
                Err(AdminError::Shutdown)
            }
        }
    }
}

/// `min_head - 1` when any queue holds work, else `cursor - 1`; `None` until
/// the first record reaches a terminal outcome.
fn safe_offset(cursor: LogOffset, min_head: Option<LogOffset>) -> Option<LogOffset> {
    match min_head {
        Some(head) => head.checked_sub(1),
        None => cursor.checked_sub(1),
    }
}

/// Exponential backoff with jitter, capped at `max`.
fn retry_delay(base: Duration, max: Duration, consecutive_failures: u32) -> Duration {
    let exponent = consecutive_failures.saturating_sub(1).min(16);
    let delay = base.saturating_mul(1u32 << exponent);
    let jitter_ms = rand::thread_rng().gen_range(0..=base.as_millis().max(1) as u64);
    (delay + Duration::from_millis(jitter_ms)).min(max)
}
