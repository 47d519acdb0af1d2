// Copyright (c) Venice Contributors
// SPDX-License-Identifier: Apache-2.0

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::codec::OperationCodec;
use crate::context::Context;
use crate::log_stream::{LogRecord, LogStream};
use crate::store_queue::{OperationWrapper, QueueSet};

/// Single consumer of the admin log: reads batches in offset order, decodes
/// them and fans the operations out into per-store queues.
///
/// The tailer never blocks on a poison record: anything undecodable is
/// counted, logged and skipped, so one bad producer cannot wedge the whole
/// control plane.
pub(crate) struct Tailer {
    context: Arc<Context>,
    log: Arc<dyn LogStream>,
    queues: Arc<QueueSet>,
    /// Next offset to hand to a queue. Read by the coordinator when computing
    /// the globally safe offset.
    cursor: Arc<AtomicU64>,
    leader: watch::Receiver<bool>,
    running: watch::Receiver<bool>,
}

impl Tailer {
    pub(crate) fn new(
        context: Arc<Context>,
        log: Arc<dyn LogStream>,
        queues: Arc<QueueSet>,
        cursor: Arc<AtomicU64>,
        leader: watch::Receiver<bool>,
        running: watch::Receiver<bool>,
    ) -> Self {
        Self {
            context,
            log,
            queues,
            cursor,
            leader,
            running,
        }
    }

    pub(crate) fn start(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        debug!("admin log tailer started");
        let batch_size = self.context.parameters.tail_batch_size;
        loop {
            if !*self.running.borrow() {
                break;
            }
            if !*self.leader.borrow() {
                // Stall without consuming. Anything produced meanwhile is
                // re-read after the next leadership gain; execution-id dedup
                // absorbs records another leader already executed.
                tokio::select! {
                    res = self.leader.changed() => if res.is_err() { break },
                    res = self.running.changed() => if res.is_err() { break },
                }
                continue;
            }
            tokio::select! {
                result = self.log.next_batch(batch_size) => match result {
                    Ok(batch) => self.handle_batch(batch),
                    Err(err) => {
                        warn!("failed to read admin log: {err}");
                        tokio::time::sleep(self.context.parameters.retry_backoff_base).await;
                    }
                },
                res = self.running.changed() => if res.is_err() { break },
                res = self.leader.changed() => if res.is_err() { break },
            }
        }
        debug!("admin log tailer stopped");
    }

    fn handle_batch(&self, batch: Vec<LogRecord>) {
        for record in batch {
            match OperationCodec::decode(&record.payload) {
                Ok(operation) => {
                    let store = operation.store_key();
                    self.queues
                        .enqueue(&store, OperationWrapper::new(operation, record.offset));
                }
                Err(err) => {
                    warn!(
                        offset = record.offset,
                        "skipping undecodable admin record: {err}"
                    );
                    self.context.metrics.malformed_admin_records.inc();
                }
            }
            // The cursor only advances once the record is either queued or
            // durably skipped, so the safe offset can never pass unrouted work.
            self.cursor.store(record.offset + 1, Ordering::SeqCst);
            self.context
                .metrics
                .tailer_cursor
                .set((record.offset + 1) as i64);
        }
    }
}
