// Copyright (c) Venice Contributors
// SPDX-License-Identifier: Apache-2.0

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};

use crate::operation::{AdminOperation, LogOffset};

/// An admin operation in flight between the tailer and its terminal outcome.
#[derive(Clone, Debug)]
pub(crate) struct OperationWrapper {
    pub operation: AdminOperation,
    /// Position of the record in the admin log.
    pub offset: LogOffset,
    /// Set on the first dispatch attempt and preserved across retries, so
    /// execution latency includes time spent backing off.
    pub first_attempt_at: Option<Instant>,
    pub attempt_count: u32,
}

impl OperationWrapper {
    pub(crate) fn new(operation: AdminOperation, offset: LogOffset) -> Self {
        Self {
            operation,
            offset,
            first_attempt_at: None,
            attempt_count: 0,
        }
    }
}

/// FIFO of pending operations for a single store.
///
/// The tailer is the only producer and the current lease holder the only
/// consumer. The head is peeked, not popped, until its handler succeeds, so a
/// crash or retriable failure leaves it in place. The lease bit enforces
/// single-flight: the coordinator only hands unleased queues to workers.
pub(crate) struct StoreQueue {
    store: String,
    entries: VecDeque<OperationWrapper>,
    leased: bool,
    /// Earliest instant at which the queue may be scheduled again, set by the
    /// coordinator's backoff policy after a retriable failure.
    not_before: Option<Instant>,
    consecutive_failures: u32,
}

impl StoreQueue {
    fn new(store: String) -> Self {
        Self {
            store,
            entries: VecDeque::new(),
            leased: false,
            not_before: None,
            consecutive_failures: 0,
        }
    }

    pub(crate) fn store(&self) -> &str {
        &self.store
    }

    pub(crate) fn push(&mut self, wrapper: OperationWrapper) {
        debug_assert!(
            self.entries
                .back()
                .map_or(true, |tail| tail.offset < wrapper.offset),
            "enqueue must preserve log offset order"
        );
        self.entries.push_back(wrapper);
    }

    pub(crate) fn head_mut(&mut self) -> Option<&mut OperationWrapper> {
        self.entries.front_mut()
    }

    pub(crate) fn head_offset(&self) -> Option<LogOffset> {
        self.entries.front().map(|w| w.offset)
    }

    pub(crate) fn pop(&mut self) -> Option<OperationWrapper> {
        self.entries.pop_front()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn is_leased(&self) -> bool {
        self.leased
    }

    /// Takes the lease if the queue has work, is unleased and its backoff
    /// deadline has passed.
    pub(crate) fn try_lease(&mut self, now: Instant) -> bool {
        if self.leased || self.entries.is_empty() {
            return false;
        }
        if self.not_before.is_some_and(|deadline| now < deadline) {
            return false;
        }
        self.leased = true;
        true
    }

    pub(crate) fn release_lease(&mut self) {
        self.leased = false;
    }

    /// Records a retriable failure and defers the next lease until `not_before`.
    /// Returns the consecutive failure count for backoff computation.
    pub(crate) fn record_failure(&mut self, not_before: Instant) -> u32 {
        self.consecutive_failures += 1;
        self.not_before = Some(not_before);
        self.consecutive_failures
    }

    pub(crate) fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Clears the backoff state after a drain that ended without failure.
    pub(crate) fn record_progress(&mut self) {
        self.consecutive_failures = 0;
        self.not_before = None;
    }
}

/// All live store queues, keyed by store name.
///
/// Writers of the map itself are the tailer (insert on first record for a
/// store) and the coordinator (reap). Workers never touch the map, only the
/// queues handed to them, so no map lock is held during handler execution.
pub(crate) struct QueueSet {
    queues: RwLock<BTreeMap<String, Arc<Mutex<StoreQueue>>>>,
}

impl QueueSet {
    pub(crate) fn new() -> Self {
        Self {
            queues: RwLock::new(BTreeMap::new()),
        }
    }

    /// Appends a wrapper to its store's queue, creating the queue on first use.
    pub(crate) fn enqueue(&self, store: &str, wrapper: OperationWrapper) {
        if let Some(queue) = self.queues.read().get(store) {
            queue.lock().push(wrapper);
            return;
        }
        let queue = self
            .queues
            .write()
            .entry(store.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(StoreQueue::new(store.to_string()))))
            .clone();
        queue.lock().push(wrapper);
    }

    pub(crate) fn get(&self, store: &str) -> Option<Arc<Mutex<StoreQueue>>> {
        self.queues.read().get(store).cloned()
    }

    pub(crate) fn snapshot(&self) -> Vec<Arc<Mutex<StoreQueue>>> {
        self.queues.read().values().cloned().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.queues.read().len()
    }

    /// Smallest head offset across non-empty queues, or None if every queue is
    /// empty. Input to the globally safe offset.
    pub(crate) fn min_head_offset(&self) -> Option<LogOffset> {
        self.queues
            .read()
            .values()
            .filter_map(|q| q.lock().head_offset())
            .min()
    }

    pub(crate) fn pending_operations(&self) -> usize {
        self.queues.read().values().map(|q| q.lock().len()).sum()
    }

    /// Drops queues that are empty and unleased. Returns how many were reaped.
    pub(crate) fn reap_idle(&self) -> usize {
        let mut queues = self.queues.write();
        let before = queues.len();
        queues.retain(|_, queue| {
            let queue = queue.lock();
            !queue.is_empty() || queue.is_leased()
        });
        before - queues.len()
    }
}
