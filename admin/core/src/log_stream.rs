// Copyright (c) Venice Contributors
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::AdminResult;
use crate::operation::LogOffset;

/// One raw record read from the admin log.
#[derive(Clone, Debug, PartialEq)]
pub struct LogRecord {
    pub offset: LogOffset,
    pub payload: Bytes,
}

/// Consumer view of the single-partition admin log. Implementations wrap the
/// durable log's consumer API; this core only ever runs one cursor.
#[async_trait]
pub trait LogStream: Send + Sync + 'static {
    /// Repositions the cursor so the next batch starts at or after `offset`.
    async fn seek(&self, offset: LogOffset) -> AdminResult<()>;

    /// Returns the next records in offset order, at most `max_records` of
    /// them. Waits until at least one record is available.
    ///
    /// Must be cancel-safe: records count as delivered only when the future
    /// resolves, so dropping it mid-wait loses nothing.
    async fn next_batch(&self, max_records: usize) -> AdminResult<Vec<LogRecord>>;
}

/// In-memory admin log used by tests and local tooling. Offsets are assigned
/// densely in append order, mirroring a single log partition.
#[derive(Default)]
pub struct MemLogStream {
    inner: Mutex<MemLogInner>,
    notify: Notify,
}

#[derive(Default)]
struct MemLogInner {
    records: Vec<LogRecord>,
    cursor: LogOffset,
}

impl MemLogStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a payload and returns its assigned offset.
    pub fn append(&self, payload: Bytes) -> LogOffset {
        let offset = {
            let mut inner = self.inner.lock();
            let offset = inner.records.len() as LogOffset;
            inner.records.push(LogRecord { offset, payload });
            offset
        };
        self.notify.notify_waiters();
        offset
    }

    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().records.is_empty()
    }
}

#[async_trait]
impl LogStream for MemLogStream {
    async fn seek(&self, offset: LogOffset) -> AdminResult<()> {
        self.inner.lock().cursor = offset;
        Ok(())
    }

    async fn next_batch(&self, max_records: usize) -> AdminResult<Vec<LogRecord>> {
        loop {
            // Register for wakeup before checking, so an append between the
            // check and the await is not lost.
            let notified = self.notify.notified();
            {
                let mut inner = self.inner.lock();
                let cursor = inner.cursor;
                let batch: Vec<LogRecord> = inner
                    .records
                    .iter()
                    .filter(|r| r.offset >= cursor)
                    .take(max_records)
                    .cloned()
                    .collect();
                if let Some(last) = batch.last() {
                    inner.cursor = last.offset + 1;
                    return Ok(batch);
                }
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn batches_preserve_offset_order() {
        let log = MemLogStream::new();
        assert_eq!(log.append(Bytes::from_static(b"a")), 0);
        assert_eq!(log.append(Bytes::from_static(b"b")), 1);
        assert_eq!(log.append(Bytes::from_static(b"c")), 2);

        let batch = log.next_batch(2).await.unwrap();
        assert_eq!(
            batch.iter().map(|r| r.offset).collect::<Vec<_>>(),
            vec![0, 1]
        );
        let batch = log.next_batch(10).await.unwrap();
        assert_eq!(batch.iter().map(|r| r.offset).collect::<Vec<_>>(), vec![2]);
    }

    #[tokio::test]
    async fn seek_rewinds_the_cursor() {
        let log = MemLogStream::new();
        log.append(Bytes::from_static(b"a"));
        log.append(Bytes::from_static(b"b"));
        log.next_batch(10).await.unwrap();

        log.seek(1).await.unwrap();
        let batch = log.next_batch(10).await.unwrap();
        assert_eq!(batch.iter().map(|r| r.offset).collect::<Vec<_>>(), vec![1]);
    }

    #[tokio::test]
    async fn next_batch_waits_for_appends() {
        let log = std::sync::Arc::new(MemLogStream::new());
        let reader = {
            let log = log.clone();
            tokio::spawn(async move { log.next_batch(1).await })
        };
        tokio::task::yield_now().await;
        log.append(Bytes::from_static(b"late"));
        let batch = reader.await.unwrap().unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].offset, 0);
    }
}
