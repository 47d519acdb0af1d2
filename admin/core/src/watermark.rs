// Copyright (c) Venice Contributors
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::{AdminError, AdminResult};
use crate::operation::{ExecutionId, LogOffset};

/// Durable progress store for admin consumption, keyed per cluster.
///
/// Conceptual layout:
/// - `/<cluster>/offset` — the globally safe log offset, monotonic.
/// - `/<cluster>/execId/<store>` — last succeeded execution id, monotonic.
///
/// Implementations must provide read-your-writes per key; both writes reject
/// regressions so a stale controller can never roll progress back.
#[async_trait]
pub trait WatermarkStore: Send + Sync + 'static {
    async fn read_offset(&self, cluster: &str) -> AdminResult<Option<LogOffset>>;

    /// Persists the safe offset. Equal rewrites are accepted as no-ops;
    /// smaller values fail with [`AdminError::WatermarkRegression`].
    async fn write_offset(&self, cluster: &str, offset: LogOffset) -> AdminResult<()>;

    async fn read_exec_ids(&self, cluster: &str) -> AdminResult<BTreeMap<String, ExecutionId>>;

    /// Compare-and-set bump of a store's last succeeded execution id.
    /// Accepted iff `id` is strictly greater than the current value.
    async fn bump_exec_id(&self, cluster: &str, store: &str, id: ExecutionId) -> AdminResult<()>;
}

/// In-memory watermark store for tests and single-process tooling.
#[derive(Default)]
pub struct MemWatermarkStore {
    inner: RwLock<MemWatermarkInner>,
}

#[derive(Default)]
struct MemWatermarkInner {
    offsets: BTreeMap<String, LogOffset>,
    exec_ids: BTreeMap<String, BTreeMap<String, ExecutionId>>,
}

impl MemWatermarkStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WatermarkStore for MemWatermarkStore {
    async fn read_offset(&self, cluster: &str) -> AdminResult<Option<LogOffset>> {
        Ok(self.inner.read().offsets.get(cluster).copied())
    }

    async fn write_offset(&self, cluster: &str, offset: LogOffset) -> AdminResult<()> {
        let mut inner = self.inner.write();
        if let Some(&current) = inner.offsets.get(cluster) {
            if offset < current {
                return Err(AdminError::WatermarkRegression {
                    scope: format!("{cluster}/offset"),
                    current,
                    attempted: offset,
                });
            }
        }
        inner.offsets.insert(cluster.to_string(), offset);
        Ok(())
    }

    async fn read_exec_ids(&self, cluster: &str) -> AdminResult<BTreeMap<String, ExecutionId>> {
        Ok(self
            .inner
            .read()
            .exec_ids
            .get(cluster)
            .cloned()
            .unwrap_or_default())
    }

    async fn bump_exec_id(&self, cluster: &str, store: &str, id: ExecutionId) -> AdminResult<()> {
        let mut inner = self.inner.write();
        let per_store = inner.exec_ids.entry(cluster.to_string()).or_default();
        let current = per_store.get(store).copied().unwrap_or(0);
        if id <= current {
            return Err(AdminError::WatermarkRegression {
                scope: format!("{cluster}/execId/{store}"),
                current,
                attempted: id,
            });
        }
        per_store.insert(store.to_string(), id);
        Ok(())
    }
}
