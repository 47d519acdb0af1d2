// Copyright (c) Venice Contributors
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Operational configurations of the admin command consumption core.
///
/// All fields should tolerate differing values across controllers of the same
/// fleet without affecting correctness; anything that must agree fleet-wide
/// belongs in the admin log schema instead.
///
/// NOTE: default values should make sense, so most operators should not need to
/// specify any field.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Parameters {
    /// Maximum number of store queues drained concurrently.
    #[serde(default = "Parameters::default_worker_pool_size")]
    pub worker_pool_size: usize,

    /// Maximum number of admin log records pulled per tailer read.
    #[serde(default = "Parameters::default_tail_batch_size")]
    pub tail_batch_size: usize,

    /// How often idle workers are matched against non-empty store queues.
    #[serde(default = "Parameters::default_schedule_interval")]
    pub schedule_interval: Duration,

    /// How often the globally safe offset is persisted. Execution-id bumps are
    /// written eagerly and are not affected by this cadence.
    #[serde(default = "Parameters::default_checkpoint_interval")]
    pub checkpoint_interval: Duration,

    /// First retry delay after a retriable handler failure. Doubles per
    /// consecutive failure of the same store queue.
    #[serde(default = "Parameters::default_retry_backoff_base")]
    pub retry_backoff_base: Duration,

    /// Upper bound on the per-store retry delay.
    #[serde(default = "Parameters::default_retry_backoff_max")]
    pub retry_backoff_max: Duration,
}

impl Parameters {
    pub fn default_worker_pool_size() -> usize {
        8
    }

    pub fn default_tail_batch_size() -> usize {
        128
    }

    pub fn default_schedule_interval() -> Duration {
        Duration::from_millis(20)
    }

    pub fn default_checkpoint_interval() -> Duration {
        Duration::from_secs(5)
    }

    pub fn default_retry_backoff_base() -> Duration {
        Duration::from_millis(100)
    }

    pub fn default_retry_backoff_max() -> Duration {
        Duration::from_secs(30)
    }
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            worker_pool_size: Parameters::default_worker_pool_size(),
            tail_batch_size: Parameters::default_tail_batch_size(),
            schedule_interval: Parameters::default_schedule_interval(),
            checkpoint_interval: Parameters::default_checkpoint_interval(),
            retry_backoff_base: Parameters::default_retry_backoff_base(),
            retry_backoff_max: Parameters::default_retry_backoff_max(),
        }
    }
}
