// Copyright (c) Venice Contributors
// SPDX-License-Identifier: Apache-2.0

//! Admin command consumption core.
//!
//! Control-plane mutations reach each datacenter through a single-partition,
//! append-only admin log. This crate tails that log, partitions work by store,
//! executes every command in per-store order with in-place retry, deduplicates
//! replays against a durable per-store execution-id watermark and checkpoints
//! the globally safe offset.
//!
//! The durable log, the administrative state machine, leadership election and
//! watermark persistence are collaborators behind the [`LogStream`],
//! [`AdminBackend`], [`LeaderOracle`] and [`WatermarkStore`] traits.

mod backend;
mod codec;
mod context;
mod coordinator;
mod dispatch;
mod error;
mod leader;
mod log_stream;
mod metrics;
mod operation;
mod store_queue;
mod tailer;
pub mod testing;
mod watermark;
mod worker;

pub use backend::{AdminBackend, StoreInfo, StoreKind, UpdateStoreRequest};
pub use codec::OperationCodec;
pub use coordinator::{Coordinator, CoordinatorHandle};
pub use error::{AdminError, AdminResult, FailureClass};
pub use leader::{LeaderOracle, StaticLeaderOracle};
pub use log_stream::{LogRecord, LogStream, MemLogStream};
pub use operation::{
    store_name_from_topic, timestamp_utc_ms, AbortMigration, AddVersion, AdminOperation,
    AdminOperationKind, AdminPayload, BackupStrategy, CompressionStrategy, DeleteOldVersion,
    DeleteStore, DerivedSchemaCreation, EtlConfig, ExecutionId, IncrementalPushPolicy,
    KillOfflinePushJob, LogOffset, MigrateStore, SchemaId, SetStoreCurrentVersion, SetStoreOwner,
    SetStorePartition, StoreCreation, StoreTarget, SupersetSchemaCreation, UpdateStorePayload,
    ValueSchemaCreation, CLUSTER_SCOPE_STORE, IGNORED_CURRENT_VERSION, IGNORE_VERSION,
};
pub use watermark::{MemWatermarkStore, WatermarkStore};
