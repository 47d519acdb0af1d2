// Copyright (c) Venice Contributors
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, EnumDiscriminants};

/// Position of a record in the single-partition admin log.
pub type LogOffset = u64;

/// Producer-assigned id of an admin command, strictly increasing per producer.
/// Used to deduplicate replays across log retention and rewind.
pub type ExecutionId = u64;

/// Identifier of a schema registered for a store. Assigned by the producer and
/// carried explicitly so every datacenter registers the same id.
pub type SchemaId = i32;

/// Store key under which operations whose affected store cannot be derived are
/// serialized. Keeps such records ordered with respect to each other without
/// blocking any real store queue.
pub const CLUSTER_SCOPE_STORE: &str = "__cluster_scope__";

/// Inside an UpdateStore payload: "do not change the current version". The log
/// schema mandates this sentinel; it is translated away before the sparse
/// update request reaches the backend.
pub const IGNORED_CURRENT_VERSION: i64 = -1;

/// Passed as the largest used version number when deleting a store that is
/// mid-migration, so the destination cluster keeps its own version counter.
pub const IGNORE_VERSION: i64 = -2;

pub fn timestamp_utc_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// One command read from the admin log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AdminOperation {
    pub execution_id: ExecutionId,
    pub payload: AdminPayload,
    /// Wall clock of the producing controller when the command was written.
    pub producer_timestamp_ms: u64,
    /// Wall clock of the local broker when the record landed in the log.
    pub broker_timestamp_ms: u64,
}

impl AdminOperation {
    pub fn kind(&self) -> AdminOperationKind {
        self.payload.kind()
    }

    /// The store whose queue serializes this operation.
    pub fn store_key(&self) -> String {
        self.payload.store_key()
    }
}

/// The closed set of admin command payloads. Adding a variant is a deliberate
/// schema evolution of the record envelope and the dispatch table together.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, EnumDiscriminants)]
#[strum_discriminants(
    name(AdminOperationKind),
    derive(AsRefStr),
    strum(serialize_all = "SCREAMING_SNAKE_CASE")
)]
pub enum AdminPayload {
    StoreCreation(StoreCreation),
    ValueSchemaCreation(ValueSchemaCreation),
    DerivedSchemaCreation(DerivedSchemaCreation),
    SupersetSchemaCreation(SupersetSchemaCreation),
    DisableStoreWrite(StoreTarget),
    EnableStoreWrite(StoreTarget),
    DisableStoreRead(StoreTarget),
    EnableStoreRead(StoreTarget),
    KillOfflinePushJob(KillOfflinePushJob),
    DeleteAllVersions(StoreTarget),
    SetStoreCurrentVersion(SetStoreCurrentVersion),
    SetStoreOwner(SetStoreOwner),
    SetStorePartition(SetStorePartition),
    UpdateStore(UpdateStorePayload),
    DeleteStore(DeleteStore),
    DeleteOldVersion(DeleteOldVersion),
    MigrateStore(MigrateStore),
    AbortMigration(AbortMigration),
    AddVersion(AddVersion),
}

impl AdminPayload {
    pub fn kind(&self) -> AdminOperationKind {
        AdminOperationKind::from(self)
    }

    pub fn store_key(&self) -> String {
        match self {
            AdminPayload::StoreCreation(p) => p.store_name.clone(),
            AdminPayload::ValueSchemaCreation(p) => p.store_name.clone(),
            AdminPayload::DerivedSchemaCreation(p) => p.store_name.clone(),
            AdminPayload::SupersetSchemaCreation(p) => p.store_name.clone(),
            AdminPayload::DisableStoreWrite(p)
            | AdminPayload::EnableStoreWrite(p)
            | AdminPayload::DisableStoreRead(p)
            | AdminPayload::EnableStoreRead(p)
            | AdminPayload::DeleteAllVersions(p) => p.store_name.clone(),
            AdminPayload::KillOfflinePushJob(p) => store_name_from_topic(&p.topic)
                .unwrap_or_else(|| CLUSTER_SCOPE_STORE.to_string()),
            AdminPayload::SetStoreCurrentVersion(p) => p.store_name.clone(),
            AdminPayload::SetStoreOwner(p) => p.store_name.clone(),
            AdminPayload::SetStorePartition(p) => p.store_name.clone(),
            AdminPayload::UpdateStore(p) => p.store_name.clone(),
            AdminPayload::DeleteStore(p) => p.store_name.clone(),
            AdminPayload::DeleteOldVersion(p) => p.store_name.clone(),
            AdminPayload::MigrateStore(p) => p.store_name.clone(),
            AdminPayload::AbortMigration(p) => p.store_name.clone(),
            AdminPayload::AddVersion(p) => p.store_name.clone(),
        }
    }
}

/// Version topics are named `<store>_v<version>`; the kill command identifies a
/// push by topic only, so the store is derived back from the name.
pub fn store_name_from_topic(topic: &str) -> Option<String> {
    let (store, version) = topic.rsplit_once("_v")?;
    if store.is_empty() || version.is_empty() || !version.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(store.to_string())
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoreCreation {
    pub store_name: String,
    pub owner: String,
    pub key_schema: String,
    pub value_schema: String,
    pub is_system_store: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValueSchemaCreation {
    pub store_name: String,
    pub schema_id: SchemaId,
    pub schema: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DerivedSchemaCreation {
    pub store_name: String,
    pub value_schema_id: SchemaId,
    pub derived_schema_id: SchemaId,
    pub schema: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SupersetSchemaCreation {
    pub store_name: String,
    pub superset_schema_id: SchemaId,
    pub superset_schema: String,
}

/// Payload of the kinds that only name the store they act on.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoreTarget {
    pub store_name: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KillOfflinePushJob {
    /// Version topic of the push to kill.
    pub topic: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SetStoreCurrentVersion {
    pub store_name: String,
    pub version: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SetStoreOwner {
    pub store_name: String,
    pub owner: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SetStorePartition {
    pub store_name: String,
    pub partition_count: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeleteStore {
    pub store_name: String,
    pub largest_used_version_number: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeleteOldVersion {
    pub store_name: String,
    pub version: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MigrateStore {
    pub store_name: String,
    pub src_cluster: String,
    pub dest_cluster: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AbortMigration {
    pub store_name: String,
    pub src_cluster: String,
    pub dest_cluster: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AddVersion {
    pub store_name: String,
    /// Push job that produced the version; used for idempotent re-push checks.
    pub push_job_id: String,
    pub version_number: u64,
    pub partition_count: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompressionStrategy {
    NoOp,
    Gzip,
    Zstd,
    ZstdWithDict,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackupStrategy {
    KeepMinVersions,
    DeleteOnNewPushStart,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum IncrementalPushPolicy {
    PushToVersionTopic,
    IncrementalPushSameAsRealTime,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EtlConfig {
    pub regular_version_etl_enabled: bool,
    pub future_version_etl_enabled: bool,
    pub etled_user_proxy_account: String,
}

/// Wire form of an UpdateStore command. Every field is optional; unset means
/// "do not change". `current_version` additionally carries the
/// `IGNORED_CURRENT_VERSION` sentinel because the log schema predates optional
/// fields for it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateStorePayload {
    pub store_name: String,
    pub owner: Option<String>,
    pub enable_reads: Option<bool>,
    pub enable_writes: Option<bool>,
    pub partition_count: Option<u32>,
    pub partitioner_class: Option<String>,
    pub partitioner_params: Option<BTreeMap<String, String>>,
    pub amplification_factor: Option<u32>,
    pub storage_quota_in_byte: Option<i64>,
    pub hybrid_store_overhead_bypass: Option<bool>,
    pub read_quota_in_cu: Option<i64>,
    pub current_version: Option<i64>,
    pub hybrid_rewind_seconds: Option<i64>,
    pub hybrid_offset_lag_threshold: Option<i64>,
    pub access_controlled: Option<bool>,
    pub compression_strategy: Option<CompressionStrategy>,
    pub client_decompression_enabled: Option<bool>,
    pub chunking_enabled: Option<bool>,
    pub single_get_router_cache_enabled: Option<bool>,
    pub batch_get_router_cache_enabled: Option<bool>,
    pub batch_get_limit: Option<i32>,
    pub num_versions_to_preserve: Option<i32>,
    pub incremental_push_enabled: Option<bool>,
    pub is_migrating: Option<bool>,
    pub write_computation_enabled: Option<bool>,
    pub read_computation_enabled: Option<bool>,
    pub bootstrap_to_online_timeout_in_hours: Option<i32>,
    pub leader_follower_model: Option<bool>,
    pub backup_strategy: Option<BackupStrategy>,
    pub schema_auto_register_from_push_job_enabled: Option<bool>,
    pub hybrid_store_disk_quota_enabled: Option<bool>,
    pub replication_factor: Option<i32>,
    pub etl_config: Option<EtlConfig>,
    pub largest_used_version_number: Option<i64>,
    pub native_replication_enabled: Option<bool>,
    pub push_stream_source_address: Option<String>,
    pub incremental_push_policy: Option<IncrementalPushPolicy>,
    pub backup_version_retention_ms: Option<i64>,
}
