// Copyright (c) Venice Contributors
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AdminResult;
use crate::operation::{
    BackupStrategy, CompressionStrategy, EtlConfig, IncrementalPushPolicy, SchemaId,
};

/// What flavor of store a name refers to; drives version lifecycle handling.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreKind {
    /// Regular user-created store.
    User,
    /// Per-store metadata system store; its versions are materialized and
    /// dematerialized rather than pushed and deleted.
    MetadataSystem,
    /// Shared system store whose versions are bumped in place.
    SharedSystem,
}

/// The slice of catalog state the dispatch handlers consult before acting.
#[derive(Clone, Debug, PartialEq)]
pub struct StoreInfo {
    pub name: String,
    pub owner: String,
    pub kind: StoreKind,
    pub is_migrating: bool,
    pub migration_src_cluster: Option<String>,
    pub migration_dest_cluster: Option<String>,
    pub largest_used_version_number: i64,
}

impl StoreInfo {
    pub fn new(name: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            owner: owner.into(),
            kind: StoreKind::User,
            is_migrating: false,
            migration_src_cluster: None,
            migration_dest_cluster: None,
            largest_used_version_number: 0,
        }
    }

    pub fn with_kind(mut self, kind: StoreKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn migrating_to(mut self, dest_cluster: impl Into<String>) -> Self {
        self.is_migrating = true;
        self.migration_dest_cluster = Some(dest_cluster.into());
        self
    }
}

/// Sparse store update applied atomically by the backend. Every field is
/// optional; unset means "preserve the current value". Unlike the wire
/// payload, `current_version` carries no sentinel: absent means unchanged.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UpdateStoreRequest {
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

/// The administrative state machine mutated by admin commands: store catalog,
/// schema registry and version manager. Implementations are expected to be
/// idempotent where the admin log can legitimately replay (deletes, kills),
/// and to classify their failures via [`crate::AdminError`]: `Transient` for
/// conditions worth retrying in place, `Rejected` for permanent refusals.
#[async_trait]
pub trait AdminBackend: Send + Sync + 'static {
    async fn get_store(&self, store: &str) -> AdminResult<Option<StoreInfo>>;

    async fn create_store(
        &self,
        store: &str,
        owner: &str,
        key_schema: &str,
        value_schema: &str,
        is_system_store: bool,
    ) -> AdminResult<()>;

    /// Registers a value schema under its producer-assigned id. Must reject a
    /// conflicting registration of the same id with a different schema.
    async fn add_value_schema(
        &self,
        store: &str,
        schema_id: SchemaId,
        schema: &str,
    ) -> AdminResult<()>;

    async fn add_derived_schema(
        &self,
        store: &str,
        value_schema_id: SchemaId,
        derived_schema_id: SchemaId,
        schema: &str,
    ) -> AdminResult<()>;

    async fn add_superset_schema(
        &self,
        store: &str,
        superset_schema_id: SchemaId,
        schema: &str,
    ) -> AdminResult<()>;

    async fn set_store_readability(&self, store: &str, readable: bool) -> AdminResult<()>;

    async fn set_store_writeability(&self, store: &str, writeable: bool) -> AdminResult<()>;

    async fn set_store_current_version(&self, store: &str, version: u64) -> AdminResult<()>;

    async fn set_store_owner(&self, store: &str, owner: &str) -> AdminResult<()>;

    async fn set_store_partition_count(&self, store: &str, partition_count: u32)
        -> AdminResult<()>;

    async fn update_store(&self, store: &str, request: UpdateStoreRequest) -> AdminResult<()>;

    /// Forwards a sparse update to the migration peer cluster so both sides of
    /// a migration converge on the same configuration.
    async fn mirror_update_store(
        &self,
        peer_cluster: &str,
        store: &str,
        request: UpdateStoreRequest,
    ) -> AdminResult<()>;

    async fn delete_all_versions(&self, store: &str) -> AdminResult<()>;

    async fn delete_version(&self, store: &str, version: u64) -> AdminResult<()>;

    /// Tears down a materialized metadata system store version.
    async fn dematerialize_version(&self, store: &str, version: u64) -> AdminResult<()>;

    /// Deletes the store. `largest_used_version_number` may be the
    /// [`crate::operation::IGNORE_VERSION`] sentinel when the store is deleted
    /// mid-migration.
    async fn delete_store(&self, store: &str, largest_used_version_number: i64)
        -> AdminResult<()>;

    /// Parent-role cross-cluster migration of a store.
    async fn migrate_store(
        &self,
        src_cluster: &str,
        dest_cluster: &str,
        store: &str,
    ) -> AdminResult<()>;

    /// Child-role bookkeeping: records the migration route in the store
    /// config without moving any data.
    async fn record_migration_route(
        &self,
        store: &str,
        src_cluster: &str,
        dest_cluster: &str,
    ) -> AdminResult<()>;

    async fn abort_migration(
        &self,
        src_cluster: &str,
        dest_cluster: &str,
        store: &str,
    ) -> AdminResult<()>;

    /// Adds a version and starts ingestion for it.
    async fn add_version(
        &self,
        store: &str,
        push_job_id: &str,
        version: u64,
        partition_count: u32,
    ) -> AdminResult<()>;

    /// Forwards an add-version to the migration peer cluster.
    async fn mirror_add_version(
        &self,
        peer_cluster: &str,
        store: &str,
        push_job_id: &str,
        version: u64,
        partition_count: u32,
    ) -> AdminResult<()>;

    /// Bumps a shared system store to the given version in place.
    async fn bump_shared_system_store_version(&self, store: &str, version: u64)
        -> AdminResult<()>;

    /// Materializes a metadata system store version for a user store.
    async fn materialize_metadata_version(&self, store: &str, version: u64) -> AdminResult<()>;

    async fn kill_offline_push(&self, topic: &str) -> AdminResult<()>;
}
