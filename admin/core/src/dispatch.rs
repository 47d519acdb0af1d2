// Copyright (c) Venice Contributors
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use tracing::{info, warn};

use crate::backend::{AdminBackend, StoreKind, UpdateStoreRequest};
use crate::context::Context;
use crate::error::{AdminError, AdminResult};
use crate::operation::{
    AddVersion, AdminOperation, AdminPayload, DeleteOldVersion, DeleteStore, KillOfflinePushJob,
    MigrateStore, StoreCreation, UpdateStorePayload, IGNORED_CURRENT_VERSION, IGNORE_VERSION,
};

/// Routes each admin operation kind to its administrative side effects.
///
/// This is the only place the deployment role is consulted: a handful of kinds
/// behave differently in a parent controller (cross-cluster fan-out) than in a
/// child controller (local application).
pub(crate) struct DispatchTable {
    context: Arc<Context>,
    backend: Arc<dyn AdminBackend>,
}

impl DispatchTable {
    pub(crate) fn new(context: Arc<Context>, backend: Arc<dyn AdminBackend>) -> Self {
        Self { context, backend }
    }

    pub(crate) async fn dispatch(&self, operation: &AdminOperation) -> AdminResult<()> {
        match &operation.payload {
            AdminPayload::StoreCreation(p) => self.handle_store_creation(p).await,
            AdminPayload::ValueSchemaCreation(p) => {
                self.backend
                    .add_value_schema(&p.store_name, p.schema_id, &p.schema)
                    .await
            }
            AdminPayload::DerivedSchemaCreation(p) => {
                self.backend
                    .add_derived_schema(
                        &p.store_name,
                        p.value_schema_id,
                        p.derived_schema_id,
                        &p.schema,
                    )
                    .await
            }
            AdminPayload::SupersetSchemaCreation(p) => {
                self.backend
                    .add_superset_schema(&p.store_name, p.superset_schema_id, &p.superset_schema)
                    .await
            }
            AdminPayload::DisableStoreWrite(p) => {
                self.backend
                    .set_store_writeability(&p.store_name, false)
                    .await
            }
            AdminPayload::EnableStoreWrite(p) => {
                self.backend
                    .set_store_writeability(&p.store_name, true)
                    .await
            }
            AdminPayload::DisableStoreRead(p) => {
                self.backend
                    .set_store_readability(&p.store_name, false)
                    .await
            }
            AdminPayload::EnableStoreRead(p) => {
                self.backend.set_store_readability(&p.store_name, true).await
            }
            AdminPayload::KillOfflinePushJob(p) => self.handle_kill_offline_push(p).await,
            AdminPayload::DeleteAllVersions(p) => {
                self.backend.delete_all_versions(&p.store_name).await
            }
            AdminPayload::SetStoreCurrentVersion(p) => {
                self.backend
                    .set_store_current_version(&p.store_name, p.version)
                    .await
            }
            AdminPayload::SetStoreOwner(p) => {
                self.backend.set_store_owner(&p.store_name, &p.owner).await
            }
            AdminPayload::SetStorePartition(p) => {
                self.backend
                    .set_store_partition_count(&p.store_name, p.partition_count)
                    .await
            }
            AdminPayload::UpdateStore(p) => self.handle_update_store(p).await,
            AdminPayload::DeleteStore(p) => self.handle_delete_store(p).await,
            AdminPayload::DeleteOldVersion(p) => self.handle_delete_old_version(p).await,
            AdminPayload::MigrateStore(p) => self.handle_migrate_store(p).await,
            AdminPayload::AbortMigration(p) => {
                self.backend
                    .abort_migration(&p.src_cluster, &p.dest_cluster, &p.store_name)
                    .await
            }
            AdminPayload::AddVersion(p) => self.handle_add_version(p).await,
        }
    }

    /// Store creation replays whenever the log is reconsumed, so an existing
    /// store is a skip, not a conflict.
    async fn handle_store_creation(&self, p: &StoreCreation) -> AdminResult<()> {
        if self.backend.get_store(&p.store_name).await?.is_some() {
            info!(store = %p.store_name, "store already exists, skipping creation");
            return Ok(());
        }
        self.backend
            .create_store(
                &p.store_name,
                &p.owner,
                &p.key_schema,
                &p.value_schema,
                p.is_system_store,
            )
            .await
    }

    async fn handle_update_store(&self, p: &UpdateStorePayload) -> AdminResult<()> {
        let request = sparse_update_request(p);
        self.backend
            .update_store(&p.store_name, request.clone())
            .await?;

        // While a store migrates, the parent keeps both sides of the migration
        // configured identically. The migrating flag is read back after the
        // update so an update that starts the migration also mirrors.
        if self.context.role.is_parent() {
            if let Some(info) = self.backend.get_store(&p.store_name).await? {
                if info.is_migrating {
                    if let Some(dest) = &info.migration_dest_cluster {
                        self.backend
                            .mirror_update_store(dest, &p.store_name, request)
                            .await?;
                    }
                }
            }
        }
        Ok(())
    }

    async fn handle_delete_store(&self, p: &DeleteStore) -> AdminResult<()> {
        let migrating = self
            .backend
            .get_store(&p.store_name)
            .await?
            .is_some_and(|info| info.is_migrating);
        // Deleting the source copy of a migrating store must not clamp the
        // destination's version counter.
        let largest = if migrating {
            IGNORE_VERSION
        } else {
            p.largest_used_version_number
        };
        self.backend.delete_store(&p.store_name, largest).await
    }

    async fn handle_delete_old_version(&self, p: &DeleteOldVersion) -> AdminResult<()> {
        match self.backend.get_store(&p.store_name).await? {
            Some(info) if info.kind == StoreKind::MetadataSystem => {
                self.backend
                    .dematerialize_version(&p.store_name, p.version)
                    .await
            }
            Some(_) => self.backend.delete_version(&p.store_name, p.version).await,
            None => {
                warn!(store = %p.store_name, version = p.version, "store not found, nothing to delete");
                Ok(())
            }
        }
    }

    async fn handle_migrate_store(&self, p: &MigrateStore) -> AdminResult<()> {
        if self.context.role.is_parent() {
            self.backend
                .migrate_store(&p.src_cluster, &p.dest_cluster, &p.store_name)
                .await
        } else {
            self.backend
                .record_migration_route(&p.store_name, &p.src_cluster, &p.dest_cluster)
                .await
        }
    }

    async fn handle_add_version(&self, p: &AddVersion) -> AdminResult<()> {
        if self.context.role.is_parent() {
            self.backend
                .add_version(
                    &p.store_name,
                    &p.push_job_id,
                    p.version_number,
                    p.partition_count,
                )
                .await?;
            if let Some(info) = self.backend.get_store(&p.store_name).await? {
                if info.is_migrating {
                    if let Some(dest) = &info.migration_dest_cluster {
                        self.backend
                            .mirror_add_version(
                                dest,
                                &p.store_name,
                                &p.push_job_id,
                                p.version_number,
                                p.partition_count,
                            )
                            .await?;
                    }
                }
            }
            return Ok(());
        }

        match self.backend.get_store(&p.store_name).await?.map(|i| i.kind) {
            Some(StoreKind::SharedSystem) => {
                self.backend
                    .bump_shared_system_store_version(&p.store_name, p.version_number)
                    .await
            }
            Some(StoreKind::MetadataSystem) => {
                self.backend
                    .materialize_metadata_version(&p.store_name, p.version_number)
                    .await
            }
            _ => {
                self.backend
                    .add_version(
                        &p.store_name,
                        &p.push_job_id,
                        p.version_number,
                        p.partition_count,
                    )
                    .await
            }
        }
    }

    /// Parent controllers never run pushes themselves; the kill is meaningful
    /// only where ingestion happens.
    async fn handle_kill_offline_push(&self, p: &KillOfflinePushJob) -> AdminResult<()> {
        if self.context.role.is_parent() {
            return Err(AdminError::UnsupportedOperation(format!(
                "kill offline push for topic {} targets child clusters only",
                p.topic
            )));
        }
        self.backend.kill_offline_push(&p.topic).await
    }
}

/// Builds the sparse backend request from the wire payload, translating the
/// current-version sentinel into plain absence.
fn sparse_update_request(p: &UpdateStorePayload) -> UpdateStoreRequest {
    UpdateStoreRequest {
        owner: p.owner.clone(),
        enable_reads: p.enable_reads,
        enable_writes: p.enable_writes,
        partition_count: p.partition_count,
        partitioner_class: p.partitioner_class.clone(),
        partitioner_params: p.partitioner_params.clone(),
        amplification_factor: p.amplification_factor,
        storage_quota_in_byte: p.storage_quota_in_byte,
        hybrid_store_overhead_bypass: p.hybrid_store_overhead_bypass,
        read_quota_in_cu: p.read_quota_in_cu,
        current_version: p
            .current_version
            .filter(|version| *version != IGNORED_CURRENT_VERSION),
        hybrid_rewind_seconds: p.hybrid_rewind_seconds,
        hybrid_offset_lag_threshold: p.hybrid_offset_lag_threshold,
        access_controlled: p.access_controlled,
        compression_strategy: p.compression_strategy,
        client_decompression_enabled: p.client_decompression_enabled,
        chunking_enabled: p.chunking_enabled,
        single_get_router_cache_enabled: p.single_get_router_cache_enabled,
        batch_get_router_cache_enabled: p.batch_get_router_cache_enabled,
        batch_get_limit: p.batch_get_limit,
        num_versions_to_preserve: p.num_versions_to_preserve,
        incremental_push_enabled: p.incremental_push_enabled,
        is_migrating: p.is_migrating,
        write_computation_enabled: p.write_computation_enabled,
        read_computation_enabled: p.read_computation_enabled,
        bootstrap_to_online_timeout_in_hours: p.bootstrap_to_online_timeout_in_hours,
        leader_follower_model: p.leader_follower_model,
        backup_strategy: p.backup_strategy,
        schema_auto_register_from_push_job_enabled: p.schema_auto_register_from_push_job_enabled,
        hybrid_store_disk_quota_enabled: p.hybrid_store_disk_quota_enabled,
        replication_factor: p.replication_factor,
        etl_config: p.etl_config.clone(),
        largest_used_version_number: p.largest_used_version_number,
        native_replication_enabled: p.native_replication_enabled,
        push_stream_source_address: p.push_stream_source_address.clone(),
        incremental_push_policy: p.incremental_push_policy,
        backup_version_retention_ms: p.backup_version_retention_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use admin_config::ClusterRole;

    use crate::backend::StoreInfo;
    use crate::operation::{AbortMigration, SetStoreOwner};
    use crate::testing::{BackendCall, RecordingBackend};

    fn operation(payload: AdminPayload) -> AdminOperation {
        AdminOperation {
            execution_id: 1,
            payload,
            producer_timestamp_ms: 0,
            broker_timestamp_ms: 0,
        }
    }

    fn table(role: ClusterRole, backend: Arc<RecordingBackend>) -> DispatchTable {
        DispatchTable::new(Arc::new(Context::new_for_test(role)), backend)
    }

    #[tokio::test]
    async fn store_creation_is_idempotent() {
        let backend = Arc::new(RecordingBackend::new());
        let table = table(ClusterRole::Child, backend.clone());
        let op = operation(AdminPayload::StoreCreation(StoreCreation {
            store_name: "profiles".to_string(),
            owner: "identity-team".to_string(),
            key_schema: "\"string\"".to_string(),
            value_schema: "\"bytes\"".to_string(),
            is_system_store: false,
        }));

        table.dispatch(&op).await.unwrap();
        table.dispatch(&op).await.unwrap();

        // The replay is skipped, not rejected.
        assert_eq!(
            backend.calls(),
            vec![BackendCall::CreateStore {
                store: "profiles".to_string(),
                owner: "identity-team".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn kill_push_is_unsupported_in_parent() {
        let backend = Arc::new(RecordingBackend::new());
        let table = table(ClusterRole::Parent, backend.clone());
        let op = operation(AdminPayload::KillOfflinePushJob(KillOfflinePushJob {
            topic: "profiles_v4".to_string(),
        }));

        let err = table.dispatch(&op).await.unwrap_err();
        assert!(matches!(err, AdminError::UnsupportedOperation(_)));
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn kill_push_runs_in_child() {
        let backend = Arc::new(RecordingBackend::new());
        let table = table(ClusterRole::Child, backend.clone());
        let op = operation(AdminPayload::KillOfflinePushJob(KillOfflinePushJob {
            topic: "profiles_v4".to_string(),
        }));

        table.dispatch(&op).await.unwrap();
        assert_eq!(
            backend.calls(),
            vec![BackendCall::KillOfflinePush {
                topic: "profiles_v4".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn migrate_store_branches_on_role() {
        let payload = AdminPayload::MigrateStore(MigrateStore {
            store_name: "profiles".to_string(),
            src_cluster: "venice-0".to_string(),
            dest_cluster: "venice-1".to_string(),
        });

        let parent_backend = Arc::new(RecordingBackend::new());
        table(ClusterRole::Parent, parent_backend.clone())
            .dispatch(&operation(payload.clone()))
            .await
            .unwrap();
        assert_eq!(
            parent_backend.calls(),
            vec![BackendCall::MigrateStore {
                src_cluster: "venice-0".to_string(),
                dest_cluster: "venice-1".to_string(),
                store: "profiles".to_string(),
            }]
        );

        let child_backend = Arc::new(RecordingBackend::new());
        table(ClusterRole::Child, child_backend.clone())
            .dispatch(&operation(payload))
            .await
            .unwrap();
        assert_eq!(
            child_backend.calls(),
            vec![BackendCall::RecordMigrationRoute {
                store: "profiles".to_string(),
                src_cluster: "venice-0".to_string(),
                dest_cluster: "venice-1".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn delete_store_uses_sentinel_while_migrating() {
        let backend = Arc::new(RecordingBackend::new());
        backend.put_store(StoreInfo::new("profiles", "identity-team").migrating_to("venice-1"));
        let table = table(ClusterRole::Child, backend.clone());

        table
            .dispatch(&operation(AdminPayload::DeleteStore(DeleteStore {
                store_name: "profiles".to_string(),
                largest_used_version_number: 12,
            })))
            .await
            .unwrap();

        assert_eq!(
            backend.calls(),
            vec![BackendCall::DeleteStore {
                store: "profiles".to_string(),
                largest_used_version_number: IGNORE_VERSION,
            }]
        );
    }

    #[tokio::test]
    async fn delete_store_passes_largest_version_when_not_migrating() {
        let backend = Arc::new(RecordingBackend::new());
        backend.put_store(StoreInfo::new("profiles", "identity-team"));
        let table = table(ClusterRole::Child, backend.clone());

        table
            .dispatch(&operation(AdminPayload::DeleteStore(DeleteStore {
                store_name: "profiles".to_string(),
                largest_used_version_number: 12,
            })))
            .await
            .unwrap();

        assert_eq!(
            backend.calls(),
            vec![BackendCall::DeleteStore {
                store: "profiles".to_string(),
                largest_used_version_number: 12,
            }]
        );
    }

    #[tokio::test]
    async fn delete_old_version_dematerializes_metadata_stores() {
        let backend = Arc::new(RecordingBackend::new());
        backend.put_store(
            StoreInfo::new("profiles_meta", "venice").with_kind(StoreKind::MetadataSystem),
        );
        backend.put_store(StoreInfo::new("profiles", "identity-team"));
        let table = table(ClusterRole::Child, backend.clone());

        table
            .dispatch(&operation(AdminPayload::DeleteOldVersion(DeleteOldVersion {
                store_name: "profiles_meta".to_string(),
                version: 3,
            })))
            .await
            .unwrap();
        table
            .dispatch(&operation(AdminPayload::DeleteOldVersion(DeleteOldVersion {
                store_name: "profiles".to_string(),
                version: 3,
            })))
            .await
            .unwrap();

        assert_eq!(
            backend.calls(),
            vec![
                BackendCall::DematerializeVersion {
                    store: "profiles_meta".to_string(),
                    version: 3,
                },
                BackendCall::DeleteVersion {
                    store: "profiles".to_string(),
                    version: 3,
                },
            ]
        );
    }

    #[tokio::test]
    async fn update_store_mirrors_to_peer_while_migrating_in_parent() {
        let backend = Arc::new(RecordingBackend::new());
        backend.put_store(StoreInfo::new("profiles", "identity-team").migrating_to("venice-1"));
        let table = table(ClusterRole::Parent, backend.clone());

        table
            .dispatch(&operation(AdminPayload::UpdateStore(UpdateStorePayload {
                store_name: "profiles".to_string(),
                enable_writes: Some(false),
                current_version: Some(IGNORED_CURRENT_VERSION),
                ..Default::default()
            })))
            .await
            .unwrap();

        let calls = backend.calls();
        assert_eq!(calls.len(), 2);
        match &calls[0] {
            BackendCall::UpdateStore { store, request } => {
                assert_eq!(store, "profiles");
                assert_eq!(request.enable_writes, Some(false));
                // The sentinel never reaches the backend.
                assert_eq!(request.current_version, None);
            }
            other => panic!("expected UpdateStore, got {other:?}"),
        }
        assert_eq!(
            calls[1],
            BackendCall::MirrorUpdateStore {
                peer_cluster: "venice-1".to_string(),
                store: "profiles".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn update_store_does_not_mirror_in_child() {
        let backend = Arc::new(RecordingBackend::new());
        backend.put_store(StoreInfo::new("profiles", "identity-team").migrating_to("venice-1"));
        let table = table(ClusterRole::Child, backend.clone());

        table
            .dispatch(&operation(AdminPayload::UpdateStore(UpdateStorePayload {
                store_name: "profiles".to_string(),
                enable_writes: Some(false),
                ..Default::default()
            })))
            .await
            .unwrap();

        assert_eq!(backend.calls().len(), 1);
    }

    #[tokio::test]
    async fn add_version_branches_on_store_kind_in_child() {
        let backend = Arc::new(RecordingBackend::new());
        backend.put_store(
            StoreInfo::new("shared_metrics", "venice").with_kind(StoreKind::SharedSystem),
        );
        backend.put_store(
            StoreInfo::new("profiles_meta", "venice").with_kind(StoreKind::MetadataSystem),
        );
        backend.put_store(StoreInfo::new("profiles", "identity-team"));
        let table = table(ClusterRole::Child, backend.clone());

        for store in ["shared_metrics", "profiles_meta", "profiles"] {
            table
                .dispatch(&operation(AdminPayload::AddVersion(AddVersion {
                    store_name: store.to_string(),
                    push_job_id: "push-7".to_string(),
                    version_number: 7,
                    partition_count: 4,
                })))
                .await
                .unwrap();
        }

        assert_eq!(
            backend.calls(),
            vec![
                BackendCall::BumpSharedSystemStoreVersion {
                    store: "shared_metrics".to_string(),
                    version: 7,
                },
                BackendCall::MaterializeMetadataVersion {
                    store: "profiles_meta".to_string(),
                    version: 7,
                },
                BackendCall::AddVersion {
                    store: "profiles".to_string(),
                    version: 7,
                },
            ]
        );
    }

    #[tokio::test]
    async fn add_version_mirrors_while_migrating_in_parent() {
        let backend = Arc::new(RecordingBackend::new());
        backend.put_store(StoreInfo::new("profiles", "identity-team").migrating_to("venice-1"));
        let table = table(ClusterRole::Parent, backend.clone());

        table
            .dispatch(&operation(AdminPayload::AddVersion(AddVersion {
                store_name: "profiles".to_string(),
                push_job_id: "push-7".to_string(),
                version_number: 7,
                partition_count: 4,
            })))
            .await
            .unwrap();

        assert_eq!(
            backend.calls(),
            vec![
                BackendCall::AddVersion {
                    store: "profiles".to_string(),
                    version: 7,
                },
                BackendCall::MirrorAddVersion {
                    peer_cluster: "venice-1".to_string(),
                    store: "profiles".to_string(),
                    version: 7,
                },
            ]
        );
    }

    #[tokio::test]
    async fn abort_migration_cancels_both_clusters() {
        let backend = Arc::new(RecordingBackend::new());
        let table = table(ClusterRole::Parent, backend.clone());

        table
            .dispatch(&operation(AdminPayload::AbortMigration(AbortMigration {
                store_name: "profiles".to_string(),
                src_cluster: "venice-0".to_string(),
                dest_cluster: "venice-1".to_string(),
            })))
            .await
            .unwrap();

        assert_eq!(
            backend.calls(),
            vec![BackendCall::AbortMigration {
                src_cluster: "venice-0".to_string(),
                dest_cluster: "venice-1".to_string(),
                store: "profiles".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn set_store_owner_applies_single_field() {
        let backend = Arc::new(RecordingBackend::new());
        let table = table(ClusterRole::Child, backend.clone());

        table
            .dispatch(&operation(AdminPayload::SetStoreOwner(SetStoreOwner {
                store_name: "profiles".to_string(),
                owner: "growth-team".to_string(),
            })))
            .await
            .unwrap();

        assert_eq!(
            backend.calls(),
            vec![BackendCall::SetOwner {
                store: "profiles".to_string(),
                owner: "growth-team".to_string(),
            }]
        );
    }
}
