// Copyright (c) Venice Contributors
// SPDX-License-Identifier: Apache-2.0

//! Test doubles shared by unit and integration tests.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::backend::{AdminBackend, StoreInfo, UpdateStoreRequest};
use crate::error::{AdminError, AdminResult};
use crate::operation::SchemaId;

/// One mutation observed by [`RecordingBackend`]. Read probes (`get_store`)
/// are not recorded; assertions care about administrative side effects.
#[derive(Clone, Debug, PartialEq)]
pub enum BackendCall {
    CreateStore {
        store: String,
        owner: String,
    },
    AddValueSchema {
        store: String,
        schema_id: SchemaId,
    },
    AddDerivedSchema {
        store: String,
        value_schema_id: SchemaId,
        derived_schema_id: SchemaId,
    },
    AddSupersetSchema {
        store: String,
        superset_schema_id: SchemaId,
    },
    SetReadability {
        store: String,
        readable: bool,
    },
    SetWriteability {
        store: String,
        writeable: bool,
    },
    SetCurrentVersion {
        store: String,
        version: u64,
    },
    SetOwner {
        store: String,
        owner: String,
    },
    SetPartitionCount {
        store: String,
        partition_count: u32,
    },
    UpdateStore {
        store: String,
        request: UpdateStoreRequest,
    },
    MirrorUpdateStore {
        peer_cluster: String,
        store: String,
    },
    DeleteAllVersions {
        store: String,
    },
    DeleteVersion {
        store: String,
        version: u64,
    },
    DematerializeVersion {
        store: String,
        version: u64,
    },
    DeleteStore {
        store: String,
        largest_used_version_number: i64,
    },
    MigrateStore {
        src_cluster: String,
        dest_cluster: String,
        store: String,
    },
    RecordMigrationRoute {
        store: String,
        src_cluster: String,
        dest_cluster: String,
    },
    AbortMigration {
        src_cluster: String,
        dest_cluster: String,
        store: String,
    },
    AddVersion {
        store: String,
        version: u64,
    },
    MirrorAddVersion {
        peer_cluster: String,
        store: String,
        version: u64,
    },
    BumpSharedSystemStoreVersion {
        store: String,
        version: u64,
    },
    MaterializeMetadataVersion {
        store: String,
        version: u64,
    },
    KillOfflinePush {
        topic: String,
    },
}

impl BackendCall {
    /// The store a mutation targets, where one is named directly.
    pub fn store(&self) -> Option<&str> {
        match self {
            BackendCall::CreateStore { store, .. }
            | BackendCall::AddValueSchema { store, .. }
            | BackendCall::AddDerivedSchema { store, .. }
            | BackendCall::AddSupersetSchema { store, .. }
            | BackendCall::SetReadability { store, .. }
            | BackendCall::SetWriteability { store, .. }
            | BackendCall::SetCurrentVersion { store, .. }
            | BackendCall::SetOwner { store, .. }
            | BackendCall::SetPartitionCount { store, .. }
            | BackendCall::UpdateStore { store, .. }
            | BackendCall::MirrorUpdateStore { store, .. }
            | BackendCall::DeleteAllVersions { store }
            | BackendCall::DeleteVersion { store, .. }
            | BackendCall::DematerializeVersion { store, .. }
            | BackendCall::DeleteStore { store, .. }
            | BackendCall::MigrateStore { store, .. }
            | BackendCall::RecordMigrationRoute { store, .. }
            | BackendCall::AbortMigration { store, .. }
            | BackendCall::AddVersion { store, .. }
            | BackendCall::MirrorAddVersion { store, .. }
            | BackendCall::BumpSharedSystemStoreVersion { store, .. }
            | BackendCall::MaterializeMetadataVersion { store, .. } => Some(store),
            BackendCall::KillOfflinePush { .. } => None,
        }
    }
}

#[derive(Default)]
struct FailurePlan {
    transient: HashMap<String, u32>,
    rejected: HashMap<String, u32>,
}

/// Admin backend that records every mutation and keeps just enough catalog
/// state for the dispatch handlers' pre-checks. Failures can be injected per
/// method to exercise the retry and halt paths.
#[derive(Default)]
pub struct RecordingBackend {
    calls: Mutex<Vec<BackendCall>>,
    stores: Mutex<BTreeMap<String, StoreInfo>>,
    failures: Mutex<FailurePlan>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds catalog state without recording a call.
    pub fn put_store(&self, info: StoreInfo) {
        self.stores.lock().insert(info.name.clone(), info);
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// The next `times` invocations of `method` fail with
    /// [`AdminError::Transient`]. The failing attempts are still recorded.
    pub fn fail_transient(&self, method: &str, times: u32) {
        self.failures
            .lock()
            .transient
            .insert(method.to_string(), times);
    }

    /// The next `times` invocations of `method` fail with
    /// [`AdminError::Rejected`].
    pub fn fail_rejected(&self, method: &str, times: u32) {
        self.failures
            .lock()
            .rejected
            .insert(method.to_string(), times);
    }

    fn record(&self, call: BackendCall) {
        self.calls.lock().push(call);
    }

    fn gate(&self, method: &str) -> AdminResult<()> {
        let mut failures = self.failures.lock();
        if let Some(remaining) = failures.transient.get_mut(method) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(AdminError::Transient(format!("injected failure: {method}")));
            }
        }
        if let Some(remaining) = failures.rejected.get_mut(method) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(AdminError::Rejected(format!("injected rejection: {method}")));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl AdminBackend for RecordingBackend {
    async fn get_store(&self, store: &str) -> AdminResult<Option<StoreInfo>> {
        Ok(self.stores.lock().get(store).cloned())
    }

    async fn create_store(
        &self,
        store: &str,
        owner: &str,
        _key_schema: &str,
        _value_schema: &str,
        _is_system_store: bool,
    ) -> AdminResult<()> {
        self.record(BackendCall::CreateStore {
            store: store.to_string(),
            owner: owner.to_string(),
        });
        self.gate("create_store")?;
        self.stores
            .lock()
            .insert(store.to_string(), StoreInfo::new(store, owner));
        Ok(())
    }

    async fn add_value_schema(
        &self,
        store: &str,
        schema_id: SchemaId,
        _schema: &str,
    ) -> AdminResult<()> {
        self.record(BackendCall::AddValueSchema {
            store: store.to_string(),
            schema_id,
        });
        self.gate("add_value_schema")
    }

    async fn add_derived_schema(
        &self,
        store: &str,
        value_schema_id: SchemaId,
        derived_schema_id: SchemaId,
        _schema: &str,
    ) -> AdminResult<()> {
        self.record(BackendCall::AddDerivedSchema {
            store: store.to_string(),
            value_schema_id,
            derived_schema_id,
        });
        self.gate("add_derived_schema")
    }

    async fn add_superset_schema(
        &self,
        store: &str,
        superset_schema_id: SchemaId,
        _schema: &str,
    ) -> AdminResult<()> {
        self.record(BackendCall::AddSupersetSchema {
            store: store.to_string(),
            superset_schema_id,
        });
        self.gate("add_superset_schema")
    }

    async fn set_store_readability(&self, store: &str, readable: bool) -> AdminResult<()> {
        self.record(BackendCall::SetReadability {
            store: store.to_string(),
            readable,
        });
        self.gate("set_store_readability")
    }

    async fn set_store_writeability(&self, store: &str, writeable: bool) -> AdminResult<()> {
        self.record(BackendCall::SetWriteability {
            store: store.to_string(),
            writeable,
        });
        self.gate("set_store_writeability")
    }

    async fn set_store_current_version(&self, store: &str, version: u64) -> AdminResult<()> {
        self.record(BackendCall::SetCurrentVersion {
            store: store.to_string(),
            version,
        });
        self.gate("set_store_current_version")
    }

    async fn set_store_owner(&self, store: &str, owner: &str) -> AdminResult<()> {
        self.record(BackendCall::SetOwner {
            store: store.to_string(),
            owner: owner.to_string(),
        });
        self.gate("set_store_owner")?;
        if let Some(info) = self.stores.lock().get_mut(store) {
            info.owner = owner.to_string();
        }
        Ok(())
    }

    async fn set_store_partition_count(
        &self,
        store: &str,
        partition_count: u32,
    ) -> AdminResult<()> {
        self.record(BackendCall::SetPartitionCount {
            store: store.to_string(),
            partition_count,
        });
        self.gate("set_store_partition_count")
    }

    async fn update_store(&self, store: &str, request: UpdateStoreRequest) -> AdminResult<()> {
        self.record(BackendCall::UpdateStore {
            store: store.to_string(),
            request: request.clone(),
        });
        self.gate("update_store")?;
        if let Some(info) = self.stores.lock().get_mut(store) {
            if let Some(migrating) = request.is_migrating {
                info.is_migrating = migrating;
            }
            if let Some(owner) = request.owner {
                info.owner = owner;
            }
        }
        Ok(())
    }

    async fn mirror_update_store(
        &self,
        peer_cluster: &str,
        store: &str,
        _request: UpdateStoreRequest,
    ) -> AdminResult<()> {
        self.record(BackendCall::MirrorUpdateStore {
            peer_cluster: peer_cluster.to_string(),
            store: store.to_string(),
        });
        self.gate("mirror_update_store")
    }

    async fn delete_all_versions(&self, store: &str) -> AdminResult<()> {
        self.record(BackendCall::DeleteAllVersions {
            store: store.to_string(),
        });
        self.gate("delete_all_versions")
    }

    async fn delete_version(&self, store: &str, version: u64) -> AdminResult<()> {
        self.record(BackendCall::DeleteVersion {
            store: store.to_string(),
            version,
        });
        self.gate("delete_version")
    }

    async fn dematerialize_version(&self, store: &str, version: u64) -> AdminResult<()> {
        self.record(BackendCall::DematerializeVersion {
            store: store.to_string(),
            version,
        });
        self.gate("dematerialize_version")
    }

    async fn delete_store(
        &self,
        store: &str,
        largest_used_version_number: i64,
    ) -> AdminResult<()> {
        self.record(BackendCall::DeleteStore {
            store: store.to_string(),
            largest_used_version_number,
        });
        self.gate("delete_store")?;
        self.stores.lock().remove(store);
        Ok(())
    }

    async fn migrate_store(
        &self,
        src_cluster: &str,
        dest_cluster: &str,
        store: &str,
    ) -> AdminResult<()> {
        self.record(BackendCall::MigrateStore {
            src_cluster: src_cluster.to_string(),
            dest_cluster: dest_cluster.to_string(),
            store: store.to_string(),
        });
        self.gate("migrate_store")
    }

    async fn record_migration_route(
        &self,
        store: &str,
        src_cluster: &str,
        dest_cluster: &str,
    ) -> AdminResult<()> {
        self.record(BackendCall::RecordMigrationRoute {
            store: store.to_string(),
            src_cluster: src_cluster.to_string(),
            dest_cluster: dest_cluster.to_string(),
        });
        self.gate("record_migration_route")?;
        if let Some(info) = self.stores.lock().get_mut(store) {
            info.migration_src_cluster = Some(src_cluster.to_string());
            info.migration_dest_cluster = Some(dest_cluster.to_string());
        }
        Ok(())
    }

    async fn abort_migration(
        &self,
        src_cluster: &str,
        dest_cluster: &str,
        store: &str,
    ) -> AdminResult<()> {
        self.record(BackendCall::AbortMigration {
            src_cluster: src_cluster.to_string(),
            dest_cluster: dest_cluster.to_string(),
            store: store.to_string(),
        });
        self.gate("abort_migration")?;
        if let Some(info) = self.stores.lock().get_mut(store) {
            info.is_migrating = false;
        }
        Ok(())
    }

    async fn add_version(
        &self,
        store: &str,
        _push_job_id: &str,
        version: u64,
        _partition_count: u32,
    ) -> AdminResult<()> {
        self.record(BackendCall::AddVersion {
            store: store.to_string(),
            version,
        });
        self.gate("add_version")?;
        if let Some(info) = self.stores.lock().get_mut(store) {
            info.largest_used_version_number = info.largest_used_version_number.max(version as i64);
        }
        Ok(())
    }

    async fn mirror_add_version(
        &self,
        peer_cluster: &str,
        store: &str,
        _push_job_id: &str,
        version: u64,
        _partition_count: u32,
    ) -> AdminResult<()> {
        self.record(BackendCall::MirrorAddVersion {
            peer_cluster: peer_cluster.to_string(),
            store: store.to_string(),
            version,
        });
        self.gate("mirror_add_version")
    }

    async fn bump_shared_system_store_version(&self, store: &str, version: u64) -> AdminResult<()> {
        self.record(BackendCall::BumpSharedSystemStoreVersion {
            store: store.to_string(),
            version,
        });
        self.gate("bump_shared_system_store_version")
    }

    async fn materialize_metadata_version(&self, store: &str, version: u64) -> AdminResult<()> {
        self.record(BackendCall::MaterializeMetadataVersion {
            store: store.to_string(),
            version,
        });
        self.gate("materialize_metadata_version")
    }

    async fn kill_offline_push(&self, topic: &str) -> AdminResult<()> {
        self.record(BackendCall::KillOfflinePush {
            topic: topic.to_string(),
        });
        self.gate("kill_offline_push")
    }
}
