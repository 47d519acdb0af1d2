// Copyright (c) Venice Contributors
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use admin_config::{ClusterRole, Parameters};

use crate::metrics::Metrics;

/// Context contains the per-process configuration and metrics shared by all
/// components of the admin consumption core.
#[derive(Clone)]
pub(crate) struct Context {
    /// Name of the cluster whose admin log this process consumes. Scopes all
    /// watermark keys.
    pub cluster: String,
    /// Parent or child deployment; consulted only by the dispatch table.
    pub role: ClusterRole,
    /// Operational parameters of this controller.
    pub parameters: Parameters,
    /// Metrics of this controller.
    pub metrics: Arc<Metrics>,
}

impl Context {
    pub(crate) fn new(
        cluster: String,
        role: ClusterRole,
        parameters: Parameters,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            cluster,
            role,
            parameters,
            metrics,
        }
    }

    #[cfg(test)]
    pub(crate) fn new_for_test(role: ClusterRole) -> Self {
        Self::new(
            "venice-cluster-0".to_string(),
            role,
            Parameters::default(),
            crate::metrics::test_metrics(),
        )
    }
}
