// Copyright (c) Venice Contributors
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};

/// Deployment role of the controller consuming the admin log.
///
/// A parent controller fronts the whole fleet and fans admin commands out to
/// the per-region child controllers; a child controller applies commands to
/// the local cluster only. The role is fixed for the lifetime of the process
/// and selects cross-cluster vs local handling for a handful of operation
/// kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClusterRole {
    Parent,
    Child,
}

impl ClusterRole {
    pub fn is_parent(&self) -> bool {
        matches!(self, ClusterRole::Parent)
    }

    pub fn is_child(&self) -> bool {
        matches!(self, ClusterRole::Child)
    }
}
