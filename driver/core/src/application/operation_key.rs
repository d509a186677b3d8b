// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Operation Key Derivation
//!
//! Maps a CSI request onto the key it claims in the [`InFlight`] registry.
//! A key names the resource instance being mutated, never the kind of call,
//! so a DeleteVolume racing a ControllerExpandVolume on the same volume id
//! derives the same key and one of them is rejected.
//!
//! CreateVolume has no volume id yet and keys on the request name instead.
//!
//! [`InFlight`]: crate::application::inflight::InFlight

use std::path::Path;

use crate::domain::node_config::KeyPolicy;

/// Key derivation for one configured [`KeyPolicy`]
#[derive(Debug, Clone, Copy, Default)]
pub struct OperationKeys {
    policy: KeyPolicy,
}

impl OperationKeys {
    pub fn new(policy: KeyPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> KeyPolicy {
        self.policy
    }

    pub fn create(&self, name: &str) -> String {
        name.to_string()
    }

    /// DeleteVolume and ControllerExpandVolume
    pub fn volume(&self, volume_id: &str) -> String {
        volume_id.to_string()
    }

    /// ControllerPublishVolume and ControllerUnpublishVolume
    pub fn attachment(&self, volume_id: &str, node_id: &str) -> String {
        self.scoped(volume_id, node_id)
    }

    /// NodeStageVolume and NodeUnstageVolume
    pub fn staging(&self, volume_id: &str, staging_path: &Path) -> String {
        self.scoped(volume_id, &staging_path.to_string_lossy())
    }

    /// NodePublishVolume, NodeUnpublishVolume and NodeExpandVolume
    pub fn target(&self, volume_id: &str, target_path: &Path) -> String {
        self.scoped(volume_id, &target_path.to_string_lossy())
    }

    fn scoped(&self, volume_id: &str, scope: &str) -> String {
        match self.policy {
            KeyPolicy::Volume => volume_id.to_string(),
            KeyPolicy::VolumeTarget => {
                format!("{}/{}", volume_id, scope.trim_start_matches('/'))
            }
        }
    }
}
