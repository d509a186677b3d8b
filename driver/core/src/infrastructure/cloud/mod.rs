// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Provider Infrastructure Module
//!
//! Concrete implementations of the CloudProvider trait. Neither of these
//! talks to a remote control plane; they back the controller role for
//! development clusters, sanity suites and tests.

pub mod local;
pub mod memory;

pub use local::LocalCloudProvider;
pub use memory::InMemoryCloudProvider;

use std::sync::Arc;

use crate::domain::cloud::{CloudError, CloudProvider};
use crate::domain::node_config::ProviderConfig;
use crate::domain::volume::{CloudVolume, ResourceType, VolumeOptions};

/// Factory function to create a provider client from configuration
pub fn create_cloud_provider(config: &ProviderConfig) -> Result<Arc<dyn CloudProvider>, CloudError> {
    match config {
        ProviderConfig::Memory => Ok(Arc::new(InMemoryCloudProvider::new())),
        ProviderConfig::Local { base_path } => {
            Ok(Arc::new(LocalCloudProvider::new(base_path.clone())?))
        }
    }
}

/// Provider-style identifier: kind prefix plus 17 hex digits
pub(crate) fn new_resource_id(resource_type: ResourceType) -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("{}{}", resource_type.id_prefix(), &hex[..17])
}

/// Idempotent-create check shared by both providers.
///
/// Returns the existing volume when the options match, otherwise
/// [`CloudError::AlreadyExists`].
pub(crate) fn reuse_existing(
    existing: &CloudVolume,
    options: &VolumeOptions,
) -> Result<CloudVolume, CloudError> {
    if &existing.options == options {
        Ok(existing.clone())
    } else {
        Err(CloudError::AlreadyExists(format!(
            "{} ({}) was created with different parameters",
            existing.name, existing.volume_id
        )))
    }
}
