// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! In-memory provider client. State is lost when the process exits.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};

use super::{new_resource_id, reuse_existing};
use crate::domain::cloud::{CloudError, CloudProvider};
use crate::domain::volume::{CloudVolume, ResourceType, VolumeOptions};

const DNS_SUFFIX: &str = "fsx.memory.local";

#[derive(Debug, Default)]
pub struct InMemoryCloudProvider {
    volumes: RwLock<HashMap<String, CloudVolume>>,
}

impl InMemoryCloudProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CloudProvider for InMemoryCloudProvider {
    async fn create_volume(
        &self,
        name: &str,
        options: &VolumeOptions,
    ) -> Result<CloudVolume, CloudError> {
        let mut volumes = self.volumes.write();
        if let Some(existing) = volumes.values().find(|v| v.name == name) {
            return reuse_existing(existing, options);
        }

        let volume_id = new_resource_id(options.resource_type);
        let volume_path = match options.resource_type {
            ResourceType::Filesystem => "/fsx".to_string(),
            ResourceType::Volume => format!("/fsx/{}", name),
        };
        let volume = CloudVolume {
            dns_name: format!("{}.{}", volume_id, DNS_SUFFIX),
            volume_id: volume_id.clone(),
            name: name.to_string(),
            options: options.clone(),
            volume_path,
            attached_nodes: BTreeSet::new(),
            created_at: Utc::now(),
        };
        volumes.insert(volume_id, volume.clone());
        Ok(volume)
    }

    async fn delete_volume(&self, volume_id: &str) -> Result<(), CloudError> {
        self.volumes
            .write()
            .remove(volume_id)
            .map(|_| ())
            .ok_or_else(|| CloudError::NotFound(volume_id.to_string()))
    }

    async fn describe_volume(&self, volume_id: &str) -> Result<CloudVolume, CloudError> {
        self.volumes
            .read()
            .get(volume_id)
            .cloned()
            .ok_or_else(|| CloudError::NotFound(volume_id.to_string()))
    }

    async fn attach_volume(&self, volume_id: &str, node_id: &str) -> Result<(), CloudError> {
        let mut volumes = self.volumes.write();
        let volume = volumes
            .get_mut(volume_id)
            .ok_or_else(|| CloudError::NotFound(volume_id.to_string()))?;
        volume.attached_nodes.insert(node_id.to_string());
        Ok(())
    }

    async fn detach_volume(&self, volume_id: &str, node_id: &str) -> Result<(), CloudError> {
        let mut volumes = self.volumes.write();
        let volume = volumes
            .get_mut(volume_id)
            .ok_or_else(|| CloudError::NotFound(volume_id.to_string()))?;
        volume.attached_nodes.remove(node_id);
        Ok(())
    }

    async fn resize_volume(&self, volume_id: &str, capacity_bytes: u64) -> Result<u64, CloudError> {
        let mut volumes = self.volumes.write();
        let volume = volumes
            .get_mut(volume_id)
            .ok_or_else(|| CloudError::NotFound(volume_id.to_string()))?;
        volume.options.capacity_bytes = capacity_bytes;
        Ok(capacity_bytes)
    }

    async fn list_volumes(&self) -> Result<Vec<CloudVolume>, CloudError> {
        let mut volumes: Vec<_> = self.volumes.read().values().cloned().collect();
        volumes.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.name.cmp(&b.name)));
        Ok(volumes)
    }
}
