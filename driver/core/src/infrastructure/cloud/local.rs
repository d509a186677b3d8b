// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Local Filesystem Provider
//!
//! Directory-backed implementation of CloudProvider for single-node
//! development clusters. Each volume is a directory under `base_path`; its
//! descriptor is kept under `.descriptors/<volume_id>.json` so the provider
//! survives driver restarts.
//!
//! **Limitations:**
//! - The node role must run on the same host (volumes are exported as
//!   `localhost:<dir>` and staged with a bind mount)
//! - Capacity is recorded, never enforced

use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{new_resource_id, reuse_existing};
use crate::domain::cloud::{CloudError, CloudProvider};
use crate::domain::volume::{CloudVolume, VolumeOptions, LOCAL_DNS_NAME};

const DESCRIPTOR_DIR: &str = ".descriptors";

pub struct LocalCloudProvider {
    base_path: PathBuf,
}

impl LocalCloudProvider {
    /// Create the provider, creating `base_path` if needed and checking that
    /// it is writable.
    pub fn new(base_path: impl Into<PathBuf>) -> Result<Self, CloudError> {
        let base_path = base_path.into();

        std::fs::create_dir_all(base_path.join(DESCRIPTOR_DIR)).map_err(|e| {
            CloudError::Io(format!(
                "Failed to create base directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        let marker = base_path.join(".fsx-csi-write-test");
        std::fs::write(&marker, b"test").map_err(|e| {
            CloudError::Io(format!(
                "Base directory {} is not writable: {}",
                base_path.display(),
                e
            ))
        })?;
        std::fs::remove_file(&marker)?;

        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn descriptor_path(&self, volume_id: &str) -> PathBuf {
        self.base_path
            .join(DESCRIPTOR_DIR)
            .join(format!("{}.json", volume_id))
    }

    fn data_path(&self, volume_id: &str) -> PathBuf {
        self.base_path.join(volume_id)
    }

    /// Reject ids that would escape the base directory
    fn check_id(volume_id: &str) -> Result<(), CloudError> {
        if volume_id.is_empty()
            || volume_id.contains('/')
            || volume_id.contains("..")
            || volume_id.starts_with('.')
        {
            return Err(CloudError::InvalidParameter(format!(
                "Invalid volume id: {:?}",
                volume_id
            )));
        }
        Ok(())
    }

    async fn read_descriptor(&self, volume_id: &str) -> Result<CloudVolume, CloudError> {
        Self::check_id(volume_id)?;
        match tokio::fs::read(self.descriptor_path(volume_id)).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(CloudError::NotFound(volume_id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn write_descriptor(&self, volume: &CloudVolume) -> Result<(), CloudError> {
        let bytes = serde_json::to_vec_pretty(volume)?;
        let path = self.descriptor_path(&volume.volume_id);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

#[async_trait]
impl CloudProvider for LocalCloudProvider {
    async fn create_volume(
        &self,
        name: &str,
        options: &VolumeOptions,
    ) -> Result<CloudVolume, CloudError> {
        if let Some(existing) = self
            .list_volumes()
            .await?
            .into_iter()
            .find(|v| v.name == name)
        {
            return reuse_existing(&existing, options);
        }

        let volume_id = new_resource_id(options.resource_type);
        let data_path = self.data_path(&volume_id);
        tokio::fs::create_dir_all(&data_path).await?;

        let volume = CloudVolume {
            volume_id,
            name: name.to_string(),
            options: options.clone(),
            dns_name: LOCAL_DNS_NAME.to_string(),
            volume_path: data_path.to_string_lossy().into_owned(),
            attached_nodes: BTreeSet::new(),
            created_at: Utc::now(),
        };
        self.write_descriptor(&volume).await?;

        debug!(volume_id = %volume.volume_id, path = %data_path.display(), "Created local volume");
        Ok(volume)
    }

    async fn delete_volume(&self, volume_id: &str) -> Result<(), CloudError> {
        // Fails with NotFound before touching the data directory
        self.read_descriptor(volume_id).await?;

        match tokio::fs::remove_dir_all(self.data_path(volume_id)).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        tokio::fs::remove_file(self.descriptor_path(volume_id)).await?;

        debug!(volume_id, "Deleted local volume");
        Ok(())
    }

    async fn describe_volume(&self, volume_id: &str) -> Result<CloudVolume, CloudError> {
        self.read_descriptor(volume_id).await
    }

    async fn attach_volume(&self, volume_id: &str, node_id: &str) -> Result<(), CloudError> {
        let mut volume = self.read_descriptor(volume_id).await?;
        if volume.attached_nodes.insert(node_id.to_string()) {
            self.write_descriptor(&volume).await?;
        }
        Ok(())
    }

    async fn detach_volume(&self, volume_id: &str, node_id: &str) -> Result<(), CloudError> {
        let mut volume = self.read_descriptor(volume_id).await?;
        if volume.attached_nodes.remove(node_id) {
            self.write_descriptor(&volume).await?;
        }
        Ok(())
    }

    async fn resize_volume(&self, volume_id: &str, capacity_bytes: u64) -> Result<u64, CloudError> {
        let mut volume = self.read_descriptor(volume_id).await?;
        volume.options.capacity_bytes = capacity_bytes;
        self.write_descriptor(&volume).await?;
        Ok(capacity_bytes)
    }

    async fn list_volumes(&self) -> Result<Vec<CloudVolume>, CloudError> {
        let mut volumes = Vec::new();
        let mut entries = tokio::fs::read_dir(self.base_path.join(DESCRIPTOR_DIR)).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = tokio::fs::read(&path).await?;
            volumes.push(serde_json::from_slice::<CloudVolume>(&bytes)?);
        }
        volumes.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.name.cmp(&b.name)));
        Ok(volumes)
    }
}
