// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Collaborator doubles for handler unit tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

use crate::domain::cloud::{CloudError, CloudProvider};
use crate::domain::mount::{MountError, MountRequest, Mounter};
use crate::domain::volume::{CloudVolume, VolumeOptions};
use crate::infrastructure::cloud::InMemoryCloudProvider;

/// Pauses a collaborator call until the test lets it continue
#[derive(Default)]
pub struct Gate {
    entered: Notify,
    release: Notify,
}

impl Gate {
    /// Wait until a call has reached the gate
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        self.release.notify_one();
    }

    async fn pass(&self) {
        self.entered.notify_one();
        self.release.notified().await;
    }
}

/// In-memory provider that counts every call and can be held at a gate
#[derive(Default)]
pub struct CountingCloudProvider {
    inner: InMemoryCloudProvider,
    calls: AtomicUsize,
    gate: Option<Arc<Gate>>,
}

impl CountingCloudProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gated(gate: Arc<Gate>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn enter(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.pass().await;
        }
    }
}

#[async_trait]
impl CloudProvider for CountingCloudProvider {
    async fn create_volume(
        &self,
        name: &str,
        options: &VolumeOptions,
    ) -> Result<CloudVolume, CloudError> {
        self.enter().await;
        self.inner.create_volume(name, options).await
    }

    async fn delete_volume(&self, volume_id: &str) -> Result<(), CloudError> {
        self.enter().await;
        self.inner.delete_volume(volume_id).await
    }

    async fn describe_volume(&self, volume_id: &str) -> Result<CloudVolume, CloudError> {
        self.enter().await;
        self.inner.describe_volume(volume_id).await
    }

    async fn attach_volume(&self, volume_id: &str, node_id: &str) -> Result<(), CloudError> {
        self.enter().await;
        self.inner.attach_volume(volume_id, node_id).await
    }

    async fn detach_volume(&self, volume_id: &str, node_id: &str) -> Result<(), CloudError> {
        self.enter().await;
        self.inner.detach_volume(volume_id, node_id).await
    }

    async fn resize_volume(&self, volume_id: &str, capacity_bytes: u64) -> Result<u64, CloudError> {
        self.enter().await;
        self.inner.resize_volume(volume_id, capacity_bytes).await
    }

    async fn list_volumes(&self) -> Result<Vec<CloudVolume>, CloudError> {
        self.enter().await;
        self.inner.list_volumes().await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountCall {
    Stage(MountRequest),
    Unstage(PathBuf),
    Publish(MountRequest),
    Unpublish(PathBuf),
}

/// Mounter that records calls and tracks mount points in memory
#[derive(Default)]
pub struct RecordingMounter {
    calls: Mutex<Vec<MountCall>>,
    mounted: Mutex<HashSet<PathBuf>>,
    gate: Option<Arc<Gate>>,
    fail_with: Option<String>,
}

impl RecordingMounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gated(gate: Arc<Gate>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    /// Every stage/publish fails with a command error carrying `stderr`
    pub fn failing(stderr: &str) -> Self {
        Self {
            fail_with: Some(stderr.to_string()),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<MountCall> {
        self.calls.lock().clone()
    }

    pub fn is_mounted(&self, path: &Path) -> bool {
        self.mounted.lock().contains(path)
    }

    async fn mount(&self, call: MountCall, target: &Path) -> Result<(), MountError> {
        self.calls.lock().push(call);
        if let Some(gate) = &self.gate {
            gate.pass().await;
        }
        if let Some(stderr) = &self.fail_with {
            return Err(MountError::Command {
                command: "mount".to_string(),
                code: Some(32),
                stderr: stderr.clone(),
            });
        }
        self.mounted.lock().insert(target.to_path_buf());
        Ok(())
    }

    async fn unmount(&self, call: MountCall, target: &Path) -> Result<(), MountError> {
        self.calls.lock().push(call);
        if let Some(gate) = &self.gate {
            gate.pass().await;
        }
        self.mounted.lock().remove(target);
        Ok(())
    }
}

#[async_trait]
impl Mounter for RecordingMounter {
    async fn stage(&self, request: &MountRequest) -> Result<(), MountError> {
        self.mount(MountCall::Stage(request.clone()), &request.target).await
    }

    async fn unstage(&self, staging_path: &Path) -> Result<(), MountError> {
        self.unmount(MountCall::Unstage(staging_path.to_path_buf()), staging_path)
            .await
    }

    async fn publish(&self, request: &MountRequest) -> Result<(), MountError> {
        self.mount(MountCall::Publish(request.clone()), &request.target).await
    }

    async fn unpublish(&self, target_path: &Path) -> Result<(), MountError> {
        self.unmount(MountCall::Unpublish(target_path.to_path_buf()), target_path)
            .await
    }

    async fn is_mount_point(&self, path: &Path) -> Result<bool, MountError> {
        Ok(self.is_mounted(path))
    }
}
