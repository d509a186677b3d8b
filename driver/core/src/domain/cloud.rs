// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Cloud Provider Trait - Anti-Corruption Layer for the storage control plane
//!
//! The controller role never talks to the storage provider API directly; it
//! goes through [`CloudProvider`]. Retry and backoff policy, credentials and
//! request signing all live behind this trait.
//!
//! Implementations must make `create_volume` idempotent by name: a repeated
//! create with identical options returns the existing resource, a repeated
//! create with different options fails with [`CloudError::AlreadyExists`].

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::volume::{CloudVolume, VolumeOptions};

#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Create (or return the existing) resource called `name`
    async fn create_volume(
        &self,
        name: &str,
        options: &VolumeOptions,
    ) -> Result<CloudVolume, CloudError>;

    /// Delete a resource by provider id
    async fn delete_volume(&self, volume_id: &str) -> Result<(), CloudError>;

    /// Look up a resource by provider id
    async fn describe_volume(&self, volume_id: &str) -> Result<CloudVolume, CloudError>;

    /// Record that `node_id` may access the resource
    async fn attach_volume(&self, volume_id: &str, node_id: &str) -> Result<(), CloudError>;

    /// Revoke access for `node_id`
    async fn detach_volume(&self, volume_id: &str, node_id: &str) -> Result<(), CloudError>;

    /// Grow the resource to `capacity_bytes`, returning the new capacity
    async fn resize_volume(&self, volume_id: &str, capacity_bytes: u64) -> Result<u64, CloudError>;

    /// All resources managed by this driver
    async fn list_volumes(&self) -> Result<Vec<CloudVolume>, CloudError>;
}

/// Provider errors
#[derive(Debug, Error)]
pub enum CloudError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Resource already exists with different parameters: {0}")]
    AlreadyExists(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unknown provider error: {0}")]
    Unknown(String),
}

impl From<std::io::Error> for CloudError {
    fn from(err: std::io::Error) -> Self {
        CloudError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for CloudError {
    fn from(err: serde_json::Error) -> Self {
        CloudError::Serialization(err.to_string())
    }
}
