// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Mount Executor Trait
//!
//! The node role delegates every local filesystem change to a [`Mounter`].
//! Implementations are expected to be idempotent: staging or publishing onto
//! a path that is already a mount point succeeds without remounting, and
//! unstaging or unpublishing a path that is not mounted is a no-op.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// A single mount to perform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountRequest {
    /// Remote export (`dns:/path`) or, for bind mounts, a local path
    pub source: String,
    pub target: PathBuf,
    /// Filesystem type; `None` for bind mounts
    pub fs_type: Option<String>,
    pub options: Vec<String>,
}

impl MountRequest {
    pub fn is_bind(&self) -> bool {
        self.options.iter().any(|o| o == "bind")
    }
}

#[async_trait]
pub trait Mounter: Send + Sync {
    /// Mount the remote export at the node-global staging path
    async fn stage(&self, request: &MountRequest) -> Result<(), MountError>;

    /// Undo [`Mounter::stage`]
    async fn unstage(&self, staging_path: &Path) -> Result<(), MountError>;

    /// Make the volume visible at the workload's target path
    async fn publish(&self, request: &MountRequest) -> Result<(), MountError>;

    /// Undo [`Mounter::publish`]
    async fn unpublish(&self, target_path: &Path) -> Result<(), MountError>;

    async fn is_mount_point(&self, path: &Path) -> Result<bool, MountError>;
}

#[derive(Debug, Error)]
pub enum MountError {
    #[error("{command} failed (exit code {code:?}): {stderr}")]
    Command {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for MountError {
    fn from(err: std::io::Error) -> Self {
        MountError::Io(err.to_string())
    }
}
