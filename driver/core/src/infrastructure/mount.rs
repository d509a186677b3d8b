// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! System Mounter
//!
//! [`Mounter`] backed by the host's `mount(8)` and `umount(8)`. Mount-point
//! detection reads the kernel mount table rather than comparing device ids,
//! so a bind mount of a directory onto itself is still detected.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::domain::mount::{MountError, MountRequest, Mounter};

const PROC_MOUNTS: &str = "/proc/self/mounts";

pub struct SystemMounter {
    mount_bin: String,
    umount_bin: String,
    mounts_file: PathBuf,
}

impl Default for SystemMounter {
    fn default() -> Self {
        Self {
            mount_bin: "mount".to_string(),
            umount_bin: "umount".to_string(),
            mounts_file: PathBuf::from(PROC_MOUNTS),
        }
    }
}

impl SystemMounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the mount table from `path` instead of `/proc/self/mounts`
    pub fn with_mounts_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.mounts_file = path.into();
        self
    }

    async fn mount(&self, request: &MountRequest) -> Result<(), MountError> {
        let target = path_str(&request.target)?;
        if self.is_mount_point(&request.target).await? {
            debug!(target, "Already mounted, skipping");
            return Ok(());
        }

        tokio::fs::create_dir_all(&request.target).await?;

        let args = mount_args(request, target);
        info!(source = %request.source, target, options = ?request.options, "Mounting");
        run(&self.mount_bin, &args).await
    }

    async fn unmount(&self, target: &Path) -> Result<(), MountError> {
        let target_str = path_str(target)?;
        if !self.is_mount_point(target).await? {
            debug!(target = target_str, "Not mounted, skipping unmount");
        } else {
            info!(target = target_str, "Unmounting");
            run(&self.umount_bin, &[target_str.to_string()]).await?;
        }

        match tokio::fs::remove_dir(target).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                // Not fatal: the kubelet removes its own directories
                warn!(target = target_str, error = %e, "Failed to remove mount directory");
                Ok(())
            }
        }
    }
}

#[async_trait]
impl Mounter for SystemMounter {
    async fn stage(&self, request: &MountRequest) -> Result<(), MountError> {
        self.mount(request).await
    }

    async fn unstage(&self, staging_path: &Path) -> Result<(), MountError> {
        self.unmount(staging_path).await
    }

    async fn publish(&self, request: &MountRequest) -> Result<(), MountError> {
        self.mount(request).await
    }

    async fn unpublish(&self, target_path: &Path) -> Result<(), MountError> {
        self.unmount(target_path).await
    }

    async fn is_mount_point(&self, path: &Path) -> Result<bool, MountError> {
        let target = path_str(path)?;
        let contents = match tokio::fs::read_to_string(&self.mounts_file).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        Ok(mount_table_contains(&contents, target))
    }
}

fn path_str(path: &Path) -> Result<&str, MountError> {
    let s = path
        .to_str()
        .ok_or_else(|| MountError::InvalidPath(path.to_string_lossy().into_owned()))?;
    if !path.is_absolute() || s.chars().any(char::is_whitespace) {
        return Err(MountError::InvalidPath(s.to_string()));
    }
    Ok(s)
}

fn mount_args(request: &MountRequest, target: &str) -> Vec<String> {
    let mut args = Vec::new();
    if let Some(fs_type) = &request.fs_type {
        args.push("-t".to_string());
        args.push(fs_type.clone());
    }
    if !request.options.is_empty() {
        args.push("-o".to_string());
        args.push(request.options.join(","));
    }
    args.push(request.source.clone());
    args.push(target.to_string());
    args
}

/// `/proc/self/mounts` format: `<device> <mountpoint> <fstype> <options> <dump> <pass>`
fn mount_table_contains(contents: &str, target: &str) -> bool {
    let target = target.trim_end_matches('/');
    contents
        .lines()
        .any(|line| line.split_whitespace().nth(1) == Some(target))
}

async fn run(program: &str, args: &[String]) -> Result<(), MountError> {
    let output = Command::new(program).args(args).output().await?;
    if output.status.success() {
        return Ok(());
    }

    Err(MountError::Command {
        command: format!("{} {}", program, args.join(" ")),
        code: output.status.code(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
}
