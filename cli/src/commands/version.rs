// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Build information

use anyhow::Result;
use serde::Serialize;

use fsx_csi_core::{DRIVER_NAME, DRIVER_VERSION};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    pub driver_name: &'static str,
    pub driver_version: &'static str,
    pub platform: String,
}

impl VersionInfo {
    pub fn current() -> Self {
        Self {
            driver_name: DRIVER_NAME,
            driver_version: DRIVER_VERSION,
            platform: format!("{}/{}", std::env::consts::OS, std::env::consts::ARCH),
        }
    }
}

pub fn print_version() -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&VersionInfo::current())?);
    Ok(())
}
