// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Volume capability checks shared by the controller and node roles.
//!
//! Only filesystem access is offered. Block access and every access mode
//! other than single-node-writer and multi-node-multi-writer are rejected.

use super::csi::volume_capability::{access_mode::Mode, AccessType};
use super::csi::VolumeCapability;
use crate::domain::error::DriverError;
use crate::domain::volume::AccessMode;

/// Access mode of a capability, if the driver supports it
pub fn supported_access_mode(capability: &VolumeCapability) -> Option<AccessMode> {
    if matches!(capability.access_type, Some(AccessType::Block(_))) {
        return None;
    }

    match capability.access_mode.as_ref()?.mode() {
        Mode::SingleNodeWriter => Some(AccessMode::SingleNodeWriter),
        Mode::MultiNodeMultiWriter => Some(AccessMode::MultiNodeMultiWriter),
        _ => None,
    }
}

pub fn is_supported(capability: &VolumeCapability) -> bool {
    supported_access_mode(capability).is_some()
}

pub fn all_supported(capabilities: &[VolumeCapability]) -> bool {
    capabilities.iter().all(is_supported)
}

/// Reject an empty or unsupported capability list
pub fn validate(capabilities: &[VolumeCapability]) -> Result<(), DriverError> {
    if capabilities.is_empty() {
        return Err(DriverError::InvalidArgument(
            "Volume capabilities not provided".to_string(),
        ));
    }
    if !all_supported(capabilities) {
        return Err(DriverError::InvalidArgument(
            "Volume capabilities not supported".to_string(),
        ));
    }
    Ok(())
}

/// Mount flags requested through the capability, in order
pub fn mount_flags(capability: &VolumeCapability) -> Vec<String> {
    match &capability.access_type {
        Some(AccessType::Mount(mount)) => mount.mount_flags.clone(),
        _ => Vec::new(),
    }
}
