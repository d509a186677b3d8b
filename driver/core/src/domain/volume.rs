// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Volume Domain Types
//!
//! Provider-neutral description of the remote filesystem resources the
//! driver provisions. An FSx for OpenZFS "volume" in CSI terms is either a
//! whole file system (`fs-…`) or a child volume inside one (`fsvol-…`); the
//! kind is chosen per StorageClass through the `ResourceType` parameter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::domain::error::DriverError;

pub const GIB: u64 = 1024 * 1024 * 1024;

/// Capacity used when `CreateVolume` carries no capacity range
pub const DEFAULT_VOLUME_SIZE: u64 = GIB;

/// StorageClass parameter selecting the resource kind
pub const PARAMETER_RESOURCE_TYPE: &str = "ResourceType";

/// Volume context keys handed from the controller to the node
pub const CONTEXT_DNS_NAME: &str = "dnsName";
pub const CONTEXT_VOLUME_PATH: &str = "volumePath";
pub const CONTEXT_RESOURCE_TYPE: &str = "resourceType";

/// DNS name reported for volumes that live on the node's own filesystem.
/// These are staged with a bind mount instead of a network mount.
pub const LOCAL_DNS_NAME: &str = "localhost";

/// Topology key advertised by `NodeGetInfo` and on created volumes
pub const TOPOLOGY_ZONE_KEY: &str = "topology.kubernetes.io/zone";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    #[default]
    Filesystem,
    Volume,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Filesystem => "filesystem",
            ResourceType::Volume => "volume",
        }
    }

    /// Prefix of the provider-issued identifier
    pub fn id_prefix(&self) -> &'static str {
        match self {
            ResourceType::Filesystem => "fs-",
            ResourceType::Volume => "fsvol-",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = DriverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "filesystem" => Ok(ResourceType::Filesystem),
            "volume" => Ok(ResourceType::Volume),
            other => Err(DriverError::InvalidArgument(format!(
                "Invalid {}: {}. Must be filesystem or volume",
                PARAMETER_RESOURCE_TYPE, other
            ))),
        }
    }
}

/// Supported subset of CSI access modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessMode {
    SingleNodeWriter,
    MultiNodeMultiWriter,
}

/// Everything the provider needs to create a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeOptions {
    pub resource_type: ResourceType,
    pub capacity_bytes: u64,
    /// StorageClass parameters minus the ones the driver consumes itself
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

impl VolumeOptions {
    /// Build options from raw StorageClass parameters.
    ///
    /// `ResourceType` is consumed here; every other parameter is passed
    /// through to the provider untouched.
    pub fn from_parameters(
        parameters: impl IntoIterator<Item = (String, String)>,
        capacity_bytes: u64,
    ) -> Result<Self, DriverError> {
        let mut resource_type = ResourceType::default();
        let mut passthrough = BTreeMap::new();
        for (key, value) in parameters {
            if key == PARAMETER_RESOURCE_TYPE {
                resource_type = value.parse()?;
            } else {
                passthrough.insert(key, value);
            }
        }

        Ok(Self {
            resource_type,
            capacity_bytes,
            parameters: passthrough,
        })
    }
}

/// A provisioned resource as reported by the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudVolume {
    pub volume_id: String,
    pub name: String,
    pub options: VolumeOptions,
    /// DNS name of the file server exporting the volume
    pub dns_name: String,
    /// Export path on the file server
    pub volume_path: String,
    #[serde(default)]
    pub attached_nodes: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
}

impl CloudVolume {
    pub fn capacity_bytes(&self) -> u64 {
        self.options.capacity_bytes
    }

    /// Context forwarded to the node in `CreateVolumeResponse.volume.volume_context`
    pub fn volume_context(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (CONTEXT_DNS_NAME.to_string(), self.dns_name.clone()),
            (CONTEXT_VOLUME_PATH.to_string(), self.volume_path.clone()),
            (
                CONTEXT_RESOURCE_TYPE.to_string(),
                self.options.resource_type.to_string(),
            ),
        ])
    }
}

/// Round a byte count up to the next whole GiB
pub fn round_up_gib(bytes: u64) -> u64 {
    bytes.div_ceil(GIB).max(1) * GIB
}

/// Resolve a CSI capacity range (`required_bytes`, `limit_bytes`, 0 = unset)
/// into the GiB-aligned size to provision.
pub fn resolve_capacity(required_bytes: i64, limit_bytes: i64) -> Result<u64, DriverError> {
    if required_bytes < 0 || limit_bytes < 0 {
        return Err(DriverError::InvalidArgument(
            "Capacity range must not be negative".to_string(),
        ));
    }

    let required = required_bytes as u64;
    let limit = limit_bytes as u64;
    let size = if required == 0 {
        DEFAULT_VOLUME_SIZE
    } else {
        round_up_gib(required)
    };

    // Sizes travel back to the caller as int64
    if size > i64::MAX as u64 {
        return Err(DriverError::OutOfRange(format!(
            "Rounded capacity {} exceeds the largest representable size",
            size
        )));
    }

    if limit != 0 && size > limit {
        return Err(DriverError::OutOfRange(format!(
            "Rounded capacity {} exceeds limit {}",
            size, limit
        )));
    }

    Ok(size)
}
