// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Driver Configuration Types
//
// Defines the configuration schema for the CSI driver process, including:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Bind endpoint and driver mode (controller, node, or both)
// - Operation key policy for admission control
// - Static node identity (overrides instance metadata discovery)
// - Provider backend and mount defaults

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::domain::endpoint::Endpoint;

pub const API_VERSION: &str = "fsx.csi/v1";
pub const KIND: &str = "DriverConfig";
pub const DEFAULT_ENDPOINT: &str = "unix:///tmp/csi.sock";
pub const CONFIG_PATH_ENV: &str = "FSX_CSI_CONFIG_PATH";

/// Top-level Kubernetes-style driver configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    /// API version (must be "fsx.csi/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "DriverConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    pub spec: DriverConfigSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Driver settings (content under `spec:`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfigSpec {
    /// Bind target, `unix:///path` or `tcp://host:port`
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default)]
    pub mode: DriverMode,

    #[serde(default)]
    pub key_policy: KeyPolicy,

    /// Static identity; unset fields are filled from instance metadata
    #[serde(default)]
    pub node: NodeSettings,

    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub mount: MountSettings,
}

/// Which CSI roles this process serves. Identity is always served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverMode {
    Controller,
    Node,
    #[default]
    All,
}

impl DriverMode {
    pub fn serves_controller(&self) -> bool {
        matches!(self, DriverMode::Controller | DriverMode::All)
    }

    pub fn serves_node(&self) -> bool {
        matches!(self, DriverMode::Node | DriverMode::All)
    }
}

impl std::str::FromStr for DriverMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "controller" => Ok(DriverMode::Controller),
            "node" => Ok(DriverMode::Node),
            "all" => Ok(DriverMode::All),
            other => Err(format!(
                "invalid mode '{}': expected controller, node or all",
                other
            )),
        }
    }
}

/// Granularity of operation keys.
///
/// `Volume` serialises every mutating call on a volume. `VolumeTarget` lets
/// calls on the same volume proceed in parallel as long as they touch
/// different nodes or mount paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyPolicy {
    #[default]
    Volume,
    VolumeTarget,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,

    /// Base URL of the instance metadata service (tests and proxies)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata_endpoint: Option<String>,
}

/// Provider backend used by the controller role
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProviderConfig {
    /// In-process, non-persistent (testing and sanity runs)
    #[default]
    Memory,

    /// Directories under `base_path` exported by the local host
    Local { base_path: PathBuf },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MountSettings {
    #[serde(default = "default_fs_type")]
    pub fs_type: String,

    /// Appended to the mount flags of every stage/publish
    #[serde(default)]
    pub default_options: Vec<String>,
}

impl Default for MountSettings {
    fn default() -> Self {
        Self {
            fs_type: default_fs_type(),
            default_options: Vec::new(),
        }
    }
}

impl Default for DriverConfigSpec {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            mode: DriverMode::default(),
            key_policy: KeyPolicy::default(),
            node: NodeSettings::default(),
            provider: ProviderConfig::default(),
            mount: MountSettings::default(),
        }
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "fsx-csi-node".to_string());

        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: hostname,
                version: Some("1.0.0".to_string()),
            },
            spec: DriverConfigSpec::default(),
        }
    }
}

impl DriverConfig {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    pub fn to_yaml_string(&self) -> anyhow::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Discover configuration file using precedence order
    /// 1. FSX_CSI_CONFIG_PATH environment variable
    /// 2. ./fsx-csi.yaml (working directory)
    /// 3. /etc/fsx-csi/config.yaml (system)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./fsx-csi.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        let system_config = PathBuf::from("/etc/fsx-csi/config.yaml");
        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit path must exist and parse
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load config at {:?}: {}", path, e)
            })?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::debug!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration.
    /// CSI sidecar manifests conventionally pass the socket and node name this way.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(endpoint) = std::env::var("CSI_ENDPOINT") {
            if !endpoint.is_empty() {
                tracing::info!("Environment override: CSI_ENDPOINT={}", endpoint);
                self.spec.endpoint = endpoint;
            }
        }

        if let Ok(node_id) = std::env::var("CSI_NODE_ID") {
            if !node_id.is_empty() {
                tracing::info!("Environment override: CSI_NODE_ID={}", node_id);
                self.spec.node.id = Some(node_id);
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        Endpoint::parse(&self.spec.endpoint)
            .map_err(|e| anyhow::anyhow!("spec.endpoint is invalid: {}", e))?;

        if let Some(id) = &self.spec.node.id {
            if id.trim().is_empty() {
                anyhow::bail!("spec.node.id cannot be blank when set");
            }
        }

        if let ProviderConfig::Local { base_path } = &self.spec.provider {
            if base_path.as_os_str().is_empty() {
                anyhow::bail!("spec.provider.base_path cannot be empty for the local provider");
            }
        }

        if self.spec.mount.fs_type.is_empty() {
            anyhow::bail!("spec.mount.fs_type cannot be empty");
        }

        Ok(())
    }
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_fs_type() -> String {
    "nfs".to_string()
}
