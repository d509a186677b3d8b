// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Driver server entry point

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

use fsx_csi_core::domain::cloud::CloudProvider;
use fsx_csi_core::domain::node_config::{DriverConfig, DriverMode};
use fsx_csi_core::infrastructure::cloud::{create_cloud_provider, InMemoryCloudProvider};
use fsx_csi_core::infrastructure::metadata::discover_identity;
use fsx_csi_core::infrastructure::mount::SystemMounter;
use fsx_csi_core::presentation::grpc::{Driver, DriverOptions};
use fsx_csi_core::{DRIVER_NAME, DRIVER_VERSION};

/// Command-line values that take precedence over the configuration file
#[derive(Debug, Clone, Default)]
pub struct ServeOverrides {
    pub endpoint: Option<String>,
    pub mode: Option<DriverMode>,
    pub node_id: Option<String>,
    pub metrics_address: Option<SocketAddr>,
}

impl ServeOverrides {
    pub fn apply(&self, config: &mut DriverConfig) {
        if let Some(endpoint) = &self.endpoint {
            config.spec.endpoint = endpoint.clone();
        }
        if let Some(mode) = self.mode {
            config.spec.mode = mode;
        }
        if let Some(node_id) = &self.node_id {
            config.spec.node.id = Some(node_id.clone());
        }
    }
}

/// Load, override and validate the configuration
pub fn load_config(config_path: Option<PathBuf>, overrides: &ServeOverrides) -> Result<DriverConfig> {
    let mut config =
        DriverConfig::load_or_default(config_path).context("Failed to load configuration")?;
    overrides.apply(&mut config);
    config
        .validate()
        .context("Configuration validation failed")?;
    Ok(config)
}

pub async fn start_driver(config_path: Option<PathBuf>, overrides: ServeOverrides) -> Result<()> {
    info!(driver = DRIVER_NAME, version = DRIVER_VERSION, "FSx CSI driver starting");

    let config = load_config(config_path, &overrides)?;
    let spec = &config.spec;
    info!(
        endpoint = %spec.endpoint,
        mode = ?spec.mode,
        key_policy = ?spec.key_policy,
        "Configuration loaded"
    );

    if let Some(addr) = overrides.metrics_address {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("Failed to start metrics exporter")?;
        info!("Metrics exporter listening on {}", addr);
    }

    let identity = discover_identity(&spec.node)
        .await
        .context("Failed to discover node identity")?;
    info!(
        node_id = %identity.node_id,
        region = %identity.region,
        zone = identity.zone.as_deref().unwrap_or("-"),
        "Node identity resolved"
    );

    // The node role never calls the provider
    let cloud: Arc<dyn CloudProvider> = if spec.mode.serves_controller() {
        create_cloud_provider(&spec.provider).context("Failed to initialize provider client")?
    } else {
        Arc::new(InMemoryCloudProvider::new())
    };

    let driver = Arc::new(Driver::new(
        spec.endpoint.clone(),
        DriverOptions::from_spec(spec),
        cloud,
        Arc::new(SystemMounter::new()),
        identity,
    ));

    let signal_driver = Arc::clone(&driver);
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_driver.stop();
    });

    driver.run().await.context("CSI driver failed")?;

    info!("FSx CSI driver shutting down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fsx_csi_core::domain::node_config::ProviderConfig;
    use std::io::Write;

    #[test]
    fn test_overrides_win_over_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "apiVersion: fsx.csi/v1\nkind: DriverConfig\nmetadata:\n  name: test\nspec:\n  endpoint: unix:///var/lib/csi/csi.sock\n  mode: controller\n  provider:\n    type: memory\n"
        )
        .unwrap();

        let overrides = ServeOverrides {
            endpoint: Some("tcp://127.0.0.1:10000".to_string()),
            mode: Some(DriverMode::Node),
            node_id: Some("node-a".to_string()),
            metrics_address: None,
        };
        let config = load_config(Some(file.path().to_path_buf()), &overrides).unwrap();

        assert_eq!(config.spec.endpoint, "tcp://127.0.0.1:10000");
        assert_eq!(config.spec.mode, DriverMode::Node);
        assert_eq!(config.spec.node.id.as_deref(), Some("node-a"));
        assert_eq!(config.spec.provider, ProviderConfig::Memory);
    }

    #[test]
    fn test_invalid_endpoint_override_fails_validation() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            file.path(),
            "apiVersion: fsx.csi/v1\nkind: DriverConfig\nmetadata:\n  name: test\nspec: {}\n",
        )
        .unwrap();

        let overrides = ServeOverrides {
            endpoint: Some("udp://0.0.0.0:1".to_string()),
            ..Default::default()
        };
        assert!(load_config(Some(file.path().to_path_buf()), &overrides).is_err());
    }

    #[test]
    fn test_missing_explicit_config_is_an_error() {
        let result = load_config(
            Some(PathBuf::from("/nonexistent/fsx-csi.yaml")),
            &ServeOverrides::default(),
        );
        assert!(result.is_err());
    }
}
