// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Metadata Sources
//!
//! - [`StaticMetadata`]: identity taken verbatim from configuration
//! - [`Ec2Metadata`]: the EC2 instance metadata service, IMDSv2 session
//!   tokens only

use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

use crate::domain::metadata::{MetadataError, MetadataService, NodeIdentity};
use crate::domain::node_config::NodeSettings;

pub const DEFAULT_IMDS_ENDPOINT: &str = "http://169.254.169.254";

const TOKEN_TTL_HEADER: &str = "X-aws-ec2-metadata-token-ttl-seconds";
const TOKEN_HEADER: &str = "X-aws-ec2-metadata-token";
const TOKEN_TTL_SECONDS: &str = "21600";

/// Region reported when the identity is static and no region is configured
const STATIC_REGION: &str = "local";

#[derive(Debug, Clone)]
pub struct StaticMetadata {
    identity: NodeIdentity,
}

impl StaticMetadata {
    pub fn new(identity: NodeIdentity) -> Self {
        Self { identity }
    }
}

#[async_trait]
impl MetadataService for StaticMetadata {
    async fn identity(&self) -> Result<NodeIdentity, MetadataError> {
        Ok(self.identity.clone())
    }
}

pub struct Ec2Metadata {
    client: reqwest::Client,
    endpoint: String,
}

impl Ec2Metadata {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, MetadataError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        })
    }

    async fn token(&self) -> Result<String, MetadataError> {
        let token = self
            .client
            .put(format!("{}/latest/api/token", self.endpoint))
            .header(TOKEN_TTL_HEADER, TOKEN_TTL_SECONDS)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(token)
    }

    async fn get(&self, token: &str, path: &str, field: &'static str) -> Result<String, MetadataError> {
        let value = self
            .client
            .get(format!("{}/latest/meta-data/{}", self.endpoint, path))
            .header(TOKEN_HEADER, token)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let value = value.trim();
        if value.is_empty() {
            return Err(MetadataError::Missing(field));
        }
        Ok(value.to_string())
    }
}

#[async_trait]
impl MetadataService for Ec2Metadata {
    async fn identity(&self) -> Result<NodeIdentity, MetadataError> {
        let token = self.token().await?;
        let node_id = self.get(&token, "instance-id", "instance-id").await?;
        let region = self.get(&token, "placement/region", "region").await?;
        let zone = self
            .get(&token, "placement/availability-zone", "availability-zone")
            .await?;

        Ok(NodeIdentity {
            node_id,
            region,
            zone: Some(zone),
        })
    }
}

/// Resolve the node identity once at startup.
///
/// A configured node id makes the identity static and no network call is
/// made. Otherwise the instance metadata service is queried and any
/// configured region or zone overrides what it reports.
pub async fn discover_identity(settings: &NodeSettings) -> Result<NodeIdentity, MetadataError> {
    if let Some(node_id) = &settings.id {
        info!(node_id = %node_id, "Using static node identity");
        return StaticMetadata::new(NodeIdentity {
            node_id: node_id.clone(),
            region: settings
                .region
                .clone()
                .unwrap_or_else(|| STATIC_REGION.to_string()),
            zone: settings.zone.clone(),
        })
        .identity()
        .await;
    }

    let endpoint = settings
        .metadata_endpoint
        .as_deref()
        .unwrap_or(DEFAULT_IMDS_ENDPOINT);
    info!(endpoint, "Discovering node identity from instance metadata");

    let mut identity = Ec2Metadata::new(endpoint)?.identity().await?;
    if let Some(region) = &settings.region {
        identity.region = region.clone();
    }
    if settings.zone.is_some() {
        identity.zone = settings.zone.clone();
    }
    Ok(identity)
}
