// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Instance Metadata
//!
//! Identity and location of the node the driver runs on. Read exactly once at
//! startup; a failure here is fatal to the process.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identity shared read-only by every handler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeIdentity {
    pub node_id: String,
    pub region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
}

#[async_trait]
pub trait MetadataService: Send + Sync {
    async fn identity(&self) -> Result<NodeIdentity, MetadataError>;
}

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("Instance metadata unavailable: {0}")]
    Unavailable(String),

    #[error("Instance metadata is missing {0}")]
    Missing(&'static str),

    #[error("Instance metadata request failed: {0}")]
    Http(String),
}

impl From<reqwest::Error> for MetadataError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            MetadataError::Unavailable(err.to_string())
        } else {
            MetadataError::Http(err.to_string())
        }
    }
}
