// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! CSI Identity service. Registered in every driver mode.

use std::collections::HashMap;
use tonic::{Request, Response, Status};

use super::csi::identity_server::{Identity, IdentityServer};
use super::csi::plugin_capability::{self, service, volume_expansion};
use super::csi::*;
use crate::domain::node_config::DriverMode;
use crate::{DRIVER_NAME, DRIVER_VERSION};

pub struct IdentityService {
    mode: DriverMode,
}

impl IdentityService {
    pub fn new(mode: DriverMode) -> Self {
        Self { mode }
    }

    /// Create a gRPC server instance
    pub fn into_server(self) -> IdentityServer<Self> {
        IdentityServer::new(self)
    }
}

fn service_capability(kind: service::Type) -> PluginCapability {
    PluginCapability {
        r#type: Some(plugin_capability::Type::Service(plugin_capability::Service {
            r#type: kind as i32,
        })),
    }
}

#[tonic::async_trait]
impl Identity for IdentityService {
    async fn get_plugin_info(
        &self,
        _request: Request<GetPluginInfoRequest>,
    ) -> Result<Response<GetPluginInfoResponse>, Status> {
        Ok(Response::new(GetPluginInfoResponse {
            name: DRIVER_NAME.to_string(),
            vendor_version: DRIVER_VERSION.to_string(),
            manifest: HashMap::new(),
        }))
    }

    async fn get_plugin_capabilities(
        &self,
        _request: Request<GetPluginCapabilitiesRequest>,
    ) -> Result<Response<GetPluginCapabilitiesResponse>, Status> {
        let mut capabilities = Vec::new();
        // Sidecars use CONTROLLER_SERVICE to decide whether to call the controller at all
        if self.mode.serves_controller() {
            capabilities.push(service_capability(service::Type::ControllerService));
        }
        capabilities.push(service_capability(
            service::Type::VolumeAccessibilityConstraints,
        ));
        capabilities.push(PluginCapability {
            r#type: Some(plugin_capability::Type::VolumeExpansion(
                plugin_capability::VolumeExpansion {
                    r#type: volume_expansion::Type::Online as i32,
                },
            )),
        });

        Ok(Response::new(GetPluginCapabilitiesResponse { capabilities }))
    }

    async fn probe(
        &self,
        _request: Request<ProbeRequest>,
    ) -> Result<Response<ProbeResponse>, Status> {
        Ok(Response::new(ProbeResponse { ready: Some(true) }))
    }
}
