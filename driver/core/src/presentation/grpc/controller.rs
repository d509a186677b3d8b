// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! CSI Controller service
//!
//! Provisioning and attachment through the [`CloudProvider`]. Each mutating
//! RPC validates its request, claims its operation key and only then calls
//! the provider. The guard returned by the registry lives until the handler
//! returns, whichever way it returns.

use std::collections::HashMap;
use std::sync::Arc;
use tonic::{Request, Response, Status};
use tracing::{info, instrument};

use super::capabilities;
use super::csi::controller_server::{Controller, ControllerServer};
use super::csi::controller_service_capability::{self, rpc};
use super::csi::*;
use crate::application::{InFlight, OperationKeys};
use crate::domain::cloud::{CloudError, CloudProvider};
use crate::domain::error::DriverError;
use crate::domain::metadata::NodeIdentity;
use crate::domain::volume::{resolve_capacity, CloudVolume, VolumeOptions, TOPOLOGY_ZONE_KEY};

const CAPABILITIES: [rpc::Type; 4] = [
    rpc::Type::CreateDeleteVolume,
    rpc::Type::PublishUnpublishVolume,
    rpc::Type::ListVolumes,
    rpc::Type::ExpandVolume,
];

pub struct ControllerService {
    cloud: Arc<dyn CloudProvider>,
    inflight: Arc<InFlight>,
    keys: OperationKeys,
    identity: Arc<NodeIdentity>,
}

impl ControllerService {
    pub fn new(
        cloud: Arc<dyn CloudProvider>,
        inflight: Arc<InFlight>,
        keys: OperationKeys,
        identity: Arc<NodeIdentity>,
    ) -> Self {
        Self {
            cloud,
            inflight,
            keys,
            identity,
        }
    }

    /// Create a gRPC server instance
    pub fn into_server(self) -> ControllerServer<Self> {
        ControllerServer::new(self)
    }

    fn topology(&self) -> Vec<Topology> {
        self.identity
            .zone
            .iter()
            .map(|zone| Topology {
                segments: HashMap::from([(TOPOLOGY_ZONE_KEY.to_string(), zone.clone())]),
            })
            .collect()
    }

    fn to_csi_volume(&self, volume: &CloudVolume) -> Volume {
        Volume {
            capacity_bytes: volume.capacity_bytes() as i64,
            volume_id: volume.volume_id.clone(),
            volume_context: volume.volume_context().into_iter().collect(),
            content_source: None,
            accessible_topology: self.topology(),
        }
    }

    #[instrument(skip_all, fields(name = %req.name))]
    async fn create(&self, req: CreateVolumeRequest) -> Result<CreateVolumeResponse, DriverError> {
        if req.name.is_empty() {
            return Err(invalid("Volume name not provided"));
        }
        capabilities::validate(&req.volume_capabilities)?;
        if req.volume_content_source.is_some() {
            return Err(invalid("Volume content source is not supported"));
        }

        let (required, limit) = req
            .capacity_range
            .map(|range| (range.required_bytes, range.limit_bytes))
            .unwrap_or_default();
        let capacity = resolve_capacity(required, limit)?;
        let options = VolumeOptions::from_parameters(req.parameters, capacity)?;

        let _guard = self.inflight.admit("CreateVolume", self.keys.create(&req.name))?;
        let volume = self.cloud.create_volume(&req.name, &options).await?;

        info!(
            volume_id = %volume.volume_id,
            resource_type = %volume.options.resource_type,
            capacity_bytes = volume.capacity_bytes(),
            "Volume created"
        );
        Ok(CreateVolumeResponse {
            volume: Some(self.to_csi_volume(&volume)),
        })
    }

    #[instrument(skip_all, fields(volume_id = %req.volume_id))]
    async fn delete(&self, req: DeleteVolumeRequest) -> Result<DeleteVolumeResponse, DriverError> {
        if req.volume_id.is_empty() {
            return Err(invalid("Volume ID not provided"));
        }

        let _guard = self.inflight.admit("DeleteVolume", self.keys.volume(&req.volume_id))?;
        match self.cloud.delete_volume(&req.volume_id).await {
            Ok(()) => info!("Volume deleted"),
            Err(CloudError::NotFound(_)) => info!("Volume not found, treating delete as done"),
            Err(e) => return Err(e.into()),
        }
        Ok(DeleteVolumeResponse {})
    }

    #[instrument(skip_all, fields(volume_id = %req.volume_id, node_id = %req.node_id))]
    async fn publish(
        &self,
        req: ControllerPublishVolumeRequest,
    ) -> Result<ControllerPublishVolumeResponse, DriverError> {
        if req.volume_id.is_empty() {
            return Err(invalid("Volume ID not provided"));
        }
        if req.node_id.is_empty() {
            return Err(invalid("Node ID not provided"));
        }
        let capability = req
            .volume_capability
            .as_ref()
            .ok_or_else(|| invalid("Volume capability not provided"))?;
        if !capabilities::is_supported(capability) {
            return Err(invalid("Volume capability not supported"));
        }

        let _guard = self.inflight.admit(
            "ControllerPublishVolume",
            self.keys.attachment(&req.volume_id, &req.node_id),
        )?;
        match self.cloud.attach_volume(&req.volume_id, &req.node_id).await {
            Ok(()) => {}
            Err(CloudError::NotFound(_)) => {
                return Err(DriverError::NotFound(format!(
                    "Volume {} not found",
                    req.volume_id
                )))
            }
            Err(e) => return Err(e.into()),
        }

        info!("Volume attached");
        Ok(ControllerPublishVolumeResponse {
            publish_context: HashMap::new(),
        })
    }

    #[instrument(skip_all, fields(volume_id = %req.volume_id, node_id = %req.node_id))]
    async fn unpublish(
        &self,
        req: ControllerUnpublishVolumeRequest,
    ) -> Result<ControllerUnpublishVolumeResponse, DriverError> {
        if req.volume_id.is_empty() {
            return Err(invalid("Volume ID not provided"));
        }
        if req.node_id.is_empty() {
            return Err(invalid("Node ID not provided"));
        }

        let _guard = self.inflight.admit(
            "ControllerUnpublishVolume",
            self.keys.attachment(&req.volume_id, &req.node_id),
        )?;
        match self.cloud.detach_volume(&req.volume_id, &req.node_id).await {
            Ok(()) => info!("Volume detached"),
            Err(CloudError::NotFound(_)) => info!("Volume not found, treating detach as done"),
            Err(e) => return Err(e.into()),
        }
        Ok(ControllerUnpublishVolumeResponse {})
    }

    async fn validate(
        &self,
        req: ValidateVolumeCapabilitiesRequest,
    ) -> Result<ValidateVolumeCapabilitiesResponse, DriverError> {
        if req.volume_id.is_empty() {
            return Err(invalid("Volume ID not provided"));
        }
        if req.volume_capabilities.is_empty() {
            return Err(invalid("Volume capabilities not provided"));
        }

        match self.cloud.describe_volume(&req.volume_id).await {
            Ok(_) => {}
            Err(CloudError::NotFound(_)) => {
                return Err(DriverError::NotFound(format!(
                    "Volume {} not found",
                    req.volume_id
                )))
            }
            Err(e) => return Err(e.into()),
        }

        if !capabilities::all_supported(&req.volume_capabilities) {
            return Ok(ValidateVolumeCapabilitiesResponse {
                confirmed: None,
                message: "Requested volume capabilities are not supported".to_string(),
            });
        }

        Ok(ValidateVolumeCapabilitiesResponse {
            confirmed: Some(validate_volume_capabilities_response::Confirmed {
                volume_context: req.volume_context,
                volume_capabilities: req.volume_capabilities,
                parameters: req.parameters,
                mutable_parameters: req.mutable_parameters,
            }),
            message: String::new(),
        })
    }

    async fn list(&self, req: ListVolumesRequest) -> Result<ListVolumesResponse, Status> {
        if req.max_entries < 0 {
            return Err(Status::invalid_argument("max_entries must not be negative"));
        }
        let start = if req.starting_token.is_empty() {
            0
        } else {
            req.starting_token.parse::<usize>().map_err(|_| {
                Status::aborted(format!("Invalid starting token {}", req.starting_token))
            })?
        };

        let volumes = self.cloud.list_volumes().await.map_err(DriverError::from)?;
        if start > volumes.len() {
            return Err(Status::aborted(format!(
                "Starting token {} is past the end of the volume list",
                start
            )));
        }

        let page = match req.max_entries {
            0 => volumes.len() - start,
            n => (n as usize).min(volumes.len() - start),
        };
        let end = start + page;
        let entries = volumes[start..end]
            .iter()
            .map(|volume| list_volumes_response::Entry {
                volume: Some(self.to_csi_volume(volume)),
                status: Some(list_volumes_response::VolumeStatus {
                    published_node_ids: volume.attached_nodes.iter().cloned().collect(),
                    volume_condition: None,
                }),
            })
            .collect();

        Ok(ListVolumesResponse {
            entries,
            next_token: if end < volumes.len() {
                end.to_string()
            } else {
                String::new()
            },
        })
    }

    #[instrument(skip_all, fields(volume_id = %req.volume_id))]
    async fn expand(
        &self,
        req: ControllerExpandVolumeRequest,
    ) -> Result<ControllerExpandVolumeResponse, DriverError> {
        if req.volume_id.is_empty() {
            return Err(invalid("Volume ID not provided"));
        }
        let range = req
            .capacity_range
            .ok_or_else(|| invalid("Capacity range not provided"))?;
        let requested = resolve_capacity(range.required_bytes, range.limit_bytes)?;

        let _guard = self
            .inflight
            .admit("ControllerExpandVolume", self.keys.volume(&req.volume_id))?;

        let volume = match self.cloud.describe_volume(&req.volume_id).await {
            Ok(volume) => volume,
            Err(CloudError::NotFound(_)) => {
                return Err(DriverError::NotFound(format!(
                    "Volume {} not found",
                    req.volume_id
                )))
            }
            Err(e) => return Err(e.into()),
        };

        let current = volume.capacity_bytes();
        if requested < current {
            return Err(invalid(&format!(
                "Cannot shrink volume from {} to {} bytes",
                current, requested
            )));
        }

        let capacity = if requested == current {
            current
        } else {
            self.cloud.resize_volume(&req.volume_id, requested).await?
        };

        info!(capacity_bytes = capacity, "Volume expanded");
        Ok(ControllerExpandVolumeResponse {
            capacity_bytes: capacity as i64,
            node_expansion_required: false,
        })
    }
}

fn invalid(message: &str) -> DriverError {
    DriverError::InvalidArgument(message.to_string())
}

#[tonic::async_trait]
impl Controller for ControllerService {
    async fn create_volume(
        &self,
        request: Request<CreateVolumeRequest>,
    ) -> Result<Response<CreateVolumeResponse>, Status> {
        Ok(Response::new(self.create(request.into_inner()).await?))
    }

    async fn delete_volume(
        &self,
        request: Request<DeleteVolumeRequest>,
    ) -> Result<Response<DeleteVolumeResponse>, Status> {
        Ok(Response::new(self.delete(request.into_inner()).await?))
    }

    async fn controller_publish_volume(
        &self,
        request: Request<ControllerPublishVolumeRequest>,
    ) -> Result<Response<ControllerPublishVolumeResponse>, Status> {
        Ok(Response::new(self.publish(request.into_inner()).await?))
    }

    async fn controller_unpublish_volume(
        &self,
        request: Request<ControllerUnpublishVolumeRequest>,
    ) -> Result<Response<ControllerUnpublishVolumeResponse>, Status> {
        Ok(Response::new(self.unpublish(request.into_inner()).await?))
    }

    async fn validate_volume_capabilities(
        &self,
        request: Request<ValidateVolumeCapabilitiesRequest>,
    ) -> Result<Response<ValidateVolumeCapabilitiesResponse>, Status> {
        Ok(Response::new(self.validate(request.into_inner()).await?))
    }

    async fn list_volumes(
        &self,
        request: Request<ListVolumesRequest>,
    ) -> Result<Response<ListVolumesResponse>, Status> {
        Ok(Response::new(self.list(request.into_inner()).await?))
    }

    async fn get_capacity(
        &self,
        _request: Request<GetCapacityRequest>,
    ) -> Result<Response<GetCapacityResponse>, Status> {
        Err(Status::unimplemented("GetCapacity is not supported"))
    }

    async fn controller_get_capabilities(
        &self,
        _request: Request<ControllerGetCapabilitiesRequest>,
    ) -> Result<Response<ControllerGetCapabilitiesResponse>, Status> {
        let capabilities = CAPABILITIES
            .iter()
            .map(|kind| ControllerServiceCapability {
                r#type: Some(controller_service_capability::Type::Rpc(
                    controller_service_capability::Rpc {
                        r#type: *kind as i32,
                    },
                )),
            })
            .collect();
        Ok(Response::new(ControllerGetCapabilitiesResponse { capabilities }))
    }

    async fn controller_expand_volume(
        &self,
        request: Request<ControllerExpandVolumeRequest>,
    ) -> Result<Response<ControllerExpandVolumeResponse>, Status> {
        Ok(Response::new(self.expand(request.into_inner()).await?))
    }
}
