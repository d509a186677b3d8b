// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! CSI Node service
//!
//! Stages the remote export once per node at the staging path, then bind
//! mounts it into each workload's target path. Volumes reported by the
//! provider with the local DNS name are bind mounted straight from their
//! directory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tonic::{Request, Response, Status};
use tracing::{debug, info, instrument};

use super::capabilities;
use super::csi::node_server::{Node, NodeServer};
use super::csi::node_service_capability::{self, rpc};
use super::csi::*;
use crate::application::{InFlight, OperationKeys};
use crate::domain::error::DriverError;
use crate::domain::metadata::NodeIdentity;
use crate::domain::mount::{MountRequest, Mounter};
use crate::domain::node_config::MountSettings;
use crate::domain::volume::{CONTEXT_DNS_NAME, CONTEXT_VOLUME_PATH, LOCAL_DNS_NAME, TOPOLOGY_ZONE_KEY};

const CAPABILITIES: [rpc::Type; 2] = [rpc::Type::StageUnstageVolume, rpc::Type::ExpandVolume];

pub struct NodeService {
    mounter: Arc<dyn Mounter>,
    inflight: Arc<InFlight>,
    keys: OperationKeys,
    identity: Arc<NodeIdentity>,
    mount: MountSettings,
}

impl NodeService {
    pub fn new(
        mounter: Arc<dyn Mounter>,
        inflight: Arc<InFlight>,
        keys: OperationKeys,
        identity: Arc<NodeIdentity>,
        mount: MountSettings,
    ) -> Self {
        Self {
            mounter,
            inflight,
            keys,
            identity,
            mount,
        }
    }

    /// Create a gRPC server instance
    pub fn into_server(self) -> NodeServer<Self> {
        NodeServer::new(self)
    }

    /// Mount of the remote export described by the volume context
    fn remote_mount(
        &self,
        context: &HashMap<String, String>,
        target: PathBuf,
        flags: Vec<String>,
    ) -> Result<MountRequest, DriverError> {
        let dns_name = context_value(context, CONTEXT_DNS_NAME)?;
        let volume_path = context_value(context, CONTEXT_VOLUME_PATH)?;

        if dns_name == LOCAL_DNS_NAME {
            return Ok(bind_mount(volume_path.to_string(), target, flags));
        }

        let mut options = self.mount.default_options.clone();
        for flag in flags {
            if !options.contains(&flag) {
                options.push(flag);
            }
        }

        Ok(MountRequest {
            source: format!("{}:{}", dns_name, volume_path),
            target,
            fs_type: Some(self.mount.fs_type.clone()),
            options,
        })
    }

    #[instrument(skip_all, fields(volume_id = %req.volume_id, staging = %req.staging_target_path))]
    async fn stage(&self, req: NodeStageVolumeRequest) -> Result<NodeStageVolumeResponse, DriverError> {
        if req.volume_id.is_empty() {
            return Err(invalid("Volume ID not provided"));
        }
        if req.staging_target_path.is_empty() {
            return Err(invalid("Staging target not provided"));
        }
        let capability = req
            .volume_capability
            .as_ref()
            .ok_or_else(|| invalid("Volume capability not provided"))?;
        if !capabilities::is_supported(capability) {
            return Err(invalid("Volume capability not supported"));
        }

        let staging = PathBuf::from(&req.staging_target_path);
        let request = self.remote_mount(
            &req.volume_context,
            staging.clone(),
            capabilities::mount_flags(capability),
        )?;

        let _guard = self
            .inflight
            .admit("NodeStageVolume", self.keys.staging(&req.volume_id, &staging))?;

        if self.mounter.is_mount_point(&staging).await? {
            debug!("Staging path already mounted");
            return Ok(NodeStageVolumeResponse {});
        }

        self.mounter.stage(&request).await?;
        info!(source = %request.source, "Volume staged");
        Ok(NodeStageVolumeResponse {})
    }

    #[instrument(skip_all, fields(volume_id = %req.volume_id, staging = %req.staging_target_path))]
    async fn unstage(
        &self,
        req: NodeUnstageVolumeRequest,
    ) -> Result<NodeUnstageVolumeResponse, DriverError> {
        if req.volume_id.is_empty() {
            return Err(invalid("Volume ID not provided"));
        }
        if req.staging_target_path.is_empty() {
            return Err(invalid("Staging target not provided"));
        }

        let staging = PathBuf::from(&req.staging_target_path);
        let _guard = self
            .inflight
            .admit("NodeUnstageVolume", self.keys.staging(&req.volume_id, &staging))?;

        self.mounter.unstage(&staging).await?;
        info!("Volume unstaged");
        Ok(NodeUnstageVolumeResponse {})
    }

    #[instrument(skip_all, fields(volume_id = %req.volume_id, target = %req.target_path))]
    async fn publish(
        &self,
        req: NodePublishVolumeRequest,
    ) -> Result<NodePublishVolumeResponse, DriverError> {
        if req.volume_id.is_empty() {
            return Err(invalid("Volume ID not provided"));
        }
        if req.target_path.is_empty() {
            return Err(invalid("Target path not provided"));
        }
        let capability = req
            .volume_capability
            .as_ref()
            .ok_or_else(|| invalid("Volume capability not provided"))?;
        if !capabilities::is_supported(capability) {
            return Err(invalid("Volume capability not supported"));
        }

        let target = PathBuf::from(&req.target_path);
        let mut flags = capabilities::mount_flags(capability);
        if req.readonly && !flags.iter().any(|f| f == "ro") {
            flags.push("ro".to_string());
        }

        let request = if req.staging_target_path.is_empty() {
            self.remote_mount(&req.volume_context, target.clone(), flags)?
        } else {
            bind_mount(req.staging_target_path.clone(), target.clone(), flags)
        };

        let _guard = self
            .inflight
            .admit("NodePublishVolume", self.keys.target(&req.volume_id, &target))?;

        if self.mounter.is_mount_point(&target).await? {
            debug!("Target path already mounted");
            return Ok(NodePublishVolumeResponse {});
        }

        self.mounter.publish(&request).await?;
        info!(source = %request.source, readonly = req.readonly, "Volume published");
        Ok(NodePublishVolumeResponse {})
    }

    #[instrument(skip_all, fields(volume_id = %req.volume_id, target = %req.target_path))]
    async fn unpublish(
        &self,
        req: NodeUnpublishVolumeRequest,
    ) -> Result<NodeUnpublishVolumeResponse, DriverError> {
        if req.volume_id.is_empty() {
            return Err(invalid("Volume ID not provided"));
        }
        if req.target_path.is_empty() {
            return Err(invalid("Target path not provided"));
        }

        let target = PathBuf::from(&req.target_path);
        let _guard = self
            .inflight
            .admit("NodeUnpublishVolume", self.keys.target(&req.volume_id, &target))?;

        self.mounter.unpublish(&target).await?;
        info!("Volume unpublished");
        Ok(NodeUnpublishVolumeResponse {})
    }

    async fn expand(&self, req: NodeExpandVolumeRequest) -> Result<NodeExpandVolumeResponse, DriverError> {
        if req.volume_id.is_empty() {
            return Err(invalid("Volume ID not provided"));
        }
        if req.volume_path.is_empty() {
            return Err(invalid("Volume path not provided"));
        }

        let _guard = self.inflight.admit(
            "NodeExpandVolume",
            self.keys.target(&req.volume_id, Path::new(&req.volume_path)),
        )?;

        // Network filesystems grow on the server; nothing to resize locally
        let capacity_bytes = req
            .capacity_range
            .map(|range| range.required_bytes)
            .unwrap_or_default();
        Ok(NodeExpandVolumeResponse { capacity_bytes })
    }
}

fn invalid(message: &str) -> DriverError {
    DriverError::InvalidArgument(message.to_string())
}

fn context_value<'a>(context: &'a HashMap<String, String>, key: &str) -> Result<&'a str, DriverError> {
    context
        .get(key)
        .map(String::as_str)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| DriverError::InvalidArgument(format!("Volume context is missing {}", key)))
}

fn bind_mount(source: String, target: PathBuf, flags: Vec<String>) -> MountRequest {
    let mut options = vec!["bind".to_string()];
    options.extend(flags.into_iter().filter(|f| f != "bind"));
    MountRequest {
        source,
        target,
        fs_type: None,
        options,
    }
}

#[tonic::async_trait]
impl Node for NodeService {
    async fn node_stage_volume(
        &self,
        request: Request<NodeStageVolumeRequest>,
    ) -> Result<Response<NodeStageVolumeResponse>, Status> {
        Ok(Response::new(self.stage(request.into_inner()).await?))
    }

    async fn node_unstage_volume(
        &self,
        request: Request<NodeUnstageVolumeRequest>,
    ) -> Result<Response<NodeUnstageVolumeResponse>, Status> {
        Ok(Response::new(self.unstage(request.into_inner()).await?))
    }

    async fn node_publish_volume(
        &self,
        request: Request<NodePublishVolumeRequest>,
    ) -> Result<Response<NodePublishVolumeResponse>, Status> {
        Ok(Response::new(self.publish(request.into_inner()).await?))
    }

    async fn node_unpublish_volume(
        &self,
        request: Request<NodeUnpublishVolumeRequest>,
    ) -> Result<Response<NodeUnpublishVolumeResponse>, Status> {
        Ok(Response::new(self.unpublish(request.into_inner()).await?))
    }

    async fn node_get_volume_stats(
        &self,
        _request: Request<NodeGetVolumeStatsRequest>,
    ) -> Result<Response<NodeGetVolumeStatsResponse>, Status> {
        Err(Status::unimplemented("NodeGetVolumeStats is not supported"))
    }

    async fn node_expand_volume(
        &self,
        request: Request<NodeExpandVolumeRequest>,
    ) -> Result<Response<NodeExpandVolumeResponse>, Status> {
        Ok(Response::new(self.expand(request.into_inner()).await?))
    }

    async fn node_get_capabilities(
        &self,
        _request: Request<NodeGetCapabilitiesRequest>,
    ) -> Result<Response<NodeGetCapabilitiesResponse>, Status> {
        let capabilities = CAPABILITIES
            .iter()
            .map(|kind| NodeServiceCapability {
                r#type: Some(node_service_capability::Type::Rpc(node_service_capability::Rpc {
                    r#type: *kind as i32,
                })),
            })
            .collect();
        Ok(Response::new(NodeGetCapabilitiesResponse { capabilities }))
    }

    async fn node_get_info(
        &self,
        _request: Request<NodeGetInfoRequest>,
    ) -> Result<Response<NodeGetInfoResponse>, Status> {
        let accessible_topology = self.identity.zone.as_ref().map(|zone| Topology {
            segments: HashMap::from([(TOPOLOGY_ZONE_KEY.to_string(), zone.clone())]),
        });

        Ok(Response::new(NodeGetInfoResponse {
            node_id: self.identity.node_id.clone(),
            max_volumes_per_node: 0,
            accessible_topology,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::node_config::KeyPolicy;
    use crate::presentation::grpc::csi::volume_capability::{
        access_mode::Mode, AccessMode, AccessType, MountVolume,
    };
    use crate::test_util::{Gate, MountCall, RecordingMounter};
    use tonic::Code;

    const STAGING: &str = "/var/lib/kubelet/plugins/kubernetes.io/csi/fsx/staging";
    const TARGET: &str = "/var/lib/kubelet/pods/a/volumes/kubernetes.io~csi/pv/mount";

    fn service_with(
        mounter: Arc<RecordingMounter>,
        policy: KeyPolicy,
    ) -> (NodeService, Arc<InFlight>) {
        let inflight = Arc::new(InFlight::new());
        let service = NodeService::new(
            mounter,
            Arc::clone(&inflight),
            OperationKeys::new(policy),
            Arc::new(NodeIdentity {
                node_id: "i-node".to_string(),
                region: "us-east-1".to_string(),
                zone: Some("us-east-1b".to_string()),
            }),
            MountSettings {
                fs_type: "nfs".to_string(),
                default_options: vec!["nfsvers=4.1".to_string()],
            },
        );
        (service, inflight)
    }

    fn capability(flags: &[&str]) -> VolumeCapability {
        VolumeCapability {
            access_type: Some(AccessType::Mount(MountVolume {
                mount_flags: flags.iter().map(|f| f.to_string()).collect(),
                ..Default::default()
            })),
            access_mode: Some(AccessMode {
                mode: Mode::MultiNodeMultiWriter as i32,
            }),
        }
    }

    fn context(dns_name: &str, path: &str) -> HashMap<String, String> {
        HashMap::from([
            (CONTEXT_DNS_NAME.to_string(), dns_name.to_string()),
            (CONTEXT_VOLUME_PATH.to_string(), path.to_string()),
        ])
    }

    fn stage_request() -> NodeStageVolumeRequest {
        NodeStageVolumeRequest {
            volume_id: "fs-1".to_string(),
            staging_target_path: STAGING.to_string(),
            volume_capability: Some(capability(&["nconnect=16", "nfsvers=4.1"])),
            volume_context: context("fs-1.fsx.us-east-1.amazonaws.com", "/fsx"),
            ..Default::default()
        }
    }

    fn publish_request(target: &str) -> NodePublishVolumeRequest {
        NodePublishVolumeRequest {
            volume_id: "fs-1".to_string(),
            staging_target_path: STAGING.to_string(),
            target_path: target.to_string(),
            volume_capability: Some(capability(&[])),
            readonly: true,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_stage_mounts_remote_export_once() {
        let mounter = Arc::new(RecordingMounter::new());
        let (service, inflight) = service_with(Arc::clone(&mounter), KeyPolicy::Volume);

        service
            .node_stage_volume(Request::new(stage_request()))
            .await
            .unwrap();
        service
            .node_stage_volume(Request::new(stage_request()))
            .await
            .unwrap();

        assert_eq!(
            mounter.calls(),
            vec![MountCall::Stage(MountRequest {
                source: "fs-1.fsx.us-east-1.amazonaws.com:/fsx".to_string(),
                target: PathBuf::from(STAGING),
                fs_type: Some("nfs".to_string()),
                options: vec!["nfsvers=4.1".to_string(), "nconnect=16".to_string()],
            })]
        );
        assert!(inflight.is_empty());
    }

    #[tokio::test]
    async fn test_stage_requires_volume_context() {
        let mounter = Arc::new(RecordingMounter::new());
        let (service, _) = service_with(Arc::clone(&mounter), KeyPolicy::Volume);

        let mut request = stage_request();
        request.volume_context.remove(CONTEXT_DNS_NAME);
        let status = service
            .node_stage_volume(Request::new(request))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::InvalidArgument);

        let mut request = stage_request();
        request.volume_capability = None;
        let status = service
            .node_stage_volume(Request::new(request))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::InvalidArgument);
        assert!(mounter.calls().is_empty());
    }

    #[tokio::test]
    async fn test_local_volume_is_bind_mounted() {
        let mounter = Arc::new(RecordingMounter::new());
        let (service, _) = service_with(Arc::clone(&mounter), KeyPolicy::Volume);

        let mut request = stage_request();
        request.volume_context = context(LOCAL_DNS_NAME, "/srv/fsx/fsvol-1");
        service.node_stage_volume(Request::new(request)).await.unwrap();

        match &mounter.calls()[0] {
            MountCall::Stage(request) => {
                assert_eq!(request.source, "/srv/fsx/fsvol-1");
                assert!(request.is_bind());
                assert_eq!(request.fs_type, None);
            }
            other => panic!("unexpected call {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_publish_binds_staging_path_readonly() {
        let mounter = Arc::new(RecordingMounter::new());
        let (service, _) = service_with(Arc::clone(&mounter), KeyPolicy::Volume);

        service
            .node_publish_volume(Request::new(publish_request(TARGET)))
            .await
            .unwrap();

        assert_eq!(
            mounter.calls(),
            vec![MountCall::Publish(MountRequest {
                source: STAGING.to_string(),
                target: PathBuf::from(TARGET),
                fs_type: None,
                options: vec!["bind".to_string(), "ro".to_string()],
            })]
        );

        service
            .node_unpublish_volume(Request::new(NodeUnpublishVolumeRequest {
                volume_id: "fs-1".to_string(),
                target_path: TARGET.to_string(),
            }))
            .await
            .unwrap();
        assert!(!mounter.is_mounted(Path::new(TARGET)));
    }

    #[tokio::test]
    async fn test_mount_failure_releases_key() {
        let mounter = Arc::new(RecordingMounter::failing("access denied by server"));
        let (service, inflight) = service_with(mounter, KeyPolicy::Volume);

        let status = service
            .node_stage_volume(Request::new(stage_request()))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::Internal);
        assert!(status.message().contains("access denied by server"));
        assert!(inflight.is_empty());
    }

    #[tokio::test]
    async fn test_volume_target_policy_allows_parallel_publishes() {
        let gate = Arc::new(Gate::default());
        let mounter = Arc::new(RecordingMounter::gated(Arc::clone(&gate)));
        let (service, inflight) = service_with(Arc::clone(&mounter), KeyPolicy::VolumeTarget);
        let service = Arc::new(service);

        let first = {
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                service
                    .node_publish_volume(Request::new(publish_request("/pods/a/mount")))
                    .await
            })
        };
        gate.entered().await;

        // Same target: rejected
        let status = service
            .node_publish_volume(Request::new(publish_request("/pods/a/mount")))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::Aborted);

        // Different target on the same volume: admitted
        let second = {
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                service
                    .node_publish_volume(Request::new(publish_request("/pods/b/mount")))
                    .await
            })
        };
        gate.entered().await;
        assert_eq!(inflight.len(), 2);

        gate.release();
        gate.release();
        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();
        assert!(inflight.is_empty());
        assert_eq!(mounter.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_volume_policy_serialises_stage_and_publish() {
        let gate = Arc::new(Gate::default());
        let mounter = Arc::new(RecordingMounter::gated(Arc::clone(&gate)));
        let (service, _) = service_with(Arc::clone(&mounter), KeyPolicy::Volume);
        let service = Arc::new(service);

        let stage = {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.node_stage_volume(Request::new(stage_request())).await })
        };
        gate.entered().await;

        let status = service
            .node_publish_volume(Request::new(publish_request(TARGET)))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::Aborted);
        assert_eq!(mounter.calls().len(), 1);

        gate.release();
        stage.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_node_info_and_expand() {
        let (service, _) = service_with(Arc::new(RecordingMounter::new()), KeyPolicy::Volume);

        let info = service
            .node_get_info(Request::new(NodeGetInfoRequest {}))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(info.node_id, "i-node");
        assert_eq!(
            info.accessible_topology.unwrap().segments[TOPOLOGY_ZONE_KEY],
            "us-east-1b"
        );

        let expanded = service
            .node_expand_volume(Request::new(NodeExpandVolumeRequest {
                volume_id: "fs-1".to_string(),
                volume_path: TARGET.to_string(),
                capacity_range: Some(CapacityRange {
                    required_bytes: 42,
                    limit_bytes: 0,
                }),
                ..Default::default()
            }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(expanded.capacity_bytes, 42);

        let status = service
            .node_get_volume_stats(Request::new(NodeGetVolumeStatsRequest::default()))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::Unimplemented);
    }
}
