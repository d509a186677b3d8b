// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! CSI gRPC Server
//!
//! [`Driver`] is the composition root: it owns the collaborators, the
//! in-flight registry and the node identity, and wires the Identity,
//! Controller and Node roles onto one endpoint.
//!
//! Lifecycle:
//! 1. [`Driver::bind`] claims the driver's single server slot, parses the
//!    endpoint and opens the listener. Nothing is registered yet.
//! 2. [`BoundServer::serve`] builds the router behind [`ErrorLoggingLayer`]
//!    and serves until [`Driver::stop`] or a transport failure.
//!
//! [`Driver::run`] does both. [`Driver::stop`] closes the listener and sends
//! GOAWAY on every open connection, so no new call is dispatched after it.
//! `serve` returns right away; calls already admitted finish on the detached
//! server task and release their keys there.

use parking_lot::Mutex;
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::{TcpListener, UnixListener};
use tokio_stream::wrappers::{TcpListenerStream, UnixListenerStream};
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;
use tracing::{info, warn};

use super::controller::ControllerService;
use super::identity::IdentityService;
use super::interceptor::ErrorLoggingLayer;
use super::node::NodeService;
use crate::application::{InFlight, OperationKeys};
use crate::domain::cloud::CloudProvider;
use crate::domain::endpoint::{Endpoint, Scheme};
use crate::domain::error::DriverError;
use crate::domain::metadata::NodeIdentity;
use crate::domain::mount::Mounter;
use crate::domain::node_config::{DriverConfigSpec, DriverMode, KeyPolicy, MountSettings};

/// Role selection and per-role settings
#[derive(Debug, Clone, Default)]
pub struct DriverOptions {
    pub mode: DriverMode,
    pub key_policy: KeyPolicy,
    pub mount: MountSettings,
}

impl DriverOptions {
    pub fn from_spec(spec: &DriverConfigSpec) -> Self {
        Self {
            mode: spec.mode,
            key_policy: spec.key_policy,
            mount: spec.mount.clone(),
        }
    }
}

type ServerSlot = Arc<Mutex<Option<CancellationToken>>>;

pub struct Driver {
    endpoint: String,
    options: DriverOptions,
    cloud: Arc<dyn CloudProvider>,
    mounter: Arc<dyn Mounter>,
    inflight: Arc<InFlight>,
    identity: Arc<NodeIdentity>,
    server: ServerSlot,
}

impl Driver {
    pub fn new(
        endpoint: impl Into<String>,
        options: DriverOptions,
        cloud: Arc<dyn CloudProvider>,
        mounter: Arc<dyn Mounter>,
        identity: NodeIdentity,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            options,
            cloud,
            mounter,
            inflight: Arc::new(InFlight::new()),
            identity: Arc::new(identity),
            server: Arc::new(Mutex::new(None)),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    pub fn inflight(&self) -> &Arc<InFlight> {
        &self.inflight
    }

    pub fn is_running(&self) -> bool {
        self.server.lock().is_some()
    }

    /// Bind and serve until [`Driver::stop`] is called.
    pub async fn run(&self) -> Result<(), DriverError> {
        self.bind().await?.serve().await
    }

    /// Claim the server slot and open the listener.
    ///
    /// # Errors
    ///
    /// - [`DriverError::AlreadyRunning`] if a server from this driver is live
    /// - [`DriverError::InvalidEndpoint`] if the endpoint does not parse
    /// - [`DriverError::Bind`] if the listener cannot be opened
    pub async fn bind(&self) -> Result<BoundServer, DriverError> {
        let token = CancellationToken::new();
        let slot = SlotGuard::claim(&self.server, token.clone())?;

        let endpoint = Endpoint::parse(&self.endpoint)?;
        let listener = Listener::bind(&endpoint).await?;
        info!(endpoint = %endpoint, mode = ?self.options.mode, "CSI driver listening");

        Ok(BoundServer {
            listener,
            services: self.services(),
            token,
            _slot: slot,
        })
    }

    /// Stop serving. A no-op when nothing is running.
    pub fn stop(&self) {
        if let Some(token) = self.server.lock().as_ref() {
            info!(endpoint = %self.endpoint, "Stopping CSI driver");
            token.cancel();
        }
    }

    fn services(&self) -> Services {
        let keys = OperationKeys::new(self.options.key_policy);
        let mode = self.options.mode;

        Services {
            identity: IdentityService::new(mode),
            controller: mode.serves_controller().then(|| {
                ControllerService::new(
                    Arc::clone(&self.cloud),
                    Arc::clone(&self.inflight),
                    keys,
                    Arc::clone(&self.identity),
                )
            }),
            node: mode.serves_node().then(|| {
                NodeService::new(
                    Arc::clone(&self.mounter),
                    Arc::clone(&self.inflight),
                    keys,
                    Arc::clone(&self.identity),
                    self.options.mount.clone(),
                )
            }),
        }
    }
}

/// The three role handlers, built once a listener is bound
struct Services {
    identity: IdentityService,
    controller: Option<ControllerService>,
    node: Option<NodeService>,
}

/// Clears the driver's server slot when the server goes away
struct SlotGuard {
    slot: ServerSlot,
}

impl SlotGuard {
    fn claim(slot: &ServerSlot, token: CancellationToken) -> Result<Self, DriverError> {
        let mut current = slot.lock();
        if current.is_some() {
            return Err(DriverError::AlreadyRunning);
        }
        *current = Some(token);
        Ok(Self {
            slot: Arc::clone(slot),
        })
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.slot.lock().take();
    }
}

enum Listener {
    Unix { listener: UnixListener, path: PathBuf },
    Tcp(TcpListener),
}

impl Listener {
    async fn bind(endpoint: &Endpoint) -> Result<Self, DriverError> {
        let bind_error = |source| DriverError::Bind {
            endpoint: endpoint.to_string(),
            source,
        };

        match endpoint.scheme {
            Scheme::Unix => {
                let path = PathBuf::from(&endpoint.address);
                remove_stale_socket(&path).map_err(bind_error)?;
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent).map_err(bind_error)?;
                }
                let listener = UnixListener::bind(&path).map_err(bind_error)?;
                Ok(Listener::Unix { listener, path })
            }
            Scheme::Tcp => {
                let listener = TcpListener::bind(endpoint.address.as_str())
                    .await
                    .map_err(bind_error)?;
                Ok(Listener::Tcp(listener))
            }
        }
    }

    fn local_addr(&self) -> BoundAddress {
        match self {
            Listener::Unix { path, .. } => BoundAddress::Unix(path.clone()),
            Listener::Tcp(listener) => match listener.local_addr() {
                Ok(addr) => BoundAddress::Tcp(addr),
                Err(_) => BoundAddress::Unknown,
            },
        }
    }
}

/// A socket left behind by a previous process would make bind fail
fn remove_stale_socket(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            info!(path = %path.display(), "Removed stale socket");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Where a [`BoundServer`] is listening
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoundAddress {
    Unix(PathBuf),
    Tcp(SocketAddr),
    Unknown,
}

impl fmt::Display for BoundAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoundAddress::Unix(path) => write!(f, "unix://{}", path.display()),
            BoundAddress::Tcp(addr) => write!(f, "tcp://{}", addr),
            BoundAddress::Unknown => f.write_str("unknown"),
        }
    }
}

/// A listener that is open but not yet serving
pub struct BoundServer {
    listener: Listener,
    services: Services,
    token: CancellationToken,
    _slot: SlotGuard,
}

impl BoundServer {
    pub fn local_addr(&self) -> BoundAddress {
        self.listener.local_addr()
    }

    /// Register the roles behind the interception layer and serve.
    pub async fn serve(self) -> Result<(), DriverError> {
        let BoundServer {
            listener,
            services,
            token,
            _slot,
        } = self;

        let router = Server::builder()
            .layer(ErrorLoggingLayer::with_shutdown(token.clone()))
            .add_service(services.identity.into_server())
            .add_optional_service(services.controller.map(ControllerService::into_server))
            .add_optional_service(services.node.map(NodeService::into_server));

        // Connections live on tasks spawned by tonic; only its own shutdown
        // signal makes them refuse new streams
        let shutdown = token.clone().cancelled_owned();
        let (mut server, socket) = match listener {
            Listener::Unix { listener, path } => {
                let incoming = UnixListenerStream::new(listener);
                let server = tokio::spawn(router.serve_with_incoming_shutdown(incoming, shutdown));
                (server, Some(path))
            }
            Listener::Tcp(listener) => {
                let incoming = TcpListenerStream::new(listener);
                let server = tokio::spawn(router.serve_with_incoming_shutdown(incoming, shutdown));
                (server, None)
            }
        };

        // The drain of admitted calls is not awaited
        let result = tokio::select! {
            joined = &mut server => match joined {
                Ok(result) => result.map_err(|e| DriverError::Transport(e.to_string())),
                Err(e) => Err(DriverError::Transport(e.to_string())),
            },
            _ = token.cancelled() => Ok(()),
        };

        if let Some(path) = socket {
            if let Err(e) = std::fs::remove_file(&path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "Failed to remove socket");
                }
            }
        }

        info!("CSI driver stopped");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{CountingCloudProvider, RecordingMounter};
    use std::time::Duration;

    fn driver(endpoint: &str) -> Driver {
        Driver::new(
            endpoint,
            DriverOptions::default(),
            Arc::new(CountingCloudProvider::new()),
            Arc::new(RecordingMounter::new()),
            NodeIdentity {
                node_id: "node-a".to_string(),
                region: "local".to_string(),
                zone: None,
            },
        )
    }

    #[tokio::test]
    async fn test_invalid_endpoint_fails_before_bind() {
        let driver = driver("bogus-no-scheme");
        let err = driver.run().await.unwrap_err();
        assert!(matches!(err, DriverError::InvalidEndpoint(_)));
        assert!(!driver.is_running());
    }

    #[tokio::test]
    async fn test_bind_in_use_fails() {
        let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = occupied.local_addr().unwrap();

        let driver = driver(&format!("tcp://{}", addr));
        let err = driver.run().await.unwrap_err();
        assert!(matches!(err, DriverError::Bind { .. }));
        assert!(!driver.is_running());
    }

    #[tokio::test]
    async fn test_second_bind_is_already_running() {
        let driver = driver("tcp://127.0.0.1:0");
        let bound = driver.bind().await.unwrap();
        assert!(driver.is_running());
        assert!(matches!(driver.bind().await, Err(DriverError::AlreadyRunning)));

        drop(bound);
        assert!(!driver.is_running());
        assert!(driver.bind().await.is_ok());
    }

    #[tokio::test]
    async fn test_stop_ends_serve() {
        let driver = Arc::new(driver("tcp://127.0.0.1:0"));
        let bound = driver.bind().await.unwrap();
        assert!(matches!(bound.local_addr(), BoundAddress::Tcp(addr) if addr.port() != 0));

        let server = tokio::spawn(bound.serve());
        driver.stop();
        tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(!driver.is_running());

        // Stop without a server is a no-op
        driver.stop();
    }

    #[tokio::test]
    async fn test_unix_socket_replaced_and_removed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("csi.sock");
        std::fs::write(&path, b"stale").unwrap();

        let driver = driver(&format!("unix://{}", path.display()));
        let bound = driver.bind().await.unwrap();
        assert_eq!(bound.local_addr(), BoundAddress::Unix(path.clone()));

        let server = tokio::spawn(bound.serve());
        driver.stop();
        server.await.unwrap().unwrap();
        assert!(!path.exists());
    }
}
