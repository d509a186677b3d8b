// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Mod
//!
//! CSI v1 bindings and the three service roles.
//!
//! # Architecture
//!
//! - **Layer:** Presentation Layer
//! - **Purpose:** Implements mod

// Generated protobuf code
pub mod csi {
    tonic::include_proto!("csi.v1");
}

pub mod capabilities;
pub mod controller;
pub mod identity;
pub mod interceptor;
pub mod node;
pub mod server;

pub use controller::ControllerService;
pub use identity::IdentityService;
pub use interceptor::ErrorLoggingLayer;
pub use node::NodeService;
pub use server::{BoundServer, Driver, DriverOptions};
