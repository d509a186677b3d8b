// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Infrastructure Module
//!
//! Concrete collaborators injected into the driver at startup.

pub mod cloud;
pub mod metadata;
pub mod mount;

pub use cloud::{create_cloud_provider, InMemoryCloudProvider, LocalCloudProvider};
pub use metadata::{discover_identity, Ec2Metadata, StaticMetadata};
pub use mount::SystemMounter;
