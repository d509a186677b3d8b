// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # fsx-csi-core
//!
//! Request admission and service composition for the FSx for OpenZFS CSI
//! driver. A single gRPC endpoint serves the CSI Identity, Controller and Node
//! roles; every call passes through one error-logging layer, and every
//! resource-mutating call is admitted through the in-flight operation
//! registry before it reaches the provider client or the mount executor.
//!
//! | Layer | Contents |
//! |-------|----------|
//! | [`domain`] | endpoint descriptor, errors, collaborator traits, configuration |
//! | [`application`] | in-flight registry and operation key derivation |
//! | [`infrastructure`] | provider clients, system mounter, metadata sources |
//! | [`presentation`] | CSI gRPC handlers, interception layer, server lifecycle |
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Crate root

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;

/// Name reported by `GetPluginInfo` and used as the CSI driver name.
pub const DRIVER_NAME: &str = "fsx.openzfs.csi.aws.com";

/// Vendor version reported by `GetPluginInfo`.
pub const DRIVER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
pub(crate) mod test_util;
