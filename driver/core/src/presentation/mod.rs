// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Presentation Layer (`fsx-csi-core`)
//!
//! gRPC surface that translates CSI calls into collaborator calls. Request
//! validation and admission happen here; provider and mount work is
//! delegated to the traits in `crate::domain`.
//!
//! | Module | Transport | Description |
//! |--------|-----------|-------------|
//! | [`grpc`] | gRPC (Tonic) | CSI Identity, Controller and Node services on one endpoint |

pub mod grpc;
