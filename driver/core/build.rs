// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Build Script for fsx-csi-core
//!
//! Compiles the Container Storage Interface v1 protocol definition into
//! tonic server and client stubs.
//!
//! # Compilation Targets
//!
//! - **CSI v1**: `../../proto/csi/v1/csi.proto` (Identity, Controller, Node)
//!
//! Generated code is placed in `OUT_DIR` and included via `tonic::include_proto!`
//! in `src/presentation/grpc/mod.rs`.
//!
//! # Dependencies
//!
//! - **protoc**: Protocol buffer compiler (vendored via `protoc-bin-vendored`)
//! - **tonic-prost-build**: Code generator for Rust gRPC stubs

use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Point prost at the vendored protoc so the build does not depend on the host toolchain
    std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);

    // google/protobuf/wrappers.proto ships with the vendored compiler
    let well_known = protoc_bin_vendored::include_path()?;

    tonic_prost_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(
            &[PathBuf::from("../../proto/csi/v1/csi.proto")],
            &[PathBuf::from("../../proto"), well_known.to_path_buf()],
        )?;

    println!("cargo:rerun-if-changed=../../proto/csi/v1/csi.proto");

    Ok(())
}
