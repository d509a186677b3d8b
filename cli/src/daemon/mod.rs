// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Driver process
//!
//! Handles:
//! - Configuration loading and command-line overrides
//! - Node identity discovery
//! - Collaborator construction
//! - Serving until SIGINT/SIGTERM

pub mod server;

pub use server::{start_driver, ServeOverrides};
