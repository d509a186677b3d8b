// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Mod
//!
//! Provides the domain types shared by every driver role.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Implements mod

pub mod cloud;
pub mod endpoint;
pub mod error;
pub mod metadata;
pub mod mount;
pub mod node_config;
pub mod volume;
