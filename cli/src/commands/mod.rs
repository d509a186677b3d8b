// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the FSx CSI CLI

pub mod config;
pub mod version;

pub use self::config::ConfigCommand;
