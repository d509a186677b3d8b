// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod inflight;
pub mod operation_key;

pub use inflight::{InFlight, InFlightGuard};
pub use operation_key::OperationKeys;
