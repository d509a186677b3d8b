// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Driver Errors
//!
//! [`DriverError`] is the single error type surfaced by the server lifecycle
//! and by every CSI handler. Collaborator failures ([`CloudError`],
//! [`MountError`], [`MetadataError`]) are wrapped unchanged so the original
//! cause reaches the caller.
//!
//! The conversion into [`tonic::Status`] is the only place where driver
//! conditions are mapped onto gRPC codes.

use thiserror::Error;
use tonic::{Code, Status};

use crate::domain::cloud::CloudError;
use crate::domain::metadata::MetadataError;
use crate::domain::mount::MountError;

#[derive(Debug, Error)]
pub enum DriverError {
    /// Malformed or unsupported bind target. Fatal at startup.
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// The listener could not be opened. Fatal at startup.
    #[error("Failed to bind {endpoint}: {source}")]
    Bind {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    /// The transport failed while serving.
    #[error("Transport error: {0}")]
    Transport(String),

    /// `run` was called while a server handle is already live.
    #[error("Server is already running")]
    AlreadyRunning,

    /// Admission denied: another operation holds the same key.
    #[error("An operation with the given volume key {0} already exists")]
    OperationPending(String),

    #[error("{0}")]
    InvalidArgument(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    AlreadyExists(String),

    #[error("{0}")]
    OutOfRange(String),

    #[error("{0}")]
    Unimplemented(String),

    #[error(transparent)]
    Cloud(#[from] CloudError),

    #[error(transparent)]
    Mount(#[from] MountError),

    #[error(transparent)]
    Metadata(#[from] MetadataError),
}

impl DriverError {
    /// gRPC code this condition is reported with
    pub fn code(&self) -> Code {
        match self {
            DriverError::OperationPending(_) => Code::Aborted,
            DriverError::InvalidArgument(_) | DriverError::InvalidEndpoint(_) => {
                Code::InvalidArgument
            }
            DriverError::NotFound(_) => Code::NotFound,
            DriverError::AlreadyExists(_) => Code::AlreadyExists,
            DriverError::OutOfRange(_) => Code::OutOfRange,
            DriverError::Unimplemented(_) => Code::Unimplemented,
            DriverError::Cloud(CloudError::NotFound(_)) => Code::NotFound,
            DriverError::Cloud(CloudError::AlreadyExists(_)) => Code::AlreadyExists,
            DriverError::Cloud(CloudError::InvalidParameter(_)) => Code::InvalidArgument,
            DriverError::Cloud(CloudError::Unavailable(_)) => Code::Unavailable,
            DriverError::Mount(MountError::InvalidPath(_)) => Code::InvalidArgument,
            DriverError::Metadata(_) => Code::Unavailable,
            _ => Code::Internal,
        }
    }
}

impl From<DriverError> for Status {
    fn from(err: DriverError) -> Self {
        Status::new(err.code(), err.to_string())
    }
}
