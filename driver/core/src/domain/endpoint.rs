// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Endpoint Descriptor
//!
//! Parses the `scheme://address` bind target handed to the driver by the
//! container orchestrator (usually through the `CSI_ENDPOINT` variable).
//!
//! Supported schemes:
//! - `unix`: filesystem domain socket; the address is always made absolute,
//!   so `unix://tmp/csi.sock` and `unix:///tmp/csi.sock` name the same path
//! - `tcp`: `host:port` handed as-is to the listener
//!
//! Parsing is pure: it never touches the filesystem or the network. Removing a
//! stale socket file and binding happen later in the server lifecycle.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::domain::error::DriverError;

const SCHEME_SEPARATOR: &str = "://";

/// Transport family of a bind target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Unix,
    Tcp,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Unix => "unix",
            Scheme::Tcp => "tcp",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scheme {
    type Err = DriverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "unix" => Ok(Scheme::Unix),
            "tcp" => Ok(Scheme::Tcp),
            other => Err(DriverError::InvalidEndpoint(format!(
                "unsupported protocol: {}",
                other
            ))),
        }
    }
}

/// A parsed bind target: exactly one scheme and one address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub scheme: Scheme,
    pub address: String,
}

impl Endpoint {
    /// Split `scheme://address` into its two parts.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::InvalidEndpoint`] when the separator is missing,
    /// the scheme is not `unix` or `tcp`, or the address is empty.
    pub fn parse(endpoint: &str) -> Result<Self, DriverError> {
        let endpoint = endpoint.trim();
        let (scheme, rest) = endpoint.split_once(SCHEME_SEPARATOR).ok_or_else(|| {
            DriverError::InvalidEndpoint(format!(
                "could not parse endpoint {:?}: expected scheme://address",
                endpoint
            ))
        })?;

        if scheme.is_empty() {
            return Err(DriverError::InvalidEndpoint(format!(
                "could not parse endpoint {:?}: missing scheme",
                endpoint
            )));
        }

        let scheme: Scheme = scheme.parse()?;
        let address = match scheme {
            Scheme::Unix => {
                let path = rest.trim_start_matches('/');
                if path.is_empty() {
                    String::new()
                } else {
                    format!("/{}", path)
                }
            }
            Scheme::Tcp => rest.trim_end_matches('/').to_string(),
        };

        if address.is_empty() {
            return Err(DriverError::InvalidEndpoint(format!(
                "could not parse endpoint {:?}: missing address",
                endpoint
            )));
        }

        Ok(Self { scheme, address })
    }

    /// Socket path for `unix` endpoints
    pub fn socket_path(&self) -> Option<PathBuf> {
        match self.scheme {
            Scheme::Unix => Some(PathBuf::from(&self.address)),
            Scheme::Tcp => None,
        }
    }
}

impl FromStr for Endpoint {
    type Err = DriverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Endpoint::parse(s)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scheme {
            // address already carries the leading slash
            Scheme::Unix => write!(f, "unix://{}", self.address),
            Scheme::Tcp => write!(f, "tcp://{}", self.address),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_unix_socket() {
        let endpoint = Endpoint::parse("unix:///tmp/csi.sock").unwrap();
        assert_eq!(endpoint.scheme, Scheme::Unix);
        assert_eq!(endpoint.address, "/tmp/csi.sock");
        assert_eq!(endpoint.socket_path(), Some(PathBuf::from("/tmp/csi.sock")));
    }

    #[test]
    fn test_parse_unix_socket_relative_form_is_made_absolute() {
        let endpoint = Endpoint::parse("unix://tmp/csi.sock").unwrap();
        assert_eq!(endpoint.address, "/tmp/csi.sock");
    }

    #[test]
    fn test_parse_tcp() {
        let endpoint = Endpoint::parse("tcp://0.0.0.0:10000").unwrap();
        assert_eq!(endpoint.scheme, Scheme::Tcp);
        assert_eq!(endpoint.address, "0.0.0.0:10000");
        assert_eq!(endpoint.socket_path(), None);
    }

    #[test]
    fn test_parse_scheme_is_case_insensitive() {
        let endpoint = Endpoint::parse("TCP://127.0.0.1:9000").unwrap();
        assert_eq!(endpoint.scheme, Scheme::Tcp);
    }

    #[test]
    fn test_parse_rejects_missing_scheme() {
        let result = Endpoint::parse("bogus-no-scheme");
        assert!(matches!(result, Err(DriverError::InvalidEndpoint(_))));
    }

    #[test]
    fn test_parse_rejects_unknown_scheme() {
        let result = Endpoint::parse("udp://0.0.0.0:10000");
        assert!(matches!(result, Err(DriverError::InvalidEndpoint(_))));
    }

    #[test]
    fn test_parse_rejects_empty_parts() {
        assert!(matches!(Endpoint::parse("://addr"), Err(DriverError::InvalidEndpoint(_))));
        assert!(matches!(Endpoint::parse("unix://"), Err(DriverError::InvalidEndpoint(_))));
        assert!(matches!(Endpoint::parse("tcp://"), Err(DriverError::InvalidEndpoint(_))));
    }

    #[test]
    fn test_display_round_trips_through_parse() {
        for raw in ["unix:///var/lib/csi/csi.sock", "tcp://127.0.0.1:10000"] {
            let endpoint = Endpoint::parse(raw).unwrap();
            assert_eq!(endpoint.to_string(), raw);
        }
    }
}
