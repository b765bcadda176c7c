//! Synchronous error types
//!
//! Only configuration and connection setup fail synchronously. Everything
//! that goes wrong after a call is opened is reported as a terminal
//! [`Status`](crate::Status) event instead.

use thiserror::Error;

use crate::method::Protocol;
use crate::transport::TransportError;

/// Invalid endpoint or method configuration
///
/// Always raised before any call state exists.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// Endpoint address is empty or whitespace
    #[error("Endpoint address is empty")]
    EmptyAddress,

    /// Endpoint address is not an absolute http(s) URL
    #[error("Invalid endpoint address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    /// Path prefix cannot be used as a URL path
    #[error("Invalid path prefix: {0}")]
    InvalidPathPrefix(String),

    /// Method descriptor is malformed
    #[error("Invalid method descriptor: {0}")]
    InvalidMethod(String),

    /// Method descriptor targets a different protocol family than the channel
    #[error("Method {method} uses {method_protocol}, but the channel speaks {channel_protocol}")]
    ProtocolMismatch {
        method: String,
        method_protocol: Protocol,
        channel_protocol: Protocol,
    },
}

impl ConfigurationError {
    pub(crate) fn invalid_address(address: &str, reason: impl Into<String>) -> Self {
        Self::InvalidAddress {
            address: address.to_string(),
            reason: reason.into(),
        }
    }
}

/// The channel could not establish its transport
#[derive(Debug, Error, Clone)]
pub enum ConnectionError {
    /// The transport's readiness check failed
    #[error("Failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: TransportError,
    },

    /// The transport could not be constructed
    #[error("Transport setup failed: {0}")]
    Setup(#[from] TransportError),
}
