//! Error types for client setup

use streamcall_core::{ConfigurationError, ConnectionError};
use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors raised synchronously by client setup
///
/// Failures of an open call are never raised; they arrive as the call's
/// terminal `Status` event.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Invalid endpoint or method descriptor
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// The channel could not be established
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::echo::EchoClient;

    #[test]
    fn test_setup_failures_are_client_errors() {
        let err = EchoClient::connect("  ").unwrap_err();
        assert!(matches!(
            err,
            ClientError::Configuration(ConfigurationError::EmptyAddress)
        ));
        assert_eq!(err.to_string(), "Endpoint address is empty");
    }
}
