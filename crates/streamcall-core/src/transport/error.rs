//! Transport layer errors

use thiserror::Error;

use crate::status::{Code, Status};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Protocol error: {0}")]
    ProtocolError(String),
}

impl TransportError {
    /// Terminal status reported to a call that hit this error
    pub fn into_status(self) -> Status {
        let code = match &self {
            TransportError::ConnectionFailed(_) | TransportError::ConnectionClosed => {
                Code::Unavailable
            }
            TransportError::Timeout(_) => Code::DeadlineExceeded,
            TransportError::InvalidConfig(_) | TransportError::ProtocolError(_) => Code::Internal,
        };
        Status::new(code, self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            TransportError::ConnectionClosed.into_status().code,
            Code::Unavailable
        );
        assert_eq!(
            TransportError::Timeout("5s".into()).into_status().code,
            Code::DeadlineExceeded
        );
        let status = TransportError::ProtocolError("bad frame".into()).into_status();
        assert_eq!(status.code, Code::Internal);
        assert_eq!(status.message, "Protocol error: bad frame");
    }
}
