//! Method descriptors

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

/// Number of response messages a method produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    /// Exactly one response message
    Unary,
    /// Zero or more response messages
    ServerStreaming,
}

/// Protocol family spoken by a method and by the transport behind a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Protocol {
    /// gRPC-Web over HTTP/1.1 or HTTP/2
    GrpcWeb,
    /// Native gRPC over HTTP/2
    Grpc,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::GrpcWeb => write!(f, "grpc-web"),
            Protocol::Grpc => write!(f, "grpc"),
        }
    }
}

/// Names a service/method pair together with its cardinality
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodDescriptor {
    /// Fully qualified service name (e.g., "echo.EchoController")
    pub service: String,
    /// Method name within the service (e.g., "Echo")
    pub method: String,
    pub cardinality: Cardinality,
    pub protocol: Protocol,
}

impl MethodDescriptor {
    /// Describe a unary method
    pub fn unary(service: impl Into<String>, method: impl Into<String>) -> Self {
        Self::new(service, method, Cardinality::Unary)
    }

    /// Describe a server-streaming method
    pub fn server_streaming(service: impl Into<String>, method: impl Into<String>) -> Self {
        Self::new(service, method, Cardinality::ServerStreaming)
    }

    fn new(service: impl Into<String>, method: impl Into<String>, cardinality: Cardinality) -> Self {
        Self {
            service: service.into(),
            method: method.into(),
            cardinality,
            protocol: Protocol::GrpcWeb,
        }
    }

    /// Use a different protocol family
    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    /// Request path, `/{service}/{method}`
    pub fn path(&self) -> String {
        format!("/{}/{}", self.service, self.method)
    }

    pub fn is_unary(&self) -> bool {
        self.cardinality == Cardinality::Unary
    }

    /// Check that both names can form a single path segment each
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        for (what, name) in [("service", &self.service), ("method", &self.method)] {
            if name.trim().is_empty() {
                return Err(ConfigurationError::InvalidMethod(format!(
                    "{} name is empty",
                    what
                )));
            }
            if name.contains('/') || name.chars().any(char::is_whitespace) {
                return Err(ConfigurationError::InvalidMethod(format!(
                    "{} name '{}' must be a single path segment",
                    what, name
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.service, self.method)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path() {
        let method = MethodDescriptor::server_streaming("echo.EchoController", "Echo");
        assert_eq!(method.path(), "/echo.EchoController/Echo");
        assert_eq!(method.protocol, Protocol::GrpcWeb);
        assert!(!method.is_unary());
    }

    #[test]
    fn test_validate_rejects_bad_names() {
        assert!(MethodDescriptor::unary("", "Say").validate().is_err());
        assert!(MethodDescriptor::unary("echo.EchoController", "a/b")
            .validate()
            .is_err());
        assert!(MethodDescriptor::unary("echo Echo", "Say").validate().is_err());
        assert!(MethodDescriptor::unary("echo.EchoController", "Say")
            .validate()
            .is_ok());
    }
}
