//! Endpoint resolution
//!
//! Turns an `{address, path_prefix}` configuration into an immutable
//! [`Endpoint`]. Resolution is pure: it validates and normalizes, nothing more.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::error::ConfigurationError;
use crate::method::MethodDescriptor;

/// Channel configuration as written by users
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Server address (e.g., "http://localhost:8080")
    pub address: String,
    /// Optional path prepended to every method path (e.g., "/api")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_prefix: Option<String>,
}

impl EndpointConfig {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            path_prefix: None,
        }
    }

    pub fn with_path_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.path_prefix = Some(prefix.into());
        self
    }
}

/// A resolved connection target
///
/// `address` only carries scheme, host and port. Any path present in the
/// configured address is folded into `path_prefix`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    address: Url,
    path_prefix: String,
}

/// Resolve a configuration into an [`Endpoint`]
pub fn resolve(config: &EndpointConfig) -> Result<Endpoint, ConfigurationError> {
    let raw = config.address.trim();
    if raw.is_empty() {
        return Err(ConfigurationError::EmptyAddress);
    }

    let mut address =
        Url::parse(raw).map_err(|e| ConfigurationError::invalid_address(raw, e.to_string()))?;

    if !matches!(address.scheme(), "http" | "https") {
        return Err(ConfigurationError::invalid_address(
            raw,
            format!("unsupported scheme '{}'", address.scheme()),
        ));
    }
    if address.host_str().map_or(true, str::is_empty) {
        return Err(ConfigurationError::invalid_address(raw, "missing host"));
    }
    if address.query().is_some() || address.fragment().is_some() {
        return Err(ConfigurationError::invalid_address(
            raw,
            "query and fragment are not allowed",
        ));
    }

    let mut path_prefix = normalize_prefix(address.path());
    if let Some(extra) = &config.path_prefix {
        if extra.contains('?') || extra.contains('#') {
            return Err(ConfigurationError::InvalidPathPrefix(extra.clone()));
        }
        path_prefix.push_str(&normalize_prefix(extra));
    }
    address.set_path("/");

    debug!(%address, %path_prefix, "Resolved endpoint");

    Ok(Endpoint {
        address,
        path_prefix,
    })
}

/// Collapse a path into "" or "/a/b" (no empty segments, no trailing slash)
fn normalize_prefix(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .fold(String::new(), |mut acc, segment| {
            acc.push('/');
            acc.push_str(segment);
            acc
        })
}

impl Endpoint {
    /// Scheme, host and port of the server
    pub fn address(&self) -> &Url {
        &self.address
    }

    /// Normalized path prefix, empty or starting with `/`
    pub fn path_prefix(&self) -> &str {
        &self.path_prefix
    }

    /// Full URL of a method on this endpoint
    pub fn method_url(&self, method: &MethodDescriptor) -> Url {
        let mut url = self.address.clone();
        url.set_path(&format!("{}{}", self.path_prefix, method.path()));
        url
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}",
            self.address.as_str().trim_end_matches('/'),
            self.path_prefix
        )
    }
}

impl FromStr for Endpoint {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        resolve(&EndpointConfig::new(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_resolve_plain_address() {
        let endpoint = resolve(&EndpointConfig::new("http://localhost:8080")).unwrap();
        assert_eq!(endpoint.address().as_str(), "http://localhost:8080/");
        assert_eq!(endpoint.path_prefix(), "");
        assert_eq!(endpoint.to_string(), "http://localhost:8080");
    }

    #[test]
    fn test_resolve_with_prefix() {
        let config = EndpointConfig::new("https://example.com/").with_path_prefix("api/v1/");
        let endpoint = resolve(&config).unwrap();
        assert_eq!(endpoint.path_prefix(), "/api/v1");

        let method = MethodDescriptor::unary("echo.EchoController", "Say");
        assert_eq!(
            endpoint.method_url(&method).as_str(),
            "https://example.com/api/v1/echo.EchoController/Say"
        );
    }

    #[test]
    fn test_address_path_folds_into_prefix() {
        let config = EndpointConfig::new("http://localhost:8080/rpc").with_path_prefix("/web");
        let endpoint = resolve(&config).unwrap();
        assert_eq!(endpoint.address().as_str(), "http://localhost:8080/");
        assert_eq!(endpoint.path_prefix(), "/rpc/web");
    }

    #[test]
    fn test_empty_address() {
        assert_eq!(
            resolve(&EndpointConfig::new("   ")),
            Err(ConfigurationError::EmptyAddress)
        );
    }

    #[test]
    fn test_malformed_address() {
        for address in ["localhost:8080", "not a url", "ftp://host/", "http://host/?q=1"] {
            let result = resolve(&EndpointConfig::new(address));
            assert!(
                matches!(result, Err(ConfigurationError::InvalidAddress { .. })),
                "expected {} to be rejected, got {:?}",
                address,
                result
            );
        }
    }

    #[test]
    fn test_bad_prefix() {
        let config = EndpointConfig::new("http://localhost:8080").with_path_prefix("/a?b");
        assert!(matches!(
            resolve(&config),
            Err(ConfigurationError::InvalidPathPrefix(_))
        ));
    }

    #[test]
    fn test_from_str() {
        let endpoint: Endpoint = "http://127.0.0.1:9000".parse().unwrap();
        assert_eq!(endpoint.to_string(), "http://127.0.0.1:9000");
    }
}
