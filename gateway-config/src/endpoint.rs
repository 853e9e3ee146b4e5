use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

/// Raised if a backend endpoint cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EndpointParseError {
    /// The address has no `:port` suffix.
    #[error("invalid backend endpoint: missing port")]
    MissingPort,
    /// The port is not a valid number.
    #[error("invalid backend endpoint: bad port")]
    BadPort,
    /// The host part is empty.
    #[error("invalid backend endpoint: no host")]
    NoHost,
    /// A scheme other than `dns` was given.
    #[error("invalid backend endpoint: unsupported scheme")]
    UnsupportedScheme,
}

/// The address of the RPC backend.
///
/// Accepted forms are `host:port`, `dns:///host:port` and `dns://authority/host:port`. The
/// host is resolved to one or more addresses when the gateway starts.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BackendEndpoint {
    authority: Option<String>,
    host: String,
    port: u16,
}

impl BackendEndpoint {
    /// Creates an endpoint for a plain host and port.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            authority: None,
            host: host.into(),
            port,
        }
    }

    /// Returns the host name or IP literal, without brackets.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns the DNS authority, if one was named.
    pub fn authority(&self) -> Option<&str> {
        self.authority.as_deref()
    }
}

impl fmt::Display for BackendEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(authority) = &self.authority {
            write!(f, "dns://{authority}/")?;
        }
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for BackendEndpoint {
    type Err = EndpointParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (authority, target) = match s.split_once("://") {
            Some(("dns", rest)) => match rest.split_once('/') {
                Some(("", target)) => (None, target),
                Some((authority, target)) => (Some(authority.to_owned()), target),
                None => return Err(EndpointParseError::NoHost),
            },
            Some(_) => return Err(EndpointParseError::UnsupportedScheme),
            None => (None, s),
        };

        let (host, port) = target
            .rsplit_once(':')
            .ok_or(EndpointParseError::MissingPort)?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(EndpointParseError::NoHost);
        }
        let port = port.parse().map_err(|_| EndpointParseError::BadPort)?;

        Ok(Self {
            authority,
            host: host.to_owned(),
            port,
        })
    }
}

impl Serialize for BackendEndpoint {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for BackendEndpoint {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(de::Error::custom)
    }
}
