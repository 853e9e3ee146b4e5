//! Tenant identity and its propagation to the backend.

use std::fmt;
use std::str::FromStr;

use http::{HeaderMap, HeaderValue, StatusCode};
use tonic::metadata::MetadataValue;
use tonic::service::Interceptor;

/// Header and metadata key that carries the tenant identity.
pub const TENANT_HEADER: &str = "x-scope-orgid";

/// The tenant id is not a valid header value.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("tenant id must be non-empty visible ASCII")]
pub struct InvalidTenantId;

/// An opaque identifier of the owner of the data.
///
/// Tenant ids are restricted to visible ASCII characters, so that they can be sent as both an
/// HTTP header and RPC metadata.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct TenantId(String);

impl TenantId {
    /// Validates and wraps a tenant id.
    pub fn new(id: impl Into<String>) -> Result<Self, InvalidTenantId> {
        let id = id.into();
        if id.is_empty() || !id.bytes().all(|b| b.is_ascii_graphic()) {
            return Err(InvalidTenantId);
        }
        Ok(Self(id))
    }

    /// Returns the tenant id as string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn to_header_value(&self) -> HeaderValue {
        // Validated on construction, only visible ASCII is left.
        HeaderValue::from_str(&self.0).unwrap_or_else(|_| HeaderValue::from_static(""))
    }
}

impl FromStr for TenantId {
    type Err = InvalidTenantId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Failure to determine the tenant of a request.
#[derive(Debug, thiserror::Error)]
pub enum TenancyError {
    /// Tenancy is derived per request, but the request has no tenant header.
    #[error("no org id")]
    Missing,
    /// The tenant header of the request is not a valid tenant id.
    #[error("invalid org id: {0}")]
    Invalid(#[from] InvalidTenantId),
    /// The request names a different tenant than the one this gateway is configured for.
    #[error("org id {given:?} does not match the configured tenant")]
    Conflict {
        /// The tenant the request asked for.
        given: String,
    },
}

impl TenancyError {
    /// Returns the HTTP status code to respond with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Missing => StatusCode::UNAUTHORIZED,
            Self::Invalid(_) | Self::Conflict { .. } => StatusCode::BAD_REQUEST,
        }
    }
}

/// How the tenant of outgoing calls is determined.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum TenancyMode {
    /// No tenant is sent to the backend.
    #[default]
    Disabled,
    /// Every call is made on behalf of the same, configured tenant.
    Static(TenantId),
    /// The tenant is taken from the tenant header of each inbound request.
    PerRequest,
}

/// Attaches the tenant identity to outgoing requests.
#[derive(Clone, Debug, Default)]
pub struct TenancyInjector {
    mode: TenancyMode,
}

impl TenancyInjector {
    /// Creates an injector for the given mode.
    pub fn new(mode: TenancyMode) -> Self {
        Self { mode }
    }

    /// Creates an injector from the tenancy configuration.
    ///
    /// An enabled configuration without a tenant id derives the tenant per request.
    pub fn from_config(enabled: bool, tenant_id: Option<&str>) -> Result<Self, InvalidTenantId> {
        let mode = match (enabled, tenant_id) {
            (false, _) => TenancyMode::Disabled,
            (true, Some(id)) => TenancyMode::Static(TenantId::new(id)?),
            (true, None) => TenancyMode::PerRequest,
        };
        Ok(Self::new(mode))
    }

    /// Returns the configured mode.
    pub fn mode(&self) -> &TenancyMode {
        &self.mode
    }

    /// Determines the tenant for a request with the given inbound headers.
    ///
    /// Returns `Ok(None)` if tenancy is disabled.
    pub fn resolve(&self, headers: &HeaderMap) -> Result<Option<TenantId>, TenancyError> {
        let inbound = headers.get(TENANT_HEADER);

        match &self.mode {
            TenancyMode::Disabled => Ok(None),
            TenancyMode::Static(tenant) => match inbound {
                Some(value) if value.as_bytes() != tenant.as_str().as_bytes() => {
                    Err(TenancyError::Conflict {
                        given: String::from_utf8_lossy(value.as_bytes()).into_owned(),
                    })
                }
                _ => Ok(Some(tenant.clone())),
            },
            TenancyMode::PerRequest => {
                let value = inbound.ok_or(TenancyError::Missing)?;
                let id = value.to_str().map_err(|_| InvalidTenantId)?;
                Ok(Some(TenantId::new(id)?))
            }
        }
    }

    /// Resolves the tenant of a request and attaches it.
    ///
    /// See [`attach`] for how the tenant is carried.
    pub fn inject<B>(
        &self,
        request: &mut http::Request<B>,
    ) -> Result<Option<TenantId>, TenancyError> {
        let tenant = self.resolve(request.headers())?;
        if let Some(ref tenant) = tenant {
            attach(request, tenant.clone());
        }
        Ok(tenant)
    }
}

/// Attaches a tenant to an outgoing request.
///
/// The tenant is set as header and stored in the request extensions, from where the bridge
/// client carries it into the RPC metadata.
pub fn attach<B>(request: &mut http::Request<B>, tenant: TenantId) {
    request
        .headers_mut()
        .insert(TENANT_HEADER, tenant.to_header_value());
    request.extensions_mut().insert(tenant);
}

/// Client interceptor that adds the tenant of a call to its metadata.
///
/// Calls without a [`TenantId`] extension pass through unchanged.
#[derive(Clone, Copy, Debug, Default)]
pub struct TenantInterceptor;

impl Interceptor for TenantInterceptor {
    fn call(
        &mut self,
        mut request: tonic::Request<()>,
    ) -> Result<tonic::Request<()>, tonic::Status> {
        let Some(tenant) = request.extensions().get::<TenantId>() else {
            return Ok(request);
        };

        let value = MetadataValue::try_from(tenant.as_str())
            .map_err(|_| tonic::Status::invalid_argument("invalid org id"))?;
        request.metadata_mut().insert(TENANT_HEADER, value);
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(tenant: Option<&'static str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(tenant) = tenant {
            headers.insert(TENANT_HEADER, HeaderValue::from_static(tenant));
        }
        headers
    }

    #[test]
    fn test_tenant_id_validation() {
        assert!(TenantId::new("team-a").is_ok());
        assert!(TenantId::new("a|b").is_ok());
        assert_eq!(TenantId::new(""), Err(InvalidTenantId));
        assert_eq!(TenantId::new("team a"), Err(InvalidTenantId));
        assert_eq!(TenantId::new("tëam"), Err(InvalidTenantId));
        assert_eq!("team-a".parse::<TenantId>().unwrap().to_string(), "team-a");
    }

    #[test]
    fn test_disabled() {
        let injector = TenancyInjector::from_config(false, Some("team-a")).unwrap();
        assert_eq!(injector.mode(), &TenancyMode::Disabled);
        assert_eq!(injector.resolve(&headers(Some("other"))).unwrap(), None);

        let mut request = http::Request::new(());
        assert_eq!(injector.inject(&mut request).unwrap(), None);
        assert!(request.headers().is_empty());
        assert!(request.extensions().get::<TenantId>().is_none());
    }

    #[test]
    fn test_static() {
        let injector = TenancyInjector::from_config(true, Some("team-a")).unwrap();
        let expected = TenantId::new("team-a").unwrap();

        assert_eq!(
            injector.resolve(&headers(None)).unwrap(),
            Some(expected.clone())
        );
        assert_eq!(
            injector.resolve(&headers(Some("team-a"))).unwrap(),
            Some(expected.clone())
        );

        let error = injector.resolve(&headers(Some("team-b"))).unwrap_err();
        assert!(matches!(error, TenancyError::Conflict { ref given } if given == "team-b"));
        assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);

        let mut request = http::Request::new(());
        injector.inject(&mut request).unwrap();
        assert_eq!(request.headers()[TENANT_HEADER], "team-a");
        assert_eq!(request.extensions().get::<TenantId>(), Some(&expected));
    }

    #[test]
    fn test_static_invalid_config() {
        assert!(TenancyInjector::from_config(true, Some("")).is_err());
        assert!(TenancyInjector::from_config(true, Some("a b")).is_err());
    }

    #[test]
    fn test_per_request() {
        let injector = TenancyInjector::from_config(true, None).unwrap();
        assert_eq!(injector.mode(), &TenancyMode::PerRequest);

        assert_eq!(
            injector.resolve(&headers(Some("team-c"))).unwrap(),
            Some(TenantId::new("team-c").unwrap())
        );

        let error = injector.resolve(&headers(None)).unwrap_err();
        assert!(matches!(error, TenancyError::Missing));
        assert_eq!(error.status_code(), StatusCode::UNAUTHORIZED);

        let mut invalid = HeaderMap::new();
        invalid.insert(TENANT_HEADER, HeaderValue::from_static("a b"));
        let error = injector.resolve(&invalid).unwrap_err();
        assert!(matches!(error, TenancyError::Invalid(_)));
        assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_interceptor() {
        let mut interceptor = TenantInterceptor;

        let request = interceptor.call(tonic::Request::new(())).unwrap();
        assert!(request.metadata().get(TENANT_HEADER).is_none());

        let mut request = tonic::Request::new(());
        request
            .extensions_mut()
            .insert(TenantId::new("team-a").unwrap());
        let request = interceptor.call(request).unwrap();
        assert_eq!(request.metadata().get(TENANT_HEADER).unwrap(), "team-a");
    }
}
