use bytes::Bytes;
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::{Method, StatusCode, Uri};

use crate::proto::{Header, HttpRequest, HttpResponse};

/// Returns `true` for headers that must not be forwarded by a proxy.
///
/// These headers only apply to a single connection and are never carried over the bridge.
pub fn is_hop_by_hop(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "connection"
            | "keep-alive"
            | "proxy-connection"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
    )
}

/// Converts a header name to its canonical MIME form.
///
/// The first letter and every letter following a hyphen are upper case, all others lower case.
///
/// ```
/// assert_eq!(gateway_httpgrpc::canonical_header_key("x-scope-orgid"), "X-Scope-Orgid");
/// ```
pub fn canonical_header_key(name: &str) -> String {
    let mut upper = true;
    name.chars()
        .map(|c| {
            let mapped = if upper {
                c.to_ascii_uppercase()
            } else {
                c.to_ascii_lowercase()
            };
            upper = c == '-';
            mapped
        })
        .collect()
}

/// A response envelope could not be turned into an HTTP response.
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    /// The status code is outside of the valid HTTP range.
    #[error("invalid status code {0} in response envelope")]
    InvalidStatus(i32),
    /// A header name or value is not valid HTTP.
    #[error("invalid header {0:?} in response envelope")]
    InvalidHeader(String),
}

fn encode_headers(headers: &HeaderMap, skip: impl Fn(&HeaderName) -> bool) -> Vec<Header> {
    headers
        .keys()
        .filter(|name| !skip(name))
        .map(|name| Header {
            key: canonical_header_key(name.as_str()),
            values: headers
                .get_all(name)
                .iter()
                .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
                .collect(),
        })
        .collect()
}

impl HttpRequest {
    /// Builds an envelope from the parts of an HTTP request.
    ///
    /// Only path and query of the URI are kept. `Host` and hop-by-hop headers are dropped.
    pub fn from_parts(method: &Method, uri: &Uri, headers: &HeaderMap, body: Bytes) -> Self {
        Self {
            method: method.as_str().to_owned(),
            url: uri
                .path_and_query()
                .map_or("/", |path_and_query| path_and_query.as_str())
                .to_owned(),
            headers: encode_headers(headers, |name| {
                name == header::HOST || is_hop_by_hop(name)
            }),
            body,
        }
    }

    /// Returns the first value of a header, matching the name case-insensitively.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|header| header.key.eq_ignore_ascii_case(key))
            .and_then(|header| header.values.first())
            .map(String::as_str)
    }
}

impl HttpResponse {
    /// Builds an envelope from an HTTP response.
    pub fn from_http(response: http::Response<Bytes>) -> Self {
        let (parts, body) = response.into_parts();
        Self {
            code: i32::from(parts.status.as_u16()),
            headers: encode_headers(&parts.headers, |_| false),
            body,
        }
    }

    /// Converts the envelope into an HTTP response.
    ///
    /// Hop-by-hop headers and `Content-Length` are dropped, the length is recomputed from the
    /// body when the response is written.
    pub fn into_http(self) -> Result<http::Response<Bytes>, EnvelopeError> {
        let status = u16::try_from(self.code)
            .ok()
            .and_then(|code| StatusCode::from_u16(code).ok())
            .ok_or(EnvelopeError::InvalidStatus(self.code))?;

        let mut response = http::Response::new(self.body);
        *response.status_mut() = status;

        let headers = response.headers_mut();
        for header in self.headers {
            let name = HeaderName::from_bytes(header.key.as_bytes())
                .map_err(|_| EnvelopeError::InvalidHeader(header.key.clone()))?;
            if is_hop_by_hop(&name) || name == header::CONTENT_LENGTH {
                continue;
            }

            for value in header.values {
                let value = HeaderValue::try_from(value)
                    .map_err(|_| EnvelopeError::InvalidHeader(header.key.clone()))?;
                headers.append(&name, value);
            }
        }

        Ok(response)
    }
}
