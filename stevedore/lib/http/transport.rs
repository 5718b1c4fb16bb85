use std::{fmt, time::Duration};

use bytes::Bytes;
use reqwest::{
    header::{HeaderName, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, LOCATION},
    redirect::Policy,
    Body, Method, Response, StatusCode,
};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::{Deserialize, Serialize};

use crate::{StevedoreError, StevedoreResult};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Maximum number of redirects followed for a single logical request.
const MAX_REDIRECTS: usize = 3;

/// Connection timeout applied to every request.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// HTTP executor shared by the auth and registry layers.
///
/// Automatic redirects are disabled on the underlying client; [`Transport::execute`]
/// implements the bounded redirect policy itself so `Authorization` handling and
/// method rewriting stay explicit. Requests with buffered bodies go through the
/// transient-retry middleware; streaming uploads use the raw client because a
/// streaming body cannot be replayed by the retry layer.
#[derive(Clone)]
pub struct Transport {
    /// Retry-wrapped client for requests with replayable bodies.
    client: ClientWithMiddleware,

    /// Raw client for one-shot streaming uploads.
    stream_client: reqwest::Client,
}

/// The body of a request issued through [`Transport::execute`].
#[derive(Debug, Clone)]
pub enum Payload {
    /// No body.
    Empty,

    /// A buffered body with its content type, replayable across retries
    /// and redirects.
    Bytes {
        /// The `Content-Type` header value.
        content_type: &'static str,

        /// The body bytes.
        data: Bytes,
    },
}

/// The structured error body a registry returns with a non-2xx status,
/// `{"errors": [{"code": ..., "message": ...}]}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// The individual errors.
    #[serde(default)]
    pub errors: Vec<RegistryErrorDetail>,
}

/// One error inside an [`ErrorResponse`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryErrorDetail {
    /// The registry error code, e.g. `MANIFEST_UNKNOWN`.
    #[serde(default)]
    pub code: String,

    /// The human-readable message.
    #[serde(default)]
    pub message: String,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Transport {
    /// Creates a transport with transient-error retries (exponential backoff,
    /// at most 3 retries) and automatic redirects disabled.
    pub fn new() -> StevedoreResult<Self> {
        let base = reqwest::Client::builder()
            .redirect(Policy::none())
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;

        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);
        let client = ClientBuilder::new(base.clone())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            client,
            stream_client: base,
        })
    }

    /// Executes a request, following up to [`MAX_REDIRECTS`] redirects.
    ///
    /// A `303 See Other` rewrites the method to GET and drops the body; other
    /// 3xx responses replay the same method and payload at the new location.
    /// An absolute `Location` is used as-is, a relative one is resolved
    /// against the scheme and host of the current URL. The first non-3xx
    /// response is returned whatever its status.
    pub async fn execute(
        &self,
        method: Method,
        url: &str,
        token: Option<&str>,
        headers: &[(HeaderName, String)],
        payload: Payload,
    ) -> StevedoreResult<Response> {
        let mut method = method;
        let mut url = url.to_string();
        let mut payload = payload;

        for _ in 0..=MAX_REDIRECTS {
            tracing::debug!(%method, %url, "sending request");

            let mut request = self.client.request(method.clone(), &url);
            if let Some(token) = token {
                request = request.header(AUTHORIZATION, token);
            }
            for (name, value) in headers {
                request = request.header(name, value.as_str());
            }
            if let Payload::Bytes { content_type, data } = &payload {
                request = request
                    .header(CONTENT_TYPE, *content_type)
                    .body(data.clone());
            }

            let response = request.send().await?;
            if !response.status().is_redirection() {
                return Ok(response);
            }

            let location = location_header(&response)?;
            if response.status() == StatusCode::SEE_OTHER {
                method = Method::GET;
                payload = Payload::Empty;
            }
            url = resolve_location(&url, &location);
        }

        Err(StevedoreError::TooManyRedirects(url))
    }

    /// Issues a single streaming request with an explicit content length,
    /// bypassing the retry middleware. The caller handles any redirect by
    /// re-opening the body and calling again.
    pub async fn send_stream(
        &self,
        method: Method,
        url: &str,
        token: Option<&str>,
        content_type: &str,
        length: u64,
        body: Body,
    ) -> StevedoreResult<Response> {
        tracing::debug!(%method, %url, length, "sending streaming request");

        let mut request = self
            .stream_client
            .request(method, url)
            .header(CONTENT_TYPE, content_type)
            .header(CONTENT_LENGTH, length)
            .body(body);
        if let Some(token) = token {
            request = request.header(AUTHORIZATION, token);
        }

        Ok(request.send().await?)
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport").finish_non_exhaustive()
    }
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "registry error:")?;
        for error in &self.errors {
            write!(f, " [{}] {}", error.code, error.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for ErrorResponse {}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Extracts the `Location` header from a redirect or upload-session response.
pub fn location_header(response: &Response) -> StevedoreResult<String> {
    response
        .headers()
        .get(LOCATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
        .ok_or(StevedoreError::MissingLocation)
}

/// Resolves a `Location` value against the URL the request was sent to.
/// Absolute locations are returned unchanged; relative ones are joined to the
/// scheme and host of `request_url`.
pub fn resolve_location(request_url: &str, location: &str) -> String {
    if location.starts_with("http://") || location.starts_with("https://") {
        return location.to_string();
    }

    let host_end = request_url
        .find("://")
        .map(|scheme_end| {
            request_url[scheme_end + 3..]
                .find('/')
                .map(|i| scheme_end + 3 + i)
                .unwrap_or(request_url.len())
        })
        .unwrap_or(request_url.len());

    if location.starts_with('/') {
        format!("{}{}", &request_url[..host_end], location)
    } else {
        format!("{}/{}", &request_url[..host_end], location)
    }
}

/// Converts a non-2xx response into an error, preferring the structured
/// registry error body when one decodes.
pub async fn response_error(response: Response) -> StevedoreError {
    let status = response.status().as_u16();
    match response.json::<ErrorResponse>().await {
        Ok(body) if !body.errors.is_empty() => StevedoreError::Registry(body),
        _ => StevedoreError::HttpStatus(status),
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_location_absolute() {
        assert_eq!(
            resolve_location(
                "https://registry.example.com/v2/foo/blobs/uploads/",
                "https://cdn.example.com/upload/abc"
            ),
            "https://cdn.example.com/upload/abc"
        );
    }

    #[test]
    fn test_resolve_location_relative() {
        assert_eq!(
            resolve_location(
                "https://registry.example.com/v2/foo/blobs/uploads/",
                "/v2/foo/blobs/uploads/session-1"
            ),
            "https://registry.example.com/v2/foo/blobs/uploads/session-1"
        );
    }

    #[test]
    fn test_resolve_location_relative_with_port() {
        assert_eq!(
            resolve_location("http://localhost:5000/v2/", "/v2/foo/blobs/uploads/s"),
            "http://localhost:5000/v2/foo/blobs/uploads/s"
        );
    }

    #[test]
    fn test_resolve_location_without_leading_slash() {
        assert_eq!(
            resolve_location("http://localhost:5000/v2/", "v2/session"),
            "http://localhost:5000/v2/session"
        );
    }

    #[test]
    fn test_error_response_display() {
        let body: ErrorResponse = serde_json::from_str(
            r#"{"errors":[{"code":"MANIFEST_UNKNOWN","message":"manifest unknown"}]}"#,
        )
        .unwrap();
        let rendered = body.to_string();
        assert!(rendered.contains("MANIFEST_UNKNOWN"));
        assert!(rendered.contains("manifest unknown"));
    }
}
