use thiserror::Error;

use crate::http::ErrorResponse;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The result of a stevedore-related operation.
pub type StevedoreResult<T> = Result<T, StevedoreError>;

/// An error that occurred while moving image content between archives and registries.
#[derive(Debug, Error)]
pub enum StevedoreError {
    /// An image reference string (or a digest inside one) could not be parsed.
    #[error("invalid image reference: {0}")]
    Reference(String),

    /// A tar archive carried neither a docker-save manifest nor an OCI index.
    #[error("unsupported archive format: {0}")]
    UnsupportedFormat(String),

    /// A tar archive was readable but inconsistent (truncated entry, missing referenced file).
    #[error("archive error: {0}")]
    Archive(String),

    /// A structured error body returned by the registry.
    #[error(transparent)]
    Registry(#[from] ErrorResponse),

    /// A non-2xx response without a decodable registry error body.
    #[error("http status error: {0}")]
    HttpStatus(u16),

    /// No usable credential or bearer token could be obtained.
    #[error("unauthorized: {0}")]
    Auth(String),

    /// A blob existence check failed right after an apparently successful upload.
    #[error("blob missing after upload: {0}")]
    UploadVerification(String),

    /// Downloaded bytes did not hash to the digest the manifest declared.
    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch {
        /// The digest the manifest or caller declared.
        expected: String,
        /// The digest computed over the received bytes.
        actual: String,
    },

    /// The redirect-follow limit was exhausted without a terminal response.
    #[error("url redirected too many times: {0}")]
    TooManyRedirects(String),

    /// A redirect or upload-session response was missing its `Location` header.
    #[error("location not found in headers")]
    MissingLocation,

    /// Neither https nor http produced any response from the registry endpoint.
    #[error("no response from the registry at {0}")]
    SchemeProbe(String),

    /// An internal lock was poisoned by a panicking thread.
    #[error("internal lock poisoned")]
    LockPoisoned,

    /// An I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// An error that occurred during an HTTP request.
    #[error("http request error: {0}")]
    HttpRequest(#[from] reqwest::Error),

    /// An error that occurred during an HTTP middleware operation.
    #[error("http middleware error: {0}")]
    HttpMiddleware(#[from] reqwest_middleware::Error),

    /// A JSON (de)serialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// An error that occurred when a join handle returned an error.
    #[error("join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}
