use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use reqwest::{
    header::{ACCEPT, LINK, WWW_AUTHENTICATE},
    Method, StatusCode,
};

use crate::{
    auth::{AuthChallenge, Authenticator},
    http::{location_header, resolve_location, response_error, Payload, Transport},
    oci::{Blob, ImageManifest, Reference, MANIFEST_ACCEPT_ANY, OCTET_STREAM},
    StevedoreError, StevedoreResult,
};

use super::{Catalog, TagsResponse};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Accept header for fetching a manifest body in a schema this library reads.
const MANIFEST_ACCEPT: &str = "application/vnd.docker.distribution.manifest.v2+json,\
application/vnd.oci.image.manifest.v1+json";

/// The digest header a registry answers manifest requests with.
const DOCKER_CONTENT_DIGEST: &str = "Docker-Content-Digest";

/// Hops allowed when replaying a streaming blob upload across redirects.
const MAX_UPLOAD_REDIRECTS: usize = 3;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The Distribution API operations, one method per endpoint.
///
/// Owns the per-endpoint scheme cache. Probing an endpoint also installs any
/// advertised bearer challenge into the authenticator, so callers must probe
/// before requesting a token. Operations take the already-resolved
/// `Authorization` value.
#[derive(Debug)]
pub struct RegistryApi {
    transport: Transport,
    authenticator: Arc<Authenticator>,
    schemes: Mutex<HashMap<String, String>>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl RegistryApi {
    /// Creates a new API client.
    pub fn new(transport: Transport, authenticator: Arc<Authenticator>) -> Self {
        Self {
            transport,
            authenticator,
            schemes: Mutex::new(HashMap::new()),
        }
    }

    /// Resolves the scheme an endpoint answers on, https first then http,
    /// caching the result. A 401 probe response carrying a bearer
    /// `WWW-Authenticate` installs the challenge into the authenticator.
    pub async fn ensure_scheme(&self, endpoint: &str) -> StevedoreResult<String> {
        {
            let schemes = self
                .schemes
                .lock()
                .map_err(|_| StevedoreError::LockPoisoned)?;
            if let Some(scheme) = schemes.get(endpoint) {
                return Ok(scheme.clone());
            }
        }

        for scheme in ["https", "http"] {
            let url = format!("{}://{}/v2/", scheme, endpoint);
            match self
                .transport
                .execute(Method::HEAD, &url, None, &[], Payload::Empty)
                .await
            {
                Ok(response) => {
                    if response.status() == StatusCode::UNAUTHORIZED {
                        let challenge = response
                            .headers()
                            .get(WWW_AUTHENTICATE)
                            .and_then(|v| v.to_str().ok())
                            .and_then(AuthChallenge::from_www_authenticate);
                        if let Some(challenge) = challenge {
                            self.authenticator.set_challenge(challenge)?;
                        }
                    }

                    tracing::debug!(endpoint, scheme, "registry scheme resolved");
                    self.schemes
                        .lock()
                        .map_err(|_| StevedoreError::LockPoisoned)?
                        .insert(endpoint.to_string(), scheme.to_string());
                    return Ok(scheme.to_string());
                }
                Err(err) => {
                    tracing::debug!(endpoint, scheme, %err, "scheme probe failed");
                }
            }
        }

        Err(StevedoreError::SchemeProbe(endpoint.to_string()))
    }

    /// The manifest URL for a reference, located by digest when present,
    /// else by tag.
    pub async fn manifest_url(&self, reference: &Reference) -> StevedoreResult<String> {
        let base = self.base_url(reference.endpoint()).await?;
        Ok(format!(
            "{}/v2/{}/manifests/{}",
            base,
            reference.name(),
            reference.locator()
        ))
    }

    /// The blob URL for a digest under a reference's repository.
    pub async fn blob_url(&self, reference: &Reference, digest: &str) -> StevedoreResult<String> {
        let base = self.base_url(reference.endpoint()).await?;
        Ok(format!("{}/v2/{}/blobs/{}", base, reference.name(), digest))
    }

    /// Fetches the manifest digest via a HEAD request with a broad Accept
    /// list. Returns `None` when the manifest does not exist.
    pub async fn digest(
        &self,
        reference: &Reference,
        token: Option<&str>,
    ) -> StevedoreResult<Option<String>> {
        let url = self.manifest_url(reference).await?;
        let response = self
            .transport
            .execute(
                Method::HEAD,
                &url,
                token,
                &[(ACCEPT, MANIFEST_ACCEPT_ANY.to_string())],
                Payload::Empty,
            )
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(response_error(response).await);
        }

        Ok(response
            .headers()
            .get(DOCKER_CONTENT_DIGEST)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string()))
    }

    /// Lists the tags of a repository. A missing repository yields an empty
    /// list.
    pub async fn tags(
        &self,
        reference: &Reference,
        token: Option<&str>,
    ) -> StevedoreResult<Vec<String>> {
        let base = self.base_url(reference.endpoint()).await?;
        let url = format!("{}/v2/{}/tags/list", base, reference.name());
        let response = self
            .transport
            .execute(Method::GET, &url, token, &[], Payload::Empty)
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            return Err(response_error(response).await);
        }

        let body: TagsResponse = response.json().await?;
        Ok(body.into_tags())
    }

    /// Fetches and decodes a manifest.
    pub async fn get_manifest(
        &self,
        reference: &Reference,
        token: Option<&str>,
    ) -> StevedoreResult<ImageManifest> {
        let url = self.manifest_url(reference).await?;
        let response = self
            .transport
            .execute(
                Method::GET,
                &url,
                token,
                &[(ACCEPT, MANIFEST_ACCEPT.to_string())],
                Payload::Empty,
            )
            .await?;

        if !response.status().is_success() {
            return Err(response_error(response).await);
        }

        Ok(response.json().await?)
    }

    /// Checks whether a blob exists in a repository.
    pub async fn is_blob_exists(
        &self,
        reference: &Reference,
        digest: &str,
        token: Option<&str>,
    ) -> StevedoreResult<bool> {
        let url = self.blob_url(reference, digest).await?;
        let response = self
            .transport
            .execute(Method::HEAD, &url, token, &[], Payload::Empty)
            .await?;
        Ok(response.status().is_success())
    }

    /// Opens an upload session, returning the absolute session URL.
    pub async fn start_push(
        &self,
        reference: &Reference,
        token: Option<&str>,
    ) -> StevedoreResult<String> {
        let base = self.base_url(reference.endpoint()).await?;
        let url = format!("{}/v2/{}/blobs/uploads/", base, reference.name());
        let response = self
            .transport
            .execute(Method::POST, &url, token, &[], Payload::Empty)
            .await?;

        if !response.status().is_success() {
            return Err(response_error(response).await);
        }

        let location = location_header(&response)?;
        Ok(resolve_location(&url, &location))
    }

    /// Attempts a cross-repository blob mount. A 201 means the registry
    /// mounted the blob and `None` is returned; a 202 means the mount was
    /// declined and the returned upload session URL must be used instead.
    pub async fn mount_blob(
        &self,
        reference: &Reference,
        digest: &str,
        from: &Reference,
        token: Option<&str>,
    ) -> StevedoreResult<Option<String>> {
        let base = self.base_url(reference.endpoint()).await?;
        let url = format!(
            "{}/v2/{}/blobs/uploads/?mount={}&from={}",
            base,
            reference.name(),
            digest,
            from.name()
        );
        let response = self
            .transport
            .execute(Method::POST, &url, token, &[], Payload::Empty)
            .await?;

        match response.status() {
            StatusCode::CREATED => Ok(None),
            StatusCode::ACCEPTED => {
                let location = location_header(&response)?;
                Ok(Some(resolve_location(&url, &location)))
            }
            _ => Err(response_error(response).await),
        }
    }

    /// Uploads a blob through an open session with a monolithic streaming
    /// PUT. Redirects are followed by re-opening the blob source for a fresh
    /// body, since a streaming body cannot be replayed.
    pub async fn upload_blob(
        &self,
        blob: &Blob,
        session_url: &str,
        token: Option<&str>,
    ) -> StevedoreResult<()> {
        let mut url = append_digest(session_url, blob.digest());

        tracing::info!(digest = %blob.digest(), size = blob.size(), "uploading blob");

        for _ in 0..=MAX_UPLOAD_REDIRECTS {
            let body = blob.source().body().await?;
            let response = self
                .transport
                .send_stream(Method::PUT, &url, token, OCTET_STREAM, blob.size(), body)
                .await?;

            if response.status().is_redirection() {
                let location = location_header(&response)?;
                url = resolve_location(&url, &location);
                continue;
            }
            if !response.status().is_success() {
                return Err(response_error(response).await);
            }
            return Ok(());
        }

        Err(StevedoreError::TooManyRedirects(url))
    }

    /// Puts a manifest under the reference's tag.
    pub async fn upload_manifest(
        &self,
        reference: &Reference,
        manifest: &ImageManifest,
        token: Option<&str>,
    ) -> StevedoreResult<()> {
        let base = self.base_url(reference.endpoint()).await?;
        let url = format!("{}/v2/{}/manifests/{}", base, reference.name(), reference.tag());
        let body = serde_json::to_vec(manifest)?;

        tracing::info!(%url, "uploading manifest");

        let response = self
            .transport
            .execute(
                Method::PUT,
                &url,
                token,
                &[],
                Payload::Bytes {
                    content_type: manifest.media_type().as_str(),
                    data: body.into(),
                },
            )
            .await?;

        if !response.status().is_success() {
            return Err(response_error(response).await);
        }
        Ok(())
    }

    /// Deletes the manifest a digest reference points at.
    pub async fn delete_manifest(
        &self,
        reference: &Reference,
        token: Option<&str>,
    ) -> StevedoreResult<()> {
        let url = self.manifest_url(reference).await?;
        self.delete(&url, token).await
    }

    /// Deletes one blob from a repository.
    pub async fn delete_layer(
        &self,
        reference: &Reference,
        digest: &str,
        token: Option<&str>,
    ) -> StevedoreResult<()> {
        let url = self.blob_url(reference, digest).await?;
        self.delete(&url, token).await
    }

    /// Fetches one page of the repository catalog. The `Link: rel="next"`
    /// header's `last` cursor, when present, overrides the body.
    pub async fn catalog(
        &self,
        endpoint: &str,
        count: Option<u32>,
        last: Option<&str>,
        token: Option<&str>,
    ) -> StevedoreResult<Catalog> {
        let base = self.base_url(endpoint).await?;
        let mut query = Vec::new();
        if let Some(count) = count {
            query.push(format!("n={}", count));
        }
        if let Some(last) = last {
            query.push(format!("last={}", last));
        }
        let mut url = format!("{}/v2/_catalog", base);
        if !query.is_empty() {
            url.push('?');
            url.push_str(&query.join("&"));
        }

        let response = self
            .transport
            .execute(Method::GET, &url, token, &[], Payload::Empty)
            .await?;

        if !response.status().is_success() {
            return Err(response_error(response).await);
        }

        let link_last = response
            .headers()
            .get(LINK)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_link_last);

        let mut catalog: Catalog = response.json().await?;
        if link_last.is_some() {
            catalog.set_next(link_last);
        }
        Ok(catalog)
    }

    async fn base_url(&self, endpoint: &str) -> StevedoreResult<String> {
        let scheme = self.ensure_scheme(endpoint).await?;
        Ok(format!("{}://{}", scheme, endpoint))
    }

    async fn delete(&self, url: &str, token: Option<&str>) -> StevedoreResult<()> {
        let response = self
            .transport
            .execute(Method::DELETE, url, token, &[], Payload::Empty)
            .await?;
        if !response.status().is_success() {
            return Err(response_error(response).await);
        }
        Ok(())
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Appends the digest query parameter to an upload session URL, which may
/// already carry query parameters of its own.
fn append_digest(session_url: &str, digest: &str) -> String {
    if session_url.contains('?') {
        format!("{}&digest={}", session_url, digest)
    } else {
        format!("{}?digest={}", session_url, digest)
    }
}

/// Extracts the `last` cursor from a `Link: </v2/_catalog?last=x&n=y>;
/// rel="next"` header value.
fn parse_link_last(link: &str) -> Option<String> {
    if !link.contains("rel=\"next\"") {
        return None;
    }
    let start = link.find('<')? + 1;
    let end = link.find('>')?;
    let url = &link[start..end];

    let query = url.split_once('?')?.1;
    for pair in query.split('&') {
        if let Some(value) = pair.strip_prefix("last=") {
            return Some(value.to_string());
        }
    }
    None
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
