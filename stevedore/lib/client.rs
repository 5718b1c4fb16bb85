use std::{path::Path, sync::Arc};

use crate::{
    archive,
    auth::{Authenticator, Credential, Scope},
    http::Transport,
    oci::{Blob, BlobSource, Image, Reference, SHA256_PREFIX},
    registry::{Catalog, RegistryApi},
    StevedoreError, StevedoreResult,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The facade tying the auth, protocol, and archive layers together.
///
/// Every instance owns its own transport, credential stores, token cache,
/// and scheme cache; nothing is process-global, so two clients with
/// different credentials can coexist.
#[derive(Debug)]
pub struct RegistryClient {
    transport: Transport,
    authenticator: Arc<Authenticator>,
    api: RegistryApi,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl RegistryClient {
    /// Creates a client with no credentials.
    pub fn new() -> StevedoreResult<Self> {
        let transport = Transport::new()?;
        let authenticator = Arc::new(Authenticator::new(transport.clone()));
        let api = RegistryApi::new(transport.clone(), Arc::clone(&authenticator));
        Ok(Self {
            transport,
            authenticator,
            api,
        })
    }

    /// Registers a basic credential for a registry domain. Operations
    /// against that domain then send `Basic` auth and skip token exchange.
    pub fn auth_basic(
        &self,
        domain: impl AsRef<str>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> StevedoreResult<()> {
        self.authenticator
            .add_basic(domain, Credential::new(username, password))
    }

    /// Sets the Docker Hub credential used during bearer token exchange.
    pub fn auth_docker_hub(
        &self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> StevedoreResult<()> {
        self.authenticator
            .set_docker_hub(Credential::new(username, password))
    }

    /// Pulls an image into a docker-save tarball at `dest`.
    pub async fn pull(&self, image: &str, dest: &Path) -> StevedoreResult<()> {
        let reference = Reference::parse(image)?;
        self.api.ensure_scheme(reference.endpoint()).await?;
        let image = self.load_remote(&reference).await?;
        archive::save(&image, dest).await
    }

    /// Pushes an image tarball (docker-save or OCI layout) to `image`.
    pub async fn push(&self, source: &Path, image: &str) -> StevedoreResult<()> {
        let target = Reference::parse(image)?;
        self.api.ensure_scheme(target.endpoint()).await?;

        // The temp dir guard must outlive the upload of the extracted blobs.
        let (loaded, _extracted) = archive::load(source).await?;
        let image = Image::new(
            target.clone(),
            loaded.config().clone(),
            loaded.layers().clone(),
        );

        let token = self
            .authenticator
            .get_token(&[(Scope::PullPush, &target)])
            .await?;
        self.push_image(&image, &target, token.as_deref()).await
    }

    /// Copies an image between repositories. On the same endpoint blobs are
    /// cross-repo mounted where the registry allows it; otherwise, and for
    /// cross-endpoint copies, blob bytes are streamed through this client.
    pub async fn copy(&self, src: &str, dst: &str) -> StevedoreResult<()> {
        let source = Reference::parse(src)?;
        let target = Reference::parse(dst)?;
        self.api.ensure_scheme(source.endpoint()).await?;

        if source.endpoint() != target.endpoint() {
            let image = self.load_remote(&source).await?;
            let image = Image::new(target.clone(), image.config().clone(), image.layers().clone());

            self.api.ensure_scheme(target.endpoint()).await?;
            let token = self
                .authenticator
                .get_token(&[(Scope::PullPush, &target)])
                .await?;
            return self.push_image(&image, &target, token.as_deref()).await;
        }

        let token = self
            .authenticator
            .get_token(&[(Scope::PullPush, &target), (Scope::Pull, &source)])
            .await?;
        let token = token.as_deref();

        let manifest = self.api.get_manifest(&source, token).await?;
        let mut descriptors = vec![manifest.config().clone()];
        descriptors.extend(manifest.layers().iter().cloned());

        for descriptor in &descriptors {
            if self
                .api
                .is_blob_exists(&target, descriptor.digest(), token)
                .await?
            {
                tracing::debug!(digest = %descriptor.digest(), "blob already present, skipping");
                continue;
            }

            match self
                .api
                .mount_blob(&target, descriptor.digest(), &source, token)
                .await?
            {
                None => {
                    tracing::debug!(digest = %descriptor.digest(), "blob mounted");
                }
                Some(session) => {
                    let blob = self
                        .remote_blob(&source, descriptor.digest(), *descriptor.size(), token)
                        .await?;
                    self.api.upload_blob(&blob, &session, token).await?;
                }
            }

            if !self
                .api
                .is_blob_exists(&target, descriptor.digest(), token)
                .await?
            {
                return Err(StevedoreError::UploadVerification(
                    descriptor.digest().clone(),
                ));
            }
        }

        self.api.upload_manifest(&target, &manifest, token).await
    }

    /// Deletes the manifest an image reference points at. The reference must
    /// carry a digest; registries do not delete by tag.
    pub async fn delete(&self, image: &str) -> StevedoreResult<()> {
        let reference = Reference::parse(image)?;
        if reference.digest().is_none() {
            return Err(StevedoreError::Reference(
                "delete requires a digest reference".into(),
            ));
        }

        self.api.ensure_scheme(reference.endpoint()).await?;
        let token = self
            .authenticator
            .get_token(&[(Scope::Delete, &reference)])
            .await?;
        self.api.delete_manifest(&reference, token.as_deref()).await
    }

    /// Resolves an image reference to its manifest digest, or `None` when
    /// the manifest does not exist.
    pub async fn digest(&self, image: &str) -> StevedoreResult<Option<String>> {
        let reference = Reference::parse(image)?;
        self.api.ensure_scheme(reference.endpoint()).await?;
        let token = self
            .authenticator
            .get_token(&[(Scope::Pull, &reference)])
            .await?;
        self.api.digest(&reference, token.as_deref()).await
    }

    /// Lists the tags of an image's repository.
    pub async fn tags(&self, image: &str) -> StevedoreResult<Vec<String>> {
        let reference = Reference::parse(image)?;
        self.api.ensure_scheme(reference.endpoint()).await?;
        let token = self
            .authenticator
            .get_token(&[(Scope::Pull, &reference)])
            .await?;
        self.api.tags(&reference, token.as_deref()).await
    }

    /// Fetches one page of an endpoint's repository catalog.
    pub async fn catalog(
        &self,
        endpoint: &str,
        count: Option<u32>,
        last: Option<&str>,
    ) -> StevedoreResult<Catalog> {
        self.api.ensure_scheme(endpoint).await?;
        let reference = Reference::for_endpoint(endpoint);
        let token = self
            .authenticator
            .get_token(&[(Scope::None, &reference)])
            .await?;
        self.api.catalog(endpoint, count, last, token.as_deref()).await
    }

    /// Resolves a reference to an [`Image`] whose blobs stream from the
    /// registry on demand.
    async fn load_remote(&self, reference: &Reference) -> StevedoreResult<Image> {
        let token = self
            .authenticator
            .get_token(&[(Scope::Pull, reference)])
            .await?;
        let token = token.as_deref();

        let manifest = self.api.get_manifest(reference, token).await?;

        let mut config = self
            .remote_blob(
                reference,
                manifest.config().digest(),
                *manifest.config().size(),
                token,
            )
            .await?;
        config.set_name(format!("{}.json", config.digest_hex()));

        let mut layers = Vec::new();
        for descriptor in manifest.layers() {
            let mut layer = self
                .remote_blob(reference, descriptor.digest(), *descriptor.size(), token)
                .await?;
            layer.set_name(format!("{}.tar.gz", layer.digest_hex()));
            layers.push(layer);
        }

        Ok(Image::new(reference.clone(), config, layers))
    }

    /// Uploads every blob of an image that the target repository is missing,
    /// re-checks each one, and only then puts the manifest.
    async fn push_image(
        &self,
        image: &Image,
        target: &Reference,
        token: Option<&str>,
    ) -> StevedoreResult<()> {
        for blob in image.all_blobs() {
            if self.api.is_blob_exists(target, blob.digest(), token).await? {
                tracing::debug!(digest = %blob.digest(), "blob already present, skipping");
                continue;
            }

            let session = self.api.start_push(target, token).await?;
            self.api.upload_blob(blob, &session, token).await?;

            if !self.api.is_blob_exists(target, blob.digest(), token).await? {
                return Err(StevedoreError::UploadVerification(blob.digest().clone()));
            }
        }

        self.api
            .upload_manifest(target, &image.wire_manifest(), token)
            .await
    }

    async fn remote_blob(
        &self,
        reference: &Reference,
        digest: &str,
        size: u64,
        token: Option<&str>,
    ) -> StevedoreResult<Blob> {
        let url = self.api.blob_url(reference, digest).await?;
        let hex = digest.strip_prefix(SHA256_PREFIX).unwrap_or(digest);
        Ok(Blob::new(
            hex.to_string(),
            size,
            digest,
            BlobSource::Remote {
                transport: self.transport.clone(),
                url,
                token: token.map(|t| t.to_string()),
            },
        ))
    }
}
