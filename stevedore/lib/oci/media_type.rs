use serde::{Deserialize, Serialize};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Accept header value covering every manifest media type a registry may
/// serve, used when only the digest is wanted.
pub const MANIFEST_ACCEPT_ANY: &str = "application/vnd.docker.distribution.manifest.v1+json,\
application/vnd.docker.distribution.manifest.v2+json,\
application/vnd.docker.distribution.manifest.list.v2+json,\
application/vnd.oci.image.manifest.v1+json,\
application/vnd.oci.image.index.v1+json";

/// Content type for raw blob bytes.
pub const OCTET_STREAM: &str = "application/octet-stream";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Media types used by the Docker v2 and OCI image specifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaType {
    /// Docker schema 2 image manifest.
    #[serde(rename = "application/vnd.docker.distribution.manifest.v2+json")]
    ManifestV2,

    /// Docker schema 2 manifest list.
    #[serde(rename = "application/vnd.docker.distribution.manifest.list.v2+json")]
    ManifestListV2,

    /// Docker image configuration blob.
    #[serde(rename = "application/vnd.docker.container.image.v1+json")]
    Config,

    /// Docker gzip-compressed layer blob.
    #[serde(rename = "application/vnd.docker.image.rootfs.diff.tar.gzip")]
    Layer,

    /// Docker foreign layer, never pushed.
    #[serde(rename = "application/vnd.docker.image.rootfs.foreign.diff.tar.gzip")]
    LayerForeign,

    /// OCI image manifest.
    #[serde(rename = "application/vnd.oci.image.manifest.v1+json")]
    ManifestOci,

    /// OCI image configuration blob.
    #[serde(rename = "application/vnd.oci.image.config.v1+json")]
    ConfigOci,

    /// OCI gzip-compressed layer blob.
    #[serde(rename = "application/vnd.oci.image.layer.v1.tar+gzip")]
    LayerOci,

    /// OCI image index.
    #[serde(rename = "application/vnd.oci.image.index.v1+json")]
    IndexOci,

    /// Any media type this library does not model.
    #[serde(other)]
    Other,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl MediaType {
    /// The wire string for this media type.
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::ManifestV2 => "application/vnd.docker.distribution.manifest.v2+json",
            MediaType::ManifestListV2 => {
                "application/vnd.docker.distribution.manifest.list.v2+json"
            }
            MediaType::Config => "application/vnd.docker.container.image.v1+json",
            MediaType::Layer => "application/vnd.docker.image.rootfs.diff.tar.gzip",
            MediaType::LayerForeign => {
                "application/vnd.docker.image.rootfs.foreign.diff.tar.gzip"
            }
            MediaType::ManifestOci => "application/vnd.oci.image.manifest.v1+json",
            MediaType::ConfigOci => "application/vnd.oci.image.config.v1+json",
            MediaType::LayerOci => "application/vnd.oci.image.layer.v1.tar+gzip",
            MediaType::IndexOci => "application/vnd.oci.image.index.v1+json",
            MediaType::Other => OCTET_STREAM,
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
