use getset::Getters;

use super::{
    Blob, Descriptor, DockerManifestEntry, ImageManifest, MediaType, Reference, DEFAULT_ENDPOINT,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// An image resolved to its content: a reference, a config blob, and the
/// ordered layer blobs. Both archive formats and the registry read path
/// produce this same shape, so everything downstream is format-agnostic.
#[derive(Debug, Clone, Getters)]
#[getset(get = "pub")]
pub struct Image {
    /// The reference the image was resolved from.
    reference: Reference,

    /// The image configuration blob.
    config: Blob,

    /// The layer blobs, base to top. Order is preserved end to end.
    layers: Vec<Blob>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Image {
    /// Creates a new image.
    pub fn new(reference: Reference, config: Blob, layers: Vec<Blob>) -> Self {
        Self {
            reference,
            config,
            layers,
        }
    }

    /// Builds the schema 2 wire manifest for pushing this image.
    pub fn wire_manifest(&self) -> ImageManifest {
        let config = Descriptor::new(
            MediaType::Config,
            self.config.size(),
            self.config.digest().clone(),
        );
        let layers = self
            .layers
            .iter()
            .map(|layer| Descriptor::new(MediaType::Layer, layer.size(), layer.digest().clone()))
            .collect();
        ImageManifest::new(MediaType::ManifestV2, config, layers)
    }

    /// Builds the `manifest.json` entry for saving this image to a
    /// docker-save tarball. Docker Hub references are tagged without their
    /// endpoint, the way `docker save` writes them.
    pub fn save_manifest(&self) -> DockerManifestEntry {
        let repo_tag = if self.reference.endpoint() == DEFAULT_ENDPOINT {
            format!("{}:{}", self.reference.name(), self.reference.tag())
        } else {
            format!(
                "{}/{}:{}",
                self.reference.endpoint(),
                self.reference.name(),
                self.reference.tag()
            )
        };
        DockerManifestEntry::new(
            self.config.name().clone(),
            vec![repo_tag],
            self.layers.iter().map(|layer| layer.name().clone()).collect(),
        )
    }

    /// All blobs of the image, config first, then layers in order.
    pub fn all_blobs(&self) -> impl Iterator<Item = &Blob> {
        std::iter::once(&self.config).chain(self.layers.iter())
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use crate::oci::BlobSource;

    use super::*;

    fn file_blob(name: &str, size: u64, digest: &str) -> Blob {
        Blob::new(name, size, digest, BlobSource::File(PathBuf::from("/tmp/x")))
    }

    fn sample_image() -> Image {
        Image::new(
            Reference::parse("localhost:5000/myrepo:1.0").unwrap(),
            file_blob("aaaa.json", 100, "sha256:aaaa"),
            vec![
                file_blob("bbbb.tar.gz", 200, "sha256:bbbb"),
                file_blob("cccc.tar.gz", 300, "sha256:cccc"),
            ],
        )
    }

    #[test]
    fn test_wire_manifest_descriptors() {
        let manifest = sample_image().wire_manifest();
        assert_eq!(*manifest.schema_version(), 2);
        assert_eq!(*manifest.media_type(), MediaType::ManifestV2);
        assert_eq!(*manifest.config().media_type(), MediaType::Config);
        assert_eq!(manifest.config().digest(), "sha256:aaaa");
        assert_eq!(manifest.layers().len(), 2);
        assert_eq!(*manifest.layers()[0].media_type(), MediaType::Layer);
        assert_eq!(manifest.layers()[1].digest(), "sha256:cccc");
    }

    #[test]
    fn test_save_manifest_paths_and_tags() {
        let entry = sample_image().save_manifest();
        assert_eq!(entry.config(), "aaaa.json");
        assert_eq!(entry.repo_tags(), &["localhost:5000/myrepo:1.0".to_string()]);
        assert_eq!(
            entry.layers(),
            &["bbbb.tar.gz".to_string(), "cccc.tar.gz".to_string()]
        );
    }

    #[test]
    fn test_all_blobs_config_first() {
        let image = sample_image();
        let names: Vec<&str> = image.all_blobs().map(|b| b.name().as_str()).collect();
        assert_eq!(names, ["aaaa.json", "bbbb.tar.gz", "cccc.tar.gz"]);
    }
}
