use std::collections::HashMap;

use getset::Getters;
use serde::{Deserialize, Serialize};

use super::MediaType;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Annotation key carrying the image reference in an OCI image layout index.
pub const REF_NAME_ANNOTATION: &str = "org.opencontainers.image.ref.name";

/// The manifest schema version this library reads and writes.
pub const SCHEMA_VERSION: u32 = 2;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A content descriptor: media type, size, and digest of one blob.
#[derive(Debug, Clone, PartialEq, Eq, Getters, Serialize, Deserialize)]
#[getset(get = "pub")]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    /// The media type of the referenced content.
    media_type: MediaType,

    /// The size of the referenced content in bytes.
    size: u64,

    /// The `sha256:<hex>` digest of the referenced content.
    digest: String,
}

/// A schema 2 image manifest, the wire form pushed to and pulled from a
/// registry. Both Docker v2 and OCI manifests deserialize into this shape.
#[derive(Debug, Clone, PartialEq, Eq, Getters, Serialize, Deserialize)]
#[getset(get = "pub")]
#[serde(rename_all = "camelCase")]
pub struct ImageManifest {
    /// The manifest schema version, always 2.
    schema_version: u32,

    /// The manifest media type.
    #[serde(default = "default_manifest_media_type")]
    media_type: MediaType,

    /// The image configuration descriptor.
    config: Descriptor,

    /// The ordered layer descriptors.
    layers: Vec<Descriptor>,
}

/// One element of the `manifest.json` array inside a `docker save` tarball.
#[derive(Debug, Clone, PartialEq, Eq, Getters, Serialize, Deserialize)]
#[getset(get = "pub")]
#[serde(rename_all = "PascalCase")]
pub struct DockerManifestEntry {
    /// Archive-relative path of the image configuration file.
    config: String,

    /// References the image was tagged with, e.g. `alpine:latest`.
    #[serde(default)]
    repo_tags: Vec<String>,

    /// Archive-relative paths of the layer tarballs, base to top.
    layers: Vec<String>,
}

/// The `index.json` of an OCI image layout.
#[derive(Debug, Clone, PartialEq, Eq, Getters, Serialize, Deserialize)]
#[getset(get = "pub")]
#[serde(rename_all = "camelCase")]
pub struct OciIndex {
    /// The index schema version.
    schema_version: u32,

    /// The manifest descriptors listed by the index.
    #[serde(default)]
    manifests: Vec<OciDescriptor>,
}

/// A descriptor inside an OCI image layout index, with annotations.
#[derive(Debug, Clone, PartialEq, Eq, Getters, Serialize, Deserialize)]
#[getset(get = "pub")]
#[serde(rename_all = "camelCase")]
pub struct OciDescriptor {
    /// The media type of the referenced content.
    media_type: MediaType,

    /// The size of the referenced content in bytes.
    #[serde(default)]
    size: u64,

    /// The `sha256:<hex>` digest of the referenced content.
    digest: String,

    /// Arbitrary descriptor annotations.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    annotations: HashMap<String, String>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Descriptor {
    /// Creates a new descriptor.
    pub fn new(media_type: MediaType, size: u64, digest: impl Into<String>) -> Self {
        Self {
            media_type,
            size,
            digest: digest.into(),
        }
    }
}

impl ImageManifest {
    /// Creates a schema 2 manifest from config and layer descriptors.
    pub fn new(media_type: MediaType, config: Descriptor, layers: Vec<Descriptor>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            media_type,
            config,
            layers,
        }
    }
}

impl DockerManifestEntry {
    /// Creates a `manifest.json` entry for a saved image.
    pub fn new(config: String, repo_tags: Vec<String>, layers: Vec<String>) -> Self {
        Self {
            config,
            repo_tags,
            layers,
        }
    }
}

impl OciDescriptor {
    /// The annotated reference name, when present.
    pub fn ref_name(&self) -> Option<&str> {
        self.annotations.get(REF_NAME_ANNOTATION).map(|s| s.as_str())
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

fn default_manifest_media_type() -> MediaType {
    MediaType::ManifestV2
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_manifest_serde_roundtrip() {
        let manifest = ImageManifest::new(
            MediaType::ManifestV2,
            Descriptor::new(MediaType::Config, 1469, "sha256:aaaa"),
            vec![Descriptor::new(MediaType::Layer, 2810810, "sha256:bbbb")],
        );

        let json = serde_json::to_string(&manifest).unwrap();
        assert!(json.contains("\"schemaVersion\":2"));
        assert!(json.contains("\"mediaType\""));

        let parsed: ImageManifest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, manifest);
    }

    #[test]
    fn test_image_manifest_media_type_defaults_when_absent() {
        let json = r#"{
            "schemaVersion": 2,
            "config": {
                "mediaType": "application/vnd.docker.container.image.v1+json",
                "size": 10,
                "digest": "sha256:aaaa"
            },
            "layers": []
        }"#;
        let parsed: ImageManifest = serde_json::from_str(json).unwrap();
        assert_eq!(*parsed.media_type(), MediaType::ManifestV2);
    }

    #[test]
    fn test_docker_manifest_entry_field_casing() {
        let json = r#"[{
            "Config": "aaaa.json",
            "RepoTags": ["alpine:latest"],
            "Layers": ["bbbb/layer.tar"]
        }]"#;
        let parsed: Vec<DockerManifestEntry> = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].config(), "aaaa.json");
        assert_eq!(parsed[0].repo_tags(), &["alpine:latest".to_string()]);
        assert_eq!(parsed[0].layers(), &["bbbb/layer.tar".to_string()]);
    }

    #[test]
    fn test_oci_index_ref_name_annotation() {
        let json = r#"{
            "schemaVersion": 2,
            "manifests": [{
                "mediaType": "application/vnd.oci.image.manifest.v1+json",
                "size": 348,
                "digest": "sha256:cccc",
                "annotations": {
                    "org.opencontainers.image.ref.name": "localhost:5000/myrepo:1.0"
                }
            }]
        }"#;
        let index: OciIndex = serde_json::from_str(json).unwrap();
        assert_eq!(
            index.manifests()[0].ref_name(),
            Some("localhost:5000/myrepo:1.0")
        );
    }
}
