use std::{
    fs::File,
    io::{self, BufReader, BufWriter, Read, Write},
    path::{Path, PathBuf},
};

use futures::TryStreamExt;
use sha2::{Digest, Sha256};
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;

use crate::{
    oci::{
        Blob, BlobSource, DockerManifestEntry, Image, ImageManifest, OciIndex, Reference,
        SHA256_PREFIX,
    },
    StevedoreError, StevedoreResult,
};

use super::{gz_compress, Sha256Writer};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The docker-save manifest file name.
const MANIFEST_JSON: &str = "manifest.json";

/// The OCI image layout index file name.
const INDEX_JSON: &str = "index.json";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The two tarball layouts this codec reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    /// A `docker save` tarball with a `manifest.json` array.
    DockerLegacy,

    /// An OCI image layout with an `index.json`.
    Oci,
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Reads an image tarball (docker-save or OCI layout) into the unified
/// in-memory form. Extracted blob files live in the returned temp directory,
/// which the caller must keep alive as long as the image's blob sources.
pub async fn load(path: &Path) -> StevedoreResult<(Image, TempDir)> {
    let dir = tempfile::tempdir()?;
    let dir_path = dir.path().to_path_buf();
    let archive_path = path.to_path_buf();

    tracing::info!(path = %path.display(), "reading image archive");

    let blobs = tokio::task::spawn_blocking(move || {
        let reader = BufReader::new(File::open(&archive_path)?);
        extract_archive(reader, &dir_path)
    })
    .await??;

    let image = match detect_format(&blobs)? {
        ArchiveFormat::DockerLegacy => read_docker_legacy(blobs).await?,
        ArchiveFormat::Oci => read_oci(blobs)?,
    };

    Ok((image, dir))
}

/// Writes an image as a docker-save tarball: `manifest.json` first, then the
/// config, then the layers in order. Remote blobs are materialized to temp
/// files (with digest verification) before the tar is written.
pub async fn save(image: &Image, dest: &Path) -> StevedoreResult<()> {
    let staging = tempfile::tempdir()?;

    tracing::info!(path = %dest.display(), "writing image archive");

    let mut entries = Vec::new();
    for blob in image.all_blobs() {
        let path = materialize(blob, staging.path()).await?;
        entries.push((blob.name().clone(), path));
    }

    let manifest = serde_json::to_vec(&vec![image.save_manifest()])?;
    let dest = dest.to_path_buf();
    tokio::task::spawn_blocking(move || write_tar(&dest, &manifest, &entries)).await??;

    Ok(())
}

/// Unpacks every regular file of a tar stream, computing each entry's SHA-256
/// while it is written out. Entry paths are sanitized; a short entry fails.
pub fn extract_archive<R: Read>(reader: R, dir: &Path) -> StevedoreResult<Vec<Blob>> {
    let mut archive = tar::Archive::new(reader);
    let mut blobs = Vec::new();

    for entry in archive.entries()? {
        let mut entry = entry?;
        if !entry.header().entry_type().is_file() {
            continue;
        }

        let raw_path = entry.path()?.to_string_lossy().into_owned();
        let name = sanitize_entry_path(&raw_path);
        let out_path = dir.join(&name);
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let expected = entry.header().size()?;
        let mut writer = Sha256Writer::new(BufWriter::new(File::create(&out_path)?));
        io::copy(&mut entry, &mut writer)?;
        let (mut inner, digest, written) = writer.finalize();
        inner.flush()?;

        if written != expected {
            return Err(StevedoreError::Archive(format!(
                "truncated entry {}: {} of {} bytes",
                raw_path, written, expected
            )));
        }

        blobs.push(Blob::new(name, written, digest, BlobSource::File(out_path)));
    }

    Ok(blobs)
}

/// Decides which layout a set of extracted entries belongs to. A top-level
/// `manifest.json` wins; OCI layouts are recognized by their `index.json`.
pub fn detect_format(blobs: &[Blob]) -> StevedoreResult<ArchiveFormat> {
    if find_blob(blobs, MANIFEST_JSON).is_some() {
        return Ok(ArchiveFormat::DockerLegacy);
    }
    if find_blob(blobs, INDEX_JSON).is_some() {
        return Ok(ArchiveFormat::Oci);
    }
    Err(StevedoreError::UnsupportedFormat(
        "archive has neither manifest.json nor index.json".into(),
    ))
}

/// Replaces the characters tar entry names may carry but file paths must not
/// with path separators, notably the `:` of `sha256:<hex>` blob names.
pub fn sanitize_entry_path(path: &str) -> String {
    path.trim_start_matches("./")
        .chars()
        .map(|c| match c {
            ':' | '*' | '?' | '"' | '<' | '>' | '|' => '/',
            other => other,
        })
        .collect()
}

async fn read_docker_legacy(mut blobs: Vec<Blob>) -> StevedoreResult<Image> {
    let manifest_blob = take_blob(&mut blobs, MANIFEST_JSON)?;
    let entries: Vec<DockerManifestEntry> = read_json(&manifest_blob)?;
    let entry = entries
        .into_iter()
        .next()
        .ok_or_else(|| StevedoreError::Archive("manifest.json is empty".into()))?;

    let tag = entry
        .repo_tags()
        .first()
        .ok_or_else(|| StevedoreError::Archive("image has no repo tags".into()))?;
    let reference = Reference::parse(tag)?;

    let mut config = take_blob(&mut blobs, entry.config())?;
    config.set_name(format!("{}.json", config.digest_hex()));

    let mut layers = Vec::new();
    for layer_path in entry.layers() {
        let mut layer = take_blob(&mut blobs, layer_path)?;
        if layer.name().ends_with(".tar") {
            layer = compress_raw_layer(layer).await?;
        }
        layer.set_name(format!("{}.tar.gz", layer.digest_hex()));
        layers.push(layer);
    }

    Ok(Image::new(reference, config, layers))
}

fn read_oci(mut blobs: Vec<Blob>) -> StevedoreResult<Image> {
    let index_blob = take_blob(&mut blobs, INDEX_JSON)?;
    let index: OciIndex = read_json(&index_blob)?;
    let descriptor = index
        .manifests()
        .first()
        .ok_or_else(|| StevedoreError::Archive("index.json lists no manifests".into()))?;

    let tag = descriptor
        .ref_name()
        .ok_or_else(|| StevedoreError::Archive("index.json has no ref name annotation".into()))?;
    let reference = Reference::parse(tag)?;

    let manifest_blob = take_blob(&mut blobs, &blob_store_path(descriptor.digest()))?;
    let manifest: ImageManifest = read_json(&manifest_blob)?;

    let mut config = take_blob(&mut blobs, &blob_store_path(manifest.config().digest()))?;
    config.set_name(format!("{}.json", config.digest_hex()));

    let mut layers = Vec::new();
    for descriptor in manifest.layers() {
        let mut layer = take_blob(&mut blobs, &blob_store_path(descriptor.digest()))?;
        layer.set_name(format!("{}.tar.gz", layer.digest_hex()));
        layers.push(layer);
    }

    Ok(Image::new(reference, config, layers))
}

/// Ensures a blob's bytes are on disk, verifying remote downloads against the
/// declared digest. A mismatched download is deleted.
pub async fn materialize(blob: &Blob, dir: &Path) -> StevedoreResult<PathBuf> {
    match blob.source() {
        BlobSource::File(path) => Ok(path.clone()),
        BlobSource::Remote { .. } => {
            let dest = dir.join(blob.name());

            tracing::info!(digest = %blob.digest(), "downloading blob");

            let mut stream = blob.source().open().await?;
            let mut file = tokio::fs::File::create(&dest).await?;
            let mut hasher = Sha256::new();
            while let Some(chunk) = stream.try_next().await? {
                hasher.update(&chunk);
                file.write_all(&chunk).await?;
            }
            file.flush().await?;

            let actual = format!("{}{}", SHA256_PREFIX, hex::encode(hasher.finalize()));
            if actual != *blob.digest() {
                tracing::error!(expected = %blob.digest(), %actual, "digest verification failed");
                tokio::fs::remove_file(&dest).await?;
                return Err(StevedoreError::DigestMismatch {
                    expected: blob.digest().clone(),
                    actual,
                });
            }

            Ok(dest)
        }
    }
}

/// The extracted path of an OCI layout blob, `blobs/sha256/<hex>` after
/// sanitization.
fn blob_store_path(digest: &str) -> String {
    format!("blobs/{}", sanitize_entry_path(digest))
}

fn find_blob<'a>(blobs: &'a [Blob], path: &str) -> Option<&'a Blob> {
    blobs.iter().find(|blob| blob.name() == path)
}

fn take_blob(blobs: &mut Vec<Blob>, path: &str) -> StevedoreResult<Blob> {
    let sanitized = sanitize_entry_path(path);
    blobs
        .iter()
        .position(|blob| blob.name() == &sanitized)
        .map(|idx| blobs.remove(idx))
        .ok_or_else(|| StevedoreError::Archive(format!("file missing from archive: {}", path)))
}

fn read_json<T: serde::de::DeserializeOwned>(blob: &Blob) -> StevedoreResult<T> {
    match blob.source() {
        BlobSource::File(path) => {
            let reader = BufReader::new(File::open(path)?);
            Ok(serde_json::from_reader(reader)?)
        }
        BlobSource::Remote { .. } => Err(StevedoreError::Archive(format!(
            "archive metadata {} is not a local file",
            blob.name()
        ))),
    }
}

async fn compress_raw_layer(layer: Blob) -> StevedoreResult<Blob> {
    let BlobSource::File(path) = layer.source().clone() else {
        return Err(StevedoreError::Archive(format!(
            "raw layer {} is not a local file",
            layer.name()
        )));
    };

    let compressed_path = path.with_extension("tar.gz");
    let out = compressed_path.clone();
    let (digest, size) =
        tokio::task::spawn_blocking(move || gz_compress(&path, &out)).await??;

    Ok(Blob::new(
        layer.name().clone(),
        size,
        digest,
        BlobSource::File(compressed_path),
    ))
}

fn write_tar(dest: &Path, manifest: &[u8], entries: &[(String, PathBuf)]) -> StevedoreResult<()> {
    let mut builder = tar::Builder::new(BufWriter::new(File::create(dest)?));

    let mut header = tar::Header::new_gnu();
    header.set_size(manifest.len() as u64);
    header.set_mode(0o644);
    builder.append_data(&mut header, MANIFEST_JSON, manifest)?;

    for (name, path) in entries {
        let file = File::open(path)?;
        let mut header = tar::Header::new_gnu();
        header.set_size(file.metadata()?.len());
        header.set_mode(0o644);
        builder.append_data(&mut header, name, BufReader::new(file))?;
    }

    builder.into_inner()?.flush()?;
    Ok(())
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_entry_path() {
        assert_eq!(sanitize_entry_path("sha256:abcd"), "sha256/abcd");
        assert_eq!(
            sanitize_entry_path("blobs/sha256:abcd"),
            "blobs/sha256/abcd"
        );
        assert_eq!(sanitize_entry_path("./manifest.json"), "manifest.json");
        assert_eq!(sanitize_entry_path("a/layer.tar"), "a/layer.tar");
        assert_eq!(sanitize_entry_path("we|rd*na?me"), "we/rd/na/me");
    }

    #[test]
    fn test_blob_store_path() {
        assert_eq!(blob_store_path("sha256:abcd"), "blobs/sha256/abcd");
    }

    #[test]
    fn test_detect_format_prefers_docker_legacy() {
        let docker = vec![blob("manifest.json"), blob("aaaa.json")];
        assert_eq!(
            detect_format(&docker).unwrap(),
            ArchiveFormat::DockerLegacy
        );

        let oci = vec![blob("index.json"), blob("oci-layout")];
        assert_eq!(detect_format(&oci).unwrap(), ArchiveFormat::Oci);

        let neither = vec![blob("random.txt")];
        assert!(matches!(
            detect_format(&neither),
            Err(StevedoreError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_extract_archive_hashes_entries() {
        let mut builder = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_gnu();
        header.set_size(5);
        header.set_mode(0o644);
        builder
            .append_data(&mut header, "dir/hello.txt", &b"hello"[..])
            .unwrap();
        let bytes = builder.into_inner().unwrap();

        let dir = tempfile::tempdir().unwrap();
        let blobs = extract_archive(&bytes[..], dir.path()).unwrap();

        assert_eq!(blobs.len(), 1);
        assert_eq!(blobs[0].name(), "dir/hello.txt");
        assert_eq!(blobs[0].size(), 5);
        assert_eq!(
            blobs[0].digest(),
            "sha256:2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        match blobs[0].source() {
            BlobSource::File(path) => {
                assert_eq!(std::fs::read(path).unwrap(), b"hello");
            }
            _ => panic!("expected file source"),
        }
    }

    #[test]
    fn test_take_blob_missing_file_is_fatal() {
        let mut blobs = vec![blob("manifest.json")];
        let err = take_blob(&mut blobs, "aaaa/layer.tar").unwrap_err();
        assert!(err.to_string().contains("file missing from archive"));
    }

    fn blob(name: &str) -> Blob {
        Blob::new(
            name,
            0,
            "sha256:0000",
            BlobSource::File(PathBuf::from("/tmp/x")),
        )
    }
}
