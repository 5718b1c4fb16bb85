//! Round-trip tests for the tarball codec: build docker-save and OCI layout
//! fixtures in-memory, read them into the unified image form, write them back
//! out, and check that content digests survive the trip.

use std::io::Write;

use flate2::{write::GzEncoder, Compression};
use sha2::{Digest, Sha256};
use stevedore::{archive, StevedoreError};
use tempfile::tempdir;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

const CONFIG_JSON: &[u8] = br#"{"architecture":"amd64","os":"linux"}"#;

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[test_log::test(tokio::test)]
async fn test_docker_save_tarball_roundtrip() -> anyhow::Result<()> {
    let dir = tempdir()?;

    // A raw (uncompressed) layer, as docker save writes them.
    let mut inner = tar::Builder::new(Vec::new());
    append(&mut inner, "etc/motd", b"hello from the layer");
    let layer = inner.into_inner()?;

    let manifest = serde_json::to_vec(&serde_json::json!([{
        "Config": "config.json",
        "RepoTags": ["localhost:5000/myrepo:1.0"],
        "Layers": ["l1/layer.tar"]
    }]))?;

    let mut outer = tar::Builder::new(Vec::new());
    append(&mut outer, "manifest.json", &manifest);
    append(&mut outer, "config.json", CONFIG_JSON);
    append(&mut outer, "l1/layer.tar", &layer);
    let tar_path = dir.path().join("image.tar");
    std::fs::write(&tar_path, outer.into_inner()?)?;

    let (image, _extracted) = archive::load(&tar_path).await?;

    assert_eq!(image.reference().endpoint(), "localhost:5000");
    assert_eq!(image.reference().name(), "myrepo");
    assert_eq!(image.reference().tag(), "1.0");

    let config_hex = sha256_hex(CONFIG_JSON);
    assert_eq!(image.config().digest(), &format!("sha256:{}", config_hex));
    assert_eq!(image.config().name(), &format!("{}.json", config_hex));
    assert_eq!(image.config().size(), CONFIG_JSON.len() as u64);

    // The layer digest covers the gzip-compressed bytes, not the raw tar.
    assert_eq!(image.layers().len(), 1);
    let compressed = &image.layers()[0];
    assert!(compressed.digest().starts_with("sha256:"));
    assert_ne!(
        compressed.digest(),
        &format!("sha256:{}", sha256_hex(&layer))
    );
    assert_eq!(
        compressed.name(),
        &format!("{}.tar.gz", compressed.digest_hex())
    );

    // Saving and reloading must leave every digest untouched.
    let out_path = dir.path().join("out.tar");
    archive::save(&image, &out_path).await?;
    let (reloaded, _extracted2) = archive::load(&out_path).await?;

    assert_eq!(reloaded.reference().endpoint(), "localhost:5000");
    assert_eq!(reloaded.reference().tag(), "1.0");
    assert_eq!(reloaded.config().digest(), image.config().digest());
    assert_eq!(reloaded.layers().len(), image.layers().len());
    for (a, b) in reloaded.layers().iter().zip(image.layers()) {
        assert_eq!(a.digest(), b.digest());
        assert_eq!(a.size(), b.size());
    }

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_oci_layout_tarball_read() -> anyhow::Result<()> {
    let dir = tempdir()?;

    let layer = gzip(b"layer contents");
    let config_hex = sha256_hex(CONFIG_JSON);
    let layer_hex = sha256_hex(&layer);

    let manifest = serde_json::to_vec(&serde_json::json!({
        "schemaVersion": 2,
        "mediaType": "application/vnd.oci.image.manifest.v1+json",
        "config": {
            "mediaType": "application/vnd.oci.image.config.v1+json",
            "size": CONFIG_JSON.len(),
            "digest": format!("sha256:{}", config_hex)
        },
        "layers": [{
            "mediaType": "application/vnd.oci.image.layer.v1.tar+gzip",
            "size": layer.len(),
            "digest": format!("sha256:{}", layer_hex)
        }]
    }))?;
    let manifest_hex = sha256_hex(&manifest);

    let index = serde_json::to_vec(&serde_json::json!({
        "schemaVersion": 2,
        "manifests": [{
            "mediaType": "application/vnd.oci.image.manifest.v1+json",
            "size": manifest.len(),
            "digest": format!("sha256:{}", manifest_hex),
            "annotations": {
                "org.opencontainers.image.ref.name": "localhost:5000/myrepo:2.0"
            }
        }]
    }))?;

    let mut builder = tar::Builder::new(Vec::new());
    append(&mut builder, "oci-layout", br#"{"imageLayoutVersion":"1.0.0"}"#);
    append(&mut builder, "index.json", &index);
    append(&mut builder, &format!("blobs/sha256/{}", manifest_hex), &manifest);
    append(&mut builder, &format!("blobs/sha256/{}", config_hex), CONFIG_JSON);
    append(&mut builder, &format!("blobs/sha256/{}", layer_hex), &layer);
    let tar_path = dir.path().join("image-oci.tar");
    std::fs::write(&tar_path, builder.into_inner()?)?;

    let (image, _extracted) = archive::load(&tar_path).await?;

    assert_eq!(image.reference().endpoint(), "localhost:5000");
    assert_eq!(image.reference().name(), "myrepo");
    assert_eq!(image.reference().tag(), "2.0");
    assert_eq!(image.config().digest(), &format!("sha256:{}", config_hex));
    assert_eq!(image.config().name(), &format!("{}.json", config_hex));
    assert_eq!(image.layers().len(), 1);
    assert_eq!(
        image.layers()[0].digest(),
        &format!("sha256:{}", layer_hex)
    );
    assert_eq!(
        image.layers()[0].name(),
        &format!("{}.tar.gz", layer_hex)
    );

    // An OCI archive saves as docker-save and reads back identically.
    let out_path = dir.path().join("out.tar");
    archive::save(&image, &out_path).await?;
    let (reloaded, _extracted2) = archive::load(&out_path).await?;
    assert_eq!(reloaded.config().digest(), image.config().digest());
    assert_eq!(reloaded.layers()[0].digest(), image.layers()[0].digest());

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_unrecognized_tarball_is_rejected() -> anyhow::Result<()> {
    let dir = tempdir()?;

    let mut builder = tar::Builder::new(Vec::new());
    append(&mut builder, "random.txt", b"not an image");
    let tar_path = dir.path().join("junk.tar");
    std::fs::write(&tar_path, builder.into_inner()?)?;

    let err = archive::load(&tar_path).await.unwrap_err();
    assert!(matches!(err, StevedoreError::UnsupportedFormat(_)));

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_docker_save_missing_layer_is_fatal() -> anyhow::Result<()> {
    let dir = tempdir()?;

    let manifest = serde_json::to_vec(&serde_json::json!([{
        "Config": "config.json",
        "RepoTags": ["localhost:5000/myrepo:1.0"],
        "Layers": ["gone/layer.tar"]
    }]))?;

    let mut builder = tar::Builder::new(Vec::new());
    append(&mut builder, "manifest.json", &manifest);
    append(&mut builder, "config.json", CONFIG_JSON);
    let tar_path = dir.path().join("broken.tar");
    std::fs::write(&tar_path, builder.into_inner()?)?;

    let err = archive::load(&tar_path).await.unwrap_err();
    assert!(err.to_string().contains("file missing from archive"));

    Ok(())
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

fn append(builder: &mut tar::Builder<Vec<u8>>, name: &str, data: &[u8]) {
    let mut header = tar::Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    builder.append_data(&mut header, name, data).unwrap();
}

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}
