use std::path::PathBuf;

use bytes::Bytes;
use futures::{stream::BoxStream, StreamExt, TryStreamExt};
use getset::{CopyGetters, Getters};
use reqwest::Method;
use tokio_util::io::ReaderStream;

use crate::{
    http::{response_error, Payload, Transport},
    StevedoreResult,
};

use super::SHA256_PREFIX;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// One piece of image content (a config or a layer) plus the capability to
/// read its bytes again.
#[derive(Debug, Clone, Getters, CopyGetters)]
pub struct Blob {
    /// The content-addressed file name, e.g. `<hex>.tar.gz` or `<hex>.json`.
    #[getset(get = "pub")]
    name: String,

    /// The blob size in bytes.
    #[getset(get_copy = "pub")]
    size: u64,

    /// The `sha256:<hex>` digest.
    #[getset(get = "pub")]
    digest: String,

    /// Where the bytes come from.
    source: BlobSource,
}

/// A re-invocable byte stream: every open produces a fresh stream of the
/// blob's bytes, so uploads can replay the content across redirects.
#[derive(Debug, Clone)]
pub enum BlobSource {
    /// Bytes live in a local file.
    File(PathBuf),

    /// Bytes live behind a registry blob URL, fetched with a
    /// redirect-following GET on each open.
    Remote {
        /// The transport used for the fetch.
        transport: Transport,

        /// The absolute blob URL.
        url: String,

        /// The `Authorization` value for the fetch, if any.
        token: Option<String>,
    },
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Blob {
    /// Creates a new blob.
    pub fn new(
        name: impl Into<String>,
        size: u64,
        digest: impl Into<String>,
        source: BlobSource,
    ) -> Self {
        Self {
            name: name.into(),
            size,
            digest: digest.into(),
            source,
        }
    }

    /// The byte source of this blob.
    pub fn source(&self) -> &BlobSource {
        &self.source
    }

    /// The digest without its `sha256:` prefix.
    pub fn digest_hex(&self) -> &str {
        self.digest
            .strip_prefix(SHA256_PREFIX)
            .unwrap_or(&self.digest)
    }

    /// Renames the blob.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }
}

impl BlobSource {
    /// Opens a fresh stream over the blob's bytes.
    pub async fn open(&self) -> StevedoreResult<BoxStream<'static, StevedoreResult<Bytes>>> {
        match self {
            BlobSource::File(path) => {
                let file = tokio::fs::File::open(path).await?;
                Ok(ReaderStream::new(file).map_err(Into::into).boxed())
            }
            BlobSource::Remote {
                transport,
                url,
                token,
            } => {
                let response = transport
                    .execute(Method::GET, url, token.as_deref(), &[], Payload::Empty)
                    .await?;
                if !response.status().is_success() {
                    return Err(response_error(response).await);
                }
                Ok(response.bytes_stream().map_err(Into::into).boxed())
            }
        }
    }

    /// Opens a fresh stream wrapped as a request body for uploads.
    pub async fn body(&self) -> StevedoreResult<reqwest::Body> {
        Ok(reqwest::Body::wrap_stream(self.open().await?))
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::io::Write;

    use futures::TryStreamExt;

    use super::*;

    #[test_log::test(tokio::test)]
    async fn test_blob_source_file_reopens_from_start() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"layer bytes").unwrap();

        let source = BlobSource::File(file.path().to_path_buf());
        for _ in 0..2 {
            let stream = source.open().await.unwrap();
            let chunks: Vec<Bytes> = stream.try_collect().await.unwrap();
            let joined: Vec<u8> = chunks.concat();
            assert_eq!(joined, b"layer bytes");
        }
    }

    #[test]
    fn test_blob_digest_hex_strips_prefix() {
        let blob = Blob::new(
            "aaaa.tar.gz",
            3,
            "sha256:deadbeef",
            BlobSource::File(PathBuf::from("/tmp/x")),
        );
        assert_eq!(blob.digest_hex(), "deadbeef");
        assert_eq!(blob.digest(), "sha256:deadbeef");
    }
}
