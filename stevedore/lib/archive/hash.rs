use std::{
    fs::File,
    io::{self, BufReader, BufWriter, Write},
    path::Path,
};

use flate2::{write::GzEncoder, Compression};
use sha2::{Digest, Sha256};

use crate::{oci::SHA256_PREFIX, StevedoreResult};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A writer that hashes everything passing through it, so digests come out
/// of a single streaming pass instead of a re-read.
#[derive(Debug)]
pub struct Sha256Writer<W: Write> {
    inner: W,
    hasher: Sha256,
    written: u64,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl<W: Write> Sha256Writer<W> {
    /// Wraps a writer.
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
            written: 0,
        }
    }

    /// Consumes the writer, returning the inner writer, the `sha256:<hex>`
    /// digest, and the number of bytes written.
    pub fn finalize(self) -> (W, String, u64) {
        let digest = format!("{}{}", SHA256_PREFIX, hex::encode(self.hasher.finalize()));
        (self.inner, digest, self.written)
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl<W: Write> Write for Sha256Writer<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Gzip-compresses `src` into `dst`, returning the digest and size of the
/// compressed output. Raw docker-save layers go through this before upload,
/// since the registry addresses the compressed bytes.
pub fn gz_compress(src: &Path, dst: &Path) -> StevedoreResult<(String, u64)> {
    let mut reader = BufReader::new(File::open(src)?);
    let writer = Sha256Writer::new(BufWriter::new(File::create(dst)?));
    let mut encoder = GzEncoder::new(writer, Compression::default());

    io::copy(&mut reader, &mut encoder)?;
    let writer = encoder.finish()?;
    let (mut inner, digest, size) = writer.finalize();
    inner.flush()?;

    Ok((digest, size))
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::io::Read;

    use flate2::read::GzDecoder;

    use super::*;

    #[test]
    fn test_sha256_writer_known_vector() {
        let mut writer = Sha256Writer::new(Vec::new());
        writer.write_all(b"hello").unwrap();
        let (inner, digest, written) = writer.finalize();
        assert_eq!(inner, b"hello");
        assert_eq!(written, 5);
        assert_eq!(
            digest,
            "sha256:2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_gz_compress_digest_covers_compressed_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("layer.tar");
        let dst = dir.path().join("layer.tar.gz");
        std::fs::write(&src, b"raw layer contents").unwrap();

        let (digest, size) = gz_compress(&src, &dst).unwrap();

        let compressed = std::fs::read(&dst).unwrap();
        assert_eq!(size, compressed.len() as u64);

        let mut hasher = Sha256::new();
        hasher.update(&compressed);
        assert_eq!(
            digest,
            format!("{}{}", SHA256_PREFIX, hex::encode(hasher.finalize()))
        );

        let mut decoded = Vec::new();
        GzDecoder::new(&compressed[..])
            .read_to_end(&mut decoded)
            .unwrap();
        assert_eq!(decoded, b"raw layer contents");
    }
}
