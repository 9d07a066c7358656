//! Content digests.
//!
//! The content hash is independent of the identity digest: it covers the submitted bytes
//! and is rendered as standard (padded) base64 of their SHA-256.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use sha2::{Digest, Sha256};
use std::io::{self, Read};

/// Size and digest of a byte sequence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentDigest {
    pub size: u64,
    pub hash: String,
}

impl ContentDigest {
    /// Digests an in-memory buffer.
    pub fn of(bytes: &[u8]) -> Self {
        Self {
            size: bytes.len() as u64,
            hash: STANDARD.encode(Sha256::digest(bytes)),
        }
    }
}

/// A reader adapter that digests everything read through it.
///
/// Used on the read path so the bytes handed to the scan oracle are also checked against
/// the recorded size and hash without a second pass over the file.
pub struct DigestReader<R> {
    inner: R,
    hasher: Sha256,
    size: u64,
}

impl<R: Read> DigestReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
            size: 0,
        }
    }

    /// Reads whatever the consumer left unread, then returns the digest of the whole input
    /// together with the exhausted inner reader.
    pub fn finish(mut self) -> io::Result<(ContentDigest, R)> {
        io::copy(&mut self, &mut io::sink())?;
        let digest = ContentDigest {
            size: self.size,
            hash: STANDARD.encode(self.hasher.finalize()),
        };
        Ok((digest, self.inner))
    }
}

impl<R: Read> Read for DigestReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        self.size += n as u64;
        Ok(n)
    }
}

/// Best-effort media type detection from magic bytes.
///
/// Falls back to `application/octet-stream` when the format is not recognised.
pub fn detect_content_type(bytes: &[u8]) -> &'static str {
    infer::get(bytes)
        .map(|kind| kind.mime_type())
        .unwrap_or("application/octet-stream")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_reader_matches_buffer_digest() {
        let data: Vec<u8> = (0..=255).cycle().take(10_000).collect();

        let mut reader = DigestReader::new(&data[..]);
        let mut head = [0u8; 100];
        reader.read_exact(&mut head).unwrap();

        // finish() drains the remainder
        let (streamed, rest) = reader.finish().unwrap();
        assert!(rest.is_empty());
        assert_eq!(streamed, ContentDigest::of(&data));
        assert_eq!(streamed.size, 10_000);
    }

    #[test]
    fn empty_content_has_well_known_hash() {
        let digest = ContentDigest::of(b"");
        assert_eq!(digest.size, 0);
        assert_eq!(digest.hash, "47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU=");
    }

    #[test]
    fn detects_png_and_falls_back_for_text() {
        let png_header = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
        assert_eq!(detect_content_type(&png_header), "image/png");
        assert_eq!(
            detect_content_type(b"plain text"),
            "application/octet-stream"
        );
    }
}
