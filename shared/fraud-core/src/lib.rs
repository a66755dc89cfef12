//! Fraud-check primitives shared by HamroKotha services.
//!
//! Listing photos are fingerprinted with SHA-256 so byte-identical uploads can
//! be matched across listings owned by different landlords. The flag
//! bookkeeping applied to a suspicious listing lives in [`flag`], and the
//! user-filed reports that feed moderation in [`report`].

pub mod flag;
pub mod report;

pub use flag::{duplicate_image_reason, is_cross_owner, FlagState};
pub use report::{ReportError, ReportReason, ReportStatus};

use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::{self, Display};
use std::io::{self, Read};

/// Length in bytes of a [`ContentDigest`].
pub const DIGEST_LEN: usize = 32;

/// Fixed-length fingerprint of an uploaded file's raw bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentDigest([u8; DIGEST_LEN]);

impl ContentDigest {
    /// Hashes an in-memory buffer.
    pub fn of(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self(hasher.finalize().into())
    }

    /// Hashes everything `reader` yields until EOF.
    ///
    /// This is the fallible path: a truncated or unreadable stream surfaces
    /// as the underlying I/O error and no digest is produced.
    pub fn from_reader<R: Read>(mut reader: R) -> io::Result<Self> {
        let mut hasher = Sha256::new();
        io::copy(&mut reader, &mut hasher)?;
        Ok(Self(hasher.finalize().into()))
    }

    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    /// Compact form used for HTTP entity tags.
    pub fn to_base64(&self) -> String {
        general_purpose::STANDARD_NO_PAD.encode(self.0)
    }
}

impl Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenReader;

    impl Read for BrokenReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::UnexpectedEof, "stream cut short"))
        }
    }

    #[test]
    fn digest_is_deterministic() {
        let first = ContentDigest::of(b"fake-image-bytes");
        let second = ContentDigest::of(b"fake-image-bytes");
        assert_eq!(first, second);
        assert_ne!(first, ContentDigest::of(b"fake-image-bytes!"));
    }

    #[test]
    fn empty_input_has_well_known_digest() {
        let digest = ContentDigest::of(&[]);
        assert_eq!(
            digest.to_string(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn streaming_matches_buffered() {
        let bytes = vec![7u8; 20_000];
        let streamed = ContentDigest::from_reader(bytes.as_slice()).unwrap();
        assert_eq!(streamed, ContentDigest::of(&bytes));
    }

    #[test]
    fn reader_failure_yields_no_digest() {
        let err = ContentDigest::from_reader(BrokenReader).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn base64_form_has_no_padding() {
        let encoded = ContentDigest::of(b"photo").to_base64();
        assert_eq!(encoded.len(), 43);
        assert!(!encoded.ends_with('='));
    }

    #[test]
    fn serializes_through_json() {
        let digest = ContentDigest::of(b"photo");
        let json = serde_json::to_string(&digest).unwrap();
        let back: ContentDigest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, digest);
    }
}
