//! Digest helpers.
//!
//! Blobs are addressed by OCI digests (`<algorithm>:<hex>`). On a filesystem the colon is
//! replaced by a dot, so `sha256:abc` is stored as `sha256.abc`.

use std::{
    io::{self, Write},
    str::FromStr,
};

use oci_spec::image::{Digest, DigestAlgorithm, Sha256Digest};
use sha2::{Digest as _, Sha256, Sha384, Sha512};

use crate::{OcmError, OcmResult, KIND_DIGEST};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A writer that hashes everything passing through it.
///
/// The digest is computed with the algorithm of the digest the content is expected to match.
pub struct DigestWriter<W> {
    inner: W,
    hasher: Hasher,
    size: u64,
}

enum Hasher {
    Sha256(Sha256),
    Sha384(Sha384),
    Sha512(Sha512),
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl<W: Write> DigestWriter<W> {
    /// Creates a writer hashing with the given algorithm.
    ///
    /// ## Errors
    ///
    /// Fails for algorithms other than sha256, sha384 and sha512.
    pub fn new(inner: W, algorithm: &DigestAlgorithm) -> OcmResult<Self> {
        let hasher = match algorithm {
            DigestAlgorithm::Sha256 => Hasher::Sha256(Sha256::new()),
            DigestAlgorithm::Sha384 => Hasher::Sha384(Sha384::new()),
            DigestAlgorithm::Sha512 => Hasher::Sha512(Sha512::new()),
            other => {
                return Err(OcmError::invalid(
                    KIND_DIGEST,
                    format!("unsupported digest algorithm {other}"),
                ))
            }
        };

        Ok(Self {
            inner,
            hasher,
            size: 0,
        })
    }

    /// Returns the number of bytes written so far.
    pub fn get_size(&self) -> u64 {
        self.size
    }

    /// Flushes the inner writer and returns it together with the digest of the written content.
    pub fn finish(mut self) -> OcmResult<(W, Digest, u64)> {
        self.inner.flush()?;
        let (algorithm, hex) = match self.hasher {
            Hasher::Sha256(h) => ("sha256", hex::encode(h.finalize())),
            Hasher::Sha384(h) => ("sha384", hex::encode(h.finalize())),
            Hasher::Sha512(h) => ("sha512", hex::encode(h.finalize())),
        };
        let digest = parse(&format!("{algorithm}:{hex}"))?;
        Ok((self.inner, digest, self.size))
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Computes the sha256 digest of `data`.
pub fn for_bytes(data: &[u8]) -> OcmResult<Digest> {
    let hex = hex::encode(Sha256::digest(data));
    Ok(Sha256Digest::from_str(&hex)?.into())
}

/// Parses a digest in `<algorithm>:<hex>` notation.
pub fn parse(value: &str) -> OcmResult<Digest> {
    Digest::from_str(value).map_err(|e| OcmError::invalid(KIND_DIGEST, format!("{value}: {e}")))
}

/// Returns the file name a blob with the given digest is stored under.
pub fn to_filename(digest: &Digest) -> String {
    format!("{}.{}", digest.algorithm(), digest.digest())
}

/// Parses a blob file name back into a digest.
pub fn from_filename(name: &str) -> OcmResult<Digest> {
    let (algorithm, hex) = name
        .split_once('.')
        .ok_or_else(|| OcmError::invalid(KIND_DIGEST, format!("not a blob file name: {name}")))?;
    parse(&format!("{algorithm}:{hex}"))
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl<W: Write> Write for DigestWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        match &mut self.hasher {
            Hasher::Sha256(h) => h.update(&buf[..n]),
            Hasher::Sha384(h) => h.update(&buf[..n]),
            Hasher::Sha512(h) => h.update(&buf[..n]),
        }
        self.size += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const TESTDATA_DIGEST: &str =
        "sha256:810ff2fb242a5dee4220f2cb0e6a519891fb67f2f828a6cab4ef8894633b1f50";

    #[test]
    fn test_digest_for_bytes() -> anyhow::Result<()> {
        let digest = for_bytes(b"testdata")?;
        assert_eq!(digest.to_string(), TESTDATA_DIGEST);
        Ok(())
    }

    #[test]
    fn test_digest_filename_mapping() -> anyhow::Result<()> {
        let digest = parse(TESTDATA_DIGEST)?;
        let name = to_filename(&digest);
        assert_eq!(
            name,
            "sha256.810ff2fb242a5dee4220f2cb0e6a519891fb67f2f828a6cab4ef8894633b1f50"
        );
        assert_eq!(from_filename(&name)?, digest);
        assert!(from_filename("oci-layout").is_err());
        Ok(())
    }

    #[test]
    fn test_digest_writer() -> anyhow::Result<()> {
        let mut writer = DigestWriter::new(Vec::new(), &DigestAlgorithm::Sha256)?;
        writer.write_all(b"test")?;
        writer.write_all(b"data")?;
        let (content, digest, size) = writer.finish()?;
        assert_eq!(content, b"testdata");
        assert_eq!(size, 8);
        assert_eq!(digest.to_string(), TESTDATA_DIGEST);
        Ok(())
    }
}
