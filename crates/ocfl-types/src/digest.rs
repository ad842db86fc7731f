use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Digest algorithms that may appear in an OCFL inventory.
///
/// Only [`Sha512`](DigestAlgorithm::Sha512) and
/// [`Sha256`](DigestAlgorithm::Sha256) may be used as an inventory's content
/// addressing algorithm; the others are accepted for fixity blocks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DigestAlgorithm {
    Sha512,
    Sha256,
    Sha1,
    Md5,
    Blake2b512,
}

impl DigestAlgorithm {
    /// The name used in inventories and sidecar file extensions.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sha512 => "sha512",
            Self::Sha256 => "sha256",
            Self::Sha1 => "sha1",
            Self::Md5 => "md5",
            Self::Blake2b512 => "blake2b-512",
        }
    }

    /// Length of a hex-encoded digest produced by this algorithm.
    pub fn hex_len(&self) -> usize {
        match self {
            Self::Sha512 | Self::Blake2b512 => 128,
            Self::Sha256 => 64,
            Self::Sha1 => 40,
            Self::Md5 => 32,
        }
    }

    /// Returns `true` if this algorithm may address content in an inventory.
    pub fn is_content_algorithm(&self) -> bool {
        matches!(self, Self::Sha512 | Self::Sha256)
    }
}

impl FromStr for DigestAlgorithm {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sha512" => Ok(Self::Sha512),
            "sha256" => Ok(Self::Sha256),
            "sha1" => Ok(Self::Sha1),
            "md5" => Ok(Self::Md5),
            "blake2b-512" => Ok(Self::Blake2b512),
            other => Err(TypeError::UnknownAlgorithm(other.to_string())),
        }
    }
}

impl TryFrom<String> for DigestAlgorithm {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<DigestAlgorithm> for String {
    fn from(alg: DigestAlgorithm) -> Self {
        alg.as_str().to_string()
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A content digest, normalized to lowercase hex.
///
/// Inventories may record digests in either case; two digests that differ
/// only in case address the same content, so the normalized form is the one
/// used for lookups.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Digest(String);

impl Digest {
    /// Parse and normalize a hex digest.
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        if s.is_empty() {
            return Err(TypeError::InvalidDigest("empty digest".into()));
        }
        if !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(TypeError::InvalidDigest(s.to_string()));
        }
        Ok(Self(s.to_ascii_lowercase()))
    }

    /// Build a digest from raw hash output.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(hex::encode(bytes))
    }

    /// The lowercase hex form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short hex representation (first 8 characters).
    pub fn short_hex(&self) -> &str {
        let end = self.0.len().min(8);
        &self.0[..end]
    }
}

impl FromStr for Digest {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Digest {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<Digest> for String {
    fn from(d: Digest) -> Self {
        d.0
    }
}

impl AsRef<str> for Digest {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.short_hex())
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_lowercased() {
        let d = Digest::parse("ABCdef01").unwrap();
        assert_eq!(d.as_str(), "abcdef01");
        assert_eq!(d, Digest::parse("abcdef01").unwrap());
    }

    #[test]
    fn digest_rejects_non_hex() {
        assert!(Digest::parse("").is_err());
        assert!(Digest::parse("xyz").is_err());
        assert!(Digest::parse("ab cd").is_err());
    }

    #[test]
    fn from_bytes_hex_encodes() {
        let d = Digest::from_bytes(&[0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(d.to_string(), "deadbeef");
        assert_eq!(d.short_hex(), "deadbeef");
    }

    #[test]
    fn algorithm_names_roundtrip() {
        for alg in [
            DigestAlgorithm::Sha512,
            DigestAlgorithm::Sha256,
            DigestAlgorithm::Sha1,
            DigestAlgorithm::Md5,
            DigestAlgorithm::Blake2b512,
        ] {
            assert_eq!(alg.as_str().parse::<DigestAlgorithm>().unwrap(), alg);
        }
        assert!("sha3".parse::<DigestAlgorithm>().is_err());
    }

    #[test]
    fn content_algorithms() {
        assert!(DigestAlgorithm::Sha512.is_content_algorithm());
        assert!(DigestAlgorithm::Sha256.is_content_algorithm());
        assert!(!DigestAlgorithm::Md5.is_content_algorithm());
        assert_eq!(DigestAlgorithm::Sha256.hex_len(), 64);
    }

    #[test]
    fn serde_normalizes() {
        let d: Digest = serde_json::from_str("\"AB12\"").unwrap();
        assert_eq!(d.as_str(), "ab12");
        let alg: DigestAlgorithm = serde_json::from_str("\"sha512\"").unwrap();
        assert_eq!(alg, DigestAlgorithm::Sha512);
    }
}
