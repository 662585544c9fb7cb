//! Hashing System - SHA-256 content digests
//!
//! Every tracked blueprint file is fingerprinted as `sha256:<hex>`. Files are
//! streamed through the hasher so memory stays bounded regardless of size.

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::error::{CoreError, Result};

/// Algorithm prefix used in the canonical digest form.
pub const DIGEST_ALGORITHM: &str = "sha256";

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Compute SHA-256 hash of bytes, return hex string
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// A content digest in canonical `<algorithm>:<hex>` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentDigest {
    hex: String,
}

impl ContentDigest {
    pub fn from_bytes(data: &[u8]) -> Self {
        Self {
            hex: sha256_hex(data),
        }
    }

    pub fn algorithm(&self) -> &'static str {
        DIGEST_ALGORITHM
    }

    pub fn hex(&self) -> &str {
        &self.hex
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", DIGEST_ALGORITHM, self.hex)
    }
}

/// Parse failure for a digest string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestParseError(String);

impl fmt::Display for DigestParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for DigestParseError {}

impl FromStr for ContentDigest {
    type Err = DigestParseError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (algorithm, hex) = s
            .split_once(':')
            .ok_or_else(|| DigestParseError(format!("missing algorithm prefix in '{s}'")))?;
        if algorithm != DIGEST_ALGORITHM {
            return Err(DigestParseError(format!(
                "unsupported digest algorithm '{algorithm}'"
            )));
        }
        let well_formed = hex.len() == 64
            && hex
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if !well_formed {
            return Err(DigestParseError(format!(
                "expected 64 lowercase hex characters, got '{hex}'"
            )));
        }
        Ok(Self {
            hex: hex.to_string(),
        })
    }
}

impl Serialize for ContentDigest {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ContentDigest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Stream a reader through SHA-256.
pub fn digest_reader<R: Read>(mut reader: R) -> io::Result<ContentDigest> {
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
    }
    Ok(ContentDigest {
        hex: hex::encode(hasher.finalize()),
    })
}

/// Compute the content digest of a file without buffering it whole.
pub fn hash_file(path: &Path) -> Result<ContentDigest> {
    let file = File::open(path).map_err(|e| CoreError::io(path, e))?;
    digest_reader(file).map_err(|e| CoreError::io(path, e))
}
