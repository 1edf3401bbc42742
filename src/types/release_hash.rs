// ABOUTME: Validated SHA-256 release hash.
// ABOUTME: Always 64 lowercase hex characters; names an immutable release.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReleaseHashError {
    #[error("release hash must be 64 characters, got {0}")]
    WrongLength(usize),

    #[error("release hash must be lowercase hex, found '{0}'")]
    InvalidChar(char),
}

/// SHA-256 digest of a release's canonical manifest payload, hex encoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ReleaseHash(String);

impl ReleaseHash {
    pub fn parse(value: &str) -> Result<Self, ReleaseHashError> {
        if value.len() != 64 {
            return Err(ReleaseHashError::WrongLength(value.len()));
        }

        if let Some(c) = value
            .chars()
            .find(|c| !matches!(c, '0'..='9' | 'a'..='f'))
        {
            return Err(ReleaseHashError::InvalidChar(c));
        }

        Ok(Self(value.to_string()))
    }

    /// Hash arbitrary bytes into a release hash.
    pub fn digest(bytes: &[u8]) -> Self {
        Self(sha256_hex(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 characters, for log lines and CLI output.
    pub fn short(&self) -> &str {
        &self.0[..12]
    }
}

/// Hex-encoded SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

impl TryFrom<String> for ReleaseHash {
    type Error = ReleaseHashError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ReleaseHash> for String {
    fn from(hash: ReleaseHash) -> Self {
        hash.0
    }
}

impl fmt::Display for ReleaseHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
