// kiln-common/src/model/checksum.rs
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{KilnError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
    Sha256,
    Sha512,
}

impl ChecksumAlgorithm {
    /// Length of the hex-encoded digest.
    pub fn hex_len(self) -> usize {
        match self {
            Self::Sha256 => 64,
            Self::Sha512 => 128,
        }
    }

    fn from_hex_len(len: usize) -> Option<Self> {
        match len {
            64 => Some(Self::Sha256),
            128 => Some(Self::Sha512),
            _ => None,
        }
    }
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sha256 => f.write_str("sha256"),
            Self::Sha512 => f.write_str("sha512"),
        }
    }
}

impl FromStr for ChecksumAlgorithm {
    type Err = KilnError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sha256" => Ok(Self::Sha256),
            "sha512" => Ok(Self::Sha512),
            other => Err(KilnError::Validation(format!(
                "Unsupported checksum algorithm '{other}'"
            ))),
        }
    }
}

/// An algorithm-tagged hex digest, written as `sha256:<hex>`.
///
/// A bare hex string is accepted as well; its algorithm is implied by its
/// length.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Checksum {
    algorithm: ChecksumAlgorithm,
    digest: String,
}

impl Checksum {
    pub fn new(algorithm: ChecksumAlgorithm, digest: &str) -> Result<Self> {
        let digest = digest.trim().to_ascii_lowercase();
        if digest.len() != algorithm.hex_len() {
            return Err(KilnError::Validation(format!(
                "{algorithm} digest must be {} hex characters, got {}",
                algorithm.hex_len(),
                digest.len()
            )));
        }
        if !digest.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(KilnError::Validation(format!(
                "{algorithm} digest contains non-hex characters: {digest}"
            )));
        }
        Ok(Self { algorithm, digest })
    }

    pub fn sha256(digest: &str) -> Result<Self> {
        Self::new(ChecksumAlgorithm::Sha256, digest)
    }

    pub fn algorithm(&self) -> ChecksumAlgorithm {
        self.algorithm
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn matches(&self, actual_hex: &str) -> bool {
        self.digest.eq_ignore_ascii_case(actual_hex)
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.digest)
    }
}

impl FromStr for Checksum {
    type Err = KilnError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        match s.split_once(':') {
            Some((algo, digest)) => Self::new(algo.parse()?, digest),
            None => {
                let algorithm = ChecksumAlgorithm::from_hex_len(s.len()).ok_or_else(|| {
                    KilnError::Validation(format!(
                        "Cannot infer checksum algorithm from a {}-character digest; use '<algorithm>:<hex>'",
                        s.len()
                    ))
                })?;
                Self::new(algorithm, s)
            }
        }
    }
}

impl TryFrom<String> for Checksum {
    type Error = KilnError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Checksum> for String {
    fn from(value: Checksum) -> Self {
        value.to_string()
    }
}
