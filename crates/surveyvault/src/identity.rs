//! Submission identity generation.
//!
//! A [`SubmissionIdentity`] is the only join key between the anonymized
//! record store and the identity ledger. It is drawn from the operating
//! system CSPRNG and carries no information about the submission itself.

use std::sync::LazyLock;

use rand::rngs::OsRng;
use rand::RngCore;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Number of random bytes in an identity (128 bits).
pub const IDENTITY_BYTES: usize = 16;

/// Length of the rendered identity in hex characters.
pub const IDENTITY_HEX_LEN: usize = IDENTITY_BYTES * 2;

static IDENTITY_FORMAT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!("^[0-9a-f]{{{IDENTITY_HEX_LEN}}}$")).expect("identity regex is valid")
});

/// An opaque, fixed-width identifier for one accepted submission.
///
/// Rendered as lowercase hex, which is safe to use directly as a file name
/// or database key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SubmissionIdentity(String);

impl SubmissionIdentity {
    /// Generate a fresh identity from the OS entropy source.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Entropy`] if the entropy source cannot be read. Callers
    /// must treat this as fatal rather than retrying.
    pub fn generate() -> Result<Self> {
        let mut bytes = [0u8; IDENTITY_BYTES];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| Error::Entropy(e.to_string()))?;
        Ok(Self(hex::encode(bytes)))
    }

    /// Parse a previously issued identity.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIdentity`] unless `value` is exactly
    /// 32 lowercase hex characters.
    pub fn parse(value: &str) -> Result<Self> {
        if IDENTITY_FORMAT.is_match(value) {
            Ok(Self(value.to_string()))
        } else {
            Err(Error::InvalidIdentity(value.to_string()))
        }
    }

    /// The identity as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SubmissionIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for SubmissionIdentity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for SubmissionIdentity {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<SubmissionIdentity> for String {
    fn from(identity: SubmissionIdentity) -> Self {
        identity.0
    }
}
