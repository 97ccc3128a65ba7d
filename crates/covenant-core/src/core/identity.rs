// crates/covenant-core/src/core/identity.rs
// ============================================================================
// Module: Constitutional Identity
// Description: The fixed constitutional tag and its stamping/verification.
// Purpose: Stamp every record with the configured tag and fail closed on mismatch.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! Every cross-component message and persisted record carries the
//! constitutional tag: a fixed 16-hex-character compatibility and integrity
//! marker. The tag is not a secret; it exists so that records produced under
//! a different constitution are rejected at every boundary rather than
//! silently mixed. Rotating the tag is a coordinated redeploy, equivalent to
//! a format version bump.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Required length of a constitutional tag in hex characters.
pub const CONSTITUTIONAL_TAG_LEN: usize = 16;

/// Default constitutional tag for this deployment lineage.
pub const DEFAULT_CONSTITUTIONAL_TAG: &str = "cdd01ef066bc6cf2";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised by identity construction and verification.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    /// Tag text was not 16 lowercase hex characters.
    #[error("malformed constitutional tag `{raw}`: expected 16 lowercase hex characters")]
    Malformed {
        /// The offending tag text.
        raw: String,
    },
    /// A record carried a tag different from the configured one.
    #[error("constitutional mismatch: expected {expected}, got {actual}")]
    Mismatch {
        /// The configured tag.
        expected: String,
        /// The tag carried by the record.
        actual: String,
    },
}

// ============================================================================
// SECTION: Constitutional Tag
// ============================================================================

/// Validated 16-hex-character constitutional tag.
///
/// # Invariants
/// - Always exactly 16 lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConstitutionalTag(String);

impl ConstitutionalTag {
    /// Parses and validates a tag.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::Malformed`] when the text is not 16 lowercase
    /// hex characters.
    pub fn parse(raw: impl Into<String>) -> Result<Self, IdentityError> {
        let raw = raw.into();
        let valid = raw.len() == CONSTITUTIONAL_TAG_LEN
            && raw.bytes().all(|b| b.is_ascii_digit() || (b'a' ..= b'f').contains(&b));
        if valid {
            Ok(Self(raw))
        } else {
            Err(IdentityError::Malformed {
                raw,
            })
        }
    }

    /// Returns the default deployment tag.
    #[must_use]
    pub fn deployment_default() -> Self {
        Self(DEFAULT_CONSTITUTIONAL_TAG.to_string())
    }

    /// Returns the tag as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Stamps a payload with this tag.
    #[must_use]
    pub fn stamp<T>(&self, payload: T) -> Stamped<T> {
        Stamped {
            tag: self.clone(),
            payload,
        }
    }

    /// Verifies that a stamped payload carries this tag.
    #[must_use]
    pub fn verify<T>(&self, stamped: &Stamped<T>) -> bool {
        stamped.tag == *self
    }

    /// Verifies a raw tag value against this tag, failing closed on mismatch.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::Mismatch`] when the tags differ.
    pub fn require(&self, actual: &Self) -> Result<(), IdentityError> {
        if self == actual {
            Ok(())
        } else {
            Err(IdentityError::Mismatch {
                expected: self.0.clone(),
                actual: actual.0.clone(),
            })
        }
    }
}

impl fmt::Display for ConstitutionalTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// SECTION: Stamped Payload
// ============================================================================

/// A payload carrying the constitutional tag it was produced under.
///
/// # Invariants
/// - `tag` is immutable after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stamped<T> {
    /// Tag the payload was stamped with.
    pub tag: ConstitutionalTag,
    /// The stamped payload.
    pub payload: T,
}

impl<T> Stamped<T> {
    /// Consumes the wrapper and returns the payload.
    #[must_use]
    pub fn into_payload(self) -> T {
        self.payload
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::ConstitutionalTag;
    use super::IdentityError;

    #[test]
    fn parses_the_deployment_default() -> Result<(), IdentityError> {
        let tag = ConstitutionalTag::parse(super::DEFAULT_CONSTITUTIONAL_TAG)?;
        assert_eq!(tag, ConstitutionalTag::deployment_default());
        Ok(())
    }

    #[test]
    fn rejects_malformed_tags() {
        for raw in ["", "short", "cdd01ef066bc6cf2ff", "CDD01EF066BC6CF2", "zzz01ef066bc6cf2"] {
            assert!(matches!(
                ConstitutionalTag::parse(raw),
                Err(IdentityError::Malformed { .. })
            ));
        }
    }

    #[test]
    fn stamp_and_verify_round_trip() -> Result<(), IdentityError> {
        let tag = ConstitutionalTag::deployment_default();
        let stamped = tag.stamp("payload");
        assert!(tag.verify(&stamped));

        let other = ConstitutionalTag::parse("0123456789abcdef")?;
        assert!(!other.verify(&stamped));
        assert!(matches!(other.require(&stamped.tag), Err(IdentityError::Mismatch { .. })));
        Ok(())
    }
}
