// crates/covenant-core/src/core/identifiers.rs
// ============================================================================
// Module: Covenant Identifiers
// Description: Canonical opaque identifiers for governance records.
// Purpose: Provide strongly typed, serializable identifiers with stable wire forms.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! This module defines the canonical identifiers used throughout Covenant.
//! Identifiers are opaque UTF-8 strings on the wire; no normalization or
//! validation is applied at construction. Bundle versions additionally expose
//! a monotonic ordinal for rollback bookkeeping.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Identifier Macro
// ============================================================================

/// Declares an opaque string identifier newtype with the standard surface.
macro_rules! string_identifier {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        ///
        /// # Invariants
        /// - Opaque UTF-8 string; no normalization or validation is applied by this type.
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self::new(value)
            }
        }
    };
}

// ============================================================================
// SECTION: Identifier Types
// ============================================================================

string_identifier!(
    /// Candidate identifier assigned by the orchestrator on ingress.
    CandidateId
);

string_identifier!(
    /// Rule bundle identifier (content-addressed).
    BundleId
);

string_identifier!(
    /// Rule identifier within a bundle (the rule package name).
    RuleId
);

string_identifier!(
    /// Constitutional property identifier used by verification.
    PropertyId
);

string_identifier!(
    /// Bandit arm identifier.
    ArmId
);

string_identifier!(
    /// Sandbox execution identifier.
    ExecutionId
);

string_identifier!(
    /// Model backend identifier used by the synthesis coordinator.
    ModelId
);

string_identifier!(
    /// Human review request identifier.
    ReviewId
);

string_identifier!(
    /// Reviewer identifier for human-review assignment.
    ReviewerId
);

// ============================================================================
// SECTION: Bundle Version
// ============================================================================

/// Rule bundle version: a monotonic ordinal plus an opaque tag.
///
/// # Invariants
/// - `ordinal` increases by one with each staged bundle.
/// - `tag` is opaque and stable for audit correlation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BundleVersion {
    /// Monotonic version ordinal, 1-based.
    pub ordinal: u64,
    /// Opaque version tag (e.g. `v3` or a release label).
    pub tag: String,
}

impl BundleVersion {
    /// Creates a bundle version from an ordinal and tag.
    #[must_use]
    pub fn new(ordinal: u64, tag: impl Into<String>) -> Self {
        Self {
            ordinal,
            tag: tag.into(),
        }
    }
}

impl fmt::Display for BundleVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.tag, self.ordinal)
    }
}
