// crates/covenant-rules/src/truth.rs
// ============================================================================
// Module: Tri-State Truth
// Description: Tri-state truth values for evidence-aware condition evaluation.
// Purpose: Preserve fail-closed semantics when request attributes are missing.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Conditions evaluate to `True`, `False`, or `Unknown`. `Unknown` arises when
//! the attribute a condition references is absent or has an incompatible type.
//! Clause conjunction uses strong Kleene logic: a clause fires only when every
//! condition is definitively `True`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Truth Value
// ============================================================================

/// Tri-state truth value for condition evaluation.
///
/// # Invariants
/// - Represents a closed set of truth values: true, false, or unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Truth {
    /// Definitively true.
    True,
    /// Definitively false.
    False,
    /// Indeterminate due to missing or mistyped attributes.
    Unknown,
}

impl Truth {
    /// Returns true if the value is `True`.
    #[must_use]
    pub const fn is_true(self) -> bool {
        matches!(self, Self::True)
    }

    /// Returns true if the value is `False`.
    #[must_use]
    pub const fn is_false(self) -> bool {
        matches!(self, Self::False)
    }

    /// Returns true if the value is `Unknown`.
    #[must_use]
    pub const fn is_unknown(self) -> bool {
        matches!(self, Self::Unknown)
    }

    /// Strong Kleene conjunction.
    #[must_use]
    pub const fn and(self, rhs: Self) -> Self {
        match (self, rhs) {
            (Self::False, _) | (_, Self::False) => Self::False,
            (Self::True, Self::True) => Self::True,
            _ => Self::Unknown,
        }
    }

    /// Strong Kleene disjunction.
    #[must_use]
    pub const fn or(self, rhs: Self) -> Self {
        match (self, rhs) {
            (Self::True, _) | (_, Self::True) => Self::True,
            (Self::False, Self::False) => Self::False,
            _ => Self::Unknown,
        }
    }

    /// Strong Kleene negation.
    #[must_use]
    pub const fn negate(self) -> Self {
        match self {
            Self::True => Self::False,
            Self::False => Self::True,
            Self::Unknown => Self::Unknown,
        }
    }
}

impl From<bool> for Truth {
    fn from(value: bool) -> Self {
        if value { Self::True } else { Self::False }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::Truth;

    #[test]
    fn conjunction_is_fail_closed() {
        assert_eq!(Truth::True.and(Truth::Unknown), Truth::Unknown);
        assert_eq!(Truth::False.and(Truth::Unknown), Truth::False);
        assert_eq!(Truth::True.and(Truth::True), Truth::True);
    }

    #[test]
    fn disjunction_short_circuits_on_true() {
        assert_eq!(Truth::True.or(Truth::Unknown), Truth::True);
        assert_eq!(Truth::Unknown.or(Truth::False), Truth::Unknown);
        assert_eq!(Truth::False.or(Truth::False), Truth::False);
    }

    #[test]
    fn negation_preserves_unknown() {
        assert_eq!(Truth::Unknown.negate(), Truth::Unknown);
        assert_eq!(Truth::True.negate(), Truth::False);
    }
}
