// crates/covenant-rules/src/ast.rs
// ============================================================================
// Module: Rule AST
// Description: Parsed representation of governance rule sources.
// Purpose: Provide stable, serializable rule values for compilation and audit.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A [`Rule`] is the validated form of one rule source file: a package name,
//! the constitutional tag it was authored against, a default verdict, and an
//! ordered list of decision clauses. Clauses are conjunctions of comparator
//! conditions over request attributes; multiple clauses with the same verdict
//! form a disjunction.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Verdicts
// ============================================================================

/// Decision verdict produced by rule evaluation.
///
/// # Invariants
/// - Variants are stable for serialization and wire contracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// The candidate may proceed.
    Allow,
    /// The candidate is rejected.
    Deny,
    /// The candidate requires human review before proceeding.
    RequireReview,
}

impl Verdict {
    /// Returns a stable label for the verdict.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Deny => "deny",
            Self::RequireReview => "require_review",
        }
    }

    /// Conflict precedence used when equally specific clauses disagree.
    ///
    /// Higher wins: deny > `require_review` > allow.
    #[must_use]
    pub const fn precedence(self) -> u8 {
        match self {
            Self::Allow => 0,
            Self::RequireReview => 1,
            Self::Deny => 2,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Literals
// ============================================================================

/// Literal operand appearing on the right-hand side of a condition.
///
/// # Invariants
/// - Variants are stable for serialization and contract matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Literal {
    /// UTF-8 string literal.
    Text {
        /// Literal value.
        value: String,
    },
    /// Finite 64-bit float literal.
    Number {
        /// Literal value.
        value: f64,
    },
    /// Boolean literal.
    Bool {
        /// Literal value.
        value: bool,
    },
    /// Homogeneous list literal used by set membership.
    List {
        /// Literal elements.
        items: Vec<Literal>,
    },
}

impl Literal {
    /// Returns a stable label for the literal kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::Number { .. } => "number",
            Self::Bool { .. } => "bool",
            Self::List { .. } => "list",
        }
    }
}

// ============================================================================
// SECTION: Comparators
// ============================================================================

/// Comparator applied between a request attribute and a literal.
///
/// # Invariants
/// - Variants are stable for serialization and contract matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparator {
    /// Attribute equals the literal.
    Equals,
    /// Attribute differs from the literal.
    NotEquals,
    /// Numeric greater-than.
    GreaterThan,
    /// Numeric greater-than-or-equal.
    GreaterThanOrEqual,
    /// Numeric less-than.
    LessThan,
    /// Numeric less-than-or-equal.
    LessThanOrEqual,
    /// Attribute is a member of the literal list.
    InSet,
    /// String attribute contains the literal substring.
    Contains,
    /// Attribute is present, regardless of value.
    Exists,
}

impl Comparator {
    /// Returns the surface syntax for the comparator.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Equals => "==",
            Self::NotEquals => "!=",
            Self::GreaterThan => ">",
            Self::GreaterThanOrEqual => ">=",
            Self::LessThan => "<",
            Self::LessThanOrEqual => "<=",
            Self::InSet => "in",
            Self::Contains => "contains",
            Self::Exists => "exists",
        }
    }
}

// ============================================================================
// SECTION: Conditions and Clauses
// ============================================================================

/// Single comparator condition over a request attribute.
///
/// # Invariants
/// - `attribute` is a non-empty dotted path into the request attribute map.
/// - `operand` is `None` only for [`Comparator::Exists`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Dotted attribute path (e.g. `risk` or `context.urgency`).
    pub attribute: String,
    /// Comparator applied to the attribute.
    pub comparator: Comparator,
    /// Literal operand; absent for existence checks.
    pub operand: Option<Literal>,
    /// Negation flag (`not` prefix in the source).
    pub negated: bool,
}

/// Braced decision clause: a verdict guarded by a condition conjunction.
///
/// # Invariants
/// - `conditions` is non-empty; an unconditional verdict is the rule default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clause {
    /// Verdict contributed when every condition is true.
    pub verdict: Verdict,
    /// Conjoined conditions guarding the verdict.
    pub conditions: Vec<Condition>,
}

impl Clause {
    /// Specificity of the clause: the number of guarding conditions.
    ///
    /// Conflicting clauses are resolved most-specific-first, then by verdict
    /// precedence.
    #[must_use]
    pub fn specificity(&self) -> usize {
        self.conditions.len()
    }
}

// ============================================================================
// SECTION: Rule
// ============================================================================

/// Validated rule parsed from one source file.
///
/// # Invariants
/// - `package` is non-empty and unique within a bundle.
/// - `constitution` is the 16-hex-character tag the rule was authored against.
/// - `clauses` is non-empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Dotted package name (e.g. `safety.core`).
    pub package: String,
    /// Constitutional tag declared by the source.
    pub constitution: String,
    /// Verdict returned when no clause fires.
    pub default_verdict: Verdict,
    /// Ordered decision clauses.
    pub clauses: Vec<Clause>,
}

impl Rule {
    /// Returns the clause with the given index, if present.
    #[must_use]
    pub fn clause(&self, index: usize) -> Option<&Clause> {
        self.clauses.get(index)
    }
}
