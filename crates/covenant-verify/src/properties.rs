// crates/covenant-verify/src/properties.rs
// ============================================================================
// Module: Constitutional Properties
// Description: The property catalog and its per-tier check semantics.
// Purpose: Map property identifiers onto decidable checks over rules.
// Dependencies: crate::solver, covenant-core, covenant-rules
// ============================================================================

//! ## Overview
//! Properties are the constitutional requirements rules are verified
//! against. Each property resolves to a concrete check; checks that need an
//! existential witness over numeric domains are classified rigorous and can
//! only be decided by the solver tier. Requests naming a property this
//! catalog does not know yield `unknown` obligations rather than silent
//! passes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use covenant_core::PropertyId;
use covenant_core::PropertySpec;
use covenant_core::VerificationTier;

use crate::solver::Atom;
use crate::solver::NumOp;

// ============================================================================
// SECTION: Property Checks
// ============================================================================

/// Concrete check semantics behind a property identifier.
///
/// # Invariants
/// - Variants are stable; new properties extend the enum.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyCheck {
    /// No two equally specific clauses with different verdicts are jointly
    /// satisfiable (deterministic conflict resolution).
    NoConflictingClauses,
    /// Every clause guard is satisfiable (no dead decision paths).
    NoDeadClauses,
    /// No satisfiable assignment reaches `allow` while violating the given
    /// constraint atoms (e.g. compliance below the floor).
    NoForbiddenAllow {
        /// Atoms describing the forbidden region.
        forbidden: Vec<Atom>,
    },
}

impl PropertyCheck {
    /// Minimum tier able to decide this check.
    #[must_use]
    pub const fn minimum_tier(&self) -> VerificationTier {
        match self {
            Self::NoConflictingClauses | Self::NoDeadClauses => VerificationTier::Semantic,
            Self::NoForbiddenAllow {
                ..
            } => VerificationTier::Rigorous,
        }
    }
}

// ============================================================================
// SECTION: Catalog
// ============================================================================

/// Compliance floor enforced by the default catalog.
const COMPLIANCE_FLOOR: f64 = 0.95;

/// Resolves a property specification to its check semantics.
///
/// Properties flagged `requires_numeric_witness` that the catalog does not
/// recognize resolve to `None` and surface as `unknown`.
#[must_use]
pub fn resolve_check(property: &PropertySpec) -> Option<PropertyCheck> {
    match property.property_id.as_str() {
        "no_deadlock" => Some(PropertyCheck::NoConflictingClauses),
        "bounded_response" => Some(PropertyCheck::NoDeadClauses),
        "compliance_floor" => Some(PropertyCheck::NoForbiddenAllow {
            forbidden: vec![Atom::Num {
                attr: "compliance".to_string(),
                op: NumOp::Lt,
                value: COMPLIANCE_FLOOR,
            }],
        }),
        "deny_critical_risk" => Some(PropertyCheck::NoForbiddenAllow {
            forbidden: vec![Atom::Text {
                attr: "risk".to_string(),
                eq: true,
                value: "critical".to_string(),
            }],
        }),
        _ => None,
    }
}

/// Returns the default constitutional property set.
#[must_use]
pub fn default_properties() -> Vec<PropertySpec> {
    vec![
        PropertySpec {
            property_id: PropertyId::new("no_deadlock"),
            description: "equally specific clauses never conflict".to_string(),
            requires_numeric_witness: false,
        },
        PropertySpec {
            property_id: PropertyId::new("bounded_response"),
            description: "every decision clause is reachable".to_string(),
            requires_numeric_witness: false,
        },
        PropertySpec {
            property_id: PropertyId::new("compliance_floor"),
            description: "allow is unreachable below the compliance floor".to_string(),
            requires_numeric_witness: true,
        },
        PropertySpec {
            property_id: PropertyId::new("deny_critical_risk"),
            description: "allow is unreachable for critical risk".to_string(),
            requires_numeric_witness: true,
        },
    ]
}
