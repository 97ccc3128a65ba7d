// crates/covenant-verify/src/solver.rs
// ============================================================================
// Module: Bounded Constraint Solver
// Description: Satisfiability over interval and set abstractions of rules.
// Purpose: Decide clause conjunctions for the rigorous verification tier.
// Dependencies: covenant-rules, serde_json
// ============================================================================

//! ## Overview
//! The solver decides satisfiability of condition conjunctions under an
//! abstraction: numeric attributes become intervals, string and boolean
//! attributes become equality/exclusion sets, existence checks become
//! presence constraints. A conjunction is satisfiable when every attribute's
//! constraints intersect; a witness model is produced for satisfiable
//! conjunctions. Conditions outside the abstraction yield `unknown`, never a
//! guess: proofs built on this solver fail closed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use covenant_rules::Comparator;
use covenant_rules::Condition;
use covenant_rules::Literal;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;

// ============================================================================
// SECTION: Atoms
// ============================================================================

/// Numeric comparison operator in an atom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumOp {
    /// Strictly greater than.
    Gt,
    /// Greater than or equal.
    Ge,
    /// Strictly less than.
    Lt,
    /// Less than or equal.
    Le,
    /// Equal.
    Eq,
    /// Not equal.
    Ne,
}

/// One abstracted constraint over a single attribute.
///
/// # Invariants
/// - Variants are stable for serialization into proof objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Atom {
    /// Numeric comparison.
    Num {
        /// Attribute path.
        attr: String,
        /// Comparison operator.
        op: NumOp,
        /// Comparison bound.
        value: f64,
    },
    /// String equality or disequality.
    Text {
        /// Attribute path.
        attr: String,
        /// True for equality, false for disequality.
        eq: bool,
        /// Compared value.
        value: String,
    },
    /// String set membership (or its negation).
    TextIn {
        /// Attribute path.
        attr: String,
        /// Member values.
        values: Vec<String>,
        /// True when membership is negated.
        negated: bool,
    },
    /// Boolean equality.
    Bool {
        /// Attribute path.
        attr: String,
        /// Required value.
        value: bool,
    },
    /// Attribute presence or absence.
    Exists {
        /// Attribute path.
        attr: String,
        /// True when the attribute must be present.
        present: bool,
    },
}

impl Atom {
    /// Returns the attribute the atom constrains.
    #[must_use]
    pub fn attribute(&self) -> &str {
        match self {
            Self::Num {
                attr, ..
            }
            | Self::Text {
                attr, ..
            }
            | Self::TextIn {
                attr, ..
            }
            | Self::Bool {
                attr, ..
            }
            | Self::Exists {
                attr, ..
            } => attr,
        }
    }

    /// Abstracts a rule condition into an atom.
    ///
    /// Returns `None` when the condition falls outside the abstraction
    /// (e.g. `contains`, list-typed equality); callers must treat that as
    /// undecidable, not as vacuously true.
    #[must_use]
    pub fn from_condition(condition: &Condition) -> Option<Self> {
        let attr = condition.attribute.clone();
        match (condition.comparator, condition.operand.as_ref()) {
            (Comparator::Exists, None) => Some(Self::Exists {
                attr,
                present: !condition.negated,
            }),
            (
                Comparator::Equals | Comparator::NotEquals,
                Some(Literal::Text {
                    value,
                }),
            ) => {
                let eq = (condition.comparator == Comparator::Equals) != condition.negated;
                Some(Self::Text {
                    attr,
                    eq,
                    value: value.clone(),
                })
            }
            (
                Comparator::Equals | Comparator::NotEquals,
                Some(Literal::Bool {
                    value,
                }),
            ) => {
                let wants_equal =
                    (condition.comparator == Comparator::Equals) != condition.negated;
                Some(Self::Bool {
                    attr,
                    value: if wants_equal { *value } else { !*value },
                })
            }
            (
                Comparator::Equals | Comparator::NotEquals,
                Some(Literal::Number {
                    value,
                }),
            ) => {
                let eq = (condition.comparator == Comparator::Equals) != condition.negated;
                Some(Self::Num {
                    attr,
                    op: if eq { NumOp::Eq } else { NumOp::Ne },
                    value: *value,
                })
            }
            (
                Comparator::GreaterThan
                | Comparator::GreaterThanOrEqual
                | Comparator::LessThan
                | Comparator::LessThanOrEqual,
                Some(Literal::Number {
                    value,
                }),
            ) => {
                let op = numeric_op(condition.comparator, condition.negated)?;
                Some(Self::Num {
                    attr,
                    op,
                    value: *value,
                })
            }
            (
                Comparator::InSet,
                Some(Literal::List {
                    items,
                }),
            ) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Literal::Text {
                            value,
                        } => values.push(value.clone()),
                        _ => return None,
                    }
                }
                Some(Self::TextIn {
                    attr,
                    values,
                    negated: condition.negated,
                })
            }
            _ => None,
        }
    }
}

/// Maps an ordering comparator (with negation) onto a numeric op.
const fn numeric_op(comparator: Comparator, negated: bool) -> Option<NumOp> {
    let op = match comparator {
        Comparator::GreaterThan => {
            if negated {
                NumOp::Le
            } else {
                NumOp::Gt
            }
        }
        Comparator::GreaterThanOrEqual => {
            if negated {
                NumOp::Lt
            } else {
                NumOp::Ge
            }
        }
        Comparator::LessThan => {
            if negated {
                NumOp::Ge
            } else {
                NumOp::Lt
            }
        }
        Comparator::LessThanOrEqual => {
            if negated {
                NumOp::Gt
            } else {
                NumOp::Le
            }
        }
        _ => return None,
    };
    Some(op)
}

// ============================================================================
// SECTION: Conjunctions
// ============================================================================

/// A conjunction of atoms to be decided.
///
/// # Invariants
/// - Order is irrelevant to the outcome; solving is deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Conjunction {
    /// Conjoined atoms.
    pub atoms: Vec<Atom>,
}

impl Conjunction {
    /// Builds a conjunction from rule conditions.
    ///
    /// Returns `None` when any condition is outside the abstraction.
    #[must_use]
    pub fn from_conditions(conditions: &[Condition]) -> Option<Self> {
        let mut atoms = Vec::with_capacity(conditions.len());
        for condition in conditions {
            atoms.push(Atom::from_condition(condition)?);
        }
        Some(Self {
            atoms,
        })
    }

    /// Extends this conjunction with additional atoms.
    #[must_use]
    pub fn and(mut self, extra: &[Atom]) -> Self {
        self.atoms.extend(extra.iter().cloned());
        self
    }
}

// ============================================================================
// SECTION: Solve Outcomes
// ============================================================================

/// Solver outcome for one conjunction.
///
/// # Invariants
/// - `Sat` carries a concrete witness model satisfying every atom.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SolveOutcome {
    /// Satisfiable, with a witness assignment.
    Sat {
        /// Witness model keyed by attribute.
        model: Map<String, Value>,
    },
    /// Unsatisfiable.
    Unsat,
    /// Outside the abstraction or over budget.
    Unknown {
        /// Reason the conjunction could not be decided.
        reason: String,
    },
}

// ============================================================================
// SECTION: Per-Attribute Domains
// ============================================================================

/// Accumulated constraints for one attribute.
#[derive(Debug, Default)]
struct Domain {
    /// Exclusive lower bound state: (bound, strict).
    lower: Option<(f64, bool)>,
    /// Exclusive upper bound state: (bound, strict).
    upper: Option<(f64, bool)>,
    /// Excluded point values.
    excluded_numbers: Vec<f64>,
    /// Required string value, if pinned.
    text_equal: Option<String>,
    /// Excluded string values.
    text_excluded: BTreeSet<String>,
    /// Allowed string set from membership atoms.
    text_allowed: Option<BTreeSet<String>>,
    /// Required boolean value, if pinned.
    bool_equal: Option<bool>,
    /// Presence requirement.
    presence: Option<bool>,
    /// Whether numeric constraints were seen.
    numeric: bool,
    /// Whether textual constraints were seen.
    textual: bool,
}

impl Domain {
    /// Applies one atom, reporting contradiction via `false`.
    fn apply(&mut self, atom: &Atom) -> bool {
        match atom {
            Atom::Num {
                op,
                value,
                ..
            } => {
                self.numeric = true;
                match op {
                    NumOp::Gt => self.tighten_lower(*value, true),
                    NumOp::Ge => self.tighten_lower(*value, false),
                    NumOp::Lt => self.tighten_upper(*value, true),
                    NumOp::Le => self.tighten_upper(*value, false),
                    NumOp::Eq => {
                        self.tighten_lower(*value, false);
                        self.tighten_upper(*value, false);
                    }
                    NumOp::Ne => self.excluded_numbers.push(*value),
                }
                true
            }
            Atom::Text {
                eq,
                value,
                ..
            } => {
                self.textual = true;
                if *eq {
                    if let Some(existing) = &self.text_equal
                        && existing != value
                    {
                        return false;
                    }
                    self.text_equal = Some(value.clone());
                } else {
                    self.text_excluded.insert(value.clone());
                }
                true
            }
            Atom::TextIn {
                values,
                negated,
                ..
            } => {
                self.textual = true;
                if *negated {
                    for value in values {
                        self.text_excluded.insert(value.clone());
                    }
                } else {
                    let incoming: BTreeSet<String> = values.iter().cloned().collect();
                    self.text_allowed = Some(match self.text_allowed.take() {
                        Some(existing) => existing.intersection(&incoming).cloned().collect(),
                        None => incoming,
                    });
                }
                true
            }
            Atom::Bool {
                value, ..
            } => {
                if let Some(existing) = self.bool_equal
                    && existing != *value
                {
                    return false;
                }
                self.bool_equal = Some(*value);
                true
            }
            Atom::Exists {
                present, ..
            } => {
                if let Some(existing) = self.presence
                    && existing != *present
                {
                    return false;
                }
                self.presence = Some(*present);
                true
            }
        }
    }

    /// Tightens the lower bound.
    fn tighten_lower(&mut self, bound: f64, strict: bool) {
        let replace = match self.lower {
            Some((existing, existing_strict)) => {
                bound > existing || ((bound - existing).abs() < f64::EPSILON && strict && !existing_strict)
            }
            None => true,
        };
        if replace {
            self.lower = Some((bound, strict));
        }
    }

    /// Tightens the upper bound.
    fn tighten_upper(&mut self, bound: f64, strict: bool) {
        let replace = match self.upper {
            Some((existing, existing_strict)) => {
                bound < existing || ((bound - existing).abs() < f64::EPSILON && strict && !existing_strict)
            }
            None => true,
        };
        if replace {
            self.upper = Some((bound, strict));
        }
    }

    /// Decides the domain, producing a witness value when satisfiable.
    fn witness(&self) -> DomainOutcome {
        // Absence contradicts every value constraint.
        if self.presence == Some(false) {
            if self.numeric || self.textual || self.bool_equal.is_some() {
                return DomainOutcome::Unsat;
            }
            return DomainOutcome::Absent;
        }
        if self.numeric && (self.textual || self.bool_equal.is_some()) {
            return DomainOutcome::Unsat;
        }
        if self.textual && self.bool_equal.is_some() {
            return DomainOutcome::Unsat;
        }

        if self.numeric {
            return self.numeric_witness();
        }
        if self.textual {
            return self.text_witness();
        }
        if let Some(value) = self.bool_equal {
            return DomainOutcome::Value(Value::Bool(value));
        }
        // Pure presence requirement: any value works.
        DomainOutcome::Value(json!("present"))
    }

    /// Picks a numeric witness inside the interval, avoiding exclusions.
    fn numeric_witness(&self) -> DomainOutcome {
        let lower = self.lower.unwrap_or((f64::MIN / 2.0, false));
        let upper = self.upper.unwrap_or((f64::MAX / 2.0, false));
        if lower.0 > upper.0 {
            return DomainOutcome::Unsat;
        }
        if (lower.0 - upper.0).abs() < f64::EPSILON && (lower.1 || upper.1) {
            return DomainOutcome::Unsat;
        }

        // Candidate points: the midpoint and nudges off each bound.
        let span = upper.0 - lower.0;
        let candidates = [
            lower.0 + span / 2.0,
            lower.0 + span / 4.0,
            lower.0 + span * 3.0 / 4.0,
            if lower.1 { lower.0 + span / 1000.0 + f64::EPSILON } else { lower.0 },
            if upper.1 { upper.0 - span / 1000.0 - f64::EPSILON } else { upper.0 },
        ];
        for candidate in candidates {
            let above = candidate > lower.0 || (!lower.1 && (candidate - lower.0).abs() < f64::EPSILON);
            let below = candidate < upper.0 || (!upper.1 && (candidate - upper.0).abs() < f64::EPSILON);
            let excluded = self
                .excluded_numbers
                .iter()
                .any(|point| (candidate - point).abs() < f64::EPSILON);
            if above && below && !excluded {
                return DomainOutcome::Value(json!(candidate));
            }
        }
        DomainOutcome::Unknown("numeric exclusions exhausted candidate points".to_string())
    }

    /// Picks a string witness honoring equality, membership, and exclusion.
    fn text_witness(&self) -> DomainOutcome {
        if let Some(pinned) = &self.text_equal {
            if self.text_excluded.contains(pinned) {
                return DomainOutcome::Unsat;
            }
            if let Some(allowed) = &self.text_allowed
                && !allowed.contains(pinned)
            {
                return DomainOutcome::Unsat;
            }
            return DomainOutcome::Value(Value::String(pinned.clone()));
        }
        if let Some(allowed) = &self.text_allowed {
            return allowed
                .iter()
                .find(|value| !self.text_excluded.contains(*value))
                .map_or(DomainOutcome::Unsat, |value| {
                    DomainOutcome::Value(Value::String(value.clone()))
                });
        }
        // Only exclusions: synthesize a value outside the excluded set.
        let mut candidate = "w".to_string();
        while self.text_excluded.contains(&candidate) {
            candidate.push('w');
        }
        DomainOutcome::Value(Value::String(candidate))
    }
}

/// Outcome of deciding one attribute domain.
enum DomainOutcome {
    /// Satisfiable with this witness value.
    Value(Value),
    /// Attribute must be absent from the model.
    Absent,
    /// Contradictory constraints.
    Unsat,
    /// Could not decide within the abstraction.
    Unknown(String),
}

// ============================================================================
// SECTION: Solving
// ============================================================================

/// Decides a conjunction, returning a witness model when satisfiable.
#[must_use]
pub fn solve(conjunction: &Conjunction) -> SolveOutcome {
    let mut domains: BTreeMap<&str, Domain> = BTreeMap::new();
    for atom in &conjunction.atoms {
        let domain = domains.entry(atom.attribute()).or_default();
        if !domain.apply(atom) {
            return SolveOutcome::Unsat;
        }
    }

    let mut model = Map::new();
    for (attribute, domain) in &domains {
        match domain.witness() {
            DomainOutcome::Value(value) => {
                model.insert((*attribute).to_string(), value);
            }
            DomainOutcome::Absent => {}
            DomainOutcome::Unsat => return SolveOutcome::Unsat,
            DomainOutcome::Unknown(reason) => {
                return SolveOutcome::Unknown {
                    reason,
                };
            }
        }
    }
    SolveOutcome::Sat {
        model,
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
