// crates/covenant-rules/src/eval.rs
// ============================================================================
// Module: Rule Evaluation
// Description: Single-pass clause evaluation against request attributes.
// Purpose: Convert attribute maps into tri-state clause outcomes and verdicts.
// Dependencies: crate::{ast, truth}, serde_json
// ============================================================================

//! ## Overview
//! Evaluation is a single pass over a rule's clauses. Each condition compares
//! a dotted attribute path against a literal; missing attributes and type
//! mismatches yield `Unknown`, which can never satisfy a clause. Conflicting
//! fired clauses are resolved most-specific-first, then by verdict precedence
//! (deny over review over allow), and the winning clause index is reported in
//! the outcome for the justification trace.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

use crate::ast::Comparator;
use crate::ast::Condition;
use crate::ast::Literal;
use crate::ast::Rule;
use crate::ast::Verdict;
use crate::truth::Truth;

// ============================================================================
// SECTION: Outcomes
// ============================================================================

/// Evaluation outcome for a single clause.
///
/// # Invariants
/// - `status` is the Kleene conjunction of all condition outcomes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClauseOutcome {
    /// Index of the clause within the rule.
    pub clause_index: usize,
    /// Verdict the clause contributes when fired.
    pub verdict: Verdict,
    /// Conjunction of all condition outcomes.
    pub status: Truth,
    /// Number of conditions guarding the clause.
    pub specificity: usize,
}

/// Evaluation outcome for a whole rule.
///
/// # Invariants
/// - `verdict` equals the winning clause verdict, or the rule default when no
///   clause fired.
/// - `winning_clause` is `None` iff the default verdict applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleOutcome {
    /// Rule package name.
    pub package: String,
    /// Final verdict for this rule.
    pub verdict: Verdict,
    /// Index of the winning clause, if any clause fired.
    pub winning_clause: Option<usize>,
    /// Per-clause evaluation trace.
    pub trace: Vec<ClauseOutcome>,
    /// True when any condition evaluated to `Unknown`.
    pub incomplete: bool,
}

// ============================================================================
// SECTION: Rule Evaluation
// ============================================================================

/// Evaluates a rule against a request attribute map.
#[must_use]
pub fn evaluate_rule(rule: &Rule, attributes: &Map<String, Value>) -> RuleOutcome {
    let mut trace = Vec::with_capacity(rule.clauses.len());
    let mut incomplete = false;

    for (clause_index, clause) in rule.clauses.iter().enumerate() {
        let mut status = Truth::True;
        for condition in &clause.conditions {
            let outcome = evaluate_condition(condition, attributes);
            if outcome.is_unknown() {
                incomplete = true;
            }
            status = status.and(outcome);
            if status.is_false() {
                break;
            }
        }
        trace.push(ClauseOutcome {
            clause_index,
            verdict: clause.verdict,
            status,
            specificity: clause.specificity(),
        });
    }

    let winner = trace
        .iter()
        .filter(|outcome| outcome.status.is_true())
        .max_by_key(|outcome| (outcome.specificity, outcome.verdict.precedence()));

    let (verdict, winning_clause) = winner.map_or((rule.default_verdict, None), |outcome| {
        (outcome.verdict, Some(outcome.clause_index))
    });

    RuleOutcome {
        package: rule.package.clone(),
        verdict,
        winning_clause,
        trace,
        incomplete,
    }
}

// ============================================================================
// SECTION: Condition Evaluation
// ============================================================================

/// Evaluates one condition against the attribute map.
#[must_use]
pub fn evaluate_condition(condition: &Condition, attributes: &Map<String, Value>) -> Truth {
    let value = lookup_attribute(&condition.attribute, attributes);
    let base = match condition.comparator {
        Comparator::Exists => Truth::from(value.is_some()),
        _ => match (value, condition.operand.as_ref()) {
            (Some(value), Some(operand)) => compare(condition.comparator, value, operand),
            _ => Truth::Unknown,
        },
    };
    if condition.negated { base.negate() } else { base }
}

/// Resolves a dotted attribute path within a nested attribute map.
fn lookup_attribute<'a>(path: &str, attributes: &'a Map<String, Value>) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = attributes.get(first)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Applies a comparator between an attribute value and a literal.
fn compare(comparator: Comparator, value: &Value, operand: &Literal) -> Truth {
    match comparator {
        Comparator::Equals => compare_equals(value, operand),
        Comparator::NotEquals => compare_equals(value, operand).negate(),
        Comparator::GreaterThan
        | Comparator::GreaterThanOrEqual
        | Comparator::LessThan
        | Comparator::LessThanOrEqual => compare_ordering(comparator, value, operand),
        Comparator::InSet => compare_in_set(value, operand),
        Comparator::Contains => compare_contains(value, operand),
        Comparator::Exists => Truth::Unknown,
    }
}

/// Equality comparison with strict type matching.
fn compare_equals(value: &Value, operand: &Literal) -> Truth {
    match (value, operand) {
        (
            Value::String(actual),
            Literal::Text {
                value: expected,
            },
        ) => Truth::from(actual == expected),
        (
            Value::Bool(actual),
            Literal::Bool {
                value: expected,
            },
        ) => Truth::from(actual == expected),
        (
            Value::Number(actual),
            Literal::Number {
                value: expected,
            },
        ) => actual
            .as_f64()
            .map_or(Truth::Unknown, |actual| Truth::from((actual - *expected).abs() < f64::EPSILON)),
        _ => Truth::Unknown,
    }
}

/// Numeric ordering comparison; non-numeric operands yield `Unknown`.
fn compare_ordering(comparator: Comparator, value: &Value, operand: &Literal) -> Truth {
    let Some(actual) = value.as_f64() else {
        return Truth::Unknown;
    };
    let Literal::Number {
        value: expected,
    } = operand
    else {
        return Truth::Unknown;
    };
    let result = match comparator {
        Comparator::GreaterThan => actual > *expected,
        Comparator::GreaterThanOrEqual => actual >= *expected,
        Comparator::LessThan => actual < *expected,
        Comparator::LessThanOrEqual => actual <= *expected,
        _ => return Truth::Unknown,
    };
    Truth::from(result)
}

/// Set membership against a list literal.
fn compare_in_set(value: &Value, operand: &Literal) -> Truth {
    let Literal::List {
        items,
    } = operand
    else {
        return Truth::Unknown;
    };
    let mut saw_unknown = false;
    for item in items {
        match compare_equals(value, item) {
            Truth::True => return Truth::True,
            Truth::Unknown => saw_unknown = true,
            Truth::False => {}
        }
    }
    if saw_unknown { Truth::Unknown } else { Truth::False }
}

/// Substring containment for string attributes.
fn compare_contains(value: &Value, operand: &Literal) -> Truth {
    match (value, operand) {
        (
            Value::String(actual),
            Literal::Text {
                value: needle,
            },
        ) => Truth::from(actual.contains(needle.as_str())),
        (Value::Array(items), scalar) => {
            let mut saw_unknown = false;
            for item in items {
                match compare_equals(item, scalar) {
                    Truth::True => return Truth::True,
                    Truth::Unknown => saw_unknown = true,
                    Truth::False => {}
                }
            }
            if saw_unknown { Truth::Unknown } else { Truth::False }
        }
        _ => Truth::Unknown,
    }
}
