// crates/covenant-policy/src/compile.rs
// ============================================================================
// Module: Rule Compilation
// Description: Pure syntactic and semantic validation of rule sources.
// Purpose: Report per-rule validity with no global state and no activation.
// Dependencies: covenant-core, covenant-rules
// ============================================================================

//! ## Overview
//! Compilation parses every source, applies structural checks (package
//! declaration, default verdict, at least one decision clause, balanced
//! braces), enforces the constitutional tag, and rejects duplicate package
//! names across the bundle. The outcome reports per-rule validity and an
//! overall score; nothing is staged here, so failures cannot partially
//! activate.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use covenant_core::ConstitutionalTag;
use covenant_core::interfaces::RuleSourceFile;
use covenant_rules::Rule;
use covenant_rules::parse::check_balanced_braces;
use covenant_rules::parse_rule;
use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Validation Results
// ============================================================================

/// Validation result for one source file.
///
/// # Invariants
/// - `rule` is present iff `errors` is empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleValidation {
    /// Source file name.
    pub name: String,
    /// Parsed rule when validation passed.
    pub rule: Option<Rule>,
    /// Validation errors, in detection order.
    pub errors: Vec<String>,
}

impl RuleValidation {
    /// Returns true when the source validated cleanly.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.rule.is_some()
    }
}

/// Aggregate compilation outcome.
///
/// # Invariants
/// - `score` is the valid fraction of sources, 1.0 for an empty input set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompileOutcome {
    /// Per-source validation results, in input order.
    pub validations: Vec<RuleValidation>,
    /// Overall validity score in `[0, 1]`.
    pub score: f64,
    /// Clause counts per top-level package namespace.
    pub framework_mix: BTreeMap<String, usize>,
}

impl CompileOutcome {
    /// Returns true when every source validated cleanly.
    #[must_use]
    pub fn all_valid(&self) -> bool {
        self.validations.iter().all(RuleValidation::is_valid)
    }

    /// Returns the parsed rules of the valid sources, in input order.
    #[must_use]
    pub fn rules(&self) -> Vec<(String, Rule)> {
        self.validations
            .iter()
            .filter_map(|validation| {
                validation.rule.clone().map(|rule| (validation.name.clone(), rule))
            })
            .collect()
    }
}

// ============================================================================
// SECTION: Compilation
// ============================================================================

/// Compiles rule sources against the configured constitutional tag.
///
/// Pure: consumes sources, produces a report, touches no global state. An
/// empty source set compiles successfully with zero rules.
#[must_use]
pub fn compile(sources: &[RuleSourceFile], tag: &ConstitutionalTag) -> CompileOutcome {
    let mut validations = Vec::with_capacity(sources.len());
    let mut seen_packages: BTreeSet<String> = BTreeSet::new();
    let mut framework_mix: BTreeMap<String, usize> = BTreeMap::new();

    for source in sources {
        let mut errors = Vec::new();

        // Brace balance is reported even when parsing stops earlier, so
        // submitters see the structural problem directly.
        if let Err(err) = check_balanced_braces(&source.content) {
            errors.push(err.to_string());
        }

        let rule = match parse_rule(&source.content) {
            Ok(rule) => {
                if rule.constitution != tag.as_str() {
                    errors.push(format!(
                        "constitutional mismatch: rule declares {}, expected {}",
                        rule.constitution,
                        tag.as_str()
                    ));
                }
                if !seen_packages.insert(rule.package.clone()) {
                    errors.push(format!("duplicate package name: {}", rule.package));
                }
                Some(rule)
            }
            Err(err) => {
                let rendered = err.to_string();
                if !errors.contains(&rendered) {
                    errors.push(rendered);
                }
                None
            }
        };

        let accepted = errors.is_empty().then_some(rule).flatten();
        if let Some(rule) = &accepted {
            let framework =
                rule.package.split('.').next().unwrap_or(rule.package.as_str()).to_string();
            *framework_mix.entry(framework).or_insert(0) += rule.clauses.len();
        }
        validations.push(RuleValidation {
            name: source.name.clone(),
            rule: accepted,
            errors,
        });
    }

    let score = if validations.is_empty() {
        1.0
    } else {
        let valid = validations.iter().filter(|validation| validation.is_valid()).count();
        #[allow(clippy::cast_precision_loss, reason = "source counts are small")]
        {
            valid as f64 / validations.len() as f64
        }
    };

    CompileOutcome {
        validations,
        score,
        framework_mix,
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use covenant_core::ConstitutionalTag;
    use covenant_core::interfaces::RuleSourceFile;

    use super::compile;

    /// Builds a source file from a name and body.
    fn source(name: &str, content: &str) -> RuleSourceFile {
        RuleSourceFile {
            name: name.to_string(),
            content: content.to_string(),
        }
    }

    /// A valid rule body with the given package name.
    fn valid_rule(package: &str) -> String {
        format!(
            "package {package}\nconstitution \"cdd01ef066bc6cf2\"\ndefault deny\n\
             allow {{ compliance >= 0.95 }}\n"
        )
    }

    #[test]
    fn empty_source_set_compiles_with_zero_rules() {
        let outcome = compile(&[], &ConstitutionalTag::deployment_default());
        assert!(outcome.all_valid());
        assert!((outcome.score - 1.0).abs() < f64::EPSILON);
        assert!(outcome.rules().is_empty());
    }

    #[test]
    fn duplicate_packages_are_rejected() {
        let sources = vec![
            source("a.rule", &valid_rule("safety.core")),
            source("b.rule", &valid_rule("safety.core")),
        ];
        let outcome = compile(&sources, &ConstitutionalTag::deployment_default());
        assert!(!outcome.all_valid());
        assert!(outcome.validations[0].is_valid());
        assert!(
            outcome.validations[1]
                .errors
                .iter()
                .any(|err| err.contains("duplicate package"))
        );
        assert!((outcome.score - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn mismatched_tag_is_a_semantic_error() {
        let body = "package p\nconstitution \"0123456789abcdef\"\ndefault deny\n\
                    allow { compliance >= 0.9 }\n";
        let outcome =
            compile(&[source("p.rule", body)], &ConstitutionalTag::deployment_default());
        assert!(!outcome.all_valid());
        assert!(
            outcome.validations[0]
                .errors
                .iter()
                .any(|err| err.contains("constitutional mismatch"))
        );
    }

    #[test]
    fn framework_mix_counts_clauses_per_namespace() {
        let sources = vec![
            source("a.rule", &valid_rule("safety.core")),
            source("b.rule", &valid_rule("operational.limits")),
        ];
        let outcome = compile(&sources, &ConstitutionalTag::deployment_default());
        assert_eq!(outcome.framework_mix.get("safety"), Some(&1));
        assert_eq!(outcome.framework_mix.get("operational"), Some(&1));
    }
}
