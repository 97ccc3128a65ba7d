// crates/covenant-rules/tests/parse.rs
// ============================================================================
// Module: Rule Parser Tests
// Description: Validate rule source parsing, limits, and structural errors.
// Purpose: Ensure untrusted rule text fails closed on malformed input.
// Dependencies: covenant-rules
// ============================================================================

//! Parser behavior tests covering declarations, clauses, and error paths.

use covenant_rules::Comparator;
use covenant_rules::ParseError;
use covenant_rules::Verdict;
use covenant_rules::parse::check_balanced_braces;
use covenant_rules::parse_rule;

/// A well-formed rule source used across tests.
const SAMPLE: &str = r#"
# Core safety policy.
package safety.core
constitution "cdd01ef066bc6cf2"
default require_review

allow {
    compliance >= 0.95
    risk == "low"
}

deny {
    risk in ["high", "critical"]
}
"#;

#[test]
fn parses_well_formed_rule() -> Result<(), Box<dyn std::error::Error>> {
    let rule = parse_rule(SAMPLE)?;
    assert_eq!(rule.package, "safety.core");
    assert_eq!(rule.constitution, "cdd01ef066bc6cf2");
    assert_eq!(rule.default_verdict, Verdict::RequireReview);
    assert_eq!(rule.clauses.len(), 2);

    let allow = rule.clause(0).ok_or("missing allow clause")?;
    assert_eq!(allow.verdict, Verdict::Allow);
    assert_eq!(allow.conditions.len(), 2);
    assert_eq!(allow.conditions[0].comparator, Comparator::GreaterThanOrEqual);

    let deny = rule.clause(1).ok_or("missing deny clause")?;
    assert_eq!(deny.conditions[0].comparator, Comparator::InSet);
    Ok(())
}

#[test]
fn rejects_empty_input() {
    assert_eq!(parse_rule(""), Err(ParseError::EmptyInput));
    assert_eq!(parse_rule("   \n# only a comment\n"), Err(ParseError::EmptyInput));
}

#[test]
fn rejects_missing_package() {
    let source = r#"
constitution "cdd01ef066bc6cf2"
default deny
allow { risk == "low" }
"#;
    assert_eq!(parse_rule(source), Err(ParseError::MissingPackage));
}

#[test]
fn rejects_missing_constitution() {
    let source = r"
package p
default deny
allow { compliance >= 0.9 }
";
    assert_eq!(parse_rule(source), Err(ParseError::MissingConstitution));
}

#[test]
fn rejects_missing_default_verdict() {
    let source = r#"
package p
constitution "cdd01ef066bc6cf2"
allow { compliance >= 0.9 }
"#;
    assert_eq!(parse_rule(source), Err(ParseError::MissingDefault));
}

#[test]
fn rejects_rule_without_clauses() {
    let source = r#"
package p
constitution "cdd01ef066bc6cf2"
default deny
"#;
    assert_eq!(parse_rule(source), Err(ParseError::NoClauses));
}

#[test]
fn rejects_malformed_constitution_tag() {
    let source = r#"
package p
constitution "NOT-A-TAG"
default deny
allow { risk == "low" }
"#;
    assert!(matches!(parse_rule(source), Err(ParseError::InvalidConstitutionTag { .. })));
}

#[test]
fn rejects_unbalanced_braces() {
    let source = r#"
package p
constitution "cdd01ef066bc6cf2"
default deny
allow { risk == "low"
"#;
    assert!(matches!(parse_rule(source), Err(ParseError::UnbalancedBrace { .. })));
}

#[test]
fn rejects_empty_clause_body() {
    let source = r#"
package p
constitution "cdd01ef066bc6cf2"
default deny
allow { }
"#;
    assert!(matches!(parse_rule(source), Err(ParseError::EmptyClause { .. })));
}

#[test]
fn rejects_duplicate_package_declaration() {
    let source = r#"
package p
package q
constitution "cdd01ef066bc6cf2"
default deny
allow { risk == "low" }
"#;
    assert!(matches!(
        parse_rule(source),
        Err(ParseError::DuplicateDeclaration {
            declaration: "package",
            ..
        })
    ));
}

#[test]
fn rejects_unterminated_string() {
    let source = r#"
package p
constitution "cdd01ef066bc6cf2"
default deny
allow { name == "unterminated }
"#;
    assert!(matches!(parse_rule(source), Err(ParseError::UnterminatedString { .. })));
}

#[test]
fn rejects_oversized_input() {
    let mut source = String::from("package p\n");
    source.push_str(&"# pad\n".repeat(64 * 1024));
    assert!(matches!(parse_rule(&source), Err(ParseError::InputTooLarge { .. })));
}

#[test]
fn parses_negated_and_existence_conditions() -> Result<(), Box<dyn std::error::Error>> {
    let source = r#"
package p
constitution "cdd01ef066bc6cf2"
default deny
allow {
    not risk == "critical"
    submitter exists
}
"#;
    let rule = parse_rule(source)?;
    let clause = rule.clause(0).ok_or("missing clause")?;
    assert!(clause.conditions[0].negated);
    assert_eq!(clause.conditions[1].comparator, Comparator::Exists);
    assert!(clause.conditions[1].operand.is_none());
    Ok(())
}

#[test]
fn balanced_brace_check_ignores_strings_and_comments() -> Result<(), Box<dyn std::error::Error>> {
    check_balanced_braces("allow { name == \"{\" } # {{{")?;
    assert!(check_balanced_braces("allow { nested {").is_err());
    assert!(check_balanced_braces("} allow {").is_err());
    Ok(())
}
