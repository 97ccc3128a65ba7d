// crates/covenant-rules/src/parse.rs
// ============================================================================
// Module: Rule Parser
// Description: Bounded lexer and recursive-descent parser for rule sources.
// Purpose: Turn untrusted rule text into validated `Rule` values.
// Dependencies: crate::ast, thiserror
// ============================================================================

//! ## Overview
//! Rule sources are untrusted input. The parser enforces input-size, clause,
//! and condition limits before building any AST, and fails closed on the
//! first structural problem. Grammar (informal):
//!
//! ```text
//! rule      := package constitution default clause+
//! package   := "package" dotted_ident
//! constitution := "constitution" string
//! default   := "default" verdict
//! clause    := verdict "{" condition* "}"
//! condition := ["not"] attr (cmp literal | "in" list | "contains" literal | "exists")
//! verdict   := "allow" | "deny" | "require_review"
//! cmp       := "==" | "!=" | ">" | ">=" | "<" | "<="
//! ```
//!
//! `#` starts a line comment. Conditions inside a clause are a conjunction;
//! clauses sharing a verdict form a disjunction.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::ast::Clause;
use crate::ast::Comparator;
use crate::ast::Condition;
use crate::ast::Literal;
use crate::ast::Rule;
use crate::ast::Verdict;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum allowed rule source size in bytes.
pub const MAX_RULE_SOURCE_BYTES: usize = 256 * 1024;
/// Maximum number of clauses in one rule.
pub const MAX_CLAUSES: usize = 128;
/// Maximum number of conditions in one clause.
pub const MAX_CONDITIONS_PER_CLAUSE: usize = 64;
/// Maximum number of elements in a list literal.
pub const MAX_LIST_ITEMS: usize = 256;
/// Required length of the constitutional tag.
const CONSTITUTION_TAG_LEN: usize = 16;

// ============================================================================
// SECTION: Parse Errors
// ============================================================================

/// Errors raised while parsing a rule source.
///
/// # Invariants
/// - Variants are stable for programmatic handling and submitter feedback.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Input was empty or contained only whitespace and comments.
    #[error("rule source is empty")]
    EmptyInput,
    /// Input exceeded the configured size limit.
    #[error("rule source exceeds size limit: {actual_bytes} bytes (max {max_bytes})")]
    InputTooLarge {
        /// Maximum allowed bytes.
        max_bytes: usize,
        /// Actual input length in bytes.
        actual_bytes: usize,
    },
    /// Unexpected token encountered during parsing.
    #[error("unexpected token `{found}` at {position}, expected {expected}")]
    UnexpectedToken {
        /// Human-friendly expectation summary.
        expected: &'static str,
        /// The token that was actually seen.
        found: String,
        /// Byte offset in the original input.
        position: usize,
    },
    /// Required `package` declaration is missing.
    #[error("rule source is missing a package declaration")]
    MissingPackage,
    /// Required `constitution` declaration is missing.
    #[error("rule source is missing a constitution declaration")]
    MissingConstitution,
    /// Required `default` verdict declaration is missing.
    #[error("rule source is missing a default verdict")]
    MissingDefault,
    /// Rule declared no decision clauses.
    #[error("rule source declares no decision clauses")]
    NoClauses,
    /// Clause body was empty.
    #[error("clause at {position} has no conditions")]
    EmptyClause {
        /// Byte offset of the clause opening brace.
        position: usize,
    },
    /// Opening and closing braces do not balance.
    #[error("unbalanced braces at {position}")]
    UnbalancedBrace {
        /// Byte offset where the imbalance was detected.
        position: usize,
    },
    /// String literal was not terminated before end of input.
    #[error("unterminated string starting at {position}")]
    UnterminatedString {
        /// Byte offset of the opening quote.
        position: usize,
    },
    /// Numeric literal failed to parse or was not finite.
    #[error("invalid number `{raw}` at {position}")]
    InvalidNumber {
        /// The raw numeric text.
        raw: String,
        /// Byte offset in the original input.
        position: usize,
    },
    /// Constitutional tag was not 16 lowercase hex characters.
    #[error("invalid constitutional tag `{raw}`: expected 16 lowercase hex characters")]
    InvalidConstitutionTag {
        /// The offending tag text.
        raw: String,
    },
    /// Rule exceeded the clause limit.
    #[error("rule exceeds clause limit: {actual} clauses (max {max})")]
    TooManyClauses {
        /// Maximum allowed clauses.
        max: usize,
        /// Actual clause count.
        actual: usize,
    },
    /// Clause exceeded the condition limit.
    #[error("clause exceeds condition limit: {actual} conditions (max {max})")]
    TooManyConditions {
        /// Maximum allowed conditions.
        max: usize,
        /// Actual condition count.
        actual: usize,
    },
    /// List literal exceeded the element limit.
    #[error("list literal exceeds element limit: {actual} items (max {max})")]
    TooManyListItems {
        /// Maximum allowed elements.
        max: usize,
        /// Actual element count.
        actual: usize,
    },
    /// Declaration appeared more than once.
    #[error("duplicate `{declaration}` declaration at {position}")]
    DuplicateDeclaration {
        /// Declaration keyword that repeated.
        declaration: &'static str,
        /// Byte offset of the repeat.
        position: usize,
    },
}

// ============================================================================
// SECTION: Public API
// ============================================================================

/// Parses one rule source into a validated [`Rule`].
///
/// # Errors
///
/// Returns [`ParseError`] for syntax issues, missing declarations, limit
/// breaches, or an ill-formed constitutional tag.
pub fn parse_rule(input: &str) -> Result<Rule, ParseError> {
    if input.len() > MAX_RULE_SOURCE_BYTES {
        return Err(ParseError::InputTooLarge {
            max_bytes: MAX_RULE_SOURCE_BYTES,
            actual_bytes: input.len(),
        });
    }
    let tokens = Lexer::new(input).lex()?;
    Parser::new(tokens).parse()
}

/// Checks that every opening brace in the source has a closing partner.
///
/// Exposed separately so the policy engine can report brace imbalance as a
/// structural validation failure even when parsing stops earlier.
///
/// # Errors
///
/// Returns [`ParseError::UnbalancedBrace`] on the first imbalance.
pub fn check_balanced_braces(input: &str) -> Result<(), ParseError> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut in_comment = false;
    for (position, ch) in input.char_indices() {
        match ch {
            '\n' => in_comment = false,
            '#' if !in_string => in_comment = true,
            '"' if !in_comment => in_string = !in_string,
            '{' if !in_string && !in_comment => depth += 1,
            '}' if !in_string && !in_comment => {
                depth = depth.checked_sub(1).ok_or(ParseError::UnbalancedBrace {
                    position,
                })?;
            }
            _ => {}
        }
    }
    if depth == 0 {
        Ok(())
    } else {
        Err(ParseError::UnbalancedBrace {
            position: input.len(),
        })
    }
}

// ============================================================================
// SECTION: Lexer
// ============================================================================

/// Lexer token produced from the rule source.
#[derive(Debug, Clone, PartialEq)]
enum Token {
    /// Identifier or keyword, including dotted paths.
    Ident(String),
    /// String literal with quotes stripped.
    Text(String),
    /// Numeric literal.
    Number(f64),
    /// Comparator symbol.
    Cmp(Comparator),
    /// Opening brace.
    LBrace,
    /// Closing brace.
    RBrace,
    /// Opening bracket.
    LBracket,
    /// Closing bracket.
    RBracket,
    /// Comma separator.
    Comma,
    /// End-of-input marker.
    Eof,
}

impl Token {
    /// Returns a short description of the token for error messages.
    fn describe(&self) -> String {
        match self {
            Self::Ident(name) => name.clone(),
            Self::Text(value) => format!("\"{value}\""),
            Self::Number(value) => value.to_string(),
            Self::Cmp(cmp) => cmp.as_str().to_string(),
            Self::LBrace => "{".to_string(),
            Self::RBrace => "}".to_string(),
            Self::LBracket => "[".to_string(),
            Self::RBracket => "]".to_string(),
            Self::Comma => ",".to_string(),
            Self::Eof => "end of input".to_string(),
        }
    }
}

/// Token paired with its byte offset.
#[derive(Debug, Clone)]
struct SpannedToken {
    /// Token value.
    token: Token,
    /// Byte offset into the input.
    position: usize,
}

/// Lexer for rule sources.
struct Lexer<'a> {
    /// Source input being tokenized.
    input: &'a str,
    /// Current byte offset into the input.
    offset: usize,
}

impl<'a> Lexer<'a> {
    /// Creates a new lexer for the given input.
    const fn new(input: &'a str) -> Self {
        Self {
            input,
            offset: 0,
        }
    }

    /// Lexes the input into a sequence of tokens.
    fn lex(&mut self) -> Result<Vec<SpannedToken>, ParseError> {
        let mut tokens = Vec::new();
        let bytes = self.input.as_bytes();

        while self.offset < bytes.len() {
            let ch = bytes[self.offset];
            match ch {
                b' ' | b'\t' | b'\n' | b'\r' => self.offset += 1,
                b'#' => self.skip_comment(bytes),
                b'{' => {
                    tokens.push(self.simple(Token::LBrace));
                    self.offset += 1;
                }
                b'}' => {
                    tokens.push(self.simple(Token::RBrace));
                    self.offset += 1;
                }
                b'[' => {
                    tokens.push(self.simple(Token::LBracket));
                    self.offset += 1;
                }
                b']' => {
                    tokens.push(self.simple(Token::RBracket));
                    self.offset += 1;
                }
                b',' => {
                    tokens.push(self.simple(Token::Comma));
                    self.offset += 1;
                }
                b'"' => tokens.push(self.lex_string()?),
                b'=' | b'!' | b'<' | b'>' => tokens.push(self.lex_comparator(bytes)?),
                b'0' ..= b'9' | b'-' => tokens.push(self.lex_number(bytes)?),
                b'a' ..= b'z' | b'A' ..= b'Z' | b'_' => {
                    let start = self.offset;
                    self.consume_while(bytes, |b| {
                        b.is_ascii_alphanumeric() || b == b'_' || b == b'.'
                    });
                    tokens.push(SpannedToken {
                        token: Token::Ident(self.input[start .. self.offset].to_string()),
                        position: start,
                    });
                }
                _ => {
                    return Err(ParseError::UnexpectedToken {
                        expected: "identifier, literal, or operator",
                        found: char::from(ch).to_string(),
                        position: self.offset,
                    });
                }
            }
        }

        if tokens.is_empty() {
            return Err(ParseError::EmptyInput);
        }
        tokens.push(SpannedToken {
            token: Token::Eof,
            position: self.offset,
        });
        Ok(tokens)
    }

    /// Skips a `#` comment through end of line.
    fn skip_comment(&mut self, bytes: &[u8]) {
        while self.offset < bytes.len() && bytes[self.offset] != b'\n' {
            self.offset += 1;
        }
    }

    /// Lexes a double-quoted string literal.
    fn lex_string(&mut self) -> Result<SpannedToken, ParseError> {
        let start = self.offset;
        let bytes = self.input.as_bytes();
        self.offset += 1;
        let content_start = self.offset;
        while self.offset < bytes.len() && bytes[self.offset] != b'"' {
            self.offset += 1;
        }
        if self.offset >= bytes.len() {
            return Err(ParseError::UnterminatedString {
                position: start,
            });
        }
        let value = self.input[content_start .. self.offset].to_string();
        self.offset += 1;
        Ok(SpannedToken {
            token: Token::Text(value),
            position: start,
        })
    }

    /// Lexes a comparator symbol (`==`, `!=`, `<`, `<=`, `>`, `>=`).
    fn lex_comparator(&mut self, bytes: &[u8]) -> Result<SpannedToken, ParseError> {
        let start = self.offset;
        let first = bytes[self.offset];
        let second = bytes.get(self.offset + 1).copied();
        let (cmp, width) = match (first, second) {
            (b'=', Some(b'=')) => (Comparator::Equals, 2),
            (b'!', Some(b'=')) => (Comparator::NotEquals, 2),
            (b'>', Some(b'=')) => (Comparator::GreaterThanOrEqual, 2),
            (b'<', Some(b'=')) => (Comparator::LessThanOrEqual, 2),
            (b'>', _) => (Comparator::GreaterThan, 1),
            (b'<', _) => (Comparator::LessThan, 1),
            _ => {
                return Err(ParseError::UnexpectedToken {
                    expected: "comparator",
                    found: char::from(first).to_string(),
                    position: start,
                });
            }
        };
        self.offset += width;
        Ok(SpannedToken {
            token: Token::Cmp(cmp),
            position: start,
        })
    }

    /// Lexes a numeric literal, including an optional sign and fraction.
    fn lex_number(&mut self, bytes: &[u8]) -> Result<SpannedToken, ParseError> {
        let start = self.offset;
        if bytes[self.offset] == b'-' {
            self.offset += 1;
        }
        self.consume_while(bytes, |b| b.is_ascii_digit() || b == b'.');
        let raw = &self.input[start .. self.offset];
        let value: f64 = raw.parse().map_err(|_| ParseError::InvalidNumber {
            raw: raw.to_string(),
            position: start,
        })?;
        if !value.is_finite() {
            return Err(ParseError::InvalidNumber {
                raw: raw.to_string(),
                position: start,
            });
        }
        Ok(SpannedToken {
            token: Token::Number(value),
            position: start,
        })
    }

    /// Builds a token at the current offset.
    const fn simple(&self, token: Token) -> SpannedToken {
        SpannedToken {
            token,
            position: self.offset,
        }
    }

    /// Consumes bytes while the predicate holds.
    fn consume_while(&mut self, bytes: &[u8], predicate: impl Fn(u8) -> bool) {
        while self.offset < bytes.len() && predicate(bytes[self.offset]) {
            self.offset += 1;
        }
    }
}

// ============================================================================
// SECTION: Parser
// ============================================================================

/// Recursive-descent parser over the lexed token stream.
struct Parser {
    /// Lexed tokens including the trailing EOF marker.
    tokens: Vec<SpannedToken>,
    /// Cursor into `tokens`.
    cursor: usize,
    /// Fallback EOF token returned if the cursor overruns.
    eof: SpannedToken,
}

impl Parser {
    /// Creates a parser over the token stream.
    fn new(tokens: Vec<SpannedToken>) -> Self {
        let eof_position = tokens.last().map_or(0, |token| token.position);
        Self {
            tokens,
            cursor: 0,
            eof: SpannedToken {
                token: Token::Eof,
                position: eof_position,
            },
        }
    }

    /// Parses the full rule source.
    fn parse(mut self) -> Result<Rule, ParseError> {
        let mut package: Option<String> = None;
        let mut constitution: Option<String> = None;
        let mut default_verdict: Option<Verdict> = None;
        let mut clauses: Vec<Clause> = Vec::new();

        loop {
            let spanned = self.peek().clone();
            match &spanned.token {
                Token::Eof => break,
                Token::Ident(word) => match word.as_str() {
                    "package" => {
                        if package.is_some() {
                            return Err(ParseError::DuplicateDeclaration {
                                declaration: "package",
                                position: spanned.position,
                            });
                        }
                        self.advance();
                        package = Some(self.expect_ident("package name")?);
                    }
                    "constitution" => {
                        if constitution.is_some() {
                            return Err(ParseError::DuplicateDeclaration {
                                declaration: "constitution",
                                position: spanned.position,
                            });
                        }
                        self.advance();
                        let tag = self.expect_text("constitutional tag")?;
                        validate_constitution_tag(&tag)?;
                        constitution = Some(tag);
                    }
                    "default" => {
                        if default_verdict.is_some() {
                            return Err(ParseError::DuplicateDeclaration {
                                declaration: "default",
                                position: spanned.position,
                            });
                        }
                        self.advance();
                        default_verdict = Some(self.expect_verdict()?);
                    }
                    "allow" | "deny" | "require_review" => {
                        if clauses.len() >= MAX_CLAUSES {
                            return Err(ParseError::TooManyClauses {
                                max: MAX_CLAUSES,
                                actual: clauses.len() + 1,
                            });
                        }
                        clauses.push(self.parse_clause()?);
                    }
                    other => {
                        return Err(ParseError::UnexpectedToken {
                            expected: "declaration or clause verdict",
                            found: other.to_string(),
                            position: spanned.position,
                        });
                    }
                },
                Token::RBrace => {
                    return Err(ParseError::UnbalancedBrace {
                        position: spanned.position,
                    });
                }
                other => {
                    return Err(ParseError::UnexpectedToken {
                        expected: "declaration or clause verdict",
                        found: other.describe(),
                        position: spanned.position,
                    });
                }
            }
        }

        let package = package.ok_or(ParseError::MissingPackage)?;
        let constitution = constitution.ok_or(ParseError::MissingConstitution)?;
        let default_verdict = default_verdict.ok_or(ParseError::MissingDefault)?;
        if clauses.is_empty() {
            return Err(ParseError::NoClauses);
        }
        Ok(Rule {
            package,
            constitution,
            default_verdict,
            clauses,
        })
    }

    /// Parses one braced decision clause.
    fn parse_clause(&mut self) -> Result<Clause, ParseError> {
        let verdict = self.expect_verdict()?;
        let open = self.peek().clone();
        match open.token {
            Token::LBrace => self.advance(),
            ref other => {
                return Err(ParseError::UnexpectedToken {
                    expected: "{",
                    found: other.describe(),
                    position: open.position,
                });
            }
        }

        let mut conditions = Vec::new();
        loop {
            let spanned = self.peek().clone();
            match &spanned.token {
                Token::RBrace => {
                    self.advance();
                    break;
                }
                Token::Eof => {
                    return Err(ParseError::UnbalancedBrace {
                        position: spanned.position,
                    });
                }
                _ => {
                    if conditions.len() >= MAX_CONDITIONS_PER_CLAUSE {
                        return Err(ParseError::TooManyConditions {
                            max: MAX_CONDITIONS_PER_CLAUSE,
                            actual: conditions.len() + 1,
                        });
                    }
                    conditions.push(self.parse_condition()?);
                }
            }
        }

        if conditions.is_empty() {
            return Err(ParseError::EmptyClause {
                position: open.position,
            });
        }
        Ok(Clause {
            verdict,
            conditions,
        })
    }

    /// Parses one condition inside a clause body.
    fn parse_condition(&mut self) -> Result<Condition, ParseError> {
        let mut negated = false;
        if let Token::Ident(word) = &self.peek().token
            && word == "not"
        {
            negated = true;
            self.advance();
        }

        let attribute = self.expect_ident("attribute path")?;
        let spanned = self.peek().clone();
        match &spanned.token {
            Token::Cmp(cmp) => {
                let comparator = *cmp;
                self.advance();
                let operand = self.parse_literal()?;
                Ok(Condition {
                    attribute,
                    comparator,
                    operand: Some(operand),
                    negated,
                })
            }
            Token::Ident(word) => match word.as_str() {
                "in" => {
                    self.advance();
                    let operand = self.parse_list()?;
                    Ok(Condition {
                        attribute,
                        comparator: Comparator::InSet,
                        operand: Some(operand),
                        negated,
                    })
                }
                "contains" => {
                    self.advance();
                    let operand = self.parse_literal()?;
                    Ok(Condition {
                        attribute,
                        comparator: Comparator::Contains,
                        operand: Some(operand),
                        negated,
                    })
                }
                "exists" => {
                    self.advance();
                    Ok(Condition {
                        attribute,
                        comparator: Comparator::Exists,
                        operand: None,
                        negated,
                    })
                }
                other => Err(ParseError::UnexpectedToken {
                    expected: "comparator, `in`, `contains`, or `exists`",
                    found: other.to_string(),
                    position: spanned.position,
                }),
            },
            other => Err(ParseError::UnexpectedToken {
                expected: "comparator, `in`, `contains`, or `exists`",
                found: other.describe(),
                position: spanned.position,
            }),
        }
    }

    /// Parses a scalar literal (string, number, or bool).
    fn parse_literal(&mut self) -> Result<Literal, ParseError> {
        let spanned = self.peek().clone();
        match &spanned.token {
            Token::Text(value) => {
                let value = value.clone();
                self.advance();
                Ok(Literal::Text {
                    value,
                })
            }
            Token::Number(value) => {
                let value = *value;
                self.advance();
                Ok(Literal::Number {
                    value,
                })
            }
            Token::Ident(word) if word == "true" => {
                self.advance();
                Ok(Literal::Bool {
                    value: true,
                })
            }
            Token::Ident(word) if word == "false" => {
                self.advance();
                Ok(Literal::Bool {
                    value: false,
                })
            }
            Token::LBracket => self.parse_list(),
            other => Err(ParseError::UnexpectedToken {
                expected: "literal",
                found: other.describe(),
                position: spanned.position,
            }),
        }
    }

    /// Parses a bracketed list literal.
    fn parse_list(&mut self) -> Result<Literal, ParseError> {
        let open = self.peek().clone();
        match open.token {
            Token::LBracket => self.advance(),
            ref other => {
                return Err(ParseError::UnexpectedToken {
                    expected: "[",
                    found: other.describe(),
                    position: open.position,
                });
            }
        }
        let mut items = Vec::new();
        loop {
            let spanned = self.peek().clone();
            match &spanned.token {
                Token::RBracket => {
                    self.advance();
                    break;
                }
                Token::Comma => self.advance(),
                Token::Eof => {
                    return Err(ParseError::UnexpectedToken {
                        expected: "]",
                        found: "end of input".to_string(),
                        position: spanned.position,
                    });
                }
                _ => {
                    if items.len() >= MAX_LIST_ITEMS {
                        return Err(ParseError::TooManyListItems {
                            max: MAX_LIST_ITEMS,
                            actual: items.len() + 1,
                        });
                    }
                    items.push(self.parse_literal()?);
                }
            }
        }
        Ok(Literal::List {
            items,
        })
    }

    /// Expects an identifier token and returns its text.
    fn expect_ident(&mut self, expected: &'static str) -> Result<String, ParseError> {
        let spanned = self.peek().clone();
        match &spanned.token {
            Token::Ident(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            other => Err(ParseError::UnexpectedToken {
                expected,
                found: other.describe(),
                position: spanned.position,
            }),
        }
    }

    /// Expects a string literal token and returns its contents.
    fn expect_text(&mut self, expected: &'static str) -> Result<String, ParseError> {
        let spanned = self.peek().clone();
        match &spanned.token {
            Token::Text(value) => {
                let value = value.clone();
                self.advance();
                Ok(value)
            }
            other => Err(ParseError::UnexpectedToken {
                expected,
                found: other.describe(),
                position: spanned.position,
            }),
        }
    }

    /// Expects a verdict keyword.
    fn expect_verdict(&mut self) -> Result<Verdict, ParseError> {
        let spanned = self.peek().clone();
        match &spanned.token {
            Token::Ident(word) => {
                let verdict = match word.as_str() {
                    "allow" => Verdict::Allow,
                    "deny" => Verdict::Deny,
                    "require_review" => Verdict::RequireReview,
                    other => {
                        return Err(ParseError::UnexpectedToken {
                            expected: "verdict (allow, deny, require_review)",
                            found: other.to_string(),
                            position: spanned.position,
                        });
                    }
                };
                self.advance();
                Ok(verdict)
            }
            other => Err(ParseError::UnexpectedToken {
                expected: "verdict (allow, deny, require_review)",
                found: other.describe(),
                position: spanned.position,
            }),
        }
    }

    /// Returns the current token without advancing.
    fn peek(&self) -> &SpannedToken {
        self.tokens.get(self.cursor).unwrap_or(&self.eof)
    }

    /// Advances past the current token.
    fn advance(&mut self) {
        if self.cursor < self.tokens.len().saturating_sub(1) {
            self.cursor += 1;
        }
    }
}

// ============================================================================
// SECTION: Validation Helpers
// ============================================================================

/// Validates the shape of a constitutional tag (16 lowercase hex characters).
fn validate_constitution_tag(tag: &str) -> Result<(), ParseError> {
    let valid = tag.len() == CONSTITUTION_TAG_LEN
        && tag.bytes().all(|b| b.is_ascii_digit() || (b'a' ..= b'f').contains(&b));
    if valid {
        Ok(())
    } else {
        Err(ParseError::InvalidConstitutionTag {
            raw: tag.to_string(),
        })
    }
}
