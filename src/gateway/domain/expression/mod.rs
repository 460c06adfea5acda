//! Restricted expression language for parameter mappings and conditions.
//!
//! Expressions are parsed once, when a binding is composed, into a tagged
//! syntax tree. Evaluation only reads the execution context; there is no
//! assignment, looping or host access. Conditions are further limited to
//! boolean and comparison logic over context fields.

mod ast;
mod eval;
mod parser;

pub use ast::Reference;

use ast::Node;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Parse-time failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExpressionError {
    /// The source is blank.
    #[error("expression is empty")]
    Empty,
    /// The source exceeds the length limit.
    #[error("expression exceeds {max} bytes")]
    TooLong {
        /// Byte limit.
        max: usize,
    },
    /// A character outside the grammar.
    #[error("unexpected character '{found}' at {position}")]
    UnexpectedCharacter {
        /// Byte offset.
        position: usize,
        /// Offending character.
        found: char,
    },
    /// A string literal is not closed or has a bad escape.
    #[error("unterminated or malformed string starting at {position}")]
    UnterminatedString {
        /// Byte offset.
        position: usize,
    },
    /// A numeric literal or index is malformed.
    #[error("invalid number '{text}' at {position}")]
    InvalidNumber {
        /// Byte offset.
        position: usize,
        /// Offending text.
        text: String,
    },
    /// A token appears where the grammar does not allow it.
    #[error("unexpected {found} at {position}, expected {expected}")]
    UnexpectedToken {
        /// Byte offset.
        position: usize,
        /// Offending token.
        found: String,
        /// What the grammar expected.
        expected: String,
    },
    /// The source ends early.
    #[error("unexpected end of expression, expected {expected}")]
    UnexpectedEnd {
        /// What the grammar expected.
        expected: String,
    },
    /// A call names a function outside the closed set.
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
    /// A call has the wrong number of arguments.
    #[error("function '{function}' does not accept {found} argument(s)")]
    Arity {
        /// Function name.
        function: String,
        /// Supplied argument count.
        found: usize,
    },
    /// `exists` was given something other than a path.
    #[error("exists() at {position} requires a field path")]
    ExistsRequiresPath {
        /// Byte offset.
        position: usize,
    },
    /// `template` was given something other than a string literal.
    #[error("template() at {position} requires a string literal")]
    TemplateRequiresLiteral {
        /// Byte offset.
        position: usize,
    },
    /// The template failed to compile.
    #[error("invalid template: {0}")]
    Template(String),
    /// Parentheses or calls nest too deeply.
    #[error("expression nests deeper than {max} levels")]
    NestingTooDeep {
        /// Depth limit.
        max: usize,
    },
    /// A condition uses a value-transforming function.
    #[error("function '{0}' is not allowed in conditions")]
    NotAllowedInCondition(String),
}

/// Run-time failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EvaluationError {
    /// A referenced path does not resolve.
    #[error("missing field '{0}'")]
    MissingField(String),
    /// An operand has the wrong JSON type.
    #[error("{operation} expects {expected}, found {found}")]
    TypeMismatch {
        /// Operator or function.
        operation: String,
        /// Expected types.
        expected: String,
        /// Actual types.
        found: String,
    },
    /// Template rendering failed.
    #[error("template rendering failed: {0}")]
    Template(String),
}

/// Parsed expression together with its source text.
///
/// Serializes as the source string and re-parses on deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Expression {
    source: String,
    root: Node,
}

impl Expression {
    /// Parses a mapping expression.
    ///
    /// # Errors
    ///
    /// Returns [`ExpressionError`] when the source violates the grammar.
    pub fn parse(source: &str) -> Result<Self, ExpressionError> {
        let root = parser::parse(source)?;
        Ok(Self {
            source: source.trim().to_owned(),
            root,
        })
    }

    /// Parses a condition, rejecting value-transforming functions.
    ///
    /// # Errors
    ///
    /// Returns [`ExpressionError::NotAllowedInCondition`] for `concat`,
    /// `lower`, `upper` or `template`, and grammar errors otherwise.
    pub fn parse_condition(source: &str) -> Result<Self, ExpressionError> {
        let expression = Self::parse(source)?;
        if let Some(function) = expression.root.first_disallowed_in_condition() {
            return Err(ExpressionError::NotAllowedInCondition(
                function.name().to_owned(),
            ));
        }
        Ok(expression)
    }

    /// Returns the normalized source text.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Returns every root-level name the expression reads.
    #[must_use]
    pub fn references(&self) -> Vec<Reference> {
        let mut references = Vec::new();
        self.root.collect_references(&mut references);
        references.sort();
        references.dedup();
        references
    }

    /// Evaluates the expression as a parameter mapping.
    ///
    /// # Errors
    ///
    /// Returns [`EvaluationError::MissingField`] when a referenced path does
    /// not resolve, outside of `exists`, `coalesce` and `default`.
    pub fn evaluate(&self, context: &Value) -> Result<Value, EvaluationError> {
        eval::evaluate(&self.root, context, eval::Mode::Strict)
    }

    /// Evaluates the expression as a condition.
    ///
    /// Missing paths read as `null`; the result is coerced by JSON
    /// truthiness.
    ///
    /// # Errors
    ///
    /// Returns [`EvaluationError::TypeMismatch`] when an ordering comparison
    /// mixes incompatible types.
    pub fn evaluate_condition(&self, context: &Value) -> Result<bool, EvaluationError> {
        eval::evaluate(&self.root, context, eval::Mode::Lenient).map(|value| eval::truthy(&value))
    }
}

impl TryFrom<String> for Expression {
    type Error = ExpressionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Expression> for String {
    fn from(value: Expression) -> Self {
        value.source
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
