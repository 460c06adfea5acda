//! Tagged syntax tree for mapping and condition expressions.

use super::eval::Mode;
use minijinja::{Environment, UndefinedBehavior};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

const TEMPLATE_NAME: &str = "mapping";

/// One step of a field path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// Object member access.
    Key(String),
    /// Array element access.
    Index(usize),
}

/// Dotted/indexed path into the execution context, e.g. `geo.output.lat`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    root: String,
    rest: Vec<PathSegment>,
}

impl FieldPath {
    pub(super) const fn new(root: String, rest: Vec<PathSegment>) -> Self {
        Self { root, rest }
    }

    /// Returns the first path segment (`input` or a binding alias).
    #[must_use]
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Returns the segment after the root when it is a member name.
    #[must_use]
    pub fn first_field(&self) -> Option<&str> {
        match self.rest.first() {
            Some(PathSegment::Key(key)) => Some(key),
            Some(PathSegment::Index(_)) | None => None,
        }
    }

    /// Resolves the path against `context`.
    #[must_use]
    pub fn resolve<'ctx>(&self, context: &'ctx Value) -> Option<&'ctx Value> {
        let start = context.get(&self.root)?;
        self.rest
            .iter()
            .try_fold(start, |current, segment| match segment {
                PathSegment::Key(key) => current.get(key),
                PathSegment::Index(index) => current.get(*index),
            })
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.root)?;
        for segment in &self.rest {
            match segment {
                PathSegment::Key(key) => write!(f, ".{key}")?,
                PathSegment::Index(index) => write!(f, "[{index}]")?,
            }
        }
        Ok(())
    }
}

/// Closed set of callable functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Function {
    /// Concatenates the text form of every argument.
    Concat,
    /// Lowercases a string.
    Lower,
    /// Uppercases a string.
    Upper,
    /// First non-null argument.
    Coalesce,
    /// First argument, or the second when the first is missing or null.
    Default,
    /// Whether a path resolves to a non-null value.
    Exists,
    /// Length of a string, array or object.
    Len,
    /// Renders a `minijinja` template against the context.
    Template,
}

impl Function {
    pub(super) fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "concat" => Self::Concat,
            "lower" => Self::Lower,
            "upper" => Self::Upper,
            "coalesce" => Self::Coalesce,
            "default" => Self::Default,
            "exists" => Self::Exists,
            "len" => Self::Len,
            "template" => Self::Template,
            _ => return None,
        })
    }

    /// Returns the function's name in expression source.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Concat => "concat",
            Self::Lower => "lower",
            Self::Upper => "upper",
            Self::Coalesce => "coalesce",
            Self::Default => "default",
            Self::Exists => "exists",
            Self::Len => "len",
            Self::Template => "template",
        }
    }

    /// Returns whether the function may appear in a condition.
    #[must_use]
    pub const fn allowed_in_condition(self) -> bool {
        matches!(
            self,
            Self::Coalesce | Self::Default | Self::Exists | Self::Len
        )
    }

    /// Returns the accepted argument count range.
    pub(super) const fn arity(self) -> (usize, Option<usize>) {
        match self {
            Self::Concat | Self::Coalesce => (1, None),
            Self::Default => (2, Some(2)),
            Self::Lower | Self::Upper | Self::Exists | Self::Len | Self::Template => (1, Some(1)),
        }
    }
}

/// Boolean and comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `&&`
    And,
    /// `||`
    Or,
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl BinaryOp {
    /// Returns the operator's source symbol.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::And => "&&",
            Self::Or => "||",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }
}

/// Expression node.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Constant value.
    Literal(Value),
    /// Context lookup.
    Path(FieldPath),
    /// Function call.
    Call {
        /// Called function.
        function: Function,
        /// Arguments.
        args: Vec<Node>,
    },
    /// Template rendering; references are extracted at parse time.
    Template {
        /// Template compiled when the expression was parsed.
        template: CompiledTemplate,
        /// Dotted variable paths the template reads.
        variables: Vec<String>,
    },
    /// Logical negation.
    Not(Box<Node>),
    /// Binary operator application.
    Binary {
        /// Operator.
        op: BinaryOp,
        /// Left operand.
        left: Box<Node>,
        /// Right operand.
        right: Box<Node>,
    },
}

/// A `template(..)` argument compiled once, at parse time.
///
/// Undefined-variable handling is fixed per environment, so one environment
/// is kept for each evaluation mode. Clones share them.
#[derive(Clone)]
pub struct CompiledTemplate {
    source: String,
    strict: Arc<Environment<'static>>,
    lenient: Arc<Environment<'static>>,
}

impl CompiledTemplate {
    pub(super) fn compile(source: String) -> Result<Self, minijinja::Error> {
        let strict = template_environment(&source, UndefinedBehavior::Strict)?;
        let lenient = template_environment(&source, UndefinedBehavior::Lenient)?;
        Ok(Self {
            source,
            strict: Arc::new(strict),
            lenient: Arc::new(lenient),
        })
    }

    /// Dotted variable paths the template reads, sorted.
    pub(super) fn variables(&self) -> Result<Vec<String>, minijinja::Error> {
        let template = self.lenient.get_template(TEMPLATE_NAME)?;
        let mut variables: Vec<String> = template.undeclared_variables(true).into_iter().collect();
        variables.sort();
        Ok(variables)
    }

    pub(super) fn render(&self, context: &Value, mode: Mode) -> Result<String, minijinja::Error> {
        let environment = match mode {
            Mode::Strict => &self.strict,
            Mode::Lenient => &self.lenient,
        };
        environment.get_template(TEMPLATE_NAME)?.render(context)
    }
}

fn template_environment(
    source: &str,
    behavior: UndefinedBehavior,
) -> Result<Environment<'static>, minijinja::Error> {
    let mut environment = Environment::new();
    environment.set_undefined_behavior(behavior);
    environment.add_template_owned(TEMPLATE_NAME, source.to_owned())?;
    Ok(environment)
}

impl fmt::Debug for CompiledTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledTemplate")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

impl PartialEq for CompiledTemplate {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

/// Root-level name read by an expression.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Reference {
    /// `input` or a binding alias.
    pub root: String,
    /// Member read directly under the root, when known.
    pub field: Option<String>,
}

impl Node {
    pub(super) fn collect_references(&self, into: &mut Vec<Reference>) {
        match self {
            Self::Literal(_) => {}
            Self::Path(path) => into.push(Reference {
                root: path.root().to_owned(),
                field: path.first_field().map(str::to_owned),
            }),
            Self::Call { args, .. } => {
                for arg in args {
                    arg.collect_references(into);
                }
            }
            Self::Template { variables, .. } => {
                for variable in variables {
                    let mut parts = variable.split('.');
                    if let Some(root) = parts.next() {
                        into.push(Reference {
                            root: root.to_owned(),
                            field: parts.next().map(str::to_owned),
                        });
                    }
                }
            }
            Self::Not(inner) => inner.collect_references(into),
            Self::Binary { left, right, .. } => {
                left.collect_references(into);
                right.collect_references(into);
            }
        }
    }

    pub(super) fn first_disallowed_in_condition(&self) -> Option<Function> {
        match self {
            Self::Literal(_) | Self::Path(_) => None,
            Self::Template { .. } => Some(Function::Template),
            Self::Call { function, args } => {
                if function.allowed_in_condition() {
                    args.iter().find_map(Self::first_disallowed_in_condition)
                } else {
                    Some(*function)
                }
            }
            Self::Not(inner) => inner.first_disallowed_in_condition(),
            Self::Binary { left, right, .. } => left
                .first_disallowed_in_condition()
                .or_else(|| right.first_disallowed_in_condition()),
        }
    }
}
