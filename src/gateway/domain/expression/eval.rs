//! Evaluation of parsed expressions against an execution context.

use super::{
    EvaluationError,
    ast::{BinaryOp, Function, Node},
};
use serde_json::Value;
use std::cmp::Ordering;

/// How missing paths are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Mode {
    /// Missing paths are evaluation errors.
    Strict,
    /// Missing paths evaluate to `null`.
    Lenient,
}

pub(super) fn evaluate(node: &Node, context: &Value, mode: Mode) -> Result<Value, EvaluationError> {
    match node {
        Node::Literal(value) => Ok(value.clone()),
        Node::Path(path) => match (path.resolve(context), mode) {
            (Some(value), _) => Ok(value.clone()),
            (None, Mode::Lenient) => Ok(Value::Null),
            (None, Mode::Strict) => Err(EvaluationError::MissingField(path.to_string())),
        },
        Node::Call { function, args } => call(*function, args, context, mode),
        Node::Template { template, .. } => template
            .render(context, mode)
            .map(Value::String)
            .map_err(|err| EvaluationError::Template(err.to_string())),
        Node::Not(inner) => Ok(Value::Bool(!truthy(&evaluate(inner, context, mode)?))),
        Node::Binary { op, left, right } => binary(*op, left, right, context, mode),
    }
}

/// JSON truthiness: `null`, `false`, zero and empty values are false.
pub(super) fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(members) => !members.is_empty(),
    }
}

fn call(
    function: Function,
    args: &[Node],
    context: &Value,
    mode: Mode,
) -> Result<Value, EvaluationError> {
    match function {
        Function::Exists => Ok(Value::Bool(args.iter().all(|arg| {
            matches!(arg, Node::Path(path) if path.resolve(context).is_some_and(|v| !v.is_null()))
        }))),
        Function::Coalesce => {
            for arg in args {
                let value = evaluate(arg, context, Mode::Lenient)?;
                if !value.is_null() {
                    return Ok(value);
                }
            }
            Ok(Value::Null)
        }
        Function::Default => {
            let mut operands = args.iter();
            let primary = match operands.next() {
                Some(node) => evaluate(node, context, Mode::Lenient)?,
                None => Value::Null,
            };
            if !primary.is_null() {
                return Ok(primary);
            }
            operands
                .next()
                .map_or(Ok(Value::Null), |fallback| evaluate(fallback, context, mode))
        }
        Function::Concat => {
            let mut joined = String::new();
            for arg in args {
                match evaluate(arg, context, mode)? {
                    Value::Null => {}
                    Value::String(text) => joined.push_str(&text),
                    other => joined.push_str(&other.to_string()),
                }
            }
            Ok(Value::String(joined))
        }
        Function::Lower | Function::Upper => {
            let value = single(args, context, mode)?;
            let Value::String(text) = value else {
                return Err(mismatch(function.name(), "string", &value));
            };
            Ok(Value::String(if function == Function::Lower {
                text.to_lowercase()
            } else {
                text.to_uppercase()
            }))
        }
        Function::Len => {
            let value = single(args, context, mode)?;
            match &value {
                Value::String(text) => Ok(Value::from(text.chars().count())),
                Value::Array(items) => Ok(Value::from(items.len())),
                Value::Object(members) => Ok(Value::from(members.len())),
                _ => Err(mismatch("len", "string, array or object", &value)),
            }
        }
        Function::Template => Err(EvaluationError::Template(
            "template calls are compiled at parse time".to_owned(),
        )),
    }
}

fn single(args: &[Node], context: &Value, mode: Mode) -> Result<Value, EvaluationError> {
    args.first()
        .map_or(Ok(Value::Null), |arg| evaluate(arg, context, mode))
}

fn binary(
    op: BinaryOp,
    left: &Node,
    right: &Node,
    context: &Value,
    mode: Mode,
) -> Result<Value, EvaluationError> {
    match op {
        BinaryOp::And => {
            if !truthy(&evaluate(left, context, mode)?) {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(truthy(&evaluate(right, context, mode)?)))
        }
        BinaryOp::Or => {
            if truthy(&evaluate(left, context, mode)?) {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(truthy(&evaluate(right, context, mode)?)))
        }
        BinaryOp::Eq | BinaryOp::Ne => {
            let equal = values_equal(
                &evaluate(left, context, mode)?,
                &evaluate(right, context, mode)?,
            );
            Ok(Value::Bool(equal == (op == BinaryOp::Eq)))
        }
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let lhs = evaluate(left, context, mode)?;
            let rhs = evaluate(right, context, mode)?;
            let ordering = compare(op, &lhs, &rhs)?;
            Ok(Value::Bool(match op {
                BinaryOp::Lt => ordering == Ordering::Less,
                BinaryOp::Le => ordering != Ordering::Greater,
                BinaryOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            }))
        }
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x.partial_cmp(&y) == Some(Ordering::Equal),
            _ => a == b,
        },
        _ => left == right,
    }
}

fn compare(op: BinaryOp, left: &Value, right: &Value) -> Result<Ordering, EvaluationError> {
    let ordering = match (left, right) {
        (Value::Number(a), Value::Number(b)) => a
            .as_f64()
            .zip(b.as_f64())
            .and_then(|(x, y)| x.partial_cmp(&y)),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    };
    ordering.ok_or_else(|| EvaluationError::TypeMismatch {
        operation: op.symbol().to_owned(),
        expected: "two numbers or two strings".to_owned(),
        found: format!("{} and {}", json_type(left), json_type(right)),
    })
}

fn mismatch(operation: &str, expected: &str, found: &Value) -> EvaluationError {
    EvaluationError::TypeMismatch {
        operation: operation.to_owned(),
        expected: expected.to_owned(),
        found: json_type(found).to_owned(),
    }
}

const fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
