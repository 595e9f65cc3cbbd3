//! Condition evaluator.
//!
//! Conditions are evaluated against a JSON context. Qualified names walk
//! nested objects (`user.department` reads `context["user"]["department"]`),
//! falling back to a flat key holding the whole dotted name. Numbers are
//! exact decimals. An error means the condition is unevaluable; the engine
//! treats that as not satisfied on ALLOW rules and as satisfied on DENY rules.

use rpl_core::ast::{ArithOp, CompareOp, Condition, Expr, Value};
use rust_decimal::Decimal;
use std::cmp::Ordering;
use std::str::FromStr;

pub type Context = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConditionError {
    #[error("unresolved name '{0}'")]
    UnresolvedName(String),
    #[error("cannot compare {left} with {right}")]
    TypeMismatch {
        left: &'static str,
        right: &'static str,
    },
    #[error("operator '{op}' is not defined for {operand}")]
    UnsupportedOperator {
        op: &'static str,
        operand: &'static str,
    },
    #[error("invalid number '{0}'")]
    InvalidNumber(String),
    #[error("division by zero")]
    DivisionByZero,
    #[error("numeric overflow")]
    Overflow,
}

/// Runtime operand.
#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Null,
    Bool(bool),
    Number(Decimal),
    Str(String),
    List(Vec<Operand>),
    Object,
}

impl Operand {
    fn type_name(&self) -> &'static str {
        match self {
            Operand::Null => "null",
            Operand::Bool(_) => "boolean",
            Operand::Number(_) => "number",
            Operand::Str(_) => "string",
            Operand::List(_) => "list",
            Operand::Object => "object",
        }
    }

    fn from_json(value: &serde_json::Value) -> Result<Operand, ConditionError> {
        Ok(match value {
            serde_json::Value::Null => Operand::Null,
            serde_json::Value::Bool(b) => Operand::Bool(*b),
            serde_json::Value::Number(n) => Operand::Number(parse_decimal(&n.to_string())?),
            serde_json::Value::String(s) => Operand::Str(s.clone()),
            serde_json::Value::Array(items) => Operand::List(
                items
                    .iter()
                    .map(Operand::from_json)
                    .collect::<Result<_, _>>()?,
            ),
            serde_json::Value::Object(_) => Operand::Object,
        })
    }

    /// Bare identifiers in value positions are strings.
    fn from_literal(value: &Value) -> Result<Operand, ConditionError> {
        Ok(match value {
            Value::Str(s) | Value::Ident(s) => Operand::Str(s.clone()),
            Value::Char(c) => Operand::Str(c.to_string()),
            Value::Int(text) | Value::Real(text) => Operand::Number(parse_decimal(text)?),
            Value::Bool(b) => Operand::Bool(*b),
            Value::List(items) => Operand::List(
                items
                    .iter()
                    .map(Operand::from_literal)
                    .collect::<Result<_, _>>()?,
            ),
        })
    }
}

fn parse_decimal(text: &str) -> Result<Decimal, ConditionError> {
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .map_err(|_| ConditionError::InvalidNumber(text.to_owned()))
}

/// Evaluate `condition` against `context`.
pub fn evaluate_condition(condition: &Condition, context: &Context) -> Result<bool, ConditionError> {
    match condition {
        Condition::Or { left, right } => {
            if evaluate_condition(left, context)? {
                return Ok(true);
            }
            evaluate_condition(right, context)
        }
        Condition::And { left, right } => {
            if !evaluate_condition(left, context)? {
                return Ok(false);
            }
            evaluate_condition(right, context)
        }
        Condition::Not { operand } => Ok(!evaluate_condition(operand, context)?),
        Condition::Compare { left, op, right } => {
            let l = eval_expr(left, context)?;
            let r = eval_expr(right, context)?;
            compare(&l, *op, &r)
        }
        Condition::In { expr, values } => {
            let needle = eval_expr(expr, context)?;
            for value in values {
                if loosely_equal(&needle, &Operand::from_literal(value)?) {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Condition::Contains { expr, value } => {
            let haystack = eval_expr(expr, context)?;
            let needle = Operand::from_literal(value)?;
            match (&haystack, &needle) {
                (Operand::List(items), _) => Ok(items.iter().any(|i| loosely_equal(i, &needle))),
                (Operand::Str(h), Operand::Str(n)) => Ok(h.contains(n.as_str())),
                _ => Err(ConditionError::UnsupportedOperator {
                    op: "CONTAINS",
                    operand: haystack.type_name(),
                }),
            }
        }
    }
}

fn eval_expr(expr: &Expr, context: &Context) -> Result<Operand, ConditionError> {
    match expr {
        Expr::Literal { value } => Operand::from_literal(value),
        Expr::Name { path } => resolve_name(path, context),
        Expr::Unary { negate, operand } => match eval_expr(operand, context)? {
            Operand::Number(n) if *negate => Ok(Operand::Number(-n)),
            Operand::Number(n) => Ok(Operand::Number(n)),
            other => Err(ConditionError::UnsupportedOperator {
                op: if *negate { "-" } else { "+" },
                operand: other.type_name(),
            }),
        },
        Expr::Binary { op, left, right } => {
            let l = eval_expr(left, context)?;
            let r = eval_expr(right, context)?;
            let (Operand::Number(a), Operand::Number(b)) = (&l, &r) else {
                let operand = if matches!(l, Operand::Number(_)) { &r } else { &l };
                return Err(ConditionError::UnsupportedOperator {
                    op: op.symbol(),
                    operand: operand.type_name(),
                });
            };
            let result = match op {
                ArithOp::Add => a.checked_add(*b),
                ArithOp::Sub => a.checked_sub(*b),
                ArithOp::Mul => a.checked_mul(*b),
                ArithOp::Div => {
                    if b.is_zero() {
                        return Err(ConditionError::DivisionByZero);
                    }
                    a.checked_div(*b)
                }
            };
            result.map(Operand::Number).ok_or(ConditionError::Overflow)
        }
    }
}

fn resolve_name(path: &[String], context: &Context) -> Result<Operand, ConditionError> {
    let dotted = path.join(".");
    let mut segments = path.iter();
    let nested = segments
        .next()
        .and_then(|first| context.get(first))
        .and_then(|root| {
            segments.try_fold(root, |current, segment| current.as_object()?.get(segment))
        });
    match nested.or_else(|| context.get(&dotted)) {
        Some(value) => Operand::from_json(value),
        None => Err(ConditionError::UnresolvedName(dotted)),
    }
}

fn compare(left: &Operand, op: CompareOp, right: &Operand) -> Result<bool, ConditionError> {
    let ordering = match (left, right) {
        (Operand::Number(a), Operand::Number(b)) => a.cmp(b),
        (Operand::Str(a), Operand::Str(b)) => a.cmp(b),
        (Operand::Bool(a), Operand::Bool(b)) => {
            return equality(op, a == b);
        }
        (Operand::Null, Operand::Null) => return equality(op, true),
        (Operand::List(_), Operand::List(_)) => return equality(op, loosely_equal(left, right)),
        _ => {
            return Err(ConditionError::TypeMismatch {
                left: left.type_name(),
                right: right.type_name(),
            })
        }
    };
    Ok(match op {
        CompareOp::Eq => ordering == Ordering::Equal,
        CompareOp::Neq => ordering != Ordering::Equal,
        CompareOp::Lt => ordering == Ordering::Less,
        CompareOp::Gt => ordering == Ordering::Greater,
        CompareOp::Lte => ordering != Ordering::Greater,
        CompareOp::Gte => ordering != Ordering::Less,
    })
}

/// `==` and `!=` only; ordering operators are undefined here.
fn equality(op: CompareOp, equal: bool) -> Result<bool, ConditionError> {
    match op {
        CompareOp::Eq => Ok(equal),
        CompareOp::Neq => Ok(!equal),
        other => Err(ConditionError::UnsupportedOperator {
            op: other.symbol(),
            operand: "non-ordered values",
        }),
    }
}

/// Same-type equality; values of different types are never equal.
fn loosely_equal(a: &Operand, b: &Operand) -> bool {
    match (a, b) {
        (Operand::Number(x), Operand::Number(y)) => x == y,
        (Operand::List(xs), Operand::List(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| loosely_equal(x, y))
        }
        (Operand::Object, _) | (_, Operand::Object) => false,
        _ => a == b,
    }
}
