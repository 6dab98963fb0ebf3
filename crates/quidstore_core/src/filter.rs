//! Query filters.
//!
//! Filters are written as JSON objects in a MongoDB-style dialect and
//! compiled into a [`Filter`] before evaluation:
//!
//! ```json
//! { "serverId": "123", "hp": { "$gt": 0 }, "$or": [{ "rank": "Elderly" }, { "rank": "Hunter" }] }
//! ```
//!
//! | Key | Meaning |
//! |-----|---------|
//! | `field` | literal: equal to the field; object: nested filter on the field |
//! | `a.b` | dotted path into nested objects and arrays |
//! | `$or` / `$and` | any / all of the listed filters or literals |
//! | `$in` / `$nin` | value equals / equals none of the listed literals or filters |
//! | `$gt` `$gte` `$lt` `$lte` | ordered comparison of numbers or strings |
//! | `$ne` | present and not equal |
//! | `$exists` | presence test |
//!
//! A missing field matches no literal and no operator except
//! `{"$exists": false}`.

use crate::document::{exact_integer, json_eq, map_eq, step, Document, ValueKind};
use crate::error::{CoreError, CoreResult};
use serde_json::{Map, Value};
use std::cmp::Ordering;

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    /// `$gt`
    Gt,
    /// `$gte`
    Gte,
    /// `$lt`
    Lt,
    /// `$lte`
    Lte,
}

impl Comparison {
    fn holds(self, ordering: Ordering) -> bool {
        match self {
            Self::Gt => ordering == Ordering::Greater,
            Self::Gte => ordering != Ordering::Less,
            Self::Lt => ordering == Ordering::Less,
            Self::Lte => ordering != Ordering::Greater,
        }
    }
}

/// A compiled predicate, evaluated against an optional value.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// All predicates hold. An empty list requires the value to exist.
    And(Vec<Predicate>),
    /// At least one predicate holds.
    Or(Vec<Predicate>),
    /// No predicate holds; the value must exist.
    NoneOf(Vec<Predicate>),
    /// The value at `path` satisfies the inner predicate.
    Field {
        /// Path segments below the current value.
        path: Vec<String>,
        /// Predicate applied to the value found there.
        predicate: Box<Predicate>,
    },
    /// Equal to the literal.
    Eq(Value),
    /// Present and not equal to the literal.
    Ne(Value),
    /// Ordered comparison.
    Compare(Comparison, Value),
    /// Presence test.
    Exists(bool),
}

impl Predicate {
    /// Evaluates the predicate against `value` (`None` = missing).
    #[must_use]
    pub fn eval(&self, value: Option<&Value>) -> bool {
        match self {
            Self::And(children) if children.is_empty() => value.is_some(),
            Self::And(children) => children.iter().all(|p| p.eval(value)),
            Self::Or(children) => value.is_some() && children.iter().any(|p| p.eval(value)),
            Self::NoneOf(children) => value.is_some() && !children.iter().any(|p| p.eval(value)),
            Self::Field { path, predicate } => {
                let target = value.and_then(|v| {
                    path.iter()
                        .try_fold(v, |current, segment| step(current, segment))
                });
                predicate.eval(target)
            }
            Self::Eq(literal) => value.is_some_and(|v| json_eq(v, literal)),
            Self::Ne(literal) => value.is_some_and(|v| !json_eq(v, literal)),
            Self::Compare(op, operand) => value
                .and_then(|v| compare(v, operand))
                .is_some_and(|ordering| op.holds(ordering)),
            Self::Exists(expected) => value.is_some() == *expected,
        }
    }
}

fn compare(value: &Value, operand: &Value) -> Option<Ordering> {
    match (value, operand) {
        (Value::Number(a), Value::Number(b)) => match (exact_integer(a), exact_integer(b)) {
            (Some(a), Some(b)) => Some(a.cmp(&b)),
            _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
        },
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// A compiled document filter.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    root: Predicate,
}

impl Filter {
    /// A filter matching every document.
    #[must_use]
    pub fn all() -> Self {
        Self {
            root: Predicate::And(Vec::new()),
        }
    }

    /// A filter matching documents whose top-level `field` equals `value`.
    #[must_use]
    pub fn eq(field: impl Into<String>, value: Value) -> Self {
        Self {
            root: Predicate::And(vec![Predicate::Field {
                path: vec![field.into()],
                predicate: Box::new(Predicate::Eq(value)),
            }]),
        }
    }

    /// Compiles a JSON filter.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFilter` if the filter is not an object, uses an
    /// unknown operator, or gives an operator a malformed operand.
    pub fn parse(raw: &Value) -> CoreResult<Self> {
        let map = raw
            .as_object()
            .ok_or_else(|| CoreError::invalid_filter("filter must be a JSON object"))?;
        Ok(Self {
            root: parse_object(map)?,
        })
    }

    /// Returns the compiled predicate.
    #[must_use]
    pub fn predicate(&self) -> &Predicate {
        &self.root
    }

    /// Returns `true` if the document satisfies the filter.
    #[must_use]
    pub fn matches(&self, document: &Document) -> bool {
        self.root.eval_map(document.as_map())
    }

    /// Returns the literal a top-level field must equal, if the filter
    /// requires one.
    ///
    /// Used to narrow candidates through the id and field indexes.
    #[must_use]
    pub fn required_equality(&self, field: &str) -> Option<&Value> {
        let Predicate::And(children) = &self.root else {
            return None;
        };
        children.iter().find_map(|child| match child {
            Predicate::Field { path, predicate } if path.len() == 1 && path[0] == field => {
                match predicate.as_ref() {
                    Predicate::Eq(value) => Some(value),
                    _ => None,
                }
            }
            _ => None,
        })
    }
}

impl Predicate {
    // Same semantics as `eval`, applied to the document root.
    fn eval_map(&self, map: &Map<String, Value>) -> bool {
        match self {
            Self::And(children) => children.iter().all(|p| p.eval_map(map)),
            Self::Or(children) => children.iter().any(|p| p.eval_map(map)),
            Self::NoneOf(children) => !children.iter().any(|p| p.eval_map(map)),
            Self::Field { path, predicate } => {
                let mut segments = path.iter();
                let target = segments.next().and_then(|first| {
                    segments.try_fold(map.get(first)?, |current, segment| step(current, segment))
                });
                predicate.eval(target)
            }
            Self::Eq(literal) => literal.as_object().is_some_and(|other| map_eq(map, other)),
            Self::Ne(literal) => !literal.as_object().is_some_and(|other| map_eq(map, other)),
            Self::Compare(..) => false,
            Self::Exists(expected) => *expected,
        }
    }
}

impl TryFrom<&Value> for Filter {
    type Error = CoreError;

    fn try_from(raw: &Value) -> CoreResult<Self> {
        Self::parse(raw)
    }
}

fn parse_object(map: &Map<String, Value>) -> CoreResult<Predicate> {
    let mut children = Vec::with_capacity(map.len());
    for (key, value) in map {
        children.push(parse_entry(key, value)?);
    }
    Ok(Predicate::And(children))
}

fn parse_entry(key: &str, value: &Value) -> CoreResult<Predicate> {
    if let Some(op) = key.strip_prefix('$') {
        return parse_operator(op, value);
    }
    if key.is_empty() || key.split('.').any(str::is_empty) {
        return Err(CoreError::invalid_filter(format!("invalid field path '{key}'")));
    }
    let predicate = match value {
        Value::Object(nested) => parse_object(nested)?,
        literal => Predicate::Eq(literal.clone()),
    };
    Ok(Predicate::Field {
        path: key.split('.').map(str::to_string).collect(),
        predicate: Box::new(predicate),
    })
}

fn parse_operator(op: &str, operand: &Value) -> CoreResult<Predicate> {
    match op {
        "or" => Ok(Predicate::Or(parse_list(op, operand)?)),
        "and" => Ok(Predicate::And(parse_list(op, operand)?)),
        "in" => Ok(Predicate::Or(parse_list(op, operand)?)),
        "nin" => Ok(Predicate::NoneOf(parse_list(op, operand)?)),
        "ne" => Ok(Predicate::Ne(operand.clone())),
        "gt" | "gte" | "lt" | "lte" => {
            let comparison = match op {
                "gt" => Comparison::Gt,
                "gte" => Comparison::Gte,
                "lt" => Comparison::Lt,
                _ => Comparison::Lte,
            };
            match operand {
                Value::Number(_) | Value::String(_) => {
                    Ok(Predicate::Compare(comparison, operand.clone()))
                }
                other => Err(CoreError::invalid_filter(format!(
                    "${op} needs a number or string operand, found {}",
                    ValueKind::of(other)
                ))),
            }
        }
        "exists" => match operand {
            Value::Bool(b) => Ok(Predicate::Exists(*b)),
            other => Err(CoreError::invalid_filter(format!(
                "$exists needs a boolean operand, found {}",
                ValueKind::of(other)
            ))),
        },
        _ => Err(CoreError::invalid_filter(format!("unknown operator ${op}"))),
    }
}

fn parse_list(op: &str, operand: &Value) -> CoreResult<Vec<Predicate>> {
    let items = operand.as_array().ok_or_else(|| {
        CoreError::invalid_filter(format!(
            "${op} needs an array operand, found {}",
            ValueKind::of(operand)
        ))
    })?;
    items
        .iter()
        .map(|item| match item {
            Value::Object(nested) => parse_object(nested),
            literal => Ok(Predicate::Eq(literal.clone())),
        })
        .collect()
}
