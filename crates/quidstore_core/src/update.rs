//! Update interpreter.
//!
//! Updates are JSON objects with `$set` and `$inc` sections:
//!
//! ```json
//! { "$set": { "name": "Rex", "stats.level": 2 }, "$inc": { "hp": -30 } }
//! ```
//!
//! An update is applied to a copy of the document; any failure leaves the
//! original untouched.

use crate::document::{exact_integer, Document, ValueKind, UUID_FIELD};
use crate::error::{CoreError, CoreResult};
use crate::schema::{FieldSchema, FieldType, Schema, Shape};
use serde_json::{Map, Number, Value};

/// One update operation.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOp {
    /// Replace the value at `path`.
    Set {
        /// Dotted field path.
        path: String,
        /// The new value.
        value: Value,
    },
    /// Add `delta` to the number at `path`.
    Inc {
        /// Dotted field path.
        path: String,
        /// Amount to add.
        delta: Number,
    },
}

impl UpdateOp {
    /// Returns the dotted path the operation touches.
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Self::Set { path, .. } | Self::Inc { path, .. } => path,
        }
    }
}

/// A compiled update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateSpec {
    ops: Vec<UpdateOp>,
}

impl UpdateSpec {
    /// Creates an empty update.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a `$set` operation.
    #[must_use]
    pub fn set(mut self, path: impl Into<String>, value: Value) -> Self {
        self.ops.push(UpdateOp::Set {
            path: path.into(),
            value,
        });
        self
    }

    /// Adds an `$inc` operation.
    #[must_use]
    pub fn inc(mut self, path: impl Into<String>, delta: impl Into<Number>) -> Self {
        self.ops.push(UpdateOp::Inc {
            path: path.into(),
            delta: delta.into(),
        });
        self
    }

    /// Compiles a JSON update.
    ///
    /// # Errors
    ///
    /// Returns `InvalidUpdate` for operators other than `$set` and `$inc`,
    /// sections that are not objects, empty path segments, or non-numeric
    /// `$inc` amounts.
    pub fn parse(raw: &Value) -> CoreResult<Self> {
        let map = raw
            .as_object()
            .ok_or_else(|| CoreError::invalid_update("update must be a JSON object"))?;
        let mut ops = Vec::new();
        for (op, section) in map {
            let section = section.as_object().ok_or_else(|| {
                CoreError::invalid_update(format!("{op} needs an object, found {}", ValueKind::of(section)))
            })?;
            for (path, value) in section {
                validate_path(path)?;
                match op.as_str() {
                    "$set" => ops.push(UpdateOp::Set {
                        path: path.clone(),
                        value: value.clone(),
                    }),
                    "$inc" => match value {
                        Value::Number(delta) => ops.push(UpdateOp::Inc {
                            path: path.clone(),
                            delta: delta.clone(),
                        }),
                        other => {
                            return Err(CoreError::invalid_update(format!(
                                "$inc amount for '{path}' must be a number, found {}",
                                ValueKind::of(other)
                            )))
                        }
                    },
                    other => {
                        return Err(CoreError::invalid_update(format!(
                            "unsupported update operator '{other}'"
                        )))
                    }
                }
            }
        }
        Ok(Self { ops })
    }

    /// Returns the operations in application order.
    #[must_use]
    pub fn ops(&self) -> &[UpdateOp] {
        &self.ops
    }

    /// Returns `true` if the update has no operations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

impl TryFrom<&Value> for UpdateSpec {
    type Error = CoreError;

    fn try_from(raw: &Value) -> CoreResult<Self> {
        Self::parse(raw)
    }
}

fn validate_path(path: &str) -> CoreResult<()> {
    if path.is_empty() || path.split('.').any(str::is_empty) {
        return Err(CoreError::invalid_update(format!("invalid field path '{path}'")));
    }
    Ok(())
}

/// A field changed by an update.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    /// Dotted path of the field.
    pub path: String,
    /// Value before the update (`None` if the field was absent).
    pub old: Option<Value>,
    /// Value after the update.
    pub new: Value,
}

/// Result of applying an update.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateOutcome {
    /// The updated document.
    pub document: Document,
    /// Fields whose value actually changed, in application order.
    pub changes: Vec<FieldChange>,
}

/// Applies `spec` to a copy of `doc`.
///
/// # Errors
///
/// - `LockedField` if an operation touches a locked field or anything below it
/// - `UnknownField` if the field is absent and the schema does not declare it
/// - `LockedField` if a `$set` of a container rewrites a locked value inside it
/// - `FieldTypeMismatch` if `$set` changes the kind of a value or breaks the
///   field's nested schema, or `$inc` targets something other than a number
/// - `InvalidUpdate` if an increment overflows to a non-finite number
pub fn apply_update(doc: &Document, spec: &UpdateSpec, schema: &Schema) -> CoreResult<UpdateOutcome> {
    let mut next = doc.clone();
    let mut changes = Vec::new();

    for op in spec.ops() {
        let path = op.path();
        let target = resolve(schema, path);
        if target.locked {
            return Err(CoreError::locked_field(path));
        }

        let current = next.get_path(path).cloned();
        let new = match op {
            UpdateOp::Set { value, .. } => {
                check_set(path, current.as_ref(), value, &target)?;
                value.clone()
            }
            UpdateOp::Inc { delta, .. } => match &current {
                Some(Value::Number(n)) => Value::Number(add(path, n, delta)?),
                Some(other) => {
                    return Err(CoreError::type_mismatch(
                        path,
                        FieldType::Number.name(),
                        ValueKind::of(other).name(),
                    ))
                }
                None => return Err(CoreError::unknown_field(path)),
            },
        };

        if let (Some(field), Some(old)) = (target.field, current.as_ref()) {
            if let Some(locked) = field.locked_change(path, old, Some(&new)) {
                return Err(CoreError::locked_field(locked));
            }
        }
        if current.as_ref() == Some(&new) {
            continue;
        }
        write_path(next.as_map_mut(), path, new.clone())?;
        changes.push(FieldChange {
            path: path.to_string(),
            old: current,
            new,
        });
    }

    Ok(UpdateOutcome {
        document: next,
        changes,
    })
}

/// What the schema says about a path.
struct Target<'a> {
    /// Some field on the way to the path is locked.
    locked: bool,
    /// The schema of the path itself, when declared.
    field: Option<&'a FieldSchema>,
    /// The path lies below a field without a nested schema.
    free: bool,
}

fn resolve<'a>(schema: &'a Schema, path: &str) -> Target<'a> {
    let mut segments = path.split('.');
    let mut target = Target {
        locked: path.split('.').next() == Some(UUID_FIELD),
        field: None,
        free: false,
    };
    let Some(mut current) = segments.next().and_then(|first| schema.field(first)) else {
        return target;
    };
    target.locked |= current.is_locked();
    for segment in segments {
        match current.child(segment) {
            Some(child) => {
                current = child;
                target.locked |= current.is_locked();
            }
            None => {
                target.free = is_free_form(current);
                return target;
            }
        }
    }
    target.field = Some(current);
    target
}

fn is_free_form(field: &FieldSchema) -> bool {
    matches!(field.shape(), Shape::Plain)
        && field
            .types()
            .iter()
            .any(|t| matches!(t, FieldType::Object | FieldType::Array | FieldType::Any))
}

fn check_set(path: &str, current: Option<&Value>, value: &Value, target: &Target<'_>) -> CoreResult<()> {
    let new_kind = ValueKind::of(value);
    match current {
        Some(existing) if !existing.is_null() => {
            let old_kind = ValueKind::of(existing);
            if new_kind != ValueKind::Null && new_kind != old_kind {
                return Err(CoreError::type_mismatch(path, old_kind.name(), new_kind.name()));
            }
        }
        _ if target.field.is_some() || current.is_some() || target.free => {}
        _ => return Err(CoreError::unknown_field(path)),
    }
    match target.field {
        Some(field) => field.check(path, value),
        None => Ok(()),
    }
}

fn add(path: &str, current: &Number, delta: &Number) -> CoreResult<Number> {
    if let (Some(a), Some(b)) = (exact_integer(current), exact_integer(delta)) {
        let sum = a + b;
        if let Ok(small) = i64::try_from(sum) {
            return Ok(Number::from(small));
        }
        if let Ok(large) = u64::try_from(sum) {
            return Ok(Number::from(large));
        }
    }
    let sum = current.as_f64().unwrap_or(f64::NAN) + delta.as_f64().unwrap_or(f64::NAN);
    Number::from_f64(sum)
        .ok_or_else(|| CoreError::invalid_update(format!("increment of '{path}' is not a finite number")))
}

fn write_path(root: &mut Map<String, Value>, path: &str, value: Value) -> CoreResult<()> {
    let segments: Vec<&str> = path.split('.').collect();
    let Some((last, parents)) = segments.split_last() else {
        return Err(CoreError::invalid_update("empty field path"));
    };
    let Some((first, rest)) = parents.split_first() else {
        root.insert((*last).to_string(), value);
        return Ok(());
    };
    let mut container = root
        .get_mut(*first)
        .ok_or_else(|| CoreError::unknown_field(path))?;
    for segment in rest {
        container = match container {
            Value::Object(map) => map.get_mut(*segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get_mut(i)),
            _ => None,
        }
        .ok_or_else(|| CoreError::unknown_field(path))?;
    }
    match container {
        Value::Object(map) => {
            map.insert((*last).to_string(), value);
            Ok(())
        }
        Value::Array(items) => {
            let slot = last
                .parse::<usize>()
                .ok()
                .and_then(|i| items.get_mut(i))
                .ok_or_else(|| CoreError::unknown_field(path))?;
            *slot = value;
            Ok(())
        }
        _ => Err(CoreError::unknown_field(path)),
    }
}
