//! Collection schemas.
//!
//! A schema maps field names to [`FieldSchema`] descriptors: the accepted
//! type tags, the default value and whether the field is locked after
//! creation. Nested objects, arrays and nests carry their own schemas.
//!
//! Schemas are usually written in a relaxed JSON shorthand:
//!
//! ```json
//! {
//!     "userId": { "type": "string", "locked": true },
//!     "hp": 100,
//!     "stats": { "type": "object", "default": { "level": 1, "xp": 0 } },
//!     "inventory": { "type": "array", "default": [{ "type": "string" }] },
//!     "quids": { "type": "nest", "default": { "name": "", "pronouns": [] } }
//! }
//! ```
//!
//! A field is written either as a spec (`{type, default, locked}`) or as a
//! bare literal whose type is inferred. See [`Schema::from_json`].

use crate::document::{json_eq, step, ValueKind, UUID_FIELD};
use crate::error::{CoreError, CoreResult};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

const SPEC_KEYS: [&str; 3] = ["type", "default", "locked"];

/// Type tag of a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// The field has no value; it is omitted from documents.
    Undefined,
    /// `true` / `false`.
    Boolean,
    /// Any JSON number.
    Number,
    /// A string.
    String,
    /// An object, optionally with its own sub-schema.
    Object,
    /// An array, optionally with an element schema.
    Array,
    /// An object whose values all follow one schema.
    Nest,
    /// Any value.
    Any,
}

impl FieldType {
    /// Parses a type tag name.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "undefined" => Some(Self::Undefined),
            "boolean" => Some(Self::Boolean),
            "number" => Some(Self::Number),
            "string" => Some(Self::String),
            "object" => Some(Self::Object),
            "array" => Some(Self::Array),
            "nest" => Some(Self::Nest),
            "any" => Some(Self::Any),
            _ => None,
        }
    }

    /// Returns the tag name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Boolean => "boolean",
            Self::Number => "number",
            Self::String => "string",
            Self::Object => "object",
            Self::Array => "array",
            Self::Nest => "nest",
            Self::Any => "any",
        }
    }

    /// Infers the tag of a literal value. `null` infers `any`.
    #[must_use]
    pub fn infer(value: &Value) -> Self {
        match ValueKind::of(value) {
            ValueKind::Null => Self::Any,
            ValueKind::Boolean => Self::Boolean,
            ValueKind::Number => Self::Number,
            ValueKind::String => Self::String,
            ValueKind::Object => Self::Object,
            ValueKind::Array => Self::Array,
        }
    }

    /// Returns the empty value used when no default is given.
    ///
    /// `undefined` has no value at all.
    #[must_use]
    pub fn empty_value(self) -> Option<Value> {
        match self {
            Self::Undefined => None,
            Self::Boolean => Some(Value::Bool(false)),
            Self::Number => Some(Value::from(0)),
            Self::String => Some(Value::String(String::new())),
            Self::Object | Self::Nest => Some(Value::Object(Map::new())),
            Self::Array => Some(Value::Array(Vec::new())),
            Self::Any => Some(Value::Null),
        }
    }

    /// Returns `true` if values of `kind` satisfy this tag.
    #[must_use]
    pub fn accepts(self, kind: ValueKind) -> bool {
        match self {
            Self::Undefined => false,
            Self::Boolean => kind == ValueKind::Boolean,
            Self::Number => kind == ValueKind::Number,
            Self::String => kind == ValueKind::String,
            Self::Object | Self::Nest => kind == ValueKind::Object,
            Self::Array => kind == ValueKind::Array,
            Self::Any => true,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Nested structure of a field.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    /// No nested schema.
    Plain,
    /// Object with a fixed set of sub-fields.
    Object(Schema),
    /// Array whose elements follow one schema.
    Array(Box<FieldSchema>),
    /// Object whose values all follow one schema.
    Nest(Box<FieldSchema>),
}

/// Normalized description of one field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSchema {
    types: Vec<FieldType>,
    default: Option<Value>,
    locked: bool,
    shape: Shape,
}

impl FieldSchema {
    /// Creates a field of the given type with that type's empty default.
    #[must_use]
    pub fn new(field_type: FieldType) -> Self {
        Self {
            types: vec![field_type],
            default: field_type.empty_value(),
            locked: false,
            shape: Shape::Plain,
        }
    }

    /// A string field.
    #[must_use]
    pub fn string(default: impl Into<String>) -> Self {
        Self::new(FieldType::String).with_default(Value::String(default.into()))
    }

    /// A number field.
    #[must_use]
    pub fn number(default: impl Into<serde_json::Number>) -> Self {
        Self::new(FieldType::Number).with_default(Value::Number(default.into()))
    }

    /// A boolean field.
    #[must_use]
    pub fn boolean(default: bool) -> Self {
        Self::new(FieldType::Boolean).with_default(Value::Bool(default))
    }

    /// A field accepting any value, defaulting to `null`.
    #[must_use]
    pub fn any() -> Self {
        Self::new(FieldType::Any)
    }

    /// A field that is never written.
    #[must_use]
    pub fn undefined() -> Self {
        Self::new(FieldType::Undefined)
    }

    /// A free-form object field defaulting to `{}`.
    #[must_use]
    pub fn free_object() -> Self {
        Self::new(FieldType::Object)
    }

    /// An object field with a fixed sub-schema.
    ///
    /// The default is the materialized sub-schema.
    #[must_use]
    pub fn object(fields: Schema) -> Self {
        Self {
            types: vec![FieldType::Object],
            default: Some(Value::Object(fields.materialize())),
            locked: false,
            shape: Shape::Object(fields),
        }
    }

    /// An untyped array field defaulting to `[]`.
    #[must_use]
    pub fn array() -> Self {
        Self::new(FieldType::Array)
    }

    /// An array field whose elements follow `element`.
    #[must_use]
    pub fn array_of(element: FieldSchema) -> Self {
        Self {
            shape: Shape::Array(Box::new(element)),
            ..Self::new(FieldType::Array)
        }
    }

    /// A nest field whose values follow `value`.
    #[must_use]
    pub fn nest_of(value: FieldSchema) -> Self {
        Self {
            shape: Shape::Nest(Box::new(value)),
            ..Self::new(FieldType::Nest)
        }
    }

    /// Replaces the default value.
    #[must_use]
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    /// Marks the field as locked after creation.
    #[must_use]
    pub fn locked(mut self) -> Self {
        self.locked = true;
        self
    }

    /// Also accepts values of `other`.
    #[must_use]
    pub fn or(mut self, other: FieldType) -> Self {
        if !self.types.contains(&other) {
            self.types.push(other);
        }
        self
    }

    /// Returns the accepted type tags, primary first.
    #[must_use]
    pub fn types(&self) -> &[FieldType] {
        &self.types
    }

    /// Returns the primary type tag.
    #[must_use]
    pub fn primary_type(&self) -> FieldType {
        self.types[0]
    }

    /// Returns the concrete default, or `None` for undefined fields.
    #[must_use]
    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    /// Returns `true` if the field may not change after creation.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Returns the nested structure.
    #[must_use]
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Returns `true` if `value` satisfies one of the type tags.
    ///
    /// `null` is compatible with every field.
    #[must_use]
    pub fn accepts(&self, value: &Value) -> bool {
        let kind = ValueKind::of(value);
        kind == ValueKind::Null || self.types.iter().any(|t| t.accepts(kind))
    }

    /// Describes the accepted types, e.g. `string|number`.
    #[must_use]
    pub fn type_names(&self) -> String {
        self.types
            .iter()
            .map(|t| t.name())
            .collect::<Vec<_>>()
            .join("|")
    }

    /// Returns the schema for the child `segment` of this field.
    #[must_use]
    pub fn child(&self, segment: &str) -> Option<&FieldSchema> {
        match &self.shape {
            Shape::Object(fields) => fields.field(segment),
            Shape::Nest(value) => Some(value),
            Shape::Array(element) if segment.parse::<usize>().is_ok() => Some(element),
            _ => None,
        }
    }

    /// Checks `value` against this field, descending into nested shapes.
    ///
    /// # Errors
    ///
    /// Returns `UnknownField` or `FieldTypeMismatch` naming the first
    /// offending path below `path`.
    pub fn check(&self, path: &str, value: &Value) -> CoreResult<()> {
        check_value(path, self, value)
    }

    /// Finds a locked descendant whose value differs between `old` and `new`.
    ///
    /// Descendants missing from `old` have never been set and are free.
    #[must_use]
    pub fn locked_change(&self, path: &str, old: &Value, new: Option<&Value>) -> Option<String> {
        let children: Vec<(String, &FieldSchema, &Value)> = match (&self.shape, old) {
            (Shape::Object(sub), Value::Object(map)) => map
                .iter()
                .filter_map(|(key, v)| sub.field(key).map(|f| (key.clone(), f, v)))
                .collect(),
            (Shape::Nest(inner), Value::Object(map)) => map
                .iter()
                .map(|(key, v)| (key.clone(), &**inner, v))
                .collect(),
            (Shape::Array(element), Value::Array(items)) => items
                .iter()
                .enumerate()
                .map(|(i, v)| (i.to_string(), &**element, v))
                .collect(),
            _ => return None,
        };
        children.into_iter().find_map(|(segment, field, before)| {
            let child_path = join_path(path, &segment);
            let after = new.and_then(|n| step(n, &segment));
            if field.locked {
                (!after.is_some_and(|a| json_eq(before, a))).then_some(child_path)
            } else {
                field.locked_change(&child_path, before, after)
            }
        })
    }
}

/// A normalized collection schema.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    fields: BTreeMap<String, FieldSchema>,
}

impl Schema {
    /// Creates an empty schema without the implicit `uuid` field.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts building a collection schema.
    #[must_use]
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    /// Normalizes a schema written in the relaxed JSON shorthand.
    ///
    /// The result always contains the locked `uuid` field.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSchema` if the root is not an object or a field spec
    /// is malformed.
    pub fn from_json(raw: &Value) -> CoreResult<Self> {
        let map = raw
            .as_object()
            .ok_or_else(|| CoreError::invalid_schema("schema root must be an object"))?;
        let mut schema = parse_fields("", map)?;
        schema.ensure_uuid();
        Ok(schema)
    }

    /// Adds the locked `uuid` field if it is missing.
    pub fn ensure_uuid(&mut self) {
        self.fields
            .entry(UUID_FIELD.to_string())
            .or_insert_with(|| FieldSchema::string("").locked());
    }

    /// Returns a field descriptor.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.get(name)
    }

    /// Iterates over the fields in name order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldSchema)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns the number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns `true` if the schema has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Resolves the descriptor of a dotted path.
    ///
    /// Returns the chain of descriptors from the top-level field down, or
    /// `None` if some segment is not described by the schema.
    #[must_use]
    pub fn resolve_path(&self, path: &str) -> Option<Vec<&FieldSchema>> {
        let mut segments = path.split('.');
        let mut current = self.fields.get(segments.next()?)?;
        let mut chain = vec![current];
        for segment in segments {
            current = current.child(segment)?;
            chain.push(current);
        }
        Some(chain)
    }

    /// Builds a document holding every default value.
    #[must_use]
    pub fn materialize(&self) -> Map<String, Value> {
        self.fields
            .iter()
            .filter_map(|(name, field)| field.default.clone().map(|v| (name.clone(), v)))
            .collect()
    }

    /// Checks that every field of `fields` is declared and well-typed.
    ///
    /// Missing fields are not an error.
    ///
    /// # Errors
    ///
    /// Returns `UnknownField` or `FieldTypeMismatch` naming the first
    /// offending path.
    pub fn check(&self, fields: &Map<String, Value>) -> CoreResult<()> {
        check_fields("", self, fields)
    }
}

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

fn check_fields(prefix: &str, schema: &Schema, fields: &Map<String, Value>) -> CoreResult<()> {
    for (name, value) in fields {
        let path = join_path(prefix, name);
        let field = schema
            .field(name)
            .ok_or_else(|| CoreError::unknown_field(&path))?;
        check_value(&path, field, value)?;
    }
    Ok(())
}

fn check_value(path: &str, field: &FieldSchema, value: &Value) -> CoreResult<()> {
    if !field.accepts(value) {
        return Err(CoreError::type_mismatch(
            path,
            field.type_names(),
            ValueKind::of(value).name(),
        ));
    }
    match (&field.shape, value) {
        (Shape::Object(sub), Value::Object(map)) => check_fields(path, sub, map),
        (Shape::Array(element), Value::Array(items)) => items
            .iter()
            .enumerate()
            .try_for_each(|(i, item)| check_value(&join_path(path, &i.to_string()), element, item)),
        (Shape::Nest(inner), Value::Object(map)) => map
            .iter()
            .try_for_each(|(key, item)| check_value(&join_path(path, key), inner, item)),
        _ => Ok(()),
    }
}

/// Builder for collection schemas.
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    fields: BTreeMap<String, FieldSchema>,
}

impl SchemaBuilder {
    /// Adds a field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, field: FieldSchema) -> Self {
        self.fields.insert(name.into(), field);
        self
    }

    /// Builds a collection schema, including the locked `uuid` field.
    #[must_use]
    pub fn build(self) -> Schema {
        let mut schema = self.build_nested();
        schema.ensure_uuid();
        schema
    }

    /// Builds a nested sub-schema without the `uuid` field.
    #[must_use]
    pub fn build_nested(self) -> Schema {
        Schema {
            fields: self.fields,
        }
    }
}

// Shorthand normalization

fn as_field_spec(raw: &Value) -> Option<&Map<String, Value>> {
    let map = raw.as_object()?;
    let is_spec = !map.is_empty()
        && map.keys().all(|k| SPEC_KEYS.contains(&k.as_str()))
        && (map.contains_key("type") || map.contains_key("default"));
    is_spec.then_some(map)
}

fn parse_fields(prefix: &str, raw: &Map<String, Value>) -> CoreResult<Schema> {
    let mut fields = BTreeMap::new();
    for (name, value) in raw {
        let path = join_path(prefix, name);
        fields.insert(name.clone(), parse_field(&path, value)?);
    }
    Ok(Schema { fields })
}

fn parse_field(path: &str, raw: &Value) -> CoreResult<FieldSchema> {
    match as_field_spec(raw) {
        Some(spec) => parse_spec(path, spec),
        None => literal_field(path, raw),
    }
}

fn literal_field(path: &str, literal: &Value) -> CoreResult<FieldSchema> {
    let field_type = FieldType::infer(literal);
    build_field(path, vec![field_type], Some(literal), false)
}

fn parse_spec(path: &str, spec: &Map<String, Value>) -> CoreResult<FieldSchema> {
    let mut types = Vec::new();
    let names: Vec<&Value> = match spec.get("type") {
        None => Vec::new(),
        Some(Value::String(_)) => spec.get("type").into_iter().collect(),
        Some(Value::Array(items)) => items.iter().collect(),
        Some(other) => {
            return Err(CoreError::invalid_schema(format!(
                "field '{path}': type must be a string or an array of strings, found {}",
                ValueKind::of(other)
            )))
        }
    };
    for name in names {
        let name = name.as_str().ok_or_else(|| {
            CoreError::invalid_schema(format!("field '{path}': type names must be strings"))
        })?;
        if let Some(tag) = FieldType::parse(name) {
            if !types.contains(&tag) {
                types.push(tag);
            }
        }
    }

    let default = spec.get("default");
    if types.is_empty() {
        types.push(default.map_or(FieldType::Undefined, FieldType::infer));
    }

    let locked = match spec.get("locked") {
        None => false,
        Some(Value::Bool(b)) => *b,
        Some(other) => {
            return Err(CoreError::invalid_schema(format!(
                "field '{path}': locked must be a boolean, found {}",
                ValueKind::of(other)
            )))
        }
    };

    build_field(path, types, default, locked)
}

fn build_field(
    path: &str,
    types: Vec<FieldType>,
    default: Option<&Value>,
    locked: bool,
) -> CoreResult<FieldSchema> {
    let primary = types[0];
    let (shape, default) = match (primary, default) {
        (FieldType::Object, Some(Value::Object(map))) if !map.is_empty() => {
            let fields = parse_fields(path, map)?;
            let materialized = Value::Object(fields.materialize());
            (Shape::Object(fields), Some(materialized))
        }
        (FieldType::Array, Some(Value::Array(items)))
            if items.len() == 1 && as_field_spec(&items[0]).is_some() =>
        {
            let element = parse_field(&join_path(path, "0"), &items[0])?;
            (Shape::Array(Box::new(element)), Some(Value::Array(Vec::new())))
        }
        (FieldType::Nest, Some(raw @ Value::Object(map))) if !map.is_empty() => {
            let value = match as_field_spec(raw) {
                Some(spec) => parse_spec(&join_path(path, "*"), spec)?,
                None => FieldSchema::object(parse_fields(&join_path(path, "*"), map)?),
            };
            (Shape::Nest(Box::new(value)), Some(Value::Object(Map::new())))
        }
        (_, Some(value)) => (Shape::Plain, Some(value.clone())),
        (_, None) => (Shape::Plain, primary.empty_value()),
    };

    Ok(FieldSchema {
        types,
        default,
        locked,
        shape,
    })
}
