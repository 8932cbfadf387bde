//! Structured-mode payload construction.
//!
//! Walks a [`GenericValue`] mapping field by field against a
//! [`MessageSchema`], reifying each value into the representation the
//! declared field type requires:
//!
//! - nested messages recurse, with mapping keys stringified;
//! - 32-bit integer and enum fields reject integers outside `i32`;
//! - `float` fields narrow `f64` input unconditionally;
//! - everything else converts only when the value already has the right
//!   shape, and fails with [`PayloadError::TypeMismatch`] otherwise.

use crate::common::PayloadError;
use crate::payload::GenericValue;
use crate::schema::{Cardinality, FieldKind, FieldSchema, MessageSchema, Numeric};
use bytes::Bytes;
use prost_reflect::{DynamicMessage, MapKey, Value};
use std::collections::HashMap;

type Result<T> = core::result::Result<T, PayloadError>;

/// Builds a message of type `schema` from a structured input value.
///
/// The input must be a mapping from field name to field value. A `null`
/// value leaves a singular field unset.
pub fn build_structured(schema: &MessageSchema, input: &GenericValue) -> Result<DynamicMessage> {
    match input {
        GenericValue::Map(entries) => build_message(schema, entries),
        other => Err(PayloadError::TypeMismatch {
            field: schema.name().to_owned(),
            expected: "mapping".to_owned(),
            found: other.describe(),
        }),
    }
}

fn build_message(
    schema: &MessageSchema,
    entries: &[(GenericValue, GenericValue)],
) -> Result<DynamicMessage> {
    let mut message = DynamicMessage::new(schema.descriptor().clone());

    for (name, input) in entries {
        let name = name.to_key_string();
        let field = schema
            .field(&name)
            .ok_or_else(|| PayloadError::FieldNotFound {
                field: name,
                message: schema.name().to_owned(),
            })?;

        let value = match field.cardinality() {
            Cardinality::Map { key, value } => Value::Map(build_map(&field, &key, &value, input)?),
            Cardinality::Repeated => Value::List(build_list(&field, input)?),
            Cardinality::Singular if matches!(input, GenericValue::Null) => continue,
            Cardinality::Singular => reify(&field, input)?,
        };

        message
            .try_set_field(field.descriptor(), value)
            .map_err(|e| PayloadError::TypeMismatch {
                field: field.full_name().to_owned(),
                expected: field.kind().describe(),
                found: e.to_string(),
            })?;
    }

    Ok(message)
}

fn build_list(field: &FieldSchema, input: &GenericValue) -> Result<Vec<Value>> {
    let GenericValue::List(items) = input else {
        return Err(mismatch(field, "list", input));
    };
    items.iter().map(|item| reify(field, item)).collect()
}

fn build_map(
    field: &FieldSchema,
    key_field: &FieldSchema,
    value_field: &FieldSchema,
    input: &GenericValue,
) -> Result<HashMap<MapKey, Value>> {
    let GenericValue::Map(entries) = input else {
        return Err(mismatch(field, "mapping", input));
    };

    let mut map = HashMap::with_capacity(entries.len());
    for (key, value) in entries {
        let map_key = reify_key(key_field, key)?;
        let value = reify(value_field, value)?;
        if map.insert(map_key, value).is_some() {
            return Err(PayloadError::TypeMismatch {
                field: field.full_name().to_owned(),
                expected: "unique map keys".to_owned(),
                found: format!("duplicate key {key}"),
            });
        }
    }
    Ok(map)
}

/// Converts a map key, parsing string keys for integer and bool key types
/// since text-based sources stringify every key.
fn reify_key(key_field: &FieldSchema, key: &GenericValue) -> Result<MapKey> {
    let kind = key_field.kind();
    let parsed = match (&kind, key) {
        (FieldKind::Numeric(_), GenericValue::String(s)) => s.parse().ok().map(GenericValue::Int),
        (FieldKind::Bool, GenericValue::String(s)) => s.parse().ok().map(GenericValue::Bool),
        _ => None,
    };
    let key = parsed.as_ref().unwrap_or(key);

    match reify_kind(key_field, &kind, key)? {
        Value::Bool(b) => Ok(MapKey::Bool(b)),
        Value::I32(i) => Ok(MapKey::I32(i)),
        Value::I64(i) => Ok(MapKey::I64(i)),
        Value::U32(u) => Ok(MapKey::U32(u)),
        Value::U64(u) => Ok(MapKey::U64(u)),
        Value::String(s) => Ok(MapKey::String(s)),
        _ => Err(mismatch(key_field, "map key", key)),
    }
}

fn reify(field: &FieldSchema, input: &GenericValue) -> Result<Value> {
    reify_kind(field, &field.kind(), input)
}

fn reify_kind(field: &FieldSchema, kind: &FieldKind, input: &GenericValue) -> Result<Value> {
    match (kind, input) {
        (FieldKind::Message(schema), GenericValue::Map(entries)) => {
            build_message(schema, entries).map(Value::Message)
        }
        (FieldKind::Message(_), _) => Err(mismatch(field, kind.describe(), input)),
        (FieldKind::Numeric(Numeric::I32), GenericValue::Int(i)) => {
            narrow_i32(field, kind, *i, input).map(Value::I32)
        }
        (FieldKind::Enum(_), GenericValue::Int(i)) => {
            narrow_i32(field, kind, *i, input).map(Value::EnumNumber)
        }
        (FieldKind::Enum(descriptor), GenericValue::String(name)) => descriptor
            .get_value_by_name(name)
            .map(|v| Value::EnumNumber(v.number()))
            .ok_or_else(|| mismatch(field, kind.describe(), input)),
        // Precision loss is accepted for floats; only integers are range
        // checked.
        (FieldKind::Numeric(Numeric::F32), GenericValue::Float(f)) => Ok(Value::F32(*f as f32)),
        _ => coerce(field, kind, input),
    }
}

fn narrow_i32(field: &FieldSchema, kind: &FieldKind, i: i128, input: &GenericValue) -> Result<i32> {
    i32::try_from(i).map_err(|_| mismatch(field, kind.describe(), input))
}

/// Conversion for kinds without special reification rules. Fails unless the
/// input already has the declared shape and fits the declared range.
fn coerce(field: &FieldSchema, kind: &FieldKind, input: &GenericValue) -> Result<Value> {
    let value = match (kind, input) {
        (FieldKind::Numeric(Numeric::I64), GenericValue::Int(i)) => {
            i64::try_from(*i).ok().map(Value::I64)
        }
        (FieldKind::Numeric(Numeric::U32), GenericValue::Int(i)) => {
            u32::try_from(*i).ok().map(Value::U32)
        }
        (FieldKind::Numeric(Numeric::U64), GenericValue::Int(i)) => {
            u64::try_from(*i).ok().map(Value::U64)
        }
        (FieldKind::Numeric(Numeric::F32), GenericValue::Int(i)) => Some(Value::F32(*i as f32)),
        (FieldKind::Numeric(Numeric::F64), GenericValue::Int(i)) => Some(Value::F64(*i as f64)),
        (FieldKind::Numeric(Numeric::F64), GenericValue::Float(f)) => Some(Value::F64(*f)),
        (FieldKind::Bool, GenericValue::Bool(b)) => Some(Value::Bool(*b)),
        (FieldKind::String, GenericValue::String(s)) => Some(Value::String(s.clone())),
        (FieldKind::Bytes, GenericValue::Bytes(b)) => Some(Value::Bytes(Bytes::copy_from_slice(b))),
        (FieldKind::Bytes, GenericValue::String(s)) => {
            Some(Value::Bytes(Bytes::copy_from_slice(s.as_bytes())))
        }
        _ => None,
    };
    value.ok_or_else(|| mismatch(field, kind.describe(), input))
}

fn mismatch(field: &FieldSchema, expected: impl Into<String>, found: &GenericValue) -> PayloadError {
    PayloadError::TypeMismatch {
        field: field.full_name().to_owned(),
        expected: expected.into(),
        found: found.describe(),
    }
}
