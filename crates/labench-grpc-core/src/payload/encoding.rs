//! Deterministic wire encoding.
//!
//! `prost-reflect` stores map fields in a `HashMap` and encodes entries in
//! its iteration order, which differs between map instances. Payloads are
//! encoded here instead: known fields in declaration order, map entries in
//! ascending key order, nested messages recursively, then unknown fields and
//! extensions as decoded. The result is a valid encoding of the same message.

use prost::Message;
use prost::encoding::{WireType, encode_key, encode_varint};
use prost_reflect::{
    DynamicMessage, FieldDescriptor, Kind, MapKey, MessageDescriptor, ReflectMessage, Value,
};

/// Encodes `message` so that equal messages always produce equal bytes.
pub fn encode_canonical(message: &DynamicMessage) -> Vec<u8> {
    let mut buf = Vec::with_capacity(message.encoded_len());
    encode_message(message, &mut buf);
    buf
}

fn encode_message(message: &DynamicMessage, buf: &mut Vec<u8>) {
    let descriptor = message.descriptor();

    for field in descriptor.fields() {
        if !message.has_field(&field) {
            continue;
        }
        let value = message.get_field(&field);
        match (&*value, field.kind()) {
            (Value::Map(entries), Kind::Message(entry)) => {
                let mut sorted: Vec<_> = entries.iter().collect();
                sorted.sort_unstable_by(|a, b| a.0.cmp(b.0));
                for (key, value) in sorted {
                    let mut body = Vec::new();
                    encode_field(&entry, &entry.map_entry_key_field(), key_value(key), &mut body);
                    encode_field(&entry, &entry.map_entry_value_field(), value.clone(), &mut body);
                    encode_length_delimited(field.number(), &body, buf);
                }
            }
            (Value::List(items), Kind::Message(_)) if !field.is_group() => {
                for item in items {
                    encode_field(&descriptor, &field, item.clone(), buf);
                }
            }
            _ => encode_field(&descriptor, &field, Value::clone(&value), buf),
        }
    }

    // Everything but the known fields.
    let mut rest = message.clone();
    for field in descriptor.fields() {
        rest.clear_field(&field);
    }
    buf.extend_from_slice(&rest.encode_to_vec());
}

/// Encodes a single (non-map) field value of a message of type `parent`.
fn encode_field(
    parent: &MessageDescriptor,
    field: &FieldDescriptor,
    value: Value,
    buf: &mut Vec<u8>,
) {
    if let Value::Message(nested) = &value {
        if !field.is_group() {
            let mut body = Vec::new();
            encode_message(nested, &mut body);
            encode_length_delimited(field.number(), &body, buf);
            return;
        }
    }

    let mut single = DynamicMessage::new(parent.clone());
    single.set_field(field, value);
    buf.extend_from_slice(&single.encode_to_vec());
}

fn encode_length_delimited(number: u32, body: &[u8], buf: &mut Vec<u8>) {
    encode_key(number, WireType::LengthDelimited, buf);
    encode_varint(body.len() as u64, buf);
    buf.extend_from_slice(body);
}

fn key_value(key: &MapKey) -> Value {
    match key {
        MapKey::Bool(b) => Value::Bool(*b),
        MapKey::I32(i) => Value::I32(*i),
        MapKey::I64(i) => Value::I64(*i),
        MapKey::U32(u) => Value::U32(*u),
        MapKey::U64(u) => Value::U64(*u),
        MapKey::String(s) => Value::String(s.clone()),
    }
}
