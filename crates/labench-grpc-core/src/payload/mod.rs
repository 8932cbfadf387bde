//! Request payload construction.
//!
//! A [`PayloadSource`] selects one of three input modes once, at
//! configuration time. [`build_payload`] turns it into a [`PayloadMessage`]
//! bound to the method's request schema. The message is encoded once and
//! never mutated afterwards, so every requester can replay the same bytes.
//!
//! ## Structure
//!
//! - [`value`] - The loosely-typed [`GenericValue`] input tree.
//! - [`builder`] - Structured-mode reification against a schema.
//! - [`encoding`] - Deterministic wire encoding of the built message.

pub mod builder;
pub mod encoding;
pub mod value;


pub use value::GenericValue;

use crate::common::PayloadError;
use crate::schema::MessageSchema;
use bytes::Bytes;
use prost_reflect::{DynamicMessage, MessageDescriptor, ReflectMessage};

/// How the request message is supplied. Exactly one mode is active.
#[derive(Clone, Debug, PartialEq)]
pub enum PayloadSource {
    /// A mapping walked field by field against the schema.
    Structured(GenericValue),
    /// Protobuf JSON text, parsed with the canonical JSON mapping.
    Json(String),
    /// Bytes already encoded in the protobuf wire format.
    Binary(Bytes),
}

impl PayloadSource {
    /// Picks the single configured mode out of three optional ones.
    ///
    /// With no input at all the payload is the empty message.
    pub fn from_options(
        structured: Option<GenericValue>,
        json: Option<String>,
        binary: Option<Bytes>,
    ) -> Result<Self, PayloadError> {
        match (structured, json, binary) {
            (Some(value), None, None) => Ok(Self::Structured(value)),
            (None, Some(text), None) => Ok(Self::Json(text)),
            (None, None, Some(bytes)) => Ok(Self::Binary(bytes)),
            (None, None, None) => Ok(Self::default()),
            _ => Err(PayloadError::AmbiguousSource),
        }
    }
}

impl Default for PayloadSource {
    fn default() -> Self {
        Self::Structured(GenericValue::Map(Vec::new()))
    }
}

/// A built, schema-bound request message together with its wire encoding.
///
/// Map entries are encoded in key order, so equal messages always carry
/// equal bytes. Immutable once constructed; share it behind an `Arc`.
#[derive(Clone, Debug)]
pub struct PayloadMessage {
    message: DynamicMessage,
    encoded: Bytes,
}

impl PayloadMessage {
    pub fn new(message: DynamicMessage) -> Self {
        let encoded = Bytes::from(encoding::encode_canonical(&message));
        Self { message, encoded }
    }

    pub fn message(&self) -> &DynamicMessage {
        &self.message
    }

    /// The wire encoding sent on every call. Cloning is a reference-count
    /// bump.
    pub fn encoded(&self) -> &Bytes {
        &self.encoded
    }

    pub fn descriptor(&self) -> MessageDescriptor {
        self.message.descriptor()
    }
}

/// Builds the request message for `input` from `source`.
///
/// # Errors
///
/// - [`PayloadError::FieldNotFound`] for structured input naming an unknown
///   field.
/// - [`PayloadError::TypeMismatch`] for structured input whose shape or range
///   does not fit the declared field type.
/// - [`PayloadError::Malformed`] for JSON text or binary input that does not
///   parse against the schema.
#[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(message = input.full_name())))]
pub fn build_payload(
    input: &MessageDescriptor,
    source: &PayloadSource,
) -> Result<PayloadMessage, PayloadError> {
    let malformed = |reason: String| PayloadError::Malformed {
        message: input.full_name().to_owned(),
        reason,
    };

    let message = match source {
        PayloadSource::Structured(value) => {
            builder::build_structured(&MessageSchema::new(input.clone()), value)?
        }
        PayloadSource::Json(text) => {
            let mut deserializer = serde_json::Deserializer::from_str(text);
            let message = DynamicMessage::deserialize(input.clone(), &mut deserializer)
                .map_err(|e| malformed(e.to_string()))?;
            deserializer.end().map_err(|e| malformed(e.to_string()))?;
            message
        }
        PayloadSource::Binary(bytes) => {
            DynamicMessage::decode(input.clone(), bytes.clone()).map_err(|e| malformed(e.to_string()))?
        }
    };

    let payload = PayloadMessage::new(message);

    #[cfg(feature = "tracing")]
    tracing::debug!(encoded_len = payload.encoded().len(), "Built payload");

    Ok(payload)
}
