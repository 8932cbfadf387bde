//! Typed view of a message schema.
//!
//! The payload builder never inspects `prost-reflect` descriptors directly.
//! It asks a [`MessageSchema`] for a field by name and then reasons about
//! the field's [`FieldKind`] and [`Cardinality`]. Nested message, enum and
//! map schemas are reachable from the field itself.

use prost_reflect::{EnumDescriptor, FieldDescriptor, Kind, MessageDescriptor};

/// Schema of a single message type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageSchema {
    descriptor: MessageDescriptor,
}

impl MessageSchema {
    pub fn new(descriptor: MessageDescriptor) -> Self {
        Self { descriptor }
    }

    /// Fully-qualified message name, e.g. `helloworld.HelloRequest`.
    pub fn name(&self) -> &str {
        self.descriptor.full_name()
    }

    /// Looks up a field by its declared (not JSON) name.
    pub fn field(&self, name: &str) -> Option<FieldSchema> {
        self.descriptor
            .get_field_by_name(name)
            .map(|descriptor| FieldSchema { descriptor })
    }

    pub fn descriptor(&self) -> &MessageDescriptor {
        &self.descriptor
    }
}

impl From<MessageDescriptor> for MessageSchema {
    fn from(descriptor: MessageDescriptor) -> Self {
        Self::new(descriptor)
    }
}

/// Width and signedness of a numeric field, as far as reification cares.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Numeric {
    /// `int32`, `sint32`, `sfixed32`
    I32,
    /// `int64`, `sint64`, `sfixed64`
    I64,
    /// `uint32`, `fixed32`
    U32,
    /// `uint64`, `fixed64`
    U64,
    /// `float`
    F32,
    /// `double`
    F64,
}

impl Numeric {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::I32 => "int32",
            Self::I64 => "int64",
            Self::U32 => "uint32",
            Self::U64 => "uint64",
            Self::F32 => "float",
            Self::F64 => "double",
        }
    }
}

/// The declared type of a field's values.
///
/// For map fields this is the kind of the synthetic entry message; use
/// [`FieldSchema::cardinality`] to reach the key and value schemas.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldKind {
    Numeric(Numeric),
    String,
    Bytes,
    Bool,
    Enum(EnumDescriptor),
    Message(MessageSchema),
}

impl FieldKind {
    pub fn describe(&self) -> String {
        match self {
            Self::Numeric(n) => n.as_str().to_owned(),
            Self::String => "string".to_owned(),
            Self::Bytes => "bytes".to_owned(),
            Self::Bool => "bool".to_owned(),
            Self::Enum(e) => format!("enum `{}`", e.full_name()),
            Self::Message(m) => format!("message `{}`", m.name()),
        }
    }
}

/// How many values a field holds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Cardinality {
    Singular,
    Repeated,
    Map { key: FieldSchema, value: FieldSchema },
}

/// Schema of a single field within a [`MessageSchema`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldSchema {
    descriptor: FieldDescriptor,
}

impl FieldSchema {
    pub fn name(&self) -> &str {
        self.descriptor.name()
    }

    /// Fully-qualified field name, used in error messages.
    pub fn full_name(&self) -> &str {
        self.descriptor.full_name()
    }

    pub fn kind(&self) -> FieldKind {
        match self.descriptor.kind() {
            Kind::Int32 | Kind::Sint32 | Kind::Sfixed32 => FieldKind::Numeric(Numeric::I32),
            Kind::Int64 | Kind::Sint64 | Kind::Sfixed64 => FieldKind::Numeric(Numeric::I64),
            Kind::Uint32 | Kind::Fixed32 => FieldKind::Numeric(Numeric::U32),
            Kind::Uint64 | Kind::Fixed64 => FieldKind::Numeric(Numeric::U64),
            Kind::Float => FieldKind::Numeric(Numeric::F32),
            Kind::Double => FieldKind::Numeric(Numeric::F64),
            Kind::Bool => FieldKind::Bool,
            Kind::String => FieldKind::String,
            Kind::Bytes => FieldKind::Bytes,
            Kind::Enum(e) => FieldKind::Enum(e),
            Kind::Message(m) => FieldKind::Message(MessageSchema::new(m)),
        }
    }

    pub fn cardinality(&self) -> Cardinality {
        if self.descriptor.is_map() {
            if let Kind::Message(entry) = self.descriptor.kind() {
                return Cardinality::Map {
                    key: FieldSchema {
                        descriptor: entry.map_entry_key_field(),
                    },
                    value: FieldSchema {
                        descriptor: entry.map_entry_value_field(),
                    },
                };
            }
        }
        if self.descriptor.is_list() {
            Cardinality::Repeated
        } else {
            Cardinality::Singular
        }
    }

    pub fn descriptor(&self) -> &FieldDescriptor {
        &self.descriptor
    }
}
