//! Runtime schema discovery.
//!
//! - [`descriptor`] - Typed field/message schema view used by the payload
//!   builder.
//! - [`resolver`] - Turns a method identifier and a schema source into a
//!   method descriptor.

pub mod descriptor;
pub mod resolver;

#[cfg(test)]
mod tests;

pub use descriptor::{Cardinality, FieldKind, FieldSchema, MessageSchema, Numeric};
pub use resolver::{SchemaSource, resolve_method};
