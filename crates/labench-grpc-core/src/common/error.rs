//! Error types for requester construction.
//!
//! Everything that can go wrong before the first call is fatal to the
//! factory or worker being set up and is reported through [`Error`]. Failures
//! of individual calls are not represented here: they are surfaced to the
//! caller verbatim as [`tonic::Status`].
//!
//! ## Error Cases
//! - `Config`: contradictory or incomplete configuration.
//! - `Schema`: the method descriptor could not be resolved.
//! - `Payload`: the request message could not be built from its input.
//! - `Transport`: a connection to the target could not be established.

/// Boxed error used for connector failures, which come from arbitrary
/// transports.
pub type BoxError = Box<dyn core::error::Error + Send + Sync + 'static>;

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Unified error type for configuring factories and building requesters.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The configuration is contradictory or incomplete.
    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    /// Descriptor resolution failed.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// The request payload could not be built.
    #[error(transparent)]
    Payload(#[from] PayloadError),

    /// Dialing the target failed.
    #[error("Failed to connect to `{target}`: {source}")]
    Transport {
        target: String,
        #[source]
        source: BoxError,
    },
}

/// Failure to turn a method identifier and schema source into a method
/// descriptor.
#[derive(thiserror::Error, Debug)]
pub enum SchemaError {
    #[error("Both `Proto` and `Protoset` were given; choose exactly one schema source")]
    AmbiguousSource,

    #[error("Neither `Proto` nor `Protoset` was given; a schema source is required")]
    MissingSource,

    /// The schema source failed to parse or compile.
    #[error("Failed to load schema `{source_name}`: {reason}")]
    Parse { source_name: String, reason: String },

    /// The identifier is not of the form `package.Service/Method`.
    #[error("Invalid method identifier `{call}`: expected `package.Service/Method`")]
    InvalidCall { call: String },

    #[error("Method `{call}` was not found in the resolved schema")]
    MethodNotFound { call: String },

    /// Only unary methods can be driven by a requester.
    #[error("Method `{call}` is streaming; only unary methods are supported")]
    Streaming { call: String },

    /// The method's names do not form a usable HTTP/2 request path.
    #[error("Method `{call}` cannot be addressed as a gRPC path: {reason}")]
    InvalidPath { call: String, reason: String },
}

/// Failure to build the request message.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PayloadError {
    #[error("Couldn't find field `{field}` in message `{message}`")]
    FieldNotFound { field: String, message: String },

    #[error("Type mismatch for field `{field}`: expected {expected}, found {found}")]
    TypeMismatch {
        field: String,
        expected: String,
        found: String,
    },

    /// Text or binary input that does not parse against the schema.
    #[error("Malformed payload for message `{message}`: {reason}")]
    Malformed { message: String, reason: String },

    #[error("More than one of `Data`, `DataJSON` and `DataBin` was given; choose one")]
    AmbiguousSource,
}
