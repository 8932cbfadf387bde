#![doc = include_str!("../README.md")]

mod common;
#[cfg(test)]
mod fixtures;
pub mod payload;
pub mod requester;
pub mod schema;
pub mod transport;

pub use common::*;
pub use payload::{GenericValue, PayloadMessage, PayloadSource, build_payload};
pub use requester::{
    ConnectionPolicy, FactoryConfig, FactoryConfigBuilder, GrpcRequester, GrpcRequesterFactory,
    Requester, RequesterFactory, parse_headers,
};
pub use schema::{SchemaSource, resolve_method};
pub use transport::{Connector, MethodRoute, TonicConnector, Transport};

// Public re-exports so downstream crates agree on descriptor and status types.
pub use prost_reflect;
pub use tonic;
