//! Transport seam between requesters and the wire.
//!
//! A [`Connector`] dials a target and yields a [`Transport`]; a transport
//! performs one unary call with pre-encoded request bytes and decodes the
//! reply against the method's output type. The production pair is
//! [`TonicConnector`] and [`tonic::transport::Channel`]. Tests substitute
//! in-memory implementations.

pub mod codec;
pub mod connector;

pub use codec::DynamicCodec;
pub use connector::{Connector, TonicConnector};

use crate::common::SchemaError;
use bytes::Bytes;
use prost_reflect::{DynamicMessage, MessageDescriptor, MethodDescriptor};
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::Channel;
use tonic::{Request, Response, Status};

/// The pieces of a method descriptor needed on every call: the HTTP/2 path
/// and the response type.
#[derive(Clone, Debug)]
pub struct MethodRoute {
    path: PathAndQuery,
    output: MessageDescriptor,
}

impl MethodRoute {
    pub fn new(method: &MethodDescriptor) -> Result<Self, SchemaError> {
        Ok(Self {
            path: grpc_path(method.parent_service().full_name(), method.name())?,
            output: method.output(),
        })
    }

    pub fn path(&self) -> &PathAndQuery {
        &self.path
    }

    pub fn output(&self) -> &MessageDescriptor {
        &self.output
    }
}

/// Builds `/{service}/{method}`, rejecting names that would not survive
/// as a bare request path.
fn grpc_path(service: &str, method: &str) -> Result<PathAndQuery, SchemaError> {
    let raw = format!("/{service}/{method}");
    let invalid = |reason: String| SchemaError::InvalidPath {
        call: format!("{service}/{method}"),
        reason,
    };
    let path = PathAndQuery::from_maybe_shared(raw.clone()).map_err(|e| invalid(e.to_string()))?;
    if path.query().is_some() || path.as_str() != raw {
        return Err(invalid(format!("parsed as `{}`", path.as_str())));
    }
    Ok(path)
}

/// Performs a single unary call.
pub trait Transport: Send + 'static {
    fn unary(
        &mut self,
        route: &MethodRoute,
        request: Request<Bytes>,
    ) -> impl Future<Output = Result<Response<DynamicMessage>, Status>> + Send;
}

impl Transport for Channel {
    async fn unary(
        &mut self,
        route: &MethodRoute,
        request: Request<Bytes>,
    ) -> Result<Response<DynamicMessage>, Status> {
        let mut grpc = tonic::client::Grpc::new(self.clone());
        grpc.ready()
            .await
            .map_err(|e| Status::unavailable(format!("Service was not ready: {e}")))?;
        grpc.unary(request, route.path().clone(), DynamicCodec::new(route.output().clone()))
            .await
    }
}
