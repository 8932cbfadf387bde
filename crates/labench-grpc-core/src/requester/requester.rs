use crate::common::Result;
use crate::payload::PayloadMessage;
use crate::requester::Requester;
use crate::transport::{MethodRoute, Transport};
use core::time::Duration;
use prost_reflect::MethodDescriptor;
use std::sync::Arc;
use tonic::metadata::MetadataMap;
use tonic::transport::Channel;
use tonic::{Request, Status};

/// Outgoing context bound by [`Requester::setup`].
#[derive(Clone, Debug)]
struct CallContext {
    metadata: MetadataMap,
    timeout: Option<Duration>,
}

/// Replays a factory's payload over one transport.
///
/// The method descriptor and payload are shared with every other requester
/// from the same factory. Response headers from the latest call are kept
/// in a holder private to this requester.
#[derive(Debug)]
pub struct GrpcRequester<T: Transport = Channel> {
    worker: u64,
    transport: T,
    method: MethodDescriptor,
    route: MethodRoute,
    payload: Arc<PayloadMessage>,
    headers: Arc<MetadataMap>,
    timeout: Option<Duration>,
    context: Option<CallContext>,
    response_headers: MetadataMap,
}

impl<T: Transport> GrpcRequester<T> {
    pub(crate) fn new(
        worker: u64,
        transport: T,
        method: MethodDescriptor,
        route: MethodRoute,
        payload: Arc<PayloadMessage>,
        headers: Arc<MetadataMap>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            worker,
            transport,
            route,
            method,
            payload,
            headers,
            timeout,
            context: None,
            response_headers: MetadataMap::new(),
        }
    }

    pub fn worker(&self) -> u64 {
        self.worker
    }

    pub fn method(&self) -> &MethodDescriptor {
        &self.method
    }

    pub fn payload(&self) -> &Arc<PayloadMessage> {
        &self.payload
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Whether [`Requester::setup`] has bound a call context.
    pub fn is_ready(&self) -> bool {
        self.context.is_some()
    }

    /// Headers returned by the most recent call, including failed ones.
    pub fn response_headers(&self) -> &MetadataMap {
        &self.response_headers
    }
}

impl<T: Transport> Requester for GrpcRequester<T> {
    fn setup(&mut self) -> Result<()> {
        self.context = Some(CallContext {
            metadata: (*self.headers).clone(),
            timeout: self.timeout,
        });
        Ok(())
    }

    async fn request(&mut self) -> core::result::Result<(), Status> {
        let Some(context) = &self.context else {
            return Err(Status::failed_precondition(
                "requester must be set up before issuing calls",
            ));
        };

        let mut request = Request::new(self.payload.encoded().clone());
        *request.metadata_mut() = context.metadata.clone();
        if let Some(timeout) = context.timeout {
            request.set_timeout(timeout);
        }

        match self.transport.unary(&self.route, request).await {
            Ok(response) => {
                self.response_headers = response.into_parts().0;
                Ok(())
            }
            Err(status) => {
                self.response_headers = status.metadata().clone();
                Err(status)
            }
        }
    }

    fn teardown(&mut self) -> Result<()> {
        Ok(())
    }
}
