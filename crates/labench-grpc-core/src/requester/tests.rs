use crate::common::{Error, PayloadError, SchemaError};
use crate::fixtures::{ECHO_CALL, echo_source};
use crate::payload::PayloadSource;
use crate::requester::{
    ConnectionPolicy, FactoryConfig, GrpcRequesterFactory, Requester, RequesterFactory,
    parse_headers,
};
use crate::transport::{Connector, MethodRoute, Transport};
use bytes::Bytes;
use core::time::Duration;
use prost_reflect::{DynamicMessage, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tonic::metadata::{AsciiMetadataValue, MetadataMap};
use tonic::{Code, Request, Response, Status};

#[derive(Clone, Debug)]
struct RecordedCall {
    connection: usize,
    path: String,
    metadata: MetadataMap,
    body: Bytes,
}

/// In-memory transport that records every call it receives.
#[derive(Clone, Debug)]
struct MockConnection {
    id: usize,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    status: Option<Status>,
}

impl Transport for MockConnection {
    async fn unary(
        &mut self,
        route: &MethodRoute,
        request: Request<Bytes>,
    ) -> Result<Response<DynamicMessage>, Status> {
        self.calls.lock().unwrap().push(RecordedCall {
            connection: self.id,
            path: route.path().as_str().to_owned(),
            metadata: request.metadata().clone(),
            body: request.into_inner(),
        });

        if let Some(status) = &self.status {
            return Err(status.clone());
        }

        let mut reply = DynamicMessage::new(route.output().clone());
        reply.set_field_by_name("message", Value::String("pong".to_owned()));
        let mut response = Response::new(reply);
        response
            .metadata_mut()
            .insert("x-served-by", AsciiMetadataValue::from_static("mock"));
        Ok(response)
    }
}

/// Counts dials; optionally slow, optionally failing the first few.
#[derive(Debug, Default)]
struct MockConnector {
    dials: AtomicUsize,
    failures: AtomicUsize,
    delay: Duration,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    status: Option<Status>,
}

impl MockConnector {
    fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    fn failing(failures: usize) -> Self {
        Self {
            failures: AtomicUsize::new(failures),
            ..Self::default()
        }
    }

    fn replying(status: Status) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    fn dials(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }
}

impl Connector for MockConnector {
    type Connection = MockConnection;

    async fn connect(&self, target: &str) -> crate::Result<MockConnection> {
        tokio::time::sleep(self.delay).await;
        let id = self.dials.fetch_add(1, Ordering::SeqCst);

        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(Error::Transport {
                target: target.to_owned(),
                source: "connection refused".into(),
            });
        }

        Ok(MockConnection {
            id,
            calls: Arc::clone(&self.calls),
            status: self.status.clone(),
        })
    }
}

fn echo_config(connection: ConnectionPolicy) -> FactoryConfig {
    FactoryConfig::builder("mock:50051", ECHO_CALL)
        .schema(echo_source())
        .payload(PayloadSource::Json(r#"{"id":7,"tags":["a","b"]}"#.to_owned()))
        .connection(connection)
        .headers([("x-user", "alice"), ("trace-bin", "abc")])
        .unwrap()
        .build()
        .unwrap()
}

fn factory(
    config: FactoryConfig,
    connector: MockConnector,
) -> Arc<GrpcRequesterFactory<MockConnector>> {
    Arc::new(GrpcRequesterFactory::with_connector(config, connector))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_calls_resolve_each_resource_once() {
    let factory = factory(
        echo_config(ConnectionPolicy::Shared),
        MockConnector::slow(Duration::from_millis(50)),
    );

    let handles: Vec<_> = (0..16)
        .map(|worker| {
            let factory = Arc::clone(&factory);
            tokio::spawn(async move { factory.get_requester(worker).await })
        })
        .collect();

    let mut requesters = Vec::with_capacity(handles.len());
    for handle in handles {
        requesters.push(handle.await.unwrap().unwrap());
    }

    assert_eq!(factory.connector().dials(), 1);
    let first = &requesters[0];
    for requester in &requesters[1..] {
        assert_eq!(requester.transport().id, first.transport().id);
        assert!(Arc::ptr_eq(requester.payload(), first.payload()));
        assert_eq!(requester.method(), first.method());
    }

    let mut workers: Vec<_> = requesters.iter().map(|r| r.worker()).collect();
    workers.sort_unstable();
    assert_eq!(workers, (0..16).collect::<Vec<_>>());
}

#[tokio::test]
async fn later_requesters_reuse_cached_resources() {
    let factory = factory(echo_config(ConnectionPolicy::Shared), MockConnector::default());

    let a = factory.get_requester(0).await.unwrap();
    let b = factory.get_requester(1).await.unwrap();

    assert_eq!(factory.connector().dials(), 1);
    assert!(Arc::ptr_eq(a.payload(), b.payload()));
    assert!(core::ptr::eq(
        factory.method().await.unwrap(),
        factory.method().await.unwrap()
    ));
}

#[tokio::test]
async fn dedicated_policy_dials_per_requester() {
    let factory = factory(
        echo_config(ConnectionPolicy::Dedicated),
        MockConnector::default(),
    );

    let a = factory.get_requester(0).await.unwrap();
    let b = factory.get_requester(1).await.unwrap();

    assert_eq!(factory.connector().dials(), 2);
    assert_ne!(a.transport().id, b.transport().id);
    assert!(Arc::ptr_eq(a.payload(), b.payload()));
}

#[tokio::test]
async fn failed_dial_is_retried_by_next_caller() {
    let factory = factory(echo_config(ConnectionPolicy::Shared), MockConnector::failing(1));

    let err = factory.get_requester(0).await.unwrap_err();
    match err {
        Error::Transport { target, .. } => assert_eq!(target, "mock:50051"),
        other => panic!("unexpected error: {other:?}"),
    }

    let a = factory.get_requester(1).await.unwrap();
    let b = factory.get_requester(2).await.unwrap();
    assert_eq!(factory.connector().dials(), 2);
    assert_eq!(a.transport().id, 1);
    assert_eq!(b.transport().id, 1);
}

#[tokio::test]
async fn schema_failure_is_surfaced_before_dialing() {
    let mut config = echo_config(ConnectionPolicy::Shared);
    config.call = "labench.test.Echo/Missing".to_owned();
    let factory = factory(config, MockConnector::default());

    for worker in 0..2 {
        let err = factory.get_requester(worker).await.unwrap_err();
        assert!(
            matches!(err, Error::Schema(SchemaError::MethodNotFound { ref call }) if call == "labench.test.Echo/Missing"),
            "{err:?}"
        );
    }
    assert_eq!(factory.connector().dials(), 0);
}

#[tokio::test]
async fn payload_failure_names_field_and_message() {
    let mut config = echo_config(ConnectionPolicy::Dedicated);
    config.payload = PayloadSource::Structured(crate::GenericValue::Map(vec![(
        crate::GenericValue::String("nope".to_owned()),
        crate::GenericValue::Int(1),
    )]));
    let factory = factory(config, MockConnector::default());

    let err = factory.get_requester(0).await.unwrap_err();
    match err {
        Error::Payload(PayloadError::FieldNotFound { field, message }) => {
            assert_eq!(field, "nope");
            assert_eq!(message, "labench.test.EchoRequest");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(factory.connector().dials(), 0);
}

#[tokio::test]
async fn request_before_setup_is_rejected() {
    let factory = factory(echo_config(ConnectionPolicy::Shared), MockConnector::default());
    let mut requester = factory.get_requester(0).await.unwrap();

    assert!(!requester.is_ready());
    let status = requester.request().await.unwrap_err();
    assert_eq!(status.code(), Code::FailedPrecondition);
    assert!(factory.connector().calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn request_sends_payload_and_headers_on_method_path() {
    let factory = factory(echo_config(ConnectionPolicy::Shared), MockConnector::default());
    let mut requester = factory.get_requester(0).await.unwrap();

    requester.setup().unwrap();
    requester.setup().unwrap();
    requester.request().await.unwrap();
    requester.request().await.unwrap();
    requester.teardown().unwrap();

    let calls = factory.connector().calls.lock().unwrap();
    assert_eq!(calls.len(), 2);
    for call in calls.iter() {
        assert_eq!(call.connection, 0);
        assert_eq!(call.path, "/labench.test.Echo/Send");
        assert_eq!(&call.body, requester.payload().encoded());
        assert_eq!(call.metadata.get("x-user").unwrap(), "alice");
        assert_eq!(
            call.metadata.get_bin("trace-bin").unwrap().to_bytes().unwrap(),
            Bytes::from_static(b"abc")
        );
        assert!(call.metadata.get("grpc-timeout").is_none());
    }

    assert_eq!(requester.response_headers().get("x-served-by").unwrap(), "mock");
}

#[tokio::test]
async fn configured_timeout_is_sent_as_deadline() {
    let mut config = echo_config(ConnectionPolicy::Shared);
    config.timeout = Some(Duration::from_millis(250));
    let factory = factory(config, MockConnector::default());
    let mut requester = factory.get_requester(0).await.unwrap();

    requester.setup().unwrap();
    requester.request().await.unwrap();

    let calls = factory.connector().calls.lock().unwrap();
    assert!(calls[0].metadata.get("grpc-timeout").is_some());
}

#[tokio::test]
async fn call_failure_is_returned_verbatim() {
    let mut status = Status::unavailable("backend overloaded");
    status
        .metadata_mut()
        .insert("retry-after", AsciiMetadataValue::from_static("1"));
    let factory = factory(
        echo_config(ConnectionPolicy::Shared),
        MockConnector::replying(status),
    );
    let mut requester = factory.get_requester(0).await.unwrap();
    requester.setup().unwrap();

    let err = requester.request().await.unwrap_err();
    assert_eq!(err.code(), Code::Unavailable);
    assert_eq!(err.message(), "backend overloaded");
    assert_eq!(requester.response_headers().get("retry-after").unwrap(), "1");

    // The requester stays usable after a failed call.
    assert!(requester.request().await.is_err());
    assert_eq!(factory.connector().calls.lock().unwrap().len(), 2);
    requester.teardown().unwrap();
}

#[test]
fn headers_are_validated() {
    let map = parse_headers([("X-Tenant", "blue"), ("blob-bin", "\u{1}\u{2}")]).unwrap();
    assert_eq!(map.get("x-tenant").unwrap(), "blue");
    assert_eq!(
        map.get_bin("blob-bin").unwrap().to_bytes().unwrap(),
        Bytes::from_static(&[1, 2])
    );

    for (key, value) in [("bad key", "v"), ("x-ok", "line\nbreak"), ("", "v")] {
        let err = parse_headers([(key, value)]).unwrap_err();
        assert!(matches!(err, Error::Config { .. }), "{key:?}: {err:?}");
    }
}

#[test]
fn builder_rejects_incomplete_configuration() {
    let err = FactoryConfig::builder("localhost:50051", ECHO_CALL)
        .build()
        .unwrap_err();
    assert!(matches!(err, Error::Schema(SchemaError::MissingSource)));

    let err = FactoryConfig::builder("", ECHO_CALL)
        .schema(echo_source())
        .build()
        .unwrap_err();
    assert!(matches!(err, Error::Config { .. }));

    let err = FactoryConfig::builder("localhost:50051", ECHO_CALL)
        .schema(echo_source())
        .timeout(Duration::ZERO)
        .build()
        .unwrap_err();
    assert!(matches!(err, Error::Config { .. }));

    let config = FactoryConfig::builder("localhost:50051", ECHO_CALL)
        .schema(echo_source())
        .build()
        .unwrap();
    assert_eq!(config.connection, ConnectionPolicy::Dedicated);
    assert_eq!(config.payload, PayloadSource::default());
    assert!(config.headers.is_empty());
}

#[test]
fn connection_policy_from_flag() {
    assert_eq!(ConnectionPolicy::from_shared(true), ConnectionPolicy::Shared);
    assert_eq!(ConnectionPolicy::from_shared(false), ConnectionPolicy::Dedicated);
}
