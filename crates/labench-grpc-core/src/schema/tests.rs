use super::{Cardinality, FieldKind, Numeric, SchemaSource, resolve_method};
use crate::common::SchemaError;
use crate::fixtures::{ECHO_CALL, ECHO_PROTO, echo_protoset, echo_request, echo_source};
use bytes::Bytes;

#[test]
fn resolves_inline_schema_with_imports() {
    let method = resolve_method(ECHO_CALL, &echo_source()).unwrap();
    assert_eq!(method.name(), "Send");
    assert_eq!(method.input().full_name(), "labench.test.EchoRequest");
    assert_eq!(method.output().full_name(), "labench.test.EchoResponse");
}

#[test]
fn resolves_dotted_method_identifier() {
    let method = resolve_method("labench.test.Echo.Send", &echo_source()).unwrap();
    assert_eq!(method.full_name(), "labench.test.Echo.Send");
}

#[test]
fn resolves_protoset() {
    let source = SchemaSource::Protoset(echo_protoset());
    let method = resolve_method(ECHO_CALL, &source).unwrap();
    assert_eq!(method.input().full_name(), "labench.test.EchoRequest");
}

#[test]
fn unknown_method_names_the_call() {
    let err = resolve_method("labench.test.Echo/Missing", &echo_source()).unwrap_err();
    assert!(
        matches!(&err, SchemaError::MethodNotFound { call } if call == "labench.test.Echo/Missing")
    );
    assert!(err.to_string().contains("labench.test.Echo/Missing"));
}

#[test]
fn unknown_service_is_method_not_found() {
    let err = resolve_method("labench.test.Nope/Send", &echo_source()).unwrap_err();
    assert!(matches!(err, SchemaError::MethodNotFound { .. }));
}

#[test]
fn streaming_methods_are_rejected() {
    let err = resolve_method("labench.test.Echo/Watch", &echo_source()).unwrap_err();
    assert!(matches!(err, SchemaError::Streaming { call } if call == "labench.test.Echo/Watch"));
}

#[test]
fn malformed_identifier_is_rejected() {
    let err = resolve_method("Send", &echo_source()).unwrap_err();
    assert!(matches!(err, SchemaError::InvalidCall { call } if call == "Send"));
}

#[test]
fn unparsable_inline_schema_names_the_file() {
    let source = SchemaSource::Inline {
        name: "broken.proto".to_owned(),
        source: "syntax = \"proto3\"; message {".to_owned(),
        import_paths: vec![],
    };
    let err = resolve_method(ECHO_CALL, &source).unwrap_err();
    assert!(matches!(&err, SchemaError::Parse { source_name, .. } if source_name == "broken.proto"));
}

#[test]
fn missing_import_path_fails_to_parse() {
    let source = SchemaSource::Inline {
        name: "echo.proto".to_owned(),
        source: ECHO_PROTO.to_owned(),
        import_paths: vec![],
    };
    let err = resolve_method(ECHO_CALL, &source).unwrap_err();
    assert!(matches!(err, SchemaError::Parse { .. }));
}

#[test]
fn garbage_protoset_fails_to_parse() {
    let source = SchemaSource::Protoset(Bytes::from_static(b"\xff\xff\xff"));
    let err = resolve_method(ECHO_CALL, &source).unwrap_err();
    assert!(matches!(&err, SchemaError::Parse { source_name, .. } if source_name == "<protoset>"));
}

#[test]
fn exactly_one_schema_source_is_accepted() {
    let proto = || Some(("echo.proto".to_owned(), ECHO_PROTO.to_owned()));
    let set = || Some(Bytes::from_static(b""));

    assert!(matches!(
        SchemaSource::from_options(proto(), set(), vec![]),
        Err(SchemaError::AmbiguousSource)
    ));
    assert!(matches!(
        SchemaSource::from_options(None, None, vec![]),
        Err(SchemaError::MissingSource)
    ));
    assert!(matches!(
        SchemaSource::from_options(proto(), None, vec![]),
        Ok(SchemaSource::Inline { .. })
    ));
    assert!(matches!(
        SchemaSource::from_options(None, set(), vec![]),
        Ok(SchemaSource::Protoset(_))
    ));
}

#[test]
fn field_schema_reports_kind_and_cardinality() {
    let schema = echo_request();
    assert_eq!(schema.name(), "labench.test.EchoRequest");

    let id = schema.field("id").unwrap();
    assert_eq!(id.kind(), FieldKind::Numeric(Numeric::I32));
    assert_eq!(id.cardinality(), Cardinality::Singular);

    let tags = schema.field("tags").unwrap();
    assert_eq!(tags.kind(), FieldKind::String);
    assert_eq!(tags.cardinality(), Cardinality::Repeated);

    let delta = schema.field("delta").unwrap();
    assert_eq!(delta.kind(), FieldKind::Numeric(Numeric::I32));

    let small = schema.field("small").unwrap();
    assert_eq!(small.kind(), FieldKind::Numeric(Numeric::U32));

    let Cardinality::Map { key, value } = schema.field("counts").unwrap().cardinality() else {
        panic!("`counts` should be a map");
    };
    assert_eq!(key.kind(), FieldKind::String);
    assert_eq!(value.kind(), FieldKind::Numeric(Numeric::I32));

    let Cardinality::Map { key, value } = schema.field("lookup").unwrap().cardinality() else {
        panic!("`lookup` should be a map");
    };
    assert_eq!(key.kind(), FieldKind::Numeric(Numeric::I32));
    assert!(matches!(value.kind(), FieldKind::Message(m) if m.name() == "labench.common.Label"));

    assert!(matches!(schema.field("color").unwrap().kind(), FieldKind::Enum(_)));
    assert!(schema.field("nope").is_none());
}
