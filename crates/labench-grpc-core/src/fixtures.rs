//! Shared schema fixtures for unit tests.

use crate::schema::{MessageSchema, SchemaSource, resolve_method};
use bytes::Bytes;
use prost::Message;
use prost_reflect::MethodDescriptor;
use std::path::PathBuf;
use std::sync::OnceLock;

pub(crate) const ECHO_PROTO: &str = include_str!("../testdata/echo.proto");
pub(crate) const ECHO_CALL: &str = "labench.test.Echo/Send";

pub(crate) fn testdata() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("testdata")
}

pub(crate) fn echo_source() -> SchemaSource {
    SchemaSource::Inline {
        name: "echo.proto".to_owned(),
        source: ECHO_PROTO.to_owned(),
        import_paths: vec![testdata()],
    }
}

/// Compiled once so every test shares a single descriptor pool and
/// messages built in different tests compare equal.
pub(crate) fn echo_method() -> MethodDescriptor {
    static METHOD: OnceLock<MethodDescriptor> = OnceLock::new();
    METHOD
        .get_or_init(|| resolve_method(ECHO_CALL, &echo_source()).unwrap())
        .clone()
}

pub(crate) fn echo_request() -> MessageSchema {
    MessageSchema::new(echo_method().input())
}

/// The echo schema compiled and encoded as a self-contained descriptor set.
pub(crate) fn echo_protoset() -> Bytes {
    let method = echo_method();
    let set = prost_types::FileDescriptorSet {
        file: method
            .parent_pool()
            .file_descriptor_protos()
            .cloned()
            .collect(),
    };
    Bytes::from(set.encode_to_vec())
}
