//! gRPC codec for schema-less calls.
//!
//! Requests are sent as pre-encoded protobuf bytes, so the payload is
//! serialized once per factory rather than once per call. Responses are
//! decoded into a [`DynamicMessage`] of the method's output type.

use bytes::{BufMut, Bytes};
use prost_reflect::{DynamicMessage, MessageDescriptor};
use tonic::Status;
use tonic::codec::{Codec, DecodeBuf, Decoder, EncodeBuf, Encoder};

#[derive(Clone, Debug)]
pub struct DynamicCodec {
    output: MessageDescriptor,
}

impl DynamicCodec {
    pub fn new(output: MessageDescriptor) -> Self {
        Self { output }
    }
}

impl Codec for DynamicCodec {
    type Encode = Bytes;
    type Decode = DynamicMessage;
    type Encoder = EncodedPayload;
    type Decoder = DynamicDecoder;

    fn encoder(&mut self) -> Self::Encoder {
        EncodedPayload
    }

    fn decoder(&mut self) -> Self::Decoder {
        DynamicDecoder {
            output: self.output.clone(),
        }
    }
}

/// Writes already-encoded message bytes through unchanged.
#[derive(Clone, Copy, Debug, Default)]
pub struct EncodedPayload;

impl Encoder for EncodedPayload {
    type Item = Bytes;
    type Error = Status;

    fn encode(&mut self, item: Bytes, dst: &mut EncodeBuf<'_>) -> Result<(), Status> {
        dst.put_slice(&item);
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct DynamicDecoder {
    output: MessageDescriptor,
}

impl Decoder for DynamicDecoder {
    type Item = DynamicMessage;
    type Error = Status;

    fn decode(&mut self, src: &mut DecodeBuf<'_>) -> Result<Option<DynamicMessage>, Status> {
        DynamicMessage::decode(self.output.clone(), src)
            .map(Some)
            .map_err(|e| Status::internal(format!("failed to decode response: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::DynamicCodec;
    use crate::fixtures::echo_method;
    use tonic::codec::Codec;

    #[test]
    fn decoder_targets_method_output() {
        let method = echo_method();
        let mut codec = DynamicCodec::new(method.output());
        let decoder = codec.decoder();
        assert_eq!(decoder.output.full_name(), "labench.test.EchoResponse");
    }
}
