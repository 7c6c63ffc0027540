//! Wire messages and client stub for the `ark.Inference` service.
//!
//! Written in the shape `tonic-prost-build` emits, so the crate builds
//! without `protoc`. The matching schema:
//!
//! ```proto
//! message Value {
//!   oneof kind {
//!     int64 int64_ = 1;  double float_ = 2;  bytes bytes_ = 3;
//!     string string_ = 4;  bool bool_ = 5;
//!     Int64List int64_list = 6;  FloatList float_list = 7;
//!     BytesList bytes_list = 8;  StringList string_list = 9;
//!     ValueList value_list = 10;  Struct struct_ = 11;  Int64Dict int64_dict = 12;
//!   }
//! }
//! message InferenceRequest { string req_id = 1; string model_name = 2;
//!   string method = 3; map<string, Value> inputs = 4; }
//! message InferenceResponse { string req_id = 1; string model_name = 2;
//!   map<string, Value> outputs = 3; }
//! service Inference {
//!   rpc StreamingCall(InferenceRequest) returns (stream InferenceResponse);
//! }
//! ```

use std::collections::HashMap;

use prost::bytes::{Buf, BufMut};
use prost::encoding::{skip_field, DecodeContext, WireType};
use prost::DecodeError;

/// Highest field number of the `kind` oneof.
const LAST_KIND_TAG: u32 = 12;

/// A self-describing value: exactly one `kind` is populated, or none for null.
///
/// `Message` is implemented by hand so that a populated field outside the
/// known oneof is remembered in `unknown_kind` instead of being skipped.
#[derive(Clone, PartialEq, Default, Debug)]
pub struct TaggedValue {
    pub kind: Option<tagged_value::Kind>,
    pub unknown_kind: Option<u32>,
}

pub mod tagged_value {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Kind {
        #[prost(int64, tag = "1")]
        Int64(i64),
        #[prost(double, tag = "2")]
        Float64(f64),
        #[prost(bytes = "vec", tag = "3")]
        Bytes(::prost::alloc::vec::Vec<u8>),
        #[prost(string, tag = "4")]
        String(::prost::alloc::string::String),
        #[prost(bool, tag = "5")]
        Bool(bool),
        #[prost(message, tag = "6")]
        Int64List(super::Int64List),
        #[prost(message, tag = "7")]
        Float64List(super::FloatList),
        #[prost(message, tag = "8")]
        BytesList(super::BytesList),
        #[prost(message, tag = "9")]
        StringList(super::StringList),
        #[prost(message, tag = "10")]
        ValueList(super::ValueList),
        #[prost(message, tag = "11")]
        Struct(super::Struct),
        #[prost(message, tag = "12")]
        Int64Dict(super::Int64Dict),
    }
}

impl TaggedValue {
    pub fn new(kind: tagged_value::Kind) -> Self {
        Self {
            kind: Some(kind),
            unknown_kind: None,
        }
    }
}

impl ::prost::Message for TaggedValue {
    fn encode_raw(&self, buf: &mut impl BufMut) {
        if let Some(kind) = &self.kind {
            kind.encode(buf);
        }
    }

    fn merge_field(
        &mut self,
        tag: u32,
        wire_type: WireType,
        buf: &mut impl Buf,
        ctx: DecodeContext,
    ) -> Result<(), DecodeError> {
        if (1..=LAST_KIND_TAG).contains(&tag) {
            tagged_value::Kind::merge(&mut self.kind, tag, wire_type, buf, ctx)
        } else {
            self.unknown_kind = Some(tag);
            skip_field(wire_type, tag, buf, ctx)
        }
    }

    fn encoded_len(&self) -> usize {
        self.kind
            .as_ref()
            .map_or(0, tagged_value::Kind::encoded_len)
    }

    fn clear(&mut self) {
        self.kind = None;
        self.unknown_kind = None;
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Int64List {
    #[prost(int64, repeated, tag = "1")]
    pub values: ::prost::alloc::vec::Vec<i64>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FloatList {
    #[prost(double, repeated, tag = "1")]
    pub values: ::prost::alloc::vec::Vec<f64>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BytesList {
    #[prost(bytes = "vec", repeated, tag = "1")]
    pub values: ::prost::alloc::vec::Vec<::prost::alloc::vec::Vec<u8>>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StringList {
    #[prost(string, repeated, tag = "1")]
    pub values: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ValueList {
    #[prost(message, repeated, tag = "1")]
    pub values: ::prost::alloc::vec::Vec<TaggedValue>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Struct {
    #[prost(map = "string, message", tag = "1")]
    pub fields: HashMap<::prost::alloc::string::String, TaggedValue>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Int64Dict {
    #[prost(map = "int64, message", tag = "1")]
    pub fields: HashMap<i64, TaggedValue>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InferenceRequest {
    #[prost(string, tag = "1")]
    pub req_id: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub model_name: ::prost::alloc::string::String,
    #[prost(string, tag = "3")]
    pub method: ::prost::alloc::string::String,
    #[prost(map = "string, message", tag = "4")]
    pub inputs: HashMap<::prost::alloc::string::String, TaggedValue>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InferenceResponse {
    #[prost(string, tag = "1")]
    pub req_id: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub model_name: ::prost::alloc::string::String,
    #[prost(map = "string, message", tag = "3")]
    pub outputs: HashMap<::prost::alloc::string::String, TaggedValue>,
}

pub mod inference_client {
    use tonic::codegen::http::uri::PathAndQuery;
    use tonic::transport::Channel;
    use tonic::{GrpcMethod, Request, Response, Status, Streaming};

    const SERVICE: &str = "ark.Inference";

    #[derive(Debug, Clone)]
    pub struct InferenceClient {
        inner: tonic::client::Grpc<Channel>,
    }

    impl InferenceClient {
        pub fn new(channel: Channel) -> Self {
            Self {
                inner: tonic::client::Grpc::new(channel),
            }
        }

        pub async fn streaming_call(
            &mut self,
            request: super::InferenceRequest,
        ) -> Result<Response<Streaming<super::InferenceResponse>>, Status> {
            self.inner
                .ready()
                .await
                .map_err(|e| Status::unknown(format!("Service was not ready: {e}")))?;
            let codec = tonic_prost::ProstCodec::default();
            let path = PathAndQuery::from_static("/ark.Inference/StreamingCall");
            let mut req = Request::new(request);
            req.extensions_mut()
                .insert(GrpcMethod::new(SERVICE, "StreamingCall"));
            self.inner.server_streaming(req, path, codec).await
        }
    }
}
