//! RPC boundary to the inference backend.
//!
//! - [`proto`]: protobuf messages and the `ark.Inference` client stub
//! - [`client`]: backend trait, gRPC implementation, host selection

pub mod client;
pub mod proto;

pub use client::{BackendError, FrameStream, GrpcBackend, InferenceBackend};
