//! ark-gateway: OpenAI-compatible chat completions over a streaming gRPC
//! inference backend.
//!
//! An HTTP request is compiled into a map of tagged values, sent as one
//! server-streaming call to a randomly chosen backend host, and every
//! returned frame is relayed as an SSE chunk or merged into a single JSON
//! completion.

pub mod aggregate;
pub mod codec;
pub mod config;
pub mod request;
pub mod rpc;
pub mod server;
