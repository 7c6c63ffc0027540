//! HTTP server providing an OpenAI-compatible API.
//!
//! - [`openai_api`]: Request/response types and route handlers
//! - [`streaming`]: SSE relay of backend frames as completion chunks

pub mod openai_api;
pub mod streaming;
