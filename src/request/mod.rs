//! Inbound request handling.
//!
//! - [`types`]: OpenAI chat-completion request shape
//! - [`compiler`]: mapping onto backend request inputs

pub mod compiler;
pub mod types;

pub use compiler::{CompileError, RequestCompiler};
pub use types::ChatCompletionRequest;
