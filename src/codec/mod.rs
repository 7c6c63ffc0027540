//! Typed-value codec.
//!
//! Converts between the in-memory [`Value`] domain and the self-describing
//! [`TaggedValue`](crate::rpc::proto::TaggedValue) carried on the RPC wire:
//! - [`value`]: the `Value` sum type and its JSON bridge
//! - [`tagged`]: `encode` / `decode` against the wire representation

pub mod tagged;
pub mod value;

use thiserror::Error;

pub use tagged::{decode, decode_fields, encode, encode_fields};
pub use value::Value;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodecError {
    /// The input cannot be represented in the value domain.
    #[error("unsupported value type: {0}")]
    UnsupportedValueType(String),

    /// A wire value populated a field number this codec does not recognize.
    #[error("unknown tagged value kind (field number {0})")]
    UnknownTaggedKind(u32),
}
