//! Request compiler: chat-completion request to backend `InferenceRequest`.
//!
//! The compiled inputs are a flat mapping of field name to value. Messages
//! are laid out according to [`MessageEncoding`]; sampling parameters are
//! included only when the client set them.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::codec::{encode_fields, CodecError, Value};
use crate::config::MessageEncoding;
use crate::request::types::{
    ChatCompletionRequest, ChatMessage, ContentPart, MessageContent, StopSequences,
};
use crate::rpc::proto::InferenceRequest;

#[derive(Error, Debug)]
pub enum CompileError {
    #[error("content part type {0:?} is not supported")]
    UnsupportedContentPart(String),

    #[error("{part} content part is missing {field}")]
    MalformedContentPart {
        part: &'static str,
        field: &'static str,
    },

    #[error("image payload is not valid base64: {0}")]
    InvalidImagePayload(#[from] base64::DecodeError),

    #[error("logit_bias key {0:?} is not an integer token id")]
    InvalidLogitBias(String),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Default `detail` for image parts that do not set one.
const DEFAULT_IMAGE_DETAIL: &str = "high";

#[derive(Debug, Clone, Copy, Default)]
pub struct RequestCompiler {
    encoding: MessageEncoding,
}

impl RequestCompiler {
    pub fn new(encoding: MessageEncoding) -> Self {
        Self { encoding }
    }

    /// Compile a request under a fresh request id.
    ///
    /// Nothing is returned on failure, so a rejected request never reaches
    /// the backend.
    pub fn compile(&self, request: &ChatCompletionRequest) -> Result<InferenceRequest, CompileError> {
        let inputs = self.compile_inputs(request)?;
        Ok(InferenceRequest {
            req_id: Uuid::new_v4().to_string(),
            model_name: request.model.clone(),
            method: String::new(),
            inputs: encode_fields(&inputs),
        })
    }

    /// Build the named input values.
    pub fn compile_inputs(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<BTreeMap<String, Value>, CompileError> {
        let mut inputs = BTreeMap::new();

        match self.encoding {
            MessageEncoding::Structured => structured_messages(&request.messages, &mut inputs)?,
            MessageEncoding::Legacy => legacy_messages(&request.messages, &mut inputs)?,
        }

        if let Some(stop) = &request.stop {
            let stop = match stop {
                StopSequences::Single(s) => Value::from(s.as_str()),
                StopSequences::Many(list) => {
                    Value::List(list.iter().map(|s| Value::from(s.as_str())).collect())
                }
            };
            inputs.insert("stop".into(), stop);
        }
        if let Some(max_tokens) = request.max_tokens {
            inputs.insert("max_new_tokens".into(), Value::Int(max_tokens));
        }
        if let Some(n) = request.n {
            inputs.insert("n".into(), Value::Int(n));
        }
        for (key, param) in [
            ("temperature", request.temperature),
            ("top_p", request.top_p),
            ("presence_penalty", request.presence_penalty),
            ("frequency_penalty", request.frequency_penalty),
        ] {
            if let Some(v) = param {
                inputs.insert(key.into(), Value::Float(v));
            }
        }
        if request.logprobs == Some(true) {
            let top = request.top_logprobs.unwrap_or(1);
            inputs.insert("logprobs".into(), Value::Int(top));
        }
        if let Some(bias) = &request.logit_bias {
            let entries = bias
                .iter()
                .map(|(token, weight)| {
                    let token_id = token
                        .trim()
                        .parse::<i64>()
                        .map_err(|_| CompileError::InvalidLogitBias(token.clone()))?;
                    Ok((token_id, Value::Float(*weight)))
                })
                .collect::<Result<Vec<_>, CompileError>>()?;
            inputs.insert("logit_bias".into(), Value::int_map(entries));
        }
        if let Some(format) = &request.response_format {
            let json = serde_json::to_value(format)?;
            inputs.insert("response_format".into(), Value::try_from(json)?);
        }
        if let Some(grammar) = &request.guided_grammar {
            inputs.insert("guided_grammar".into(), Value::from(grammar.as_str()));
        }
        if let Some(tools) = &request.tools {
            let json = serde_json::to_value(tools)?;
            inputs.insert("tools".into(), Value::try_from(json)?);
        }

        debug!(
            encoding = ?self.encoding,
            fields = inputs.len(),
            "Compiled request inputs"
        );
        Ok(inputs)
    }
}

/// One struct per message under `messages`.
fn structured_messages(
    messages: &[ChatMessage],
    inputs: &mut BTreeMap<String, Value>,
) -> Result<(), CompileError> {
    let mut compiled = Vec::with_capacity(messages.len());
    for msg in messages {
        let content = match &msg.content {
            None => Value::from(""),
            Some(MessageContent::Text(text)) => Value::from(text.as_str()),
            Some(MessageContent::Parts(parts)) => Value::List(
                parts
                    .iter()
                    .map(structured_part)
                    .collect::<Result<_, _>>()?,
            ),
        };
        let mut fields = BTreeMap::new();
        fields.insert("role".to_string(), Value::from(msg.role.as_str()));
        fields.insert("content".to_string(), content);
        if let Some(name) = &msg.name {
            fields.insert("name".to_string(), Value::from(name.as_str()));
        }
        compiled.push(Value::Map(fields));
    }
    inputs.insert("messages".into(), Value::List(compiled));
    Ok(())
}

fn structured_part(part: &ContentPart) -> Result<Value, CompileError> {
    match part.kind.as_str() {
        "text" => Ok(Value::string_map([
            ("type", Value::from("text")),
            ("text", Value::from(part.text.as_deref().unwrap_or_default())),
        ])),
        "image_url" => {
            let image = part
                .image_url
                .as_ref()
                .ok_or(CompileError::MalformedContentPart {
                    part: "image_url",
                    field: "image_url",
                })?;
            let detail = image.detail.as_deref().unwrap_or(DEFAULT_IMAGE_DETAIL);
            Ok(Value::string_map([
                ("type", Value::from("image_url")),
                (
                    "image_url",
                    Value::string_map([
                        ("url", Value::from(image.url.as_str())),
                        ("detail", Value::from(detail)),
                    ]),
                ),
            ]))
        }
        other => Err(CompileError::UnsupportedContentPart(other.to_string())),
    }
}

/// Text messages go to parallel `messages.role` / `messages.content` lists.
/// Multi-part messages are merged into one struct each under `messages`,
/// with images decoded from their base64 data URLs into raw bytes.
fn legacy_messages(
    messages: &[ChatMessage],
    inputs: &mut BTreeMap<String, Value>,
) -> Result<(), CompileError> {
    let mut roles = Vec::new();
    let mut contents = Vec::new();
    let mut names = Vec::new();
    let mut merged = Vec::new();

    for msg in messages {
        match &msg.content {
            Some(MessageContent::Parts(parts)) => merged.push(legacy_merged_message(msg, parts)?),
            text => {
                let text = match text {
                    Some(MessageContent::Text(t)) => t.as_str(),
                    _ => "",
                };
                roles.push(legacy_text(&msg.role));
                contents.push(legacy_text(text));
                if let Some(name) = &msg.name {
                    names.push(legacy_text(name));
                }
            }
        }
    }

    if !roles.is_empty() {
        // Legacy consumers zip names with contents, so names go out only
        // when every flattened message carries one.
        if names.len() == roles.len() {
            inputs.insert("messages.name".into(), Value::List(names));
        } else if !names.is_empty() {
            debug!(
                named = names.len(),
                messages = roles.len(),
                "Dropping partial messages.name list"
            );
        }
        inputs.insert("messages.role".into(), Value::List(roles));
        inputs.insert("messages.content".into(), Value::List(contents));
    }
    if !merged.is_empty() {
        inputs.insert("messages".into(), Value::List(merged));
    }
    Ok(())
}

fn legacy_merged_message(msg: &ChatMessage, parts: &[ContentPart]) -> Result<Value, CompileError> {
    let mut text = String::new();
    let mut images = Vec::new();
    for part in parts {
        match part.kind.as_str() {
            "text" => text.push_str(part.text.as_deref().unwrap_or_default()),
            "image_url" => {
                let image = part
                    .image_url
                    .as_ref()
                    .ok_or(CompileError::MalformedContentPart {
                        part: "image_url",
                        field: "image_url",
                    })?;
                images.push(Value::Bytes(decode_image_url(&image.url)?));
            }
            other => return Err(CompileError::UnsupportedContentPart(other.to_string())),
        }
    }

    let mut fields = BTreeMap::new();
    fields.insert("role".to_string(), Value::from(msg.role.as_str()));
    fields.insert("content".to_string(), Value::String(text));
    if !images.is_empty() {
        fields.insert("image".to_string(), Value::List(images));
    }
    if let Some(name) = &msg.name {
        fields.insert("name".to_string(), Value::from(name.as_str()));
    }
    Ok(Value::Map(fields))
}

/// Legacy consumers read the flattened lists as bytes, so text goes out as
/// UTF-8 bytes and the list encodes as `BytesList`.
fn legacy_text(text: &str) -> Value {
    Value::Bytes(text.as_bytes().to_vec())
}

/// Decode the payload of a `data:<mime>;base64,<payload>` URL. A bare
/// base64 string is accepted as well.
fn decode_image_url(url: &str) -> Result<Vec<u8>, CompileError> {
    let payload = url.rsplit(',').next().unwrap_or(url);
    Ok(STANDARD.decode(payload.trim())?)
}
