//! Extraction of one choice update from a backend response frame.
//!
//! Backends report the choice as a `choice` struct and usage as a `usage`
//! struct. Older backends also, or instead, send flattened keys:
//! `choice.index`, `choice.finish_reason` (bytes), `choice.message.content`
//! (bytes), `usage.prompt_tokens`, `usage.completion_tokens`. The flattened
//! index and finish reason win when both forms are present.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::codec::{decode_fields, CodecError, Value};
use crate::rpc::proto::InferenceResponse;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FrameError {
    #[error("response frame is missing {0}")]
    MissingField(&'static str),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Token counts reported by one frame. Counts are cumulative per choice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageSnapshot {
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub reasoning_tokens: i64,
    pub cached_tokens: Option<i64>,
}

/// One frame's worth of output for one choice index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChoiceFrame {
    pub index: i64,
    pub content: String,
    pub reasoning_content: Option<String>,
    pub tool_calls: Vec<serde_json::Value>,
    /// Empty until the terminal frame for this index.
    pub finish_reason: String,
    pub usage: Option<UsageSnapshot>,
}

impl ChoiceFrame {
    pub fn is_terminal(&self) -> bool {
        !self.finish_reason.is_empty()
    }

    /// Decode a wire frame. Any undecodable value fails the whole frame.
    pub fn from_response(frame: &InferenceResponse) -> Result<Self, FrameError> {
        let outputs = decode_fields(&frame.outputs)?;
        Self::from_outputs(&outputs)
    }

    pub fn from_outputs(outputs: &BTreeMap<String, Value>) -> Result<Self, FrameError> {
        let choice = outputs.get("choice").filter(|c| c.as_map().is_some());
        let flat_content = outputs.get("choice.message.content");
        if choice.is_none() && flat_content.is_none() {
            return Err(FrameError::MissingField("choice"));
        }
        let message = choice.and_then(|c| c.get("message"));

        let index = outputs
            .get("choice.index")
            .and_then(Value::as_i64)
            .or_else(|| choice.and_then(|c| c.get("index")).and_then(Value::as_i64))
            .unwrap_or(0);

        let finish_reason = outputs
            .get("choice.finish_reason")
            .and_then(Value::to_text)
            .or_else(|| {
                choice
                    .and_then(|c| c.get("finish_reason"))
                    .and_then(Value::to_text)
            })
            .unwrap_or_default();

        let content = message
            .and_then(|m| m.get("content"))
            .and_then(Value::to_text)
            .or_else(|| flat_content.and_then(Value::to_text))
            .unwrap_or_default();

        let reasoning_content = message
            .and_then(|m| m.get("reasoning_content"))
            .and_then(Value::to_text);

        let tool_calls = match message.and_then(|m| m.get("tool_calls")) {
            Some(Value::List(calls)) => calls
                .iter()
                .cloned()
                .map(Value::into_json)
                .collect::<Result<_, _>>()?,
            _ => Vec::new(),
        };

        Ok(Self {
            index,
            content,
            reasoning_content,
            tool_calls,
            finish_reason,
            usage: usage_snapshot(outputs),
        })
    }
}

fn usage_snapshot(outputs: &BTreeMap<String, Value>) -> Option<UsageSnapshot> {
    let usage = outputs.get("usage").filter(|u| u.as_map().is_some());
    let count = |field: &str, flat: &str| {
        usage
            .and_then(|u| u.get(field))
            .and_then(Value::as_i64)
            .or_else(|| outputs.get(flat).and_then(Value::as_i64))
    };

    let prompt_tokens = count("prompt_tokens", "usage.prompt_tokens");
    let completion_tokens = count("completion_tokens", "usage.completion_tokens");
    if usage.is_none() && prompt_tokens.is_none() && completion_tokens.is_none() {
        return None;
    }

    let reasoning_tokens = usage
        .and_then(|u| u.get("completion_tokens_details"))
        .and_then(|d| d.get("reasoning_tokens"))
        .and_then(Value::as_i64)
        .unwrap_or(0);

    let cached_tokens = outputs
        .get("cache")
        .and_then(|c| c.get("prompt_cache_hit_tokens"))
        .and_then(Value::as_i64)
        .or_else(|| {
            outputs
                .get("cache.prompt_cache_hit_tokens")
                .and_then(Value::as_i64)
        });

    Some(UsageSnapshot {
        prompt_tokens: prompt_tokens.unwrap_or(0),
        completion_tokens: completion_tokens.unwrap_or(0),
        reasoning_tokens,
        cached_tokens,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde_json::json;

    use super::*;
    use crate::codec::encode;
    use crate::rpc::proto::TaggedValue;

    fn outputs(entries: Vec<(&str, Value)>) -> BTreeMap<String, Value> {
        entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }

    fn choice(index: i64, content: &str, finish: Value) -> Value {
        Value::string_map([
            (
                "message",
                Value::string_map([
                    ("role", Value::from("assistant")),
                    ("content", Value::from(content)),
                ]),
            ),
            ("index", Value::Int(index)),
            ("finish_reason", finish),
        ])
    }

    #[test]
    fn test_structured_frame() {
        let frame = ChoiceFrame::from_outputs(&outputs(vec![
            ("choice", choice(1, "Hi", Value::Null)),
            (
                "usage",
                Value::string_map([
                    ("prompt_tokens", Value::Int(5)),
                    ("completion_tokens", Value::Int(1)),
                    (
                        "completion_tokens_details",
                        Value::string_map([("reasoning_tokens", Value::Int(0))]),
                    ),
                ]),
            ),
        ]))
        .unwrap();

        assert_eq!(frame.index, 1);
        assert_eq!(frame.content, "Hi");
        assert_eq!(frame.finish_reason, "");
        assert!(!frame.is_terminal());
        assert_eq!(
            frame.usage,
            Some(UsageSnapshot {
                prompt_tokens: 5,
                completion_tokens: 1,
                ..Default::default()
            })
        );
    }

    #[test]
    fn test_flattened_fields_take_precedence() {
        let frame = ChoiceFrame::from_outputs(&outputs(vec![
            ("choice", choice(0, "!", Value::Null)),
            ("choice.index", Value::Int(2)),
            ("choice.finish_reason", Value::Bytes(b"length".to_vec())),
        ]))
        .unwrap();
        assert_eq!(frame.index, 2);
        assert_eq!(frame.finish_reason, "length");
        assert!(frame.usage.is_none());
    }

    #[test]
    fn test_flattened_only_frame() {
        let frame = ChoiceFrame::from_outputs(&outputs(vec![
            ("choice.message.content", Value::Bytes(b"old".to_vec())),
            ("choice.index", Value::Int(0)),
            ("choice.finish_reason", Value::Bytes(b"stop".to_vec())),
            ("usage.prompt_tokens", Value::Int(3)),
            ("usage.completion_tokens", Value::Int(4)),
            ("cache.prompt_cache_hit_tokens", Value::Int(2)),
        ]))
        .unwrap();
        assert_eq!(frame.content, "old");
        assert!(frame.is_terminal());
        assert_eq!(
            frame.usage,
            Some(UsageSnapshot {
                prompt_tokens: 3,
                completion_tokens: 4,
                reasoning_tokens: 0,
                cached_tokens: Some(2),
            })
        );
    }

    #[test]
    fn test_reasoning_and_tool_calls() {
        let message = Value::string_map([
            ("content", Value::from("")),
            ("reasoning_content", Value::from("thinking")),
            (
                "tool_calls",
                Value::List(vec![Value::string_map([
                    ("id", Value::from("call_1")),
                    ("type", Value::from("function")),
                    (
                        "function",
                        Value::string_map([
                            ("name", Value::from("lookup")),
                            ("arguments", Value::from("{}")),
                        ]),
                    ),
                ])]),
            ),
        ]);
        let frame = ChoiceFrame::from_outputs(&outputs(vec![(
            "choice",
            Value::string_map([("message", message), ("index", Value::Int(0))]),
        )]))
        .unwrap();

        assert_eq!(frame.reasoning_content.as_deref(), Some("thinking"));
        assert_eq!(
            frame.tool_calls,
            vec![json!({
                "id": "call_1",
                "type": "function",
                "function": {"name": "lookup", "arguments": "{}"}
            })]
        );
    }

    #[test]
    fn test_missing_choice() {
        let err = ChoiceFrame::from_outputs(&outputs(vec![("usage", Value::Map(BTreeMap::new()))]))
            .unwrap_err();
        assert_eq!(err, FrameError::MissingField("choice"));
    }

    #[test]
    fn test_unknown_kind_in_frame_is_named_error() {
        let mut wire = HashMap::new();
        wire.insert("choice".to_string(), encode(&choice(0, "x", Value::Null)));
        wire.insert(
            "extra".to_string(),
            TaggedValue {
                kind: None,
                unknown_kind: Some(42),
            },
        );
        let frame = InferenceResponse {
            req_id: "r".into(),
            model_name: "m".into(),
            outputs: wire,
        };
        assert_eq!(
            ChoiceFrame::from_response(&frame).unwrap_err(),
            FrameError::Codec(CodecError::UnknownTaggedKind(42))
        );
    }
}
