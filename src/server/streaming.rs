//! SSE (Server-Sent Events) streaming for chat-completion chunks.
//!
//! Every backend frame becomes one chunk, emitted as soon as it arrives.
//! The stream ends with a `[DONE]` sentinel, or with a single in-band error
//! event when the backend call or a frame fails.

use std::collections::HashSet;
use std::convert::Infallible;

use axum::body::Body;
use axum::http::header;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::stream::{self, BoxStream, Stream};
use serde::Serialize;
use tokio_stream::StreamExt;
use tracing::{debug, warn};

use crate::aggregate::ChoiceFrame;
use crate::config::SseFraming;
use crate::rpc::{BackendError, FrameStream};
use crate::server::openai_api::{Envelope, ErrorResponse, Usage, ASSISTANT_ROLE, SYSTEM_FINGERPRINT};

/// Streaming chat completion chunk (OpenAI-compatible).
#[derive(Debug, Serialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub model: String,
    pub system_fingerprint: String,
    pub choices: Vec<ChunkChoice>,
    pub usage: Option<Usage>,
}

#[derive(Debug, Serialize)]
pub struct ChunkChoice {
    pub index: i64,
    pub delta: ChunkDelta,
    /// Empty until the terminal chunk for this index.
    pub finish_reason: String,
}

#[derive(Debug, Serialize)]
pub struct ChunkDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<serde_json::Value>,
}

/// Turns choice frames into chunks for one request.
///
/// The role is announced on the first chunk of each choice index. Usage is
/// attached to every chunk whose frame carries it, unless the client asked
/// for `include_usage`, in which case only terminal chunks carry it.
pub struct ChunkBuilder {
    envelope: Envelope,
    include_usage: bool,
    announced: HashSet<i64>,
}

impl ChunkBuilder {
    pub fn new(envelope: Envelope, include_usage: bool) -> Self {
        Self {
            envelope,
            include_usage,
            announced: HashSet::new(),
        }
    }

    pub fn chunk(&mut self, frame: ChoiceFrame) -> ChatCompletionChunk {
        let role = self
            .announced
            .insert(frame.index)
            .then(|| ASSISTANT_ROLE.to_string());
        let usage = if !self.include_usage || frame.is_terminal() {
            frame.usage.map(Usage::from)
        } else {
            None
        };

        ChatCompletionChunk {
            id: self.envelope.id.clone(),
            object: "chat.completion.chunk".to_string(),
            created: self.envelope.created,
            model: self.envelope.model.clone(),
            system_fingerprint: SYSTEM_FINGERPRINT.to_string(),
            choices: vec![ChunkChoice {
                index: frame.index,
                delta: ChunkDelta {
                    role,
                    content: frame.content,
                    reasoning_content: frame.reasoning_content,
                    tool_calls: frame.tool_calls,
                },
                finish_reason: frame.finish_reason,
            }],
            usage,
        }
    }
}

/// One outbound SSE payload.
#[derive(Debug)]
pub enum StreamEvent {
    Chunk(ChatCompletionChunk),
    Error(ErrorResponse),
    Done,
}

impl StreamEvent {
    /// The `data` field of the event.
    pub fn data(&self) -> String {
        match self {
            StreamEvent::Chunk(chunk) => serde_json::to_string(chunk).unwrap_or_default(),
            StreamEvent::Error(err) => serde_json::to_string(err).unwrap_or_default(),
            StreamEvent::Done => "[DONE]".to_string(),
        }
    }
}

impl From<&BackendError> for StreamEvent {
    fn from(err: &BackendError) -> Self {
        StreamEvent::Error(ErrorResponse::new(err.code(), err.message()))
    }
}

/// Map a frame stream onto SSE events, one per frame, then `[DONE]`.
///
/// A backend fault or an undecodable frame yields one error event and ends
/// the stream; the frame stream is dropped with it, which cancels the call.
pub fn frames_to_events(
    frames: FrameStream,
    builder: ChunkBuilder,
) -> impl Stream<Item = StreamEvent> + Send + 'static {
    stream::unfold(Some((frames, builder)), |state| async move {
        let (mut frames, mut builder) = state?;
        match frames.next().await {
            Some(Ok(frame)) => match ChoiceFrame::from_response(&frame) {
                Ok(choice) => {
                    debug!(
                        index = choice.index,
                        finish_reason = choice.finish_reason,
                        "Streaming frame"
                    );
                    let event = StreamEvent::Chunk(builder.chunk(choice));
                    Some((event, Some((frames, builder))))
                }
                Err(e) => {
                    warn!(error = %e, "Undecodable frame, ending stream");
                    Some((StreamEvent::Error(ErrorResponse::new(500, e.to_string())), None))
                }
            },
            Some(Err(e)) => {
                warn!(error = %e, "Backend failed mid-stream");
                Some((StreamEvent::from(&e), None))
            }
            None => Some((StreamEvent::Done, None)),
        }
    })
}

/// Wrap events in an HTTP response using the configured framing. Both
/// framings put identical `data: <payload>\n\n` bytes on the wire; no
/// keep-alive comments are interleaved.
pub fn sse_response(events: BoxStream<'static, StreamEvent>, framing: SseFraming) -> Response {
    match framing {
        SseFraming::Raw => {
            let body = events.map(|event| {
                Ok::<_, Infallible>(Bytes::from(format!("data: {}\n\n", event.data())))
            });
            (
                [
                    (header::CONTENT_TYPE, "text/event-stream"),
                    (header::CACHE_CONTROL, "no-cache"),
                ],
                Body::from_stream(body),
            )
                .into_response()
        }
        SseFraming::Event => {
            let sse = events.map(|event| Ok::<_, Infallible>(Event::default().data(event.data())));
            Sse::new(sse).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::UsageSnapshot;

    fn builder(include_usage: bool) -> ChunkBuilder {
        ChunkBuilder::new(
            Envelope {
                id: "chatcmpl-1".into(),
                created: 1,
                model: "m".into(),
            },
            include_usage,
        )
    }

    fn frame(index: i64, content: &str, finish: &str, usage: bool) -> ChoiceFrame {
        ChoiceFrame {
            index,
            content: content.into(),
            finish_reason: finish.into(),
            usage: usage.then_some(UsageSnapshot {
                prompt_tokens: 5,
                completion_tokens: 1,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_role_announced_once_per_index() {
        let mut b = builder(false);
        let first = b.chunk(frame(0, "a", "", false));
        let second = b.chunk(frame(0, "b", "", false));
        let other = b.chunk(frame(1, "c", "", false));

        assert_eq!(first.choices[0].delta.role.as_deref(), Some("assistant"));
        assert_eq!(second.choices[0].delta.role, None);
        assert_eq!(other.choices[0].delta.role.as_deref(), Some("assistant"));
    }

    #[test]
    fn test_include_usage_holds_usage_until_terminal() {
        let mut b = builder(true);
        assert!(b.chunk(frame(0, "a", "", true)).usage.is_none());
        assert!(b.chunk(frame(0, "b", "stop", true)).usage.is_some());
    }

    #[test]
    fn test_usage_on_every_carrying_chunk_without_include_usage() {
        let mut b = builder(false);
        assert!(b.chunk(frame(0, "a", "", true)).usage.is_some());
        assert!(b.chunk(frame(0, "b", "", false)).usage.is_none());
    }

    #[test]
    fn test_chunk_json_shape() {
        let mut b = builder(false);
        let json = serde_json::to_value(b.chunk(frame(0, "Hi", "", false))).unwrap();
        assert_eq!(json["object"], "chat.completion.chunk");
        assert_eq!(json["system_fingerprint"], "fp");
        assert_eq!(json["choices"][0]["delta"]["content"], "Hi");
        assert_eq!(json["choices"][0]["finish_reason"], "");
        assert!(json["usage"].is_null());
        assert!(json["choices"][0]["delta"].get("tool_calls").is_none());
    }

    #[test]
    fn test_error_event_data() {
        let err = BackendError::CallFailed {
            code: 14,
            message: "unavailable".into(),
        };
        assert_eq!(
            StreamEvent::from(&err).data(),
            r#"{"error":{"code":14,"message":"unavailable"}}"#
        );
        assert_eq!(StreamEvent::Done.data(), "[DONE]");
    }
}
