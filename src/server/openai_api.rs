//! OpenAI-compatible HTTP API.
//!
//! Implements the subset of the OpenAI API the gateway fronts:
//! - POST /v1/chat/completions
//! - GET /v1/models
//! - GET /health

use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream::BoxStream;
use serde::Serialize;
use thiserror::Error;
use tokio_stream::StreamExt;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::aggregate::{
    AggregatedCompletion, ChoiceFrame, FrameError, ResponseAggregator, UsageSnapshot, UsageTotals,
};
use crate::config::Config;
use crate::request::{ChatCompletionRequest, CompileError, RequestCompiler};
use crate::rpc::{BackendError, FrameStream, InferenceBackend};
use crate::server::streaming::{frames_to_events, sse_response, ChunkBuilder, StreamEvent};

pub const ASSISTANT_ROLE: &str = "assistant";
pub const SYSTEM_FINGERPRINT: &str = "fp";

/// Application state shared across handlers. Holds no per-request state.
pub struct AppState {
    pub backend: Arc<dyn InferenceBackend>,
    pub compiler: RequestCompiler,
    pub config: Arc<Config>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(backend: Arc<dyn InferenceBackend>, config: Arc<Config>) -> Self {
        Self {
            backend,
            compiler: RequestCompiler::new(config.compat.message_encoding),
            config,
            start_time: Instant::now(),
        }
    }
}

/// Build the axum router with all API routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/chat/completions", post(chat_completions))
        .route("/v1/models", get(list_models))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ─── Errors ────────────────────────────────────────────────────────────────

/// Failure of one chat-completion call. Never affects other requests.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// `{"error": {"code": ..., "message": ...}}`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorDetail {
    pub code: i32,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code,
                message: message.into(),
            },
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        error!(error = %self, "Chat completion failed");
        let status = StatusCode::INTERNAL_SERVER_ERROR;
        let body = ErrorResponse::new(i32::from(status.as_u16()), self.to_string());
        (status, Json(body)).into_response()
    }
}

// ─── Response Types ────────────────────────────────────────────────────────

/// Fields shared by every response object of one request.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub id: String,
    pub created: u64,
    pub model: String,
}

impl Envelope {
    pub fn new(model: String) -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self {
            id: format!("chatcmpl-{}", now.as_nanos()),
            created: now.as_secs(),
            model,
        }
    }
}

/// Chat completion response (non-streaming).
#[derive(Debug, Serialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub model: String,
    pub system_fingerprint: String,
    pub choices: Vec<ChatChoice>,
    pub usage: Usage,
}

#[derive(Debug, Serialize)]
pub struct ChatChoice {
    pub index: i64,
    pub message: ResponseMessage,
    pub finish_reason: String,
}

#[derive(Debug, Serialize)]
pub struct ResponseMessage {
    pub role: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Usage {
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_tokens: i64,
    pub completion_tokens_details: CompletionTokensDetails,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_tokens_details: Option<PromptTokensDetails>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionTokensDetails {
    pub reasoning_tokens: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromptTokensDetails {
    pub cached_tokens: i64,
}

impl Usage {
    fn new(prompt: i64, completion: i64, reasoning: i64, cached: Option<i64>) -> Self {
        Self {
            prompt_tokens: prompt,
            completion_tokens: completion,
            total_tokens: prompt.saturating_add(completion),
            completion_tokens_details: CompletionTokensDetails {
                reasoning_tokens: reasoning,
            },
            prompt_tokens_details: cached.map(|cached_tokens| PromptTokensDetails { cached_tokens }),
        }
    }
}

impl From<UsageSnapshot> for Usage {
    fn from(u: UsageSnapshot) -> Self {
        Usage::new(
            u.prompt_tokens,
            u.completion_tokens,
            u.reasoning_tokens,
            u.cached_tokens,
        )
    }
}

impl From<UsageTotals> for Usage {
    fn from(u: UsageTotals) -> Self {
        Usage::new(
            u.prompt_tokens,
            u.completion_tokens,
            u.reasoning_tokens,
            u.cached_tokens,
        )
    }
}

impl ChatCompletionResponse {
    pub fn from_aggregate(envelope: Envelope, completion: AggregatedCompletion) -> Self {
        Self {
            id: envelope.id,
            object: "chat.completion".to_string(),
            created: envelope.created,
            model: envelope.model,
            system_fingerprint: SYSTEM_FINGERPRINT.to_string(),
            choices: completion
                .choices
                .into_iter()
                .map(|c| ChatChoice {
                    index: c.index,
                    message: ResponseMessage {
                        role: ASSISTANT_ROLE.to_string(),
                        content: c.content,
                        reasoning_content: c.reasoning_content,
                        tool_calls: c.tool_calls,
                    },
                    finish_reason: c.finish_reason,
                })
                .collect(),
            usage: completion.usage.into(),
        }
    }
}

/// Model listing response.
#[derive(Debug, Serialize)]
pub struct ModelList {
    pub object: String,
    pub data: Vec<ModelInfo>,
}

#[derive(Debug, Serialize)]
pub struct ModelInfo {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub owned_by: String,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
}

// ─── Route Handlers ────────────────────────────────────────────────────────

async fn chat_completions(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatCompletionRequest>,
) -> Result<Response, GatewayError> {
    let inference = state.compiler.compile(&req)?;
    let request_id = inference.req_id.clone();

    info!(
        request_id = request_id,
        model = req.model,
        messages = req.messages.len(),
        stream = req.stream,
        "Chat completion request"
    );

    let envelope = Envelope::new(req.model.clone());

    if req.stream {
        // Status 200 is committed from here on; failures go in-band.
        let builder = ChunkBuilder::new(envelope, req.include_usage());
        let events: BoxStream<'static, StreamEvent> =
            match state.backend.streaming_call(inference).await {
                Ok(frames) => Box::pin(frames_to_events(frames, builder)),
                Err(e) => {
                    warn!(request_id = request_id, error = %e, "Backend call failed");
                    Box::pin(tokio_stream::once(StreamEvent::from(&e)))
                }
            };
        Ok(sse_response(events, state.config.compat.sse_framing))
    } else {
        let frames = state.backend.streaming_call(inference).await?;
        let completion = drain_frames(frames).await?;
        info!(
            request_id = request_id,
            choices = completion.choices.len(),
            completion_tokens = completion.usage.completion_tokens,
            "Chat completion finished"
        );
        Ok(Json(ChatCompletionResponse::from_aggregate(envelope, completion)).into_response())
    }
}

/// Drain every frame of one call into an aggregate. The first failure
/// aborts the whole call.
pub async fn drain_frames(mut frames: FrameStream) -> Result<AggregatedCompletion, GatewayError> {
    let mut aggregator = ResponseAggregator::new();
    while let Some(frame) = frames.next().await {
        aggregator.push(ChoiceFrame::from_response(&frame?)?);
    }
    Ok(aggregator.finish())
}

async fn list_models(State(state): State<Arc<AppState>>) -> Json<ModelList> {
    Json(ModelList {
        object: "list".to_string(),
        data: vec![ModelInfo {
            id: state.config.server.served_model.clone(),
            object: "model".to_string(),
            created: 0,
            owned_by: "ark".to_string(),
        }],
    })
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_totals_saturate() {
        let usage = Usage::from(UsageSnapshot {
            prompt_tokens: i64::MAX,
            completion_tokens: 10,
            reasoning_tokens: 3,
            cached_tokens: Some(4),
        });
        assert_eq!(usage.total_tokens, i64::MAX);
        assert_eq!(usage.completion_tokens_details.reasoning_tokens, 3);
        assert_eq!(usage.prompt_tokens_details, Some(PromptTokensDetails { cached_tokens: 4 }));
    }
}
