//! Backend access.
//!
//! [`InferenceBackend`] is the seam between the HTTP handlers and the RPC
//! transport. [`GrpcBackend`] opens one channel per call to a backend host
//! picked at random, and ties that channel's lifetime to the returned frame
//! stream: dropping the stream cancels the call and releases the channel.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{BoxStream, Stream};
use rand::Rng;
use thiserror::Error;
use tonic::transport::{Channel, Endpoint};
use tonic::{Code, Status, Streaming};
use tracing::{debug, info};

use crate::config::BackendConfig;
use crate::rpc::proto::inference_client::InferenceClient;
use crate::rpc::proto::{InferenceRequest, InferenceResponse};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("invalid backend endpoint {endpoint}: {message}")]
    InvalidEndpoint { endpoint: String, message: String },

    #[error("failed to connect to backend {endpoint}: {message}")]
    Connect { endpoint: String, message: String },

    #[error("backend call failed ({code}): {message}")]
    CallFailed { code: i32, message: String },
}

impl BackendError {
    /// gRPC status code describing the failure.
    pub fn code(&self) -> i32 {
        match self {
            BackendError::InvalidEndpoint { .. } => Code::InvalidArgument as i32,
            BackendError::Connect { .. } => Code::Unavailable as i32,
            BackendError::CallFailed { code, .. } => *code,
        }
    }

    pub fn message(&self) -> String {
        match self {
            BackendError::CallFailed { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<Status> for BackendError {
    fn from(status: Status) -> Self {
        BackendError::CallFailed {
            code: status.code() as i32,
            message: status.message().to_string(),
        }
    }
}

/// Ordered frames of one streaming call.
pub type FrameStream = BoxStream<'static, Result<InferenceResponse, BackendError>>;

#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Issue one streaming call. Frames arrive in delivery order.
    async fn streaming_call(&self, request: InferenceRequest) -> Result<FrameStream, BackendError>;
}

/// gRPC backend with one-shot random host selection and no failover.
#[derive(Debug, Clone)]
pub struct GrpcBackend {
    hosts: Vec<String>,
    port: u16,
}

impl GrpcBackend {
    pub fn new(hosts: Vec<String>, port: u16) -> Self {
        Self { hosts, port }
    }

    pub fn from_config(config: &BackendConfig) -> Self {
        Self::new(config.hosts(), config.grpc_port)
    }

    /// Pick the endpoint for one call, uniformly at random among the hosts.
    pub fn select_endpoint(&self) -> String {
        let host = match self.hosts.len() {
            0 => "0.0.0.0",
            1 => self.hosts[0].as_str(),
            n => self.hosts[rand::rng().random_range(0..n)].as_str(),
        };
        format!("http://{host}:{}", self.port)
    }

    async fn connect(&self, endpoint: &str) -> Result<Channel, BackendError> {
        Endpoint::from_shared(endpoint.to_string())
            .map_err(|e| BackendError::InvalidEndpoint {
                endpoint: endpoint.to_string(),
                message: e.to_string(),
            })?
            .tcp_nodelay(true)
            .http2_keep_alive_interval(Duration::from_secs(30))
            .connect()
            .await
            .map_err(|e| BackendError::Connect {
                endpoint: endpoint.to_string(),
                message: e.to_string(),
            })
    }
}

#[async_trait]
impl InferenceBackend for GrpcBackend {
    async fn streaming_call(&self, request: InferenceRequest) -> Result<FrameStream, BackendError> {
        let endpoint = self.select_endpoint();
        info!(
            request_id = request.req_id,
            backend = endpoint,
            "Dispatching streaming call"
        );

        let channel = self.connect(&endpoint).await?;
        let mut client = InferenceClient::new(channel);
        let response = client.streaming_call(request).await?;

        Ok(Box::pin(CallStream {
            inner: response.into_inner(),
            _client: client,
        }))
    }
}

/// Frame stream that keeps its call's channel alive until it is dropped.
struct CallStream {
    inner: Streaming<InferenceResponse>,
    _client: InferenceClient,
}

impl Stream for CallStream {
    type Item = Result<InferenceResponse, BackendError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner)
            .poll_next(cx)
            .map(|frame| frame.map(|r| r.map_err(BackendError::from)))
    }
}

impl Drop for CallStream {
    fn drop(&mut self) {
        debug!("Releasing backend channel");
    }
}
