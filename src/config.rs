//! Runtime configuration for ark-gateway.
//!
//! Configuration is loaded from an optional JSON file, then overridden by
//! command-line flags and `HTTP_FORWARD_*` environment variables. It is fixed
//! for the lifetime of the process.

use std::path::PathBuf;

use clap::builder::BoolishValueParser;
use clap::Parser;
use serde::{Deserialize, Serialize};

/// Command-line arguments.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "ark-gateway",
    about = "OpenAI-compatible gateway for a streaming gRPC inference backend"
)]
pub struct Cli {
    /// Path to configuration file (JSON).
    #[arg(short, long, default_value = "config.json")]
    pub config: PathBuf,

    /// HTTP listen address.
    #[arg(long, env = "HTTP_FORWARD_LISTEN")]
    pub listen: Option<String>,

    /// Enable verbose logging.
    #[arg(short, long)]
    pub verbose: bool,

    /// Backend host, used when no host list is given.
    #[arg(long, env = "HTTP_FORWARD_GRPC_HOST")]
    pub grpc_host: Option<String>,

    /// Backend port shared by every host.
    #[arg(long, env = "HTTP_FORWARD_GRPC_PORT")]
    pub grpc_port: Option<u16>,

    /// Comma separated backend hosts; one is picked at random per request.
    #[arg(long, env = "HTTP_FORWARD_GRPC_HOST_LIST", value_delimiter = ',')]
    pub grpc_host_list: Option<Vec<String>>,

    /// Emit SSE frames as named `data` events instead of raw byte lines.
    #[arg(long, env = "HTTP_FORWARD_SSE_DATA_PREFIX", value_parser = BoolishValueParser::new())]
    pub sse_data_prefix: Option<bool>,

    /// Send messages in the legacy flattened layout.
    #[arg(long, env = "HTTP_FORWARD_COMPAT_LLMSERVER_VLM_V1", value_parser = BoolishValueParser::new())]
    pub compat_llmserver_vlm_v1: Option<bool>,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server configuration.
    pub server: ServerConfig,

    /// Backend endpoint configuration.
    pub backend: BackendConfig,

    /// Wire compatibility switches.
    pub compat: CompatConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address (e.g. "0.0.0.0:8080").
    pub listen: String,

    /// Model id reported by `/v1/models`.
    pub served_model: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".to_string(),
            served_model: "ark".to_string(),
        }
    }
}

/// Backend endpoint settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub grpc_host: String,

    pub grpc_port: u16,

    /// When non-empty, takes precedence over `grpc_host`.
    pub grpc_host_list: Vec<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            grpc_host: "0.0.0.0".to_string(),
            grpc_port: 50050,
            grpc_host_list: Vec::new(),
        }
    }
}

impl BackendConfig {
    /// Candidate hosts for backend selection.
    pub fn hosts(&self) -> Vec<String> {
        let list: Vec<String> = self
            .grpc_host_list
            .iter()
            .map(|h| h.trim())
            .filter(|h| !h.is_empty())
            .map(str::to_string)
            .collect();
        if list.is_empty() {
            vec![self.grpc_host.clone()]
        } else {
            list
        }
    }
}

/// How chat messages are laid out in the request inputs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageEncoding {
    /// One struct per message under `messages`.
    #[default]
    Structured,
    /// Parallel `messages.role` / `messages.content` lists; multi-part
    /// messages become structs with decoded image bytes.
    Legacy,
}

/// How SSE frames are written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SseFraming {
    /// Raw `data: <json>\n\n` lines.
    #[default]
    Raw,
    /// axum SSE events with a `data` field.
    Event,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompatConfig {
    pub message_encoding: MessageEncoding,
    pub sse_framing: SseFraming,
}

impl Config {
    /// Load configuration from a JSON file, falling back to defaults for missing fields.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if path.exists() {
            let data = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&data)?;
            Ok(config)
        } else {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            Ok(Config::default())
        }
    }

    /// Apply command-line and environment overrides.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(listen) = &cli.listen {
            self.server.listen = listen.clone();
        }
        if let Some(host) = &cli.grpc_host {
            self.backend.grpc_host = host.clone();
        }
        if let Some(port) = cli.grpc_port {
            self.backend.grpc_port = port;
        }
        if let Some(hosts) = &cli.grpc_host_list {
            self.backend.grpc_host_list = hosts.clone();
        }
        if let Some(prefix) = cli.sse_data_prefix {
            self.compat.sse_framing = if prefix {
                SseFraming::Event
            } else {
                SseFraming::Raw
            };
        }
        if let Some(legacy) = cli.compat_llmserver_vlm_v1 {
            self.compat.message_encoding = if legacy {
                MessageEncoding::Legacy
            } else {
                MessageEncoding::Structured
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.backend.grpc_port, 50050);
        assert_eq!(cfg.backend.hosts(), vec!["0.0.0.0".to_string()]);
        assert_eq!(cfg.compat.message_encoding, MessageEncoding::Structured);
        assert_eq!(cfg.compat.sse_framing, SseFraming::Raw);
    }

    #[test]
    fn test_host_list_takes_precedence() {
        let cfg = BackendConfig {
            grpc_host_list: vec!["10.0.0.1".into(), " ".into(), "10.0.0.2".into()],
            ..Default::default()
        };
        assert_eq!(cfg.hosts(), vec!["10.0.0.1".to_string(), "10.0.0.2".to_string()]);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"backend": {{"grpc_port": 6000}}, "compat": {{"message_encoding": "legacy"}}}}"#
        )
        .unwrap();

        let cfg = Config::load(file.path()).unwrap();
        assert_eq!(cfg.backend.grpc_port, 6000);
        assert_eq!(cfg.backend.grpc_host, "0.0.0.0");
        assert_eq!(cfg.compat.message_encoding, MessageEncoding::Legacy);
        assert_eq!(cfg.server.listen, "0.0.0.0:8080");
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let cfg = Config::load(std::path::Path::new("/nonexistent/ark.json")).unwrap();
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::parse_from([
            "ark-gateway",
            "--grpc-host-list",
            "a,b",
            "--grpc-port",
            "7000",
            "--sse-data-prefix",
            "true",
            "--compat-llmserver-vlm-v1",
            "1",
        ]);
        let mut cfg = Config::default();
        cfg.apply_cli(&cli);

        assert_eq!(cfg.backend.hosts(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(cfg.backend.grpc_port, 7000);
        assert_eq!(cfg.compat.sse_framing, SseFraming::Event);
        assert_eq!(cfg.compat.message_encoding, MessageEncoding::Legacy);
    }
}
