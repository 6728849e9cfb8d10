//! Request shaping and the HTTP exchange with the local query agent.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::errors::ClientError;
use crate::domain::model::QueryResult;

pub const DEFAULT_AGENT_URL: &str = "http://127.0.0.1:7337";
pub const DEFAULT_TOKEN_HEADER: &str = "X-XSQL-Token";
const QUERY_PATH: &str = "/v1/query";

/// Inclusive bounds and default for a numeric request option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptionBounds {
    pub default: u64,
    pub min: u64,
    pub max: u64,
}

impl OptionBounds {
    pub const MAX_ROWS: OptionBounds = OptionBounds {
        default: 2000,
        min: 1,
        max: 10_000,
    };
    pub const TIMEOUT_MS: OptionBounds = OptionBounds {
        default: 5000,
        min: 100,
        max: 120_000,
    };

    /// Same bounds with a different default, itself kept within range.
    pub fn with_default(self, default: u64) -> Self {
        Self {
            default: default.clamp(self.min, self.max),
            ..self
        }
    }

    /// Clamp user input. Empty or non-numeric input yields the default;
    /// fractional values are floored.
    pub fn clamp_input(&self, input: &str) -> u64 {
        match input.trim().parse::<f64>() {
            Ok(value) if value.is_finite() => self.clamp_value(value),
            _ => self.default,
        }
    }

    pub fn clamp_value(&self, value: f64) -> u64 {
        let floored = value.floor();
        if floored <= self.min as f64 {
            self.min
        } else if floored >= self.max as f64 {
            self.max
        } else {
            floored as u64
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryOptions {
    pub max_rows: u64,
    pub timeout_ms: u64,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            max_rows: OptionBounds::MAX_ROWS.default,
            timeout_ms: OptionBounds::TIMEOUT_MS.default,
        }
    }
}

/// Body of `POST /v1/query`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub html: String,
    pub query: String,
    pub options: QueryOptions,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<ErrorMessage>,
}

#[derive(Debug, Deserialize)]
struct ErrorMessage {
    message: Option<String>,
}

/// The external agent executing queries.
#[async_trait]
pub trait AgentClient: Send + Sync {
    async fn query(&self, token: &str, request: &QueryRequest) -> Result<QueryResult, ClientError>;
}

/// Agent reached over HTTP on the loopback interface.
#[derive(Debug, Clone)]
pub struct HttpAgentClient {
    http_client: Client,
    base_url: String,
    token_header: String,
}

impl Default for HttpAgentClient {
    fn default() -> Self {
        Self::new(DEFAULT_AGENT_URL)
    }
}

impl HttpAgentClient {
    /// The client sets no deadline of its own; `timeout_ms` is enforced by
    /// the agent.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token_header: DEFAULT_TOKEN_HEADER.to_string(),
        }
    }

    pub fn with_token_header(mut self, header: impl Into<String>) -> Self {
        self.token_header = header.into();
        self
    }

    pub fn endpoint(&self) -> String {
        format!("{}{QUERY_PATH}", self.base_url)
    }
}

#[async_trait]
impl AgentClient for HttpAgentClient {
    async fn query(&self, token: &str, request: &QueryRequest) -> Result<QueryResult, ClientError> {
        let start = std::time::Instant::now();
        let response = self
            .http_client
            .post(self.endpoint())
            .header(self.token_header.as_str(), token)
            .json(request)
            .send()
            .await
            .map_err(|err| {
                warn!(error = %err, "agent request failed");
                ClientError::network(format!("agent request failed: {err}"))
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| ClientError::network(format!("failed to read agent response: {err}")))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorBody>(&body)
                .ok()
                .and_then(|body| body.error)
                .and_then(|error| error.message)
                .filter(|message| !message.is_empty())
                .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
            warn!(status = %status, message = %message, "agent rejected query");
            return Err(ClientError::Network(message));
        }

        let result: QueryResult = serde_json::from_str(&body)
            .map_err(|err| ClientError::network(format!("invalid agent response: {err}")))?;

        debug!(
            rows = result.rows.len(),
            elapsed_ms = result.elapsed_ms,
            round_trip_ms = start.elapsed().as_millis() as u64,
            "agent query completed"
        );
        Ok(result)
    }
}
