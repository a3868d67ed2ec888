/// Minimal client for an OpenAI-compatible chat completions endpoint.
///
/// Only non-streaming chat is supported. Transient failures (timeouts, connection errors,
/// 429 and 5xx) are retried with capped exponential backoff plus jitter; everything else
/// is returned to the caller on the first attempt.
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `retry` (0-based): `initial * 2^retry`, capped at
    /// `max_backoff`, plus up to 25% jitter.
    pub fn delay(&self, retry: u32) -> Duration {
        let capped = self.capped_millis(retry);
        Duration::from_millis(capped.saturating_add(clock_jitter(capped / 4)))
    }

    /// Upper bound of `delay(retry)`, jitter included.
    pub fn max_delay(&self, retry: u32) -> Duration {
        let capped = self.capped_millis(retry);
        Duration::from_millis(capped.saturating_add(capped / 4))
    }

    fn capped_millis(&self, retry: u32) -> u64 {
        let factor = 1u128.checked_shl(retry).unwrap_or(u128::MAX);
        self.initial_backoff
            .as_millis()
            .saturating_mul(factor)
            .min(self.max_backoff.as_millis()) as u64
    }
}

#[derive(Clone, Debug)]
pub struct OpenAiClientConfig {
    pub base_url: String,
    /// Sent as a bearer token when present. Local OpenAI-compatible servers often need none.
    pub api_key: Option<String>,
    pub model: String,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
    /// Upstream error bodies are truncated to this many bytes before being reported.
    pub error_body_limit: usize,
}

impl Default for OpenAiClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            request_timeout: Duration::from_secs(15),
            retry: RetryPolicy {
                max_retries: 3,
                initial_backoff: Duration::from_millis(200),
                max_backoff: Duration::from_millis(5_000),
            },
            error_body_limit: 8 * 1024,
        }
    }
}

impl OpenAiClientConfig {
    /// Read `OPENAI_BASE_URL`, `OPENAI_API_KEY`, `OPENAI_MODEL`, `OPENAI_TIMEOUT_SECS`,
    /// `OPENAI_MAX_RETRIES`, `OPENAI_RETRY_INITIAL_MS`, `OPENAI_RETRY_MAX_MS` and
    /// `OPENAI_MAX_ERROR_BODY_BYTES`. Unset or unparsable values fall back to the defaults.
    pub fn from_env() -> Self {
        let d = Self::default();
        let text = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());

        let base_url = text("OPENAI_BASE_URL").unwrap_or(d.base_url);

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: text("OPENAI_API_KEY"),
            model: text("OPENAI_MODEL").unwrap_or(d.model),
            request_timeout: Duration::from_secs(env_or(
                "OPENAI_TIMEOUT_SECS",
                d.request_timeout.as_secs(),
            )),
            retry: RetryPolicy {
                max_retries: env_or("OPENAI_MAX_RETRIES", d.retry.max_retries),
                initial_backoff: Duration::from_millis(env_or(
                    "OPENAI_RETRY_INITIAL_MS",
                    d.retry.initial_backoff.as_millis() as u64,
                )),
                max_backoff: Duration::from_millis(env_or(
                    "OPENAI_RETRY_MAX_MS",
                    d.retry.max_backoff.as_millis() as u64,
                )),
            },
            error_body_limit: env_or("OPENAI_MAX_ERROR_BODY_BYTES", d.error_body_limit),
        }
    }

    /// Longest time `OpenAiClient::complete` can take: every attempt running into the request
    /// timeout, plus the largest possible backoff before each retry.
    pub fn worst_case_duration(&self) -> Duration {
        let attempts = self.request_timeout * (self.retry.max_retries + 1);
        let backoff: Duration = (0..self.retry.max_retries)
            .map(|retry| self.retry.max_delay(retry))
            .sum();
        attempts + backoff
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[derive(Debug, thiserror::Error)]
pub enum OpenAiClientError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("could not decode completion response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("upstream error {status}: {message}")]
    Api { status: StatusCode, message: String },

    #[error("response contained no completion text")]
    EmptyCompletion,
}

impl OpenAiClientError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            OpenAiClientError::Transport(e) => e.is_timeout() || e.is_connect() || e.is_body(),
            OpenAiClientError::Api { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            OpenAiClientError::Decode(_) | OpenAiClientError::EmptyCompletion => false,
        }
    }
}

#[derive(Clone)]
pub struct OpenAiClient {
    config: OpenAiClientConfig,
    http: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(config: OpenAiClientConfig) -> Result<Self, OpenAiClientError> {
        let http = reqwest::Client::builder()
            .user_agent("tos-monitor/0.1")
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { config, http })
    }

    /// Send a system + user prompt pair to the configured model and return the trimmed text
    /// of the first choice.
    pub async fn complete(
        &self,
        system: &str,
        user: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String, OpenAiClientError> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            max_tokens,
            temperature,
        };

        let mut retry = 0;
        loop {
            match self.send_once(&request).await {
                Ok(text) => return Ok(text),
                Err(e) if retry < self.config.retry.max_retries && e.is_transient() => {
                    let delay = self.config.retry.delay(retry);
                    retry += 1;
                    warn!(
                        retry,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "chat completion failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn send_once(&self, request: &ChatRequest<'_>) -> Result<String, OpenAiClientError> {
        let url = format!("{}/chat/completions", self.config.base_url);
        let mut builder = self.http.post(&url).json(request);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }
        let resp = builder.send().await?;
        let status = resp.status();
        let body = resp.bytes().await?;

        if !status.is_success() {
            return Err(OpenAiClientError::Api {
                status,
                message: upstream_message(&body, self.config.error_body_limit),
            });
        }

        let parsed: ChatResponse = serde_json::from_slice(&body)?;
        debug!(model = %self.config.model, choices = parsed.choices.len(), "chat completion received");
        parsed
            .first_content()
            .ok_or(OpenAiClientError::EmptyCompletion)
    }
}

/// The `error.message` of an OpenAI-style error envelope, or the raw body cut to `limit` bytes.
fn upstream_message(body: &[u8], limit: usize) -> String {
    if let Ok(ErrorEnvelope {
        error: ErrorDetail {
            message: Some(message),
        },
    }) = serde_json::from_slice::<ErrorEnvelope>(body)
    {
        return message;
    }
    String::from_utf8_lossy(&body[..body.len().min(limit)]).into_owned()
}

/// Up to `max` milliseconds derived from the wall clock's sub-second part.
fn clock_jitter(max: u64) -> u64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos() as u64)
        .unwrap_or(0);
    nanos % (max + 1)
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

impl ChatResponse {
    fn first_content(&self) -> Option<String> {
        let content = self.choices.first()?.message.content.as_deref()?.trim();
        (!content.is_empty()).then(|| content.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: Option<String>,
}
