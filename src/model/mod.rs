pub mod moderation;
pub mod prompt;
pub mod relay;

use actix_web::http::StatusCode;
use anyhow::Result;
use log::{debug, info};
use reqwest::{Client, RequestBuilder, Response};
use serde_json::{json, Value};
use std::time::Duration;

use crate::config::{Config, ModerationFailMode};
use crate::error::ProxyError;
use crate::web::models::ChatMessage;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of a completion call.
pub enum Completion {
    /// Buffered mode: the first choice's text, empty when upstream sent none.
    Reply(String),
    /// Streamed mode: the successful upstream response, body not yet read.
    Stream(Response),
}

/// Client for the OpenAI-compatible completion and moderation endpoints.
pub struct OpenAiClient {
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    request_timeout: Duration,
    stream_timeout: Duration,
    fail_mode: ModerationFailMode,
    client: Client,
}

impl OpenAiClient {
    pub fn new(config: &Config) -> Result<Self> {
        info!("Using completion API at: {}", config.openai_base_url);

        let client = Client::builder().connect_timeout(CONNECT_TIMEOUT).build()?;

        Ok(Self {
            base_url: config.openai_base_url.clone(),
            api_key: config.openai_api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            request_timeout: config.upstream_timeout,
            stream_timeout: config.stream_timeout,
            fail_mode: config.moderation_fail_mode,
            client,
        })
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.client
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_key)
    }

    pub async fn complete(&self, messages: &[ChatMessage], stream: bool) -> Result<Completion, ProxyError> {
        let payload = json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "stream": stream,
        });

        info!(
            "Sending {} messages to {} (stream: {})",
            messages.len(),
            self.model,
            stream
        );
        debug!("Payload: {}", payload);

        let timeout = if stream { self.stream_timeout } else { self.request_timeout };
        let response = self
            .post("/v1/chat/completions")
            .timeout(timeout)
            .json(&payload)
            .send()
            .await?;
        let response = ensure_success(response).await?;

        if stream {
            return Ok(Completion::Stream(response));
        }

        let response_json: Value = response.json().await?;
        debug!("Response JSON: {}", response_json);

        let content = response_json
            .get("choices")
            .and_then(|choices| choices.get(0))
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(|content| content.as_str())
            .unwrap_or_default();

        info!("Response length: {} characters", content.len());
        Ok(Completion::Reply(content.to_string()))
    }
}

/// Turns a non-success upstream answer into [`ProxyError::Upstream`] carrying its raw body.
async fn ensure_success(response: Response) -> Result<Response, ProxyError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await?;
    let status = StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    Err(ProxyError::Upstream { status, body })
}
