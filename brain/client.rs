use std::{collections::VecDeque, env};

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use aura_tools::ErrorKind;

/// Default generation endpoint when `LLM_ENDPOINT` is unset.
const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:9000/generate";

/// Requested response shape.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormat {
    /// Free-form text.
    #[default]
    Text,
    /// The model should answer with a JSON document.
    Json,
}

/// Options for one completion request.
#[derive(Debug, Clone)]
pub struct LlmOptions {
    /// Sampling temperature.
    pub temperature: f32,
    /// Completion budget.
    pub max_tokens: usize,
    /// Desired response shape.
    pub response_format: ResponseFormat,
}

impl Default for LlmOptions {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_tokens: 512,
            response_format: ResponseFormat::Text,
        }
    }
}

impl LlmOptions {
    /// Low-temperature JSON-answer options used by the planner.
    #[must_use]
    pub const fn json(max_tokens: usize) -> Self {
        Self {
            temperature: 0.1,
            max_tokens,
            response_format: ResponseFormat::Json,
        }
    }
}

/// Token accounting reported with a completion.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct TokenUsage {
    /// Tokens consumed by the prompt.
    pub prompt_tokens: u64,
    /// Tokens produced by the model.
    pub completion_tokens: u64,
}

/// One model completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// Raw model text.
    pub text: String,
    /// Usage accounting (estimated when the endpoint omits it).
    pub usage: TokenUsage,
}

/// Failure categories of the LLM adapter.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LlmError {
    /// The endpoint was unreachable or the connection dropped.
    #[error("network: {0}")]
    Network(String),
    /// The endpoint rate-limited the request.
    #[error("rate limited")]
    RateLimit,
    /// Credentials were rejected.
    #[error("authentication rejected")]
    Auth,
    /// The response could not be used.
    #[error("bad response: {0}")]
    BadResponse(String),
    /// No credentials are configured.
    #[error("no credentials configured")]
    NoCredentials,
}

impl From<LlmError> for ErrorKind {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Network(detail) => Self::LlmNetwork(detail),
            LlmError::RateLimit => Self::LlmRateLimit,
            LlmError::Auth => Self::LlmAuth,
            LlmError::BadResponse(detail) => Self::LlmBadResponse(detail),
            LlmError::NoCredentials => Self::NoCredentials,
        }
    }
}

/// Abstract completion contract consumed by Layers 1.5, 2, and conversation.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Requests one completion.
    async fn complete(&self, prompt: &str, options: &LlmOptions) -> Result<Completion, LlmError>;
}

#[derive(Debug, Clone, Serialize)]
struct GenerateRequest<'a> {
    prompt: &'a str,
    max_tokens: usize,
    temperature: f32,
    top_p: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    text: String,
    #[serde(default)]
    prompt_tokens: Option<u64>,
    #[serde(default)]
    completion_tokens: Option<u64>,
}

/// HTTP client against a JSON `generate` endpoint.
#[derive(Debug)]
pub struct HttpLlmClient {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl HttpLlmClient {
    /// Builds a client from `LLM_API_KEY` and `LLM_ENDPOINT`.
    ///
    /// A missing key is [`LlmError::NoCredentials`]; the layers that need
    /// the model surface it without calling out.
    pub fn from_env() -> Result<Self, LlmError> {
        let api_key = env::var("LLM_API_KEY").map_err(|_| LlmError::NoCredentials)?;
        if api_key.trim().is_empty() {
            return Err(LlmError::NoCredentials);
        }
        let endpoint = env::var("LLM_ENDPOINT").unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string());
        Ok(Self::new(endpoint, api_key))
    }

    /// Builds a client for an explicit endpoint and key.
    #[must_use]
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, prompt: &str, options: &LlmOptions) -> Result<Completion, LlmError> {
        let payload = GenerateRequest {
            prompt,
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            top_p: 0.9,
            response_format: match options.response_format {
                ResponseFormat::Text => None,
                ResponseFormat::Json => Some("json"),
            },
        };
        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|err| LlmError::Network(err.to_string()))?;

        match response.status().as_u16() {
            401 | 403 => return Err(LlmError::Auth),
            429 => return Err(LlmError::RateLimit),
            status if status >= 500 => {
                return Err(LlmError::Network(format!("server status {status}")))
            }
            _ => {}
        }
        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|err| LlmError::BadResponse(err.to_string()))?;
        let usage = TokenUsage {
            prompt_tokens: body.prompt_tokens.unwrap_or_else(|| estimate_tokens(prompt)),
            completion_tokens: body
                .completion_tokens
                .unwrap_or_else(|| estimate_tokens(&body.text)),
        };
        Ok(Completion {
            text: body.text,
            usage,
        })
    }
}

fn estimate_tokens(text: &str) -> u64 {
    (text.len() as u64).div_ceil(4)
}

/// Scripted double replaying queued responses; records every prompt.
#[derive(Default)]
pub struct ScriptedLlmClient {
    responses: Mutex<VecDeque<Result<String, LlmError>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLlmClient {
    /// Empty script; completions fail until responses are queued.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a successful completion.
    pub fn push_response(&self, text: impl Into<String>) {
        self.responses.lock().push_back(Ok(text.into()));
    }

    /// Queues a failure.
    pub fn push_error(&self, error: LlmError) {
        self.responses.lock().push_back(Err(error));
    }

    /// Prompts seen so far, in order.
    #[must_use]
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, prompt: &str, _options: &LlmOptions) -> Result<Completion, LlmError> {
        self.prompts.lock().push(prompt.to_string());
        let next = self
            .responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::BadResponse("script exhausted".into())));
        next.map(|text| Completion {
            usage: TokenUsage {
                prompt_tokens: estimate_tokens(prompt),
                completion_tokens: estimate_tokens(&text),
            },
            text,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_client_replays_in_order() {
        let client = ScriptedLlmClient::new();
        client.push_response("first");
        client.push_error(LlmError::RateLimit);
        let options = LlmOptions::default();
        assert_eq!(client.complete("p1", &options).await.unwrap().text, "first");
        assert_eq!(
            client.complete("p2", &options).await.unwrap_err(),
            LlmError::RateLimit
        );
        assert_eq!(client.prompts(), vec!["p1", "p2"]);
    }

    #[test]
    fn llm_errors_map_to_taxonomy() {
        assert_eq!(ErrorKind::from(LlmError::RateLimit), ErrorKind::LlmRateLimit);
        assert_eq!(ErrorKind::from(LlmError::NoCredentials), ErrorKind::NoCredentials);
        assert!(matches!(
            ErrorKind::from(LlmError::Network("down".into())),
            ErrorKind::LlmNetwork(_)
        ));
    }

    #[test]
    fn missing_key_is_no_credentials() {
        env::remove_var("LLM_API_KEY");
        assert_eq!(HttpLlmClient::from_env().unwrap_err(), LlmError::NoCredentials);
    }
}
