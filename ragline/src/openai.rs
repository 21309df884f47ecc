//! OpenAI embedding and chat providers.
//!
//! This module is only available when the `openai` feature is enabled.

use std::time::Duration;

use async_openai::Client;
use async_openai::config::OpenAIConfig as AsyncOpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequest, CreateChatCompletionRequestArgs,
};
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::chat::{ChatMessage, ChatModel, ChatRole, ChatStream};
use crate::embedding::{EmbeddingProvider, check_dimensions};
use crate::error::{FailureCause, RagError, Result};
use crate::remote::{Remote, RemoteCallPolicy};

const PROVIDER: &str = "openai";

/// The default OpenAI API base.
const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

/// The default model for OpenAI embeddings.
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// The default dimensionality for `text-embedding-3-small`.
const DEFAULT_DIMENSIONS: usize = 1536;

/// The default chat model.
const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";

fn classify_reqwest(e: &reqwest::Error) -> FailureCause {
    if e.is_timeout() {
        FailureCause::Timeout
    } else if e.is_connect() {
        FailureCause::ConnectionRefused
    } else {
        FailureCause::Api
    }
}

/// An [`EmbeddingProvider`] backed by the OpenAI embeddings API.
///
/// Uses `reqwest` to call the `/v1/embeddings` endpoint directly.
///
/// # Configuration
///
/// - `model` – defaults to `text-embedding-3-small`.
/// - `dimensions` – optional Matryoshka dimension override.
/// - `api_key` – from the constructor or the `OPENAI_API_KEY` environment variable.
/// - `timeout` – per request, 30 seconds by default.
///
/// # Example
///
/// ```rust,ignore
/// use ragline::openai::OpenAIEmbeddingProvider;
///
/// let provider = OpenAIEmbeddingProvider::new("sk-...")?;
/// let embedding = provider.embed("hello world", &cancel).await?;
/// ```
pub struct OpenAIEmbeddingProvider {
    client: reqwest::Client,
    api_key: String,
    api_base: String,
    model: String,
    dimensions: usize,
    /// If set, passed to the API for Matryoshka dimension truncation.
    request_dimensions: Option<usize>,
    policy: RemoteCallPolicy,
}

impl OpenAIEmbeddingProvider {
    /// Create a new provider with the given API key.
    ///
    /// Uses the default model (`text-embedding-3-small`) and dimensions (1536).
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(RagError::Config("OpenAI API key must not be empty".into()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            api_base: OPENAI_API_BASE.into(),
            model: DEFAULT_EMBEDDING_MODEL.into(),
            dimensions: DEFAULT_DIMENSIONS,
            request_dimensions: None,
            policy: RemoteCallPolicy::default(),
        })
    }

    /// Create a new provider using the `OPENAI_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| RagError::Config("OPENAI_API_KEY environment variable not set".into()))?;
        Self::new(api_key)
    }

    /// Set the model name (e.g. `text-embedding-3-large`).
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the output dimensions (Matryoshka support).
    ///
    /// When set, the API returns embeddings truncated to this size.
    /// This also updates the value returned by [`dimensions()`](EmbeddingProvider::dimensions).
    pub fn with_dimensions(mut self, dims: usize) -> Self {
        self.dimensions = dims;
        self.request_dimensions = Some(dims);
        self
    }

    /// Point at an OpenAI-compatible API (e.g. `http://localhost:8080/v1`).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.policy = RemoteCallPolicy::new(timeout);
        self
    }

    async fn request(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let request_body = EmbeddingRequest {
            model: &self.model,
            input: texts.to_vec(),
            dimensions: self.request_dimensions,
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.api_base.trim_end_matches('/')))
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                error!(provider = PROVIDER, error = %e, "request failed");
                RagError::provider(PROVIDER, classify_reqwest(&e), format!("request failed: {e}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);

            error!(provider = PROVIDER, %status, detail = %detail, "API error");
            return Err(RagError::provider(
                PROVIDER,
                FailureCause::Api,
                format!("API returned {status}: {detail}"),
            ));
        }

        let mut embedding_response: EmbeddingResponse = response.json().await.map_err(|e| {
            error!(provider = PROVIDER, error = %e, "failed to parse response");
            RagError::provider(PROVIDER, FailureCause::Api, format!("failed to parse response: {e}"))
        })?;

        // The API documents input order, but `index` is authoritative.
        embedding_response.data.sort_by_key(|d| d.index);
        Ok(embedding_response.data.into_iter().map(|d| d.embedding).collect())
    }
}

// ── OpenAI API request/response types ──────────────────────────────

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

// ── EmbeddingProvider implementation ───────────────────────────────

#[async_trait]
impl EmbeddingProvider for OpenAIEmbeddingProvider {
    async fn embed(&self, text: &str, cancel: &CancellationToken) -> Result<Vec<f32>> {
        debug!(provider = PROVIDER, text_len = text.len(), "embedding single text");

        let results = self.embed_batch(&[text], cancel).await?;
        results.into_iter().next().ok_or_else(|| {
            RagError::provider(PROVIDER, FailureCause::Api, "API returned empty response")
        })
    }

    async fn embed_batch(
        &self,
        texts: &[&str],
        cancel: &CancellationToken,
    ) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            provider = PROVIDER,
            batch_size = texts.len(),
            model = %self.model,
            "embedding batch"
        );

        let embeddings =
            self.policy.guard(Remote::Provider(PROVIDER), "embed", cancel, self.request(texts)).await?;

        if embeddings.len() != texts.len() {
            return Err(RagError::provider(
                PROVIDER,
                FailureCause::Api,
                format!("requested {} embeddings, received {}", texts.len(), embeddings.len()),
            ));
        }
        for embedding in &embeddings {
            check_dimensions(PROVIDER, self.dimensions, embedding)?;
        }
        Ok(embeddings)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// ── Chat completions ───────────────────────────────────────────────

fn map_openai_err(operation: &str, e: OpenAIError) -> RagError {
    let cause = match &e {
        OpenAIError::Reqwest(inner) => classify_reqwest(inner),
        _ => FailureCause::Api,
    };
    error!(provider = PROVIDER, operation, %cause, error = %e, "OpenAI call failed");
    RagError::provider(PROVIDER, cause, format!("{operation}: {e}"))
}

fn to_request_message(
    message: &ChatMessage,
) -> std::result::Result<ChatCompletionRequestMessage, OpenAIError> {
    let content = message.content.clone();
    Ok(match message.role {
        ChatRole::System => {
            ChatCompletionRequestSystemMessageArgs::default().content(content).build()?.into()
        }
        ChatRole::User => {
            ChatCompletionRequestUserMessageArgs::default().content(content).build()?.into()
        }
        ChatRole::Assistant => {
            ChatCompletionRequestAssistantMessageArgs::default().content(content).build()?.into()
        }
    })
}

/// A [`ChatModel`] backed by the OpenAI chat completions API via `async-openai`.
pub struct OpenAIChatModel {
    client: Client<AsyncOpenAIConfig>,
    model: String,
    policy: RemoteCallPolicy,
}

impl OpenAIChatModel {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(RagError::Config("OpenAI API key must not be empty".into()));
        }
        let config = AsyncOpenAIConfig::new().with_api_key(api_key);
        Ok(Self {
            client: Client::with_config(config),
            model: DEFAULT_CHAT_MODEL.into(),
            policy: RemoteCallPolicy::default(),
        })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Applied to the whole call for [`complete`](ChatModel::complete) and to
    /// each received delta for [`stream`](ChatModel::stream).
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.policy = RemoteCallPolicy::new(timeout);
        self
    }

    fn build_request(&self, messages: &[ChatMessage], stream: bool) -> Result<CreateChatCompletionRequest> {
        let messages = messages
            .iter()
            .map(to_request_message)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| RagError::Validation(format!("invalid chat message: {e}")))?;

        CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .stream(stream)
            .build()
            .map_err(|e| RagError::Validation(format!("failed to build chat request: {e}")))
    }
}

#[async_trait]
impl ChatModel for OpenAIChatModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        cancel: &CancellationToken,
    ) -> Result<String> {
        let request = self.build_request(messages, false)?;
        debug!(provider = PROVIDER, model = %self.model, messages = messages.len(), "chat completion");

        let response = self
            .policy
            .guard(Remote::Provider(PROVIDER), "chat", cancel, async {
                self.client.chat().create(request).await.map_err(|e| map_openai_err("chat", e))
            })
            .await?;

        response.choices.into_iter().next().and_then(|c| c.message.content).ok_or_else(|| {
            RagError::provider(PROVIDER, FailureCause::Api, "completion contained no message")
        })
    }

    async fn stream(
        &self,
        messages: &[ChatMessage],
        cancel: &CancellationToken,
    ) -> Result<ChatStream> {
        let request = self.build_request(messages, true)?;
        debug!(provider = PROVIDER, model = %self.model, messages = messages.len(), "chat stream");

        let mut upstream = self
            .policy
            .guard(Remote::Provider(PROVIDER), "chat_stream", cancel, async {
                self.client
                    .chat()
                    .create_stream(request)
                    .await
                    .map_err(|e| map_openai_err("chat_stream", e))
            })
            .await?;

        let policy = self.policy;
        let cancel = cancel.clone();
        let stream = async_stream::try_stream! {
            loop {
                let next = policy
                    .guard(Remote::Provider(PROVIDER), "chat_stream", &cancel, async {
                        Ok(upstream.next().await)
                    })
                    .await?;

                match next {
                    None => break,
                    Some(Ok(chunk)) => {
                        let delta = chunk.choices.into_iter().next().and_then(|c| c.delta.content);
                        if let Some(delta) = delta.filter(|d| !d.is_empty()) {
                            yield delta;
                        }
                    }
                    Some(Err(e)) => Err::<(), _>(map_openai_err("chat_stream", e))?,
                }
            }
        };

        Ok(Box::pin(stream))
    }
}
