//! Environment configuration, validated once at startup.

use std::num::NonZeroUsize;
use std::time::Duration;

use ragline::RagConfig;
use ragline_telemetry::LogFormat;
use thiserror::Error;

const DEFAULT_COLLECTION: &str = "documents";
const DEFAULT_VECTOR_SIZE: usize = 1536;
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_CACHE_CAPACITY: usize = 10_000;
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_PORT: u16 = 8000;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value '{value}' for {key}: {reason}")]
    Invalid { key: &'static str, value: String, reason: String },
}

/// Everything the server needs to start.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub openai_api_key: String,
    pub qdrant_url: String,
    pub qdrant_api_key: Option<String>,
    pub qdrant_collection: String,
    pub vector_size: usize,
    pub embedding_model: String,
    pub chat_model: String,
    pub rag: RagConfig,
    pub embedding_cache_capacity: NonZeroUsize,
    pub remote_timeout: Duration,
    pub port: u16,
    pub log_format: LogFormat,
}

impl ServerConfig {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through `lookup`, treating blank values as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let defaults = RagConfig::default();
        let rag = RagConfig::builder()
            .chunk_size(parse(&get, "CHUNK_SIZE", defaults.chunk_size)?)
            .chunk_overlap(parse(&get, "CHUNK_OVERLAP", defaults.chunk_overlap)?)
            .top_k(parse(&get, "RAG_TOP_K", defaults.top_k)?)
            .similarity_threshold(parse(&get, "SIMILARITY_THRESHOLD", defaults.similarity_threshold)?)
            .context_token_budget(parse(&get, "CONTEXT_TOKEN_BUDGET", defaults.context_token_budget)?)
            .build()
            .map_err(|e| ConfigError::Invalid {
                key: "RAG",
                value: String::new(),
                reason: e.to_string(),
            })?;

        let vector_size: usize = parse(&get, "VECTOR_SIZE", DEFAULT_VECTOR_SIZE)?;
        if vector_size == 0 {
            return Err(invalid("VECTOR_SIZE", "0", "must be greater than zero"));
        }

        let capacity: usize = parse(&get, "EMBEDDING_CACHE_CAPACITY", DEFAULT_CACHE_CAPACITY)?;
        let embedding_cache_capacity = NonZeroUsize::new(capacity)
            .ok_or_else(|| invalid("EMBEDDING_CACHE_CAPACITY", "0", "must be greater than zero"))?;

        let timeout_secs: u64 = parse(&get, "REMOTE_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?;
        if timeout_secs == 0 {
            return Err(invalid("REMOTE_TIMEOUT_SECS", "0", "must be greater than zero"));
        }

        let log_format = match get("LOG_FORMAT") {
            Some(raw) => {
                raw.parse::<LogFormat>().map_err(|reason| invalid("LOG_FORMAT", &raw, &reason))?
            }
            None => LogFormat::default(),
        };

        Ok(Self {
            openai_api_key: required("OPENAI_API_KEY")?,
            qdrant_url: required("QDRANT_URL")?,
            qdrant_api_key: get("QDRANT_API_KEY"),
            qdrant_collection: get("QDRANT_COLLECTION").unwrap_or_else(|| DEFAULT_COLLECTION.into()),
            vector_size,
            embedding_model: get("EMBEDDING_MODEL")
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.into()),
            chat_model: get("CHAT_MODEL").unwrap_or_else(|| DEFAULT_CHAT_MODEL.into()),
            rag,
            embedding_cache_capacity,
            remote_timeout: Duration::from_secs(timeout_secs),
            port: parse(&get, "PORT", DEFAULT_PORT)?,
            log_format,
        })
    }
}

fn invalid(key: &'static str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid { key, value: value.to_string(), reason: reason.to_string() }
}

fn parse<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw.parse().map_err(|e: T::Err| invalid(key, &raw, &e.to_string())),
        None => Ok(default),
    }
}
