//! Configuration management for the real estate assistant.
//!
//! Configuration can be set via environment variables:
//! - `GROQ_API_KEY` - Required for the chat server. Credential for the hosted model.
//! - `LLM_BASE_URL` - Optional. OpenAI-compatible endpoint. Defaults to Groq.
//! - `DEFAULT_MODEL` - Optional. Model identifier. Defaults to `llama-3.1-8b-instant`.
//! - `LLM_TEMPERATURE` - Optional. Sampling temperature. Defaults to `0.3`.
//! - `LLM_TIMEOUT_SECS` - Optional. HTTP timeout for model calls. Defaults to `60`.
//! - `DATABASE_PATH` - Optional. SQLite listings database. Defaults to `RealEstate.db`.
//! - `HOST` - Optional. Server host. Defaults to `127.0.0.1`.
//! - `PORT` - Optional. Server port. Defaults to `3000`.
//! - `MAX_ITERATIONS` - Optional. Maximum tool round-trips per reply. Defaults to `5`.
//! - `HISTORY_TURNS` - Optional. Transcript turns forwarded to the model. Defaults to `10`.

use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_MODEL: &str = "llama-3.1-8b-instant";
pub const DEFAULT_DATABASE_PATH: &str = "RealEstate.db";
pub const DEFAULT_SESSION_TTL_SECS: u64 = 3600;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Property store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Path to the SQLite listings database
    pub database_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
        }
    }
}

impl StoreConfig {
    /// Load the store configuration alone (used by the MCP server).
    pub fn from_env() -> Self {
        Self {
            database_path: std::env::var("DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_DATABASE_PATH)),
        }
    }
}

/// Hosted model configuration.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// API credential, sent as a bearer token
    pub api_key: String,

    /// Base URL of the OpenAI-compatible API (without `/chat/completions`)
    pub base_url: String,

    /// Model identifier
    pub model: String,

    pub temperature: f32,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl LlmConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.3,
            timeout_secs: 60,
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub llm: LlmConfig,

    pub store: StoreConfig,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Maximum model round-trips for a single reply
    pub max_iterations: usize,

    /// Number of recent transcript turns given to the model as context
    pub history_turns: usize,

    /// Idle time after which a chat session is dropped
    pub session_ttl_secs: u64,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if `GROQ_API_KEY` is not set, and
    /// `ConfigError::InvalidValue` if a numeric variable does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var("GROQ_API_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("GROQ_API_KEY".to_string()))?;

        let llm = LlmConfig {
            api_key,
            base_url: std::env::var("LLM_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            model: std::env::var("DEFAULT_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            temperature: env_parse("LLM_TEMPERATURE", 0.3)?,
            timeout_secs: env_parse("LLM_TIMEOUT_SECS", 60)?,
        };

        let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env_parse("PORT", 3000)?;

        let max_iterations: usize = env_parse("MAX_ITERATIONS", 5)?;
        if max_iterations == 0 {
            return Err(ConfigError::InvalidValue(
                "MAX_ITERATIONS".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let session_ttl_secs: u64 = env_parse("SESSION_TTL_SECS", DEFAULT_SESSION_TTL_SECS)?;
        if session_ttl_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "SESSION_TTL_SECS".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            llm,
            store: StoreConfig::from_env(),
            host,
            port,
            max_iterations,
            history_turns: env_parse("HISTORY_TURNS", 10)?,
            session_ttl_secs,
        })
    }

    /// Create a config with custom values (useful for testing).
    pub fn new(api_key: String, database_path: PathBuf) -> Self {
        Self {
            llm: LlmConfig::new(api_key),
            store: StoreConfig { database_path },
            host: "127.0.0.1".to_string(),
            port: 3000,
            max_iterations: 5,
            history_turns: 10,
            session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
        }
    }
}

fn env_parse<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => parse_value(name, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_value<T>(name: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::InvalidValue(name.to_string(), e.to_string()))
}
