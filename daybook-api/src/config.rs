/// Configuration management for the API server
///
/// This module loads configuration from environment variables and provides
/// a type-safe configuration struct.
///
/// # Environment Variables
///
/// - `API_HOST`: Host to bind to (default: 0.0.0.0)
/// - `API_PORT`: Port to bind to (default: 5001)
/// - `CORS_ORIGINS`: Comma-separated allowed origins (default: `*`)
/// - `PRODUCTION`: Enables HSTS (default: false)
/// - `DATA_DIR`: Root of the JSON store (default: data)
/// - `UPLOADS_DIR`: Root of uploaded photos (default: uploads)
/// - `MAX_UPLOAD_BYTES`: Body limit for profile uploads (default: 5 MiB)
/// - `JWT_SECRET`: Secret key for JWT signing (required)
/// - `JWT_EXPIRY_HOURS`: Access token lifetime (default: 24)
/// - `LLM_API_KEY`: Key for the model provider (required)
/// - `LLM_API_BASE`, `LLM_MODEL`, `LLM_VISION_MODEL`, `LLM_MAX_RETRIES`, `LLM_TIMEOUT_SECS`
/// - `CHAT_RATE_LIMIT_PER_MINUTE`: Per-user budget for chat endpoints (default: 20)
/// - `RUST_LOG`: Log filter
///
/// # Example
///
/// ```no_run
/// use daybook_api::config::Config;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// println!("Server will listen on {}:{}", config.api.host, config.api.port);
/// # Ok(())
/// # }
/// ```

use daybook_shared::auth::jwt::DEFAULT_EXPIRY_HOURS;
use daybook_shared::llm::client::{LlmConfig, DEFAULT_API_BASE, DEFAULT_MODEL};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// API server configuration
    pub api: ApiConfig,

    /// File storage configuration
    pub storage: StorageConfig,

    /// JWT configuration
    pub jwt: JwtConfig,

    /// Model provider configuration
    pub llm: LlmSettings,

    /// Chat endpoint limits
    pub chat: ChatConfig,
}

/// API server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Host to bind to
    pub host: String,

    /// Port to bind to
    pub port: u16,

    /// Allowed CORS origins; `*` allows any
    pub cors_origins: Vec<String>,

    /// Production mode (enables HSTS)
    pub production: bool,
}

/// File storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root of `users.json` and the per-user directories
    pub data_dir: PathBuf,

    /// Root of uploaded profile photos
    pub uploads_dir: PathBuf,

    /// Request body limit for profile uploads
    pub max_upload_bytes: usize,
}

/// JWT configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    /// Secret key for JWT signing
    ///
    /// IMPORTANT: This must be kept secret and should be at least 32 bytes.
    /// Generate with: `openssl rand -hex 32`
    #[serde(skip_serializing)]
    pub secret: String,

    /// Access token lifetime in hours
    pub expiry_hours: i64,
}

/// Model provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    pub api_base: String,

    #[serde(skip_serializing)]
    pub api_key: String,

    pub model: String,

    pub vision_model: String,

    pub max_retries: u32,

    pub timeout_secs: u64,
}

/// Chat endpoint limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Requests per user per minute across `/api/chat/*`
    pub rate_limit_per_minute: u32,
}

impl LlmSettings {
    /// Client settings for [`daybook_shared::llm::HttpLlmClient`]
    pub fn client_config(&self) -> LlmConfig {
        LlmConfig {
            api_base: self.api_base.clone(),
            api_key: self.api_key.clone(),
            model: self.model.clone(),
            vision_model: self.vision_model.clone(),
            max_retries: self.max_retries,
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

impl Config {
    /// Loads configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Required environment variables are missing
    /// - Environment variables have invalid values
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env file if present (for development)
        dotenvy::dotenv().ok();

        let api_host = env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let api_port = parse_var("API_PORT", 5001u16)?;

        let cors_origins = env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "*".to_string())
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        let production = parse_var("PRODUCTION", false)?;

        let data_dir = env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string());
        let uploads_dir = env::var("UPLOADS_DIR").unwrap_or_else(|_| "uploads".to_string());
        let max_upload_bytes = parse_var("MAX_UPLOAD_BYTES", 5 * 1024 * 1024usize)?;

        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| anyhow::anyhow!("JWT_SECRET environment variable is required"))?;

        if jwt_secret.len() < 32 {
            anyhow::bail!("JWT_SECRET must be at least 32 characters long");
        }

        let expiry_hours = parse_var("JWT_EXPIRY_HOURS", DEFAULT_EXPIRY_HOURS)?;
        if expiry_hours <= 0 {
            anyhow::bail!("JWT_EXPIRY_HOURS must be positive");
        }

        let llm_api_key = env::var("LLM_API_KEY")
            .map_err(|_| anyhow::anyhow!("LLM_API_KEY environment variable is required"))?;

        let model = env::var("LLM_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let vision_model = env::var("LLM_VISION_MODEL").unwrap_or_else(|_| model.clone());

        Ok(Self {
            api: ApiConfig {
                host: api_host,
                port: api_port,
                cors_origins,
                production,
            },
            storage: StorageConfig {
                data_dir: data_dir.into(),
                uploads_dir: uploads_dir.into(),
                max_upload_bytes,
            },
            jwt: JwtConfig {
                secret: jwt_secret,
                expiry_hours,
            },
            llm: LlmSettings {
                api_base: env::var("LLM_API_BASE").unwrap_or_else(|_| DEFAULT_API_BASE.to_string()),
                api_key: llm_api_key,
                model,
                vision_model,
                max_retries: parse_var("LLM_MAX_RETRIES", 2u32)?,
                timeout_secs: parse_var("LLM_TIMEOUT_SECS", 60u64)?,
            },
            chat: ChatConfig {
                rate_limit_per_minute: parse_var("CHAT_RATE_LIMIT_PER_MINUTE", 20u32)?,
            },
        })
    }

    /// Returns the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }

    /// Whether CORS allows any origin
    pub fn cors_permissive(&self) -> bool {
        self.api.cors_origins.iter().any(|origin| origin == "*")
    }
}

/// Reads and parses an optional variable, falling back to `default` when unset
fn parse_var<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid value for {}: {:?} ({})", name, raw, e)),
        Err(_) => Ok(default),
    }
}
