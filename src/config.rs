use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub fred: FredConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_uploads_dir")]
    pub uploads_dir: PathBuf,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            uploads_dir: default_uploads_dir(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:3002".to_string()
}
fn default_uploads_dir() -> PathBuf {
    PathBuf::from("./uploads")
}
fn default_max_upload_bytes() -> usize {
    5 * 1024 * 1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,
    #[serde(default = "default_token_ttl_days")]
    pub token_ttl_days: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: default_jwt_secret(),
            token_ttl_days: default_token_ttl_days(),
        }
    }
}

/// Fallback signing secret for local development only.
pub const DEV_JWT_SECRET: &str = "dev-secret";

fn default_jwt_secret() -> String {
    DEV_JWT_SECRET.to_string()
}
fn default_token_ttl_days() -> i64 {
    7
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_embedding_model(),
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "huggingface".to_string()
}
fn default_embedding_model() -> String {
    "sentence-transformers/all-MiniLM-L6-v2".to_string()
}
fn default_base_url() -> String {
    "https://router.huggingface.co".to_string()
}
fn default_api_key_env() -> String {
    "HUGGINGFACE_API_TOKEN".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    #[serde(default = "default_chat_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_chat_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            model: default_chat_model(),
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_chat_timeout_secs(),
        }
    }
}

fn default_chat_model() -> String {
    "meta-llama/Llama-3.1-8B-Instruct:cerebras".to_string()
}
fn default_max_tokens() -> u32 {
    256
}
fn default_temperature() -> f32 {
    0.3
}
fn default_chat_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct FredConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_source")]
    pub source: String,
}

impl Default for FredConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            source: default_source(),
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_source() -> String {
    "maintenance_kb_v1".to_string()
}

impl Config {
    /// Config with every section at its default, rooted at the given database path.
    pub fn with_db_path(path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig { path: path.into() },
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
            embedding: EmbeddingConfig::default(),
            chat: ChatConfig::default(),
            fred: FredConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    apply_jwt_override(&mut config, std::env::var("JWT_SECRET").ok());

    validate(&config)?;
    Ok(config)
}

/// A non-empty `JWT_SECRET` from the environment wins over the file.
fn apply_jwt_override(config: &mut Config, secret: Option<String>) {
    if let Some(secret) = secret.filter(|s| !s.is_empty()) {
        config.auth.jwt_secret = secret;
    }
}

pub fn validate(config: &Config) -> Result<()> {
    if config.fred.top_k < 1 {
        anyhow::bail!("fred.top_k must be >= 1");
    }

    if !(0.0..=2.0).contains(&config.chat.temperature) {
        anyhow::bail!("chat.temperature must be in [0.0, 2.0]");
    }

    if config.chat.max_tokens == 0 {
        anyhow::bail!("chat.max_tokens must be > 0");
    }

    if config.auth.token_ttl_days < 1 {
        anyhow::bail!("auth.token_ttl_days must be >= 1");
    }

    if config.auth.jwt_secret.is_empty() {
        anyhow::bail!("auth.jwt_secret must not be empty");
    }

    if config.server.max_upload_bytes == 0 {
        anyhow::bail!("server.max_upload_bytes must be > 0");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "huggingface" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, huggingface, or openai.",
            other
        ),
    }

    if config.embedding.is_enabled() && config.embedding.model.trim().is_empty() {
        anyhow::bail!(
            "embedding.model must be specified when provider is '{}'",
            config.embedding.provider
        );
    }

    Ok(())
}
