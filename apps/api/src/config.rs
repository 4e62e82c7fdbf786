use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub llm_provider: String,
    pub llm_model: String,
    pub gemini_api_key: Option<String>,
    pub openrouter_api_key: Option<String>,
    pub oracle_timeout_secs: u64,
    pub cors_origins: Vec<String>,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            jwt_secret: require_env("JWT_SECRET")?,
            llm_provider: std::env::var("LLM_PROVIDER")
                .map(|p| p.trim().to_lowercase())
                .unwrap_or_else(|_| "gemini".to_string()),
            llm_model: std::env::var("LLM_MODEL")
                .unwrap_or_else(|_| "deepseek/deepseek-v3".to_string()),
            gemini_api_key: optional_env("GEMINI_API_KEY"),
            openrouter_api_key: optional_env("OPENROUTER_API_KEY"),
            oracle_timeout_secs: std::env::var("ORACLE_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse::<u64>()
                .context("ORACLE_TIMEOUT_SECS must be a whole number of seconds")?,
            cors_origins: optional_env("CORS_ORIGINS")
                .map(|raw| split_list(&raw))
                .unwrap_or_default(),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

/// Blank values count as unset so `.env` templates with `KEY=` stay harmless.
fn optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
