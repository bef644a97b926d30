//! Endpoint configuration, sourced from the environment with CLI overrides.

use std::env;

pub const DEFAULT_CHAT_URL: &str = "wss://spark-api.xf-yun.com/v4.0/chat";
pub const DEFAULT_DOMAIN: &str = "4.0Ultra";
pub const DEFAULT_TEMPERATURE: f64 = 0.5;
pub const DEFAULT_MAX_TOKENS: u32 = 2048;

/// Credentials and tuning for the Spark endpoint.
#[derive(Debug, Clone)]
pub struct SparkConfig {
    pub app_id: String,
    pub api_key: String,
    pub api_secret: String,
    pub chat_url: String,
    pub domain: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl SparkConfig {
    /// Reads credentials from `SPARK_APP_ID`, `SPARK_API_KEY`, and
    /// `SPARK_API_SECRET`. Endpoint and model parameters fall back to the
    /// v4.0 Ultra defaults when unset.
    pub fn from_env() -> Result<Self, String> {
        Ok(SparkConfig {
            app_id: require_env("SPARK_APP_ID")?,
            api_key: require_env("SPARK_API_KEY")?,
            api_secret: require_env("SPARK_API_SECRET")?,
            chat_url: env::var("SPARK_CHAT_URL").unwrap_or_else(|_| DEFAULT_CHAT_URL.to_string()),
            domain: env::var("SPARK_DOMAIN").unwrap_or_else(|_| DEFAULT_DOMAIN.to_string()),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        })
    }
}

fn require_env(name: &str) -> Result<String, String> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(format!("{name} environment variable is not set")),
    }
}
