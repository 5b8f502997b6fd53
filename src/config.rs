use std::env;
use thiserror::Error;

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("GEMINI_API_KEY is not set; the analysis service cannot call the model")]
    MissingApiKey,
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub body_limit: usize,
    pub http: HttpConfig,
    pub llm: LlmConfig,
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 15,
            connect_timeout_secs: 5,
        }
    }
}

/// Settings for the hosted model endpoint.
///
/// `api_key` is validated once in [`LlmConfig::from_env`]; the client re-checks
/// it before each call so a hand-built config cannot reach the network blank.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_base: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl LlmConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.7,
            max_output_tokens: 1024,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = env::var("GEMINI_API_KEY")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .ok_or(ConfigError::MissingApiKey)?;

        let mut config = Self::new(api_key);
        if let Some(base) = non_empty_var("GEMINI_API_BASE") {
            config.api_base = base.trim_end_matches('/').to_string();
        }
        if let Some(model) = non_empty_var("GEMINI_MODEL") {
            config.model = model;
        }
        if let Some(raw) = non_empty_var("GEMINI_TEMPERATURE") {
            config.temperature = raw
                .parse::<f32>()
                .ok()
                .filter(|v| (0.0..=2.0).contains(v))
                .ok_or(ConfigError::Invalid {
                    key: "GEMINI_TEMPERATURE",
                    value: raw,
                })?;
        }
        if let Some(raw) = non_empty_var("GEMINI_MAX_OUTPUT_TOKENS") {
            config.max_output_tokens = raw
                .parse::<u32>()
                .ok()
                .filter(|v| *v > 0)
                .ok_or(ConfigError::Invalid {
                    key: "GEMINI_MAX_OUTPUT_TOKENS",
                    value: raw,
                })?;
        }
        Ok(config)
    }
}

impl AppConfig {
    /// Reads `.env` (if present) and the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let llm = LlmConfig::from_env()?;
        let http = HttpConfig {
            timeout_secs: parse_var("HTTP_TIMEOUT_SECS").unwrap_or(15),
            connect_timeout_secs: parse_var("HTTP_CONNECT_TIMEOUT_SECS").unwrap_or(5),
        };
        let port = parse_var("PORT").unwrap_or(8000);
        let body_limit = parse_var::<usize>("REQUEST_MAX_BYTES")
            .filter(|v| *v > 0)
            .unwrap_or(16 * 1024);

        Ok(Self {
            port,
            body_limit,
            http,
            llm,
        })
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_var<T: std::str::FromStr>(key: &str) -> Option<T> {
    non_empty_var(key).and_then(|v| v.parse::<T>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn llm_config_defaults() {
        let config = LlmConfig::new("k");
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.api_base, DEFAULT_API_BASE);
        assert!((config.temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(config.max_output_tokens, 1024);
    }

    #[test]
    fn http_config_defaults_are_bounded() {
        let config = HttpConfig::default();
        assert_eq!(config.timeout_secs, 15);
        assert_eq!(config.connect_timeout_secs, 5);
    }

    #[test]
    fn missing_key_message_is_descriptive() {
        let message = ConfigError::MissingApiKey.to_string();
        assert!(message.contains("GEMINI_API_KEY"));
    }
}
