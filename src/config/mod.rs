//! Configuration module for the deployment service.
//!
//! Configuration is read once at startup from environment variables (optionally
//! seeded from a `.env` file) and handed to every component by reference.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors raised while building the configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variables: {}", .0.join(", "))]
    Missing(Vec<&'static str>),

    #[error("Invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// API key for the OpenAI-compatible completion endpoint
    pub llm_api_key: String,
    /// Base URL of the completion API (without trailing slash)
    pub llm_base_url: String,
    /// Model name sent with every completion request
    pub llm_model: String,
    /// GitHub token with `repo` and `pages` scopes
    pub github_token: String,
    /// GitHub REST API root
    pub github_api_url: String,
    /// Account that owns generated repositories; looked up from the token when unset
    pub github_owner: Option<String>,
    /// Shared secret every deploy request must carry
    pub user_secret: String,
    /// Process key used to sign callback payloads
    pub secret_key: String,
    /// `SECRET_KEY` was unset or blank, so `secret_key` is random for this process
    pub secret_key_generated: bool,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    pub log_format: LogFormat,
    /// Path of the JSON deployment state document
    pub state_path: PathBuf,
    pub callback_max_attempts: u32,
    pub hosting_max_attempts: u32,
    /// First backoff step; doubled on every further attempt
    pub retry_base_delay: Duration,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mut missing = Vec::new();
        let mut required = |key: &'static str| {
            get(key).unwrap_or_else(|| {
                missing.push(key);
                String::new()
            })
        };
        let llm_api_key = required("OPENAI_API_KEY");
        let github_token = required("GITHUB_TOKEN");
        let user_secret = required("USER_SECRET");
        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }

        let llm_base_url = get("OPENAI_BASE_URL")
            .unwrap_or_else(|| "https://aipipe.org/openai/v1".to_string())
            .trim_end_matches('/')
            .to_string();
        let llm_model = get("OPENAI_MODEL").unwrap_or_else(|| "gpt-4o".to_string());

        let github_api_url = get("GITHUB_API_URL")
            .unwrap_or_else(|| "https://api.github.com".to_string())
            .trim_end_matches('/')
            .to_string();
        let github_owner = get("GITHUB_OWNER");

        let (secret_key, secret_key_generated) = match get("SECRET_KEY") {
            Some(key) => (key, false),
            None => (uuid::Uuid::new_v4().simple().to_string(), true),
        };

        let host = get("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port: u16 = parse_or(&get, "PORT", 5000)?;
        let bind_addr = format!("{}:{}", host, port)
            .parse()
            .map_err(|_| ConfigError::Invalid {
                name: "HOST",
                value: host.clone(),
            })?;

        let log_level = get("LOG_LEVEL").unwrap_or_else(|| "info".to_string());
        let log_format = match get("LOG_FORMAT").as_deref() {
            None | Some("pretty") | Some("text") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "LOG_FORMAT",
                    value: other.to_string(),
                })
            }
        };

        let state_path = get("DEPLOYMENT_STATE_PATH")
            .unwrap_or_else(|| "deployment_state.json".to_string())
            .into();

        let callback_max_attempts = parse_or::<u32, _>(&get, "CALLBACK_MAX_ATTEMPTS", 3)?.max(1);
        let hosting_max_attempts = parse_or::<u32, _>(&get, "HOSTING_MAX_ATTEMPTS", 3)?.max(1);
        let retry_base_delay =
            Duration::from_millis(parse_or::<u64, _>(&get, "RETRY_BASE_DELAY_MS", 1000)?);

        Ok(Self {
            llm_api_key,
            llm_base_url,
            llm_model,
            github_token,
            github_api_url,
            github_owner,
            user_secret,
            secret_key,
            secret_key_generated,
            bind_addr,
            log_level,
            log_format,
            state_path,
            callback_max_attempts,
            hosting_max_attempts,
            retry_base_delay,
        })
    }
}

fn parse_or<T, G>(get: &G, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(name) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value: raw }),
    }
}
