use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;

const APP_DIR: &str = "consult-agent";

/// Runtime settings, read once at startup. Credentials come exclusively
/// from the environment (or a .env file) and are never written anywhere.
#[derive(Debug, Clone)]
pub struct Config {
    pub chat_api_url: String,
    pub chat_api_key: String,
    pub chat_model: String,
    pub chat_model_light: String,
    pub research_api_url: String,
    pub research_api_key: String,
    pub research_model: String,
    pub request_timeout_secs: u64,
    pub data_dir: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            chat_api_url: std::env::var("CHAT_API_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1/chat/completions".into()),
            chat_api_key: std::env::var("CHAT_API_KEY").context("CHAT_API_KEY must be set")?,
            chat_model: std::env::var("CHAT_MODEL").unwrap_or_else(|_| "gpt-4o".into()),
            chat_model_light: std::env::var("CHAT_MODEL_LIGHT")
                .unwrap_or_else(|_| "gpt-4o-mini".into()),
            research_api_url: std::env::var("RESEARCH_API_URL")
                .unwrap_or_else(|_| "https://api.perplexity.ai/chat/completions".into()),
            // Absent or malformed research credentials are not an error: the
            // gateway falls back to the chat model instead.
            research_api_key: std::env::var("RESEARCH_API_KEY").unwrap_or_default(),
            research_model: std::env::var("RESEARCH_MODEL").unwrap_or_else(|_| "sonar".into()),
            request_timeout_secs: std::env::var("REQUEST_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".into())
                .parse()
                .context("REQUEST_TIMEOUT_SECS must be a number")?,
            data_dir: std::env::var("DATA_DIR").ok().map(PathBuf::from),
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(default_data_dir)
    }

    /// Data directory without loading the full config; used by commands
    /// that touch the patient store but never dial an upstream.
    pub fn data_dir_from_env() -> PathBuf {
        dotenvy::dotenv().ok();
        std::env::var("DATA_DIR")
            .ok()
            .map(PathBuf::from)
            .unwrap_or_else(default_data_dir)
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}
