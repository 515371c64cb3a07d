//! Configuration management for the voice agent client.
//!
//! Configuration is read from environment variables (a `.env` file in the
//! working directory is loaded first by the binary):
//! - `AGENT_ID` - Required. Identifier of the ElevenLabs conversational agent.
//! - `ELEVENLABS_API_KEY` - Optional. Only needed when the agent is private.
//! - `ELEVENLABS_API_BASE` - Optional. Defaults to `https://api.elevenlabs.io`.
//! - `OPENAI_API_KEY` - Optional at startup, required by the image tool.
//! - `OPENAI_BASE_URL` - Optional. Defaults to `https://api.openai.com/v1`.
//! - `IMAGE_MODEL` - Optional. Defaults to `dall-e-3`.
//! - `SEARCH_ENDPOINT` - Optional. DuckDuckGo HTML endpoint.
//! - `WORKSPACE_PATH` - Optional. Base directory for relative tool paths. Defaults to current directory.

use std::path::PathBuf;
use thiserror::Error;

pub const DEFAULT_ELEVENLABS_API_BASE: &str = "https://api.elevenlabs.io";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_SEARCH_ENDPOINT: &str = "https://html.duckduckgo.com/html/";
pub const DEFAULT_IMAGE_MODEL: &str = "dall-e-3";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// ElevenLabs agent identifier
    pub agent_id: String,

    /// ElevenLabs API key (absent for public agents)
    pub elevenlabs_api_key: Option<String>,

    /// ElevenLabs REST base URL, also used to derive the WebSocket URL
    pub elevenlabs_api_base: String,

    /// OpenAI API key for image generation
    pub openai_api_key: Option<String>,

    /// OpenAI REST base URL
    pub openai_base_url: String,

    /// Image model identifier
    pub image_model: String,

    /// DuckDuckGo HTML search endpoint
    pub search_endpoint: String,

    /// Directory relative tool paths resolve against
    pub workspace_path: PathBuf,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if `AGENT_ID` is unset or blank.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Blank values count as unset.
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let agent_id = get("AGENT_ID")
            .map(|v| v.trim().to_string())
            .ok_or_else(|| ConfigError::MissingEnvVar("AGENT_ID".to_string()))?;

        let elevenlabs_api_key = get("ELEVENLABS_API_KEY");
        let openai_api_key = get("OPENAI_API_KEY");

        let elevenlabs_api_base = parse_url(
            "ELEVENLABS_API_BASE",
            get("ELEVENLABS_API_BASE").unwrap_or_else(|| DEFAULT_ELEVENLABS_API_BASE.to_string()),
        )
        .map(base_url)?;
        let openai_base_url = parse_url(
            "OPENAI_BASE_URL",
            get("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
        )
        .map(base_url)?;
        let search_endpoint = parse_url(
            "SEARCH_ENDPOINT",
            get("SEARCH_ENDPOINT").unwrap_or_else(|| DEFAULT_SEARCH_ENDPOINT.to_string()),
        )?;

        let image_model = get("IMAGE_MODEL").unwrap_or_else(|| DEFAULT_IMAGE_MODEL.to_string());

        let workspace_path = get("WORKSPACE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

        Ok(Self {
            agent_id,
            elevenlabs_api_key,
            elevenlabs_api_base,
            openai_api_key,
            openai_base_url,
            image_model,
            search_endpoint,
            workspace_path,
        })
    }

    /// Create a config with custom values (useful for testing).
    pub fn new(agent_id: String, workspace_path: PathBuf) -> Self {
        Self {
            agent_id,
            elevenlabs_api_key: None,
            elevenlabs_api_base: DEFAULT_ELEVENLABS_API_BASE.to_string(),
            openai_api_key: None,
            openai_base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            search_endpoint: DEFAULT_SEARCH_ENDPOINT.to_string(),
            workspace_path,
        }
    }

    /// Private agents need a signed conversation URL.
    pub fn requires_auth(&self) -> bool {
        self.elevenlabs_api_key.is_some()
    }
}

fn parse_url(name: &str, value: String) -> Result<String, ConfigError> {
    url::Url::parse(&value)
        .map_err(|e| ConfigError::InvalidValue(name.to_string(), format!("{}", e)))?;
    Ok(value)
}

fn base_url(value: String) -> String {
    value.trim_end_matches('/').to_string()
}
