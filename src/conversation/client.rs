//! ElevenLabs REST access needed to open a conversation.

use serde::Deserialize;

use super::ConversationError;

/// Connection details for the ElevenLabs API.
#[derive(Debug, Clone)]
pub struct ElevenLabsClient {
    http: reqwest::Client,
    api_base: String,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SignedUrlResponse {
    signed_url: String,
}

impl ElevenLabsClient {
    pub fn new(api_base: String, api_key: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    /// Public WebSocket URL for an agent that does not require auth.
    pub fn conversation_url(&self, agent_id: &str) -> Result<String, ConversationError> {
        let mut url = url::Url::parse(&format!("{}/v1/convai/conversation", self.api_base))
            .map_err(|e| ConversationError::InvalidUrl(format!("{}: {}", self.api_base, e)))?;

        let scheme = match url.scheme() {
            "https" | "wss" => "wss",
            "http" | "ws" => "ws",
            other => {
                return Err(ConversationError::InvalidUrl(format!(
                    "unsupported scheme '{}'",
                    other
                )))
            }
        };
        url.set_scheme(scheme)
            .map_err(|_| ConversationError::InvalidUrl(format!("cannot use scheme '{}'", scheme)))?;
        url.query_pairs_mut().append_pair("agent_id", agent_id);

        Ok(url.to_string())
    }

    /// Ask the API for a signed WebSocket URL (private agents).
    pub async fn get_signed_url(&self, agent_id: &str) -> Result<String, ConversationError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(ConversationError::MissingApiKey)?;

        let url = format!(
            "{}/v1/convai/conversation/get-signed-url?agent_id={}",
            self.api_base,
            urlencoding::encode(agent_id)
        );

        let response = self
            .http
            .get(&url)
            .header("xi-api-key", api_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ConversationError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: SignedUrlResponse = response.json().await?;
        Ok(body.signed_url)
    }
}
