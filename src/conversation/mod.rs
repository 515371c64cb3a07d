//! Conversational agent session.
//!
//! - `client`: REST calls and URL construction for opening a conversation.
//! - `protocol`: JSON messages exchanged over the WebSocket.
//! - `audio`: the audio device seam.
//! - `session`: connection lifecycle, event dispatch and client tool calls.

mod audio;
mod client;
pub mod protocol;
mod session;

use thiserror::Error;

pub use audio::{AudioInput, AudioInterface, SilentAudio};
pub use client::ElevenLabsClient;
pub use protocol::ConversationConfig;
pub use session::{Callbacks, Conversation, SessionController, SessionHandle};

#[derive(Debug, Error)]
pub enum ConversationError {
    #[error("ELEVENLABS_API_KEY is required to open a conversation with a private agent")]
    MissingApiKey,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("ElevenLabs API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Session has ended")]
    SessionClosed,

    #[error("Session task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
