//! # Voice Agent Tools
//!
//! A small client that connects an ElevenLabs conversational voice agent to
//! local client tools.
//!
//! This library provides:
//! - A WebSocket session with the hosted agent (transcript callbacks, pings,
//!   interruptions, client tool calls)
//! - A tool registry with web search, text file append and image generation
//! - Environment based configuration
//!
//! ## Flow
//!
//! 1. Load configuration and build the tool registry
//! 2. Open a session with the agent (signed URL for private agents)
//! 3. Dispatch server events: print transcripts, answer pings, run tools
//! 4. End on interrupt or when the server closes; report the conversation id
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use voice_agent_tools::conversation::{Callbacks, Conversation, ElevenLabsClient, SilentAudio};
//! use voice_agent_tools::{Config, ToolRegistry};
//!
//! let config = Config::from_env()?;
//! let client = ElevenLabsClient::new(config.elevenlabs_api_base.clone(), config.elevenlabs_api_key.clone());
//! let session = Conversation::new(
//!     client,
//!     config.agent_id.clone(),
//!     Arc::new(ToolRegistry::with_defaults(&config)?),
//!     config.requires_auth(),
//!     Arc::new(SilentAudio::default()),
//!     Callbacks::default().on_agent_response(|r| println!("Agent: {r}")),
//! )
//! .start_session()
//! .await?;
//! let conversation_id = session.wait_for_session_end().await?;
//! ```

pub mod config;
pub mod conversation;
pub mod images;
pub mod tools;

pub use config::Config;
pub use tools::ToolRegistry;
