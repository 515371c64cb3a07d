//! Voice agent client - entry point.
//!
//! Opens a conversation with the configured agent, prints transcripts,
//! forwards typed stdin lines as user messages and ends on Ctrl-C.

use std::io::BufRead;
use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use voice_agent_tools::conversation::{
    Callbacks, Conversation, ElevenLabsClient, SessionController, SilentAudio,
};
use voice_agent_tools::{Config, ToolRegistry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env before the filter reads RUST_LOG
    let dotenv = dotenvy::dotenv();

    // Initialize logging (stderr, stdout carries the transcript)
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voice_agent_tools=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match dotenv {
        Ok(path) => info!("Loaded environment from {}", path.display()),
        Err(dotenvy::Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to load .env file: {}", e),
    }

    let config = Config::from_env()?;
    info!(
        "Loaded configuration: agent={} auth={}",
        config.agent_id,
        config.requires_auth()
    );

    let tools = ToolRegistry::with_defaults(&config)?;
    for tool in tools.list_tools() {
        info!("Tool available: {}", tool.name);
    }

    let client = ElevenLabsClient::new(
        config.elevenlabs_api_base.clone(),
        config.elevenlabs_api_key.clone(),
    );

    let callbacks = Callbacks::default()
        .on_agent_response(|response| println!("Agent: {}", response))
        .on_agent_response_correction(|original, corrected| {
            println!("Agent: {} -> {}", original, corrected)
        })
        .on_user_transcript(|transcript| println!("User: {}", transcript));

    let session = Conversation::new(
        client,
        config.agent_id.clone(),
        Arc::new(tools),
        config.requires_auth(),
        Arc::new(SilentAudio::default()),
        callbacks,
    )
    .with_workspace(config.workspace_path.clone())
    .start_session()
    .await?;

    let controller = session.controller();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, ending session");
            controller.end_session();
        }
    });

    // Blocking stdin reads stay off the runtime so shutdown isn't held up.
    let input = session.controller();
    std::thread::spawn(move || forward_stdin(input));

    let conversation_id = session.wait_for_session_end().await?;
    match conversation_id {
        Some(id) => println!("Conversation ID: {}", id),
        None => println!("Conversation ID: None"),
    }

    Ok(())
}

/// Send each non-empty stdin line to the agent as a user message.
fn forward_stdin(controller: SessionController) {
    for line in std::io::stdin().lock().lines() {
        let Ok(line) = line else { break };
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if controller.send_user_message(text).is_err() {
            break;
        }
    }
}
