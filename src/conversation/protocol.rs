//! JSON messages exchanged with the conversational agent over the WebSocket.
//!
//! Server events carry a `type` discriminator and a payload object named after
//! the event (`ping` → `ping_event`, ...). Event kinds this client does not act
//! on deserialize to [`ServerEvent::Other`].

use serde::{Deserialize, Deserializer};
use serde_json::{json, Map, Value};

/// Events sent by the agent service.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    ConversationInitiationMetadata {
        conversation_initiation_metadata_event: InitiationMetadata,
    },
    Audio {
        audio_event: AudioEvent,
    },
    AgentResponse {
        agent_response_event: AgentResponseEvent,
    },
    AgentResponseCorrection {
        agent_response_correction_event: AgentResponseCorrectionEvent,
    },
    UserTranscript {
        user_transcription_event: UserTranscriptionEvent,
    },
    Interruption {
        interruption_event: InterruptionEvent,
    },
    Ping {
        ping_event: PingEvent,
    },
    ClientToolCall {
        client_tool_call: ClientToolCall,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InitiationMetadata {
    pub conversation_id: String,
    #[serde(default)]
    pub agent_output_audio_format: Option<String>,
    #[serde(default)]
    pub user_input_audio_format: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AudioEvent {
    pub audio_base_64: String,
    #[serde(deserialize_with = "event_id")]
    pub event_id: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentResponseEvent {
    pub agent_response: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentResponseCorrectionEvent {
    pub original_agent_response: String,
    pub corrected_agent_response: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserTranscriptionEvent {
    pub user_transcript: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InterruptionEvent {
    #[serde(deserialize_with = "event_id")]
    pub event_id: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PingEvent {
    #[serde(deserialize_with = "event_id")]
    pub event_id: u64,
    #[serde(default)]
    pub ping_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientToolCall {
    pub tool_name: String,
    pub tool_call_id: String,
    #[serde(default)]
    pub parameters: Value,
}

impl ClientToolCall {
    /// Tool arguments: the call's parameters plus its `tool_call_id`.
    pub fn arguments(&self) -> Value {
        let mut args = match &self.parameters {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        args.insert(
            "tool_call_id".to_string(),
            Value::String(self.tool_call_id.clone()),
        );
        Value::Object(args)
    }
}

/// Event ids arrive as numbers, occasionally as numeric strings.
fn event_id<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Num(u64),
        Str(String),
    }

    match Repr::deserialize(deserializer)? {
        Repr::Num(n) => Ok(n),
        Repr::Str(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Session overrides sent in the initiation message.
#[derive(Debug, Clone, Default)]
pub struct ConversationConfig {
    /// Extra body forwarded to a custom LLM
    pub extra_body: Option<Value>,
    /// Agent configuration overrides (prompt, first message, language, ...)
    pub conversation_config_override: Option<Value>,
    /// Values for the agent's dynamic variables
    pub dynamic_variables: Option<Value>,
}

/// Messages sent by this client.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    InitiationClientData {
        extra_body: Value,
        config_override: Value,
        dynamic_variables: Value,
    },
    /// Base64 encoded PCM chunk from the microphone.
    UserAudioChunk(String),
    UserMessage(String),
    Pong { event_id: u64 },
    ClientToolResult {
        tool_call_id: String,
        result: String,
        is_error: bool,
    },
}

impl ClientMessage {
    pub fn initiation(config: &ConversationConfig) -> Self {
        let or_empty = |v: &Option<Value>| v.clone().unwrap_or_else(|| json!({}));
        Self::InitiationClientData {
            extra_body: or_empty(&config.extra_body),
            config_override: or_empty(&config.conversation_config_override),
            dynamic_variables: or_empty(&config.dynamic_variables),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::InitiationClientData {
                extra_body,
                config_override,
                dynamic_variables,
            } => json!({
                "type": "conversation_initiation_client_data",
                "custom_llm_extra_body": extra_body,
                "conversation_config_override": config_override,
                "dynamic_variables": dynamic_variables,
            }),
            // The audio chunk is the only untyped message.
            Self::UserAudioChunk(chunk) => json!({ "user_audio_chunk": chunk }),
            Self::UserMessage(text) => json!({ "type": "user_message", "text": text }),
            Self::Pong { event_id } => json!({ "type": "pong", "event_id": event_id }),
            Self::ClientToolResult {
                tool_call_id,
                result,
                is_error,
            } => json!({
                "type": "client_tool_result",
                "tool_call_id": tool_call_id,
                "result": result,
                "is_error": is_error,
            }),
        }
    }

    pub fn to_json(&self) -> String {
        self.to_value().to_string()
    }
}
