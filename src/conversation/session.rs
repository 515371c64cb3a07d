//! Session lifecycle against the agent WebSocket.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::Engine;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::audio::{AudioInput, AudioInterface};
use super::client::ElevenLabsClient;
use super::protocol::{ClientMessage, ClientToolCall, ConversationConfig, ServerEvent};
use super::ConversationError;
use crate::tools::ToolRegistry;

type TextCallback = Box<dyn Fn(&str) + Send + Sync>;
type CorrectionCallback = Box<dyn Fn(&str, &str) + Send + Sync>;
type LatencyCallback = Box<dyn Fn(u64) + Send + Sync>;

/// Transcript and response hooks. Texts are trimmed before delivery.
#[derive(Default)]
pub struct Callbacks {
    agent_response: Option<TextCallback>,
    agent_response_correction: Option<CorrectionCallback>,
    user_transcript: Option<TextCallback>,
    latency_measurement: Option<LatencyCallback>,
}

impl Callbacks {
    pub fn on_agent_response(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.agent_response = Some(Box::new(f));
        self
    }

    /// Called with `(original, corrected)` when the agent revises a response.
    pub fn on_agent_response_correction(
        mut self,
        f: impl Fn(&str, &str) + Send + Sync + 'static,
    ) -> Self {
        self.agent_response_correction = Some(Box::new(f));
        self
    }

    pub fn on_user_transcript(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.user_transcript = Some(Box::new(f));
        self
    }

    /// Round-trip latency in milliseconds, as reported by server pings.
    pub fn on_latency_measurement(mut self, f: impl Fn(u64) + Send + Sync + 'static) -> Self {
        self.latency_measurement = Some(Box::new(f));
        self
    }
}

/// A conversation with a remote agent, ready to be started.
pub struct Conversation {
    client: ElevenLabsClient,
    agent_id: String,
    tools: Arc<ToolRegistry>,
    requires_auth: bool,
    audio: Arc<dyn AudioInterface>,
    callbacks: Callbacks,
    config: ConversationConfig,
    workspace: PathBuf,
}

impl Conversation {
    pub fn new(
        client: ElevenLabsClient,
        agent_id: impl Into<String>,
        tools: Arc<ToolRegistry>,
        requires_auth: bool,
        audio: Arc<dyn AudioInterface>,
        callbacks: Callbacks,
    ) -> Self {
        Self {
            client,
            agent_id: agent_id.into(),
            tools,
            requires_auth,
            audio,
            callbacks,
            config: ConversationConfig::default(),
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    pub fn with_config(mut self, config: ConversationConfig) -> Self {
        self.config = config;
        self
    }

    /// Directory tool calls resolve relative paths against.
    pub fn with_workspace(mut self, workspace: PathBuf) -> Self {
        self.workspace = workspace;
        self
    }

    /// Connect, send the initiation message, start audio and spawn the
    /// session task.
    pub async fn start_session(self) -> Result<SessionHandle, ConversationError> {
        let url = if self.requires_auth {
            self.client.get_signed_url(&self.agent_id).await?
        } else {
            self.client.conversation_url(&self.agent_id)?
        };

        info!("Connecting to agent {}", self.agent_id);
        let (ws, _) = tokio_tungstenite::connect_async(url.as_str()).await?;
        let (mut sink, stream) = ws.split();

        let init = ClientMessage::initiation(&self.config);
        sink.send(Message::Text(init.to_json().into())).await?;

        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        self.audio.start(AudioInput::new(outgoing.clone()));

        let state = SessionState {
            conversation_id: None,
            last_interrupt_id: 0,
            callbacks: self.callbacks,
            audio: Arc::clone(&self.audio),
            tools: self.tools,
            workspace: Arc::new(self.workspace),
            outgoing: outgoing.clone(),
        };

        let task = tokio::spawn(run_session(sink, stream, outgoing_rx, state, cancel.clone()));

        Ok(SessionHandle {
            controller: SessionController {
                cancel,
                outgoing,
                audio: self.audio,
            },
            task,
        })
    }
}

/// Cloneable control surface of a running session.
#[derive(Clone)]
pub struct SessionController {
    cancel: CancellationToken,
    outgoing: mpsc::UnboundedSender<ClientMessage>,
    audio: Arc<dyn AudioInterface>,
}

impl SessionController {
    /// Stop audio and close the connection. Safe to call repeatedly.
    pub fn end_session(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.audio.stop();
        self.cancel.cancel();
    }

    /// Send typed text to the agent as if the user had said it.
    pub fn send_user_message(&self, text: &str) -> Result<(), ConversationError> {
        if self.cancel.is_cancelled() {
            return Err(ConversationError::SessionClosed);
        }
        self.outgoing
            .send(ClientMessage::UserMessage(text.to_string()))
            .map_err(|_| ConversationError::SessionClosed)
    }

    pub fn is_ended(&self) -> bool {
        self.cancel.is_cancelled() || self.outgoing.is_closed()
    }
}

/// A started session.
pub struct SessionHandle {
    controller: SessionController,
    task: JoinHandle<Result<Option<String>, ConversationError>>,
}

impl SessionHandle {
    pub fn controller(&self) -> SessionController {
        self.controller.clone()
    }

    pub fn end_session(&self) {
        self.controller.end_session();
    }

    pub fn send_user_message(&self, text: &str) -> Result<(), ConversationError> {
        self.controller.send_user_message(text)
    }

    /// Block until the session ends and return the conversation id, if the
    /// server announced one.
    pub async fn wait_for_session_end(self) -> Result<Option<String>, ConversationError> {
        self.task.await?
    }
}

/// Per-session state owned by the session task.
struct SessionState {
    conversation_id: Option<String>,
    /// Audio events at or below this id belong to an interrupted response.
    last_interrupt_id: u64,
    callbacks: Callbacks,
    audio: Arc<dyn AudioInterface>,
    tools: Arc<ToolRegistry>,
    workspace: Arc<PathBuf>,
    outgoing: mpsc::UnboundedSender<ClientMessage>,
}

impl SessionState {
    fn handle_message(&mut self, text: &str) {
        match serde_json::from_str::<ServerEvent>(text) {
            Ok(event) => self.handle_event(event),
            Err(e) => debug!("Ignoring unparseable event ({}): {}", e, truncate(text, 200)),
        }
    }

    fn handle_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::ConversationInitiationMetadata {
                conversation_initiation_metadata_event: meta,
            } => {
                if let Some(current) = &self.conversation_id {
                    warn!(
                        "Ignoring repeated conversation metadata ({}), keeping {}",
                        meta.conversation_id, current
                    );
                    return;
                }
                info!("Conversation started: {}", meta.conversation_id);
                debug!(
                    "Audio formats: agent={:?} user={:?}",
                    meta.agent_output_audio_format, meta.user_input_audio_format
                );
                self.conversation_id = Some(meta.conversation_id);
            }
            ServerEvent::Audio { audio_event } => {
                if audio_event.event_id <= self.last_interrupt_id {
                    return;
                }
                match base64::engine::general_purpose::STANDARD.decode(&audio_event.audio_base_64) {
                    Ok(audio) => self.audio.output(audio),
                    Err(e) => warn!(
                        "Dropping undecodable audio event {}: {}",
                        audio_event.event_id, e
                    ),
                }
            }
            ServerEvent::AgentResponse {
                agent_response_event,
            } => {
                if let Some(cb) = &self.callbacks.agent_response {
                    cb(agent_response_event.agent_response.trim());
                }
            }
            ServerEvent::AgentResponseCorrection {
                agent_response_correction_event: correction,
            } => {
                if let Some(cb) = &self.callbacks.agent_response_correction {
                    cb(
                        correction.original_agent_response.trim(),
                        correction.corrected_agent_response.trim(),
                    );
                }
            }
            ServerEvent::UserTranscript {
                user_transcription_event,
            } => {
                if let Some(cb) = &self.callbacks.user_transcript {
                    cb(user_transcription_event.user_transcript.trim());
                }
            }
            ServerEvent::Interruption { interruption_event } => {
                debug!("Agent interrupted at event {}", interruption_event.event_id);
                self.last_interrupt_id = interruption_event.event_id;
                self.audio.interrupt();
            }
            ServerEvent::Ping { ping_event } => {
                self.send(ClientMessage::Pong {
                    event_id: ping_event.event_id,
                });
                if let (Some(cb), Some(ms)) = (
                    &self.callbacks.latency_measurement,
                    ping_event.ping_ms.filter(|ms| *ms > 0),
                ) {
                    cb(ms);
                }
            }
            ServerEvent::ClientToolCall { client_tool_call } => {
                self.spawn_tool_call(client_tool_call);
            }
            ServerEvent::Other => {}
        }
    }

    /// Run a tool call off the read loop; the result is queued when done.
    fn spawn_tool_call(&self, call: ClientToolCall) {
        info!("Agent called tool {} ({})", call.tool_name, call.tool_call_id);

        let tools = Arc::clone(&self.tools);
        let workspace = Arc::clone(&self.workspace);
        let outgoing = self.outgoing.clone();

        tokio::spawn(async move {
            let reply = run_tool_call(&tools, &call, &workspace).await;
            if outgoing.send(reply).is_err() {
                debug!(
                    "Session ended before the result of {} could be sent",
                    call.tool_call_id
                );
            }
        });
    }

    fn send(&self, message: ClientMessage) {
        if self.outgoing.send(message).is_err() {
            debug!("Outgoing channel closed");
        }
    }
}

/// Execute a tool call and build the result message for the agent.
async fn run_tool_call(
    tools: &ToolRegistry,
    call: &ClientToolCall,
    workspace: &Path,
) -> ClientMessage {
    let (result, is_error) = match tools
        .execute(&call.tool_name, call.arguments(), workspace)
        .await
    {
        Ok(output) if output.is_empty() => (
            format!("Client tool: {} called successfully.", call.tool_name),
            false,
        ),
        Ok(output) => (output, false),
        Err(e) => {
            warn!("Tool {} failed: {:#}", call.tool_name, e);
            (e.to_string(), true)
        }
    };

    ClientMessage::ClientToolResult {
        tool_call_id: call.tool_call_id.clone(),
        result,
        is_error,
    }
}

async fn run_session<S, R>(
    mut sink: S,
    mut stream: R,
    mut outgoing: mpsc::UnboundedReceiver<ClientMessage>,
    mut state: SessionState,
    cancel: CancellationToken,
) -> Result<Option<String>, ConversationError>
where
    S: Sink<Message, Error = WsError> + Unpin,
    R: Stream<Item = Result<Message, WsError>> + Unpin,
{
    let result = loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                // Flush messages queued before the end was requested.
                while let Ok(message) = outgoing.try_recv() {
                    if let Err(e) = send_message(&mut sink, &message).await {
                        debug!("Could not flush pending message: {}", e);
                        break;
                    }
                }
                info!("Ending session");
                if let Err(e) = sink.send(Message::Close(None)).await {
                    debug!("Close frame not sent: {}", e);
                }
                break Ok(());
            }
            Some(message) = outgoing.recv() => {
                match send_message(&mut sink, &message).await {
                    Ok(()) => {}
                    Err(e) if is_closed(&e) => {
                        info!("Connection closed while sending");
                        break Ok(());
                    }
                    Err(e) => break Err(e.into()),
                }
            }
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => state.handle_message(&text),
                Some(Ok(Message::Close(frame))) => {
                    info!("Session closed by server: {:?}", frame);
                    break Ok(());
                }
                Some(Ok(_)) => {}
                Some(Err(e)) if is_closed(&e) => {
                    info!("Connection closed");
                    break Ok(());
                }
                Some(Err(e)) => break Err(e.into()),
                None => {
                    info!("Connection closed");
                    break Ok(());
                }
            },
        }
    };

    state.audio.stop();
    cancel.cancel();

    result.map(|()| state.conversation_id)
}

async fn send_message<S>(sink: &mut S, message: &ClientMessage) -> Result<(), WsError>
where
    S: Sink<Message, Error = WsError> + Unpin,
{
    sink.send(Message::Text(message.to_json().into())).await
}

fn is_closed(e: &WsError) -> bool {
    matches!(e, WsError::ConnectionClosed | WsError::AlreadyClosed)
}

fn truncate(s: &str, max_len: usize) -> &str {
    match s.char_indices().nth(max_len) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{SaveToTxt, Tool};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
    use tokio_tungstenite::WebSocketStream;

    #[derive(Default)]
    struct RecordingAudio {
        started: AtomicBool,
        stops: AtomicUsize,
        interrupts: AtomicUsize,
        played: Mutex<Vec<Vec<u8>>>,
    }

    impl AudioInterface for RecordingAudio {
        fn start(&self, _input: AudioInput) {
            self.started.store(true, Ordering::SeqCst);
        }

        fn stop(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }

        fn output(&self, audio: Vec<u8>) {
            self.played.lock().unwrap().push(audio);
        }

        fn interrupt(&self) {
            self.interrupts.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Returns `text`, or fails when `fail` is set.
    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echo text back"
        }

        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }

        async fn execute(&self, args: Value, _workspace: &Path) -> anyhow::Result<String> {
            if args["fail"].as_bool().unwrap_or(false) {
                anyhow::bail!("echo refused");
            }
            Ok(args["text"].as_str().unwrap_or_default().to_string())
        }
    }

    fn recorder() -> (Arc<Mutex<Vec<String>>>, Callbacks) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (a, c, u, l) = (log.clone(), log.clone(), log.clone(), log.clone());
        let callbacks = Callbacks::default()
            .on_agent_response(move |r| a.lock().unwrap().push(format!("agent: {}", r)))
            .on_agent_response_correction(move |o, n| {
                c.lock().unwrap().push(format!("correction: {} -> {}", o, n))
            })
            .on_user_transcript(move |t| u.lock().unwrap().push(format!("user: {}", t)))
            .on_latency_measurement(move |ms| l.lock().unwrap().push(format!("latency: {}", ms)));
        (log, callbacks)
    }

    fn state(
        audio: Arc<RecordingAudio>,
        callbacks: Callbacks,
    ) -> (SessionState, mpsc::UnboundedReceiver<ClientMessage>) {
        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(Echo));

        let (outgoing, rx) = mpsc::unbounded_channel();
        let state = SessionState {
            conversation_id: None,
            last_interrupt_id: 0,
            callbacks,
            audio,
            tools: Arc::new(tools),
            workspace: Arc::new(std::env::temp_dir()),
            outgoing,
        };
        (state, rx)
    }

    fn event(value: Value) -> String {
        value.to_string()
    }

    #[tokio::test]
    async fn callbacks_receive_trimmed_text() {
        let (log, callbacks) = recorder();
        let (mut state, _rx) = state(Arc::new(RecordingAudio::default()), callbacks);

        state.handle_message(&event(json!({
            "type": "agent_response",
            "agent_response_event": {"agent_response": "  Hi!  "}
        })));
        state.handle_message(&event(json!({
            "type": "agent_response_correction",
            "agent_response_correction_event": {
                "original_agent_response": "Hi! How are ",
                "corrected_agent_response": "Hi! "
            }
        })));
        state.handle_message(&event(json!({
            "type": "user_transcript",
            "user_transcription_event": {"user_transcript": " hello\n"}
        })));
        state.handle_message("not json");

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "agent: Hi!".to_string(),
                "correction: Hi! How are -> Hi!".to_string(),
                "user: hello".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn first_conversation_id_wins() {
        let (mut state, _rx) = state(Arc::new(RecordingAudio::default()), Callbacks::default());

        for id in ["conv_a", "conv_b"] {
            state.handle_message(&event(json!({
                "type": "conversation_initiation_metadata",
                "conversation_initiation_metadata_event": {"conversation_id": id}
            })));
        }

        assert_eq!(state.conversation_id.as_deref(), Some("conv_a"));
    }

    #[tokio::test]
    async fn ping_is_answered_and_measured() {
        let (log, callbacks) = recorder();
        let (mut state, mut rx) = state(Arc::new(RecordingAudio::default()), callbacks);

        state.handle_message(&event(json!({
            "type": "ping",
            "ping_event": {"event_id": 5, "ping_ms": 87}
        })));
        state.handle_message(&event(json!({
            "type": "ping",
            "ping_event": {"event_id": 6}
        })));

        assert_eq!(rx.recv().await, Some(ClientMessage::Pong { event_id: 5 }));
        assert_eq!(rx.recv().await, Some(ClientMessage::Pong { event_id: 6 }));
        assert_eq!(*log.lock().unwrap(), vec!["latency: 87".to_string()]);
    }

    #[tokio::test]
    async fn interrupted_audio_is_dropped() {
        let audio = Arc::new(RecordingAudio::default());
        let (mut state, _rx) = state(audio.clone(), Callbacks::default());

        let chunk = |id: u64, b64: &str| {
            event(json!({"type": "audio", "audio_event": {"audio_base_64": b64, "event_id": id}}))
        };

        state.handle_message(&chunk(1, "AQI="));
        state.handle_message(&event(json!({
            "type": "interruption",
            "interruption_event": {"event_id": 2}
        })));
        state.handle_message(&chunk(2, "AwQ="));
        state.handle_message(&chunk(3, "BQY="));

        assert_eq!(*audio.played.lock().unwrap(), vec![vec![1, 2], vec![5, 6]]);
        assert_eq!(audio.interrupts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn tool_calls_report_results_and_errors() {
        let (mut state, mut rx) = state(Arc::new(RecordingAudio::default()), Callbacks::default());

        let call = |id: &str, name: &str, params: Value| {
            event(json!({
                "type": "client_tool_call",
                "client_tool_call": {"tool_name": name, "tool_call_id": id, "parameters": params}
            }))
        };

        state.handle_message(&call("c1", "echo", json!({"text": "pong"})));
        let reply = rx.recv().await.unwrap();
        assert_eq!(
            reply,
            ClientMessage::ClientToolResult {
                tool_call_id: "c1".to_string(),
                result: "pong".to_string(),
                is_error: false
            }
        );

        state.handle_message(&call("c2", "echo", json!({})));
        let reply = rx.recv().await.unwrap();
        assert_eq!(
            reply,
            ClientMessage::ClientToolResult {
                tool_call_id: "c2".to_string(),
                result: "Client tool: echo called successfully.".to_string(),
                is_error: false
            }
        );

        state.handle_message(&call("c3", "echo", json!({"fail": true})));
        let reply = rx.recv().await.unwrap();
        assert_eq!(
            reply,
            ClientMessage::ClientToolResult {
                tool_call_id: "c3".to_string(),
                result: "echo refused".to_string(),
                is_error: true
            }
        );

        state.handle_message(&call("c4", "missing", json!({})));
        let reply = rx.recv().await.unwrap();
        assert_eq!(
            reply,
            ClientMessage::ClientToolResult {
                tool_call_id: "c4".to_string(),
                result: "Tool 'missing' is not registered".to_string(),
                is_error: true
            }
        );
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("hi", 10), "hi");
    }

    // ── Against a local WebSocket server ─────────────────────────────

    type ServerWs = WebSocketStream<tokio::net::TcpStream>;

    /// Accept one connection; returns the request URI alongside the socket.
    async fn accept(listener: &TcpListener) -> (String, ServerWs) {
        let (stream, _) = listener.accept().await.unwrap();
        let uri = Arc::new(Mutex::new(String::new()));
        let seen = uri.clone();
        let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            *seen.lock().unwrap() = req.uri().to_string();
            Ok(resp)
        };
        let ws = tokio_tungstenite::accept_hdr_async(stream, callback)
            .await
            .unwrap();
        let uri = uri.lock().unwrap().clone();
        (uri, ws)
    }

    async fn send_json(ws: &mut ServerWs, value: Value) {
        ws.send(Message::Text(value.to_string().into())).await.unwrap();
    }

    /// Next text frame as JSON; `None` once the client closes.
    async fn next_json(ws: &mut ServerWs) -> Option<Value> {
        while let Some(Ok(frame)) = ws.next().await {
            match frame {
                Message::Text(text) => return Some(serde_json::from_str(&text).unwrap()),
                Message::Close(_) => return None,
                _ => {}
            }
        }
        None
    }

    #[tokio::test]
    async fn session_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let dir = tempfile::tempdir().expect("tempdir");

        let server = tokio::spawn(async move {
            let (uri, mut ws) = accept(&listener).await;

            let init = next_json(&mut ws).await.unwrap();
            assert_eq!(init["type"], "conversation_initiation_client_data");

            send_json(&mut ws, json!({
                "type": "conversation_initiation_metadata",
                "conversation_initiation_metadata_event": {
                    "conversation_id": "conv_1",
                    "agent_output_audio_format": "pcm_16000",
                    "user_input_audio_format": "pcm_16000"
                }
            }))
            .await;
            send_json(
                &mut ws,
                json!({"type": "ping", "ping_event": {"event_id": 7, "ping_ms": 42}}),
            )
            .await;
            send_json(&mut ws, json!({
                "type": "agent_response",
                "agent_response_event": {"agent_response": "  Hello there  "}
            }))
            .await;
            send_json(&mut ws, json!({
                "type": "client_tool_call",
                "client_tool_call": {
                    "tool_name": "save_to_txt",
                    "tool_call_id": "call_1",
                    "parameters": {"filename": "notes/out.txt", "data": "hello"}
                }
            }))
            .await;

            let mut replies = Vec::new();
            while replies.len() < 2 {
                replies.push(next_json(&mut ws).await.unwrap());
            }

            send_json(&mut ws, json!({
                "type": "user_transcript",
                "user_transcription_event": {"user_transcript": " Thanks "}
            }))
            .await;
            ws.close(None).await.unwrap();

            (uri, replies)
        });

        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(SaveToTxt));
        tools.register_alias("save_to_txt", "saveToTxt");

        let audio = Arc::new(RecordingAudio::default());
        let (log, callbacks) = recorder();

        let session = Conversation::new(
            ElevenLabsClient::new(format!("http://{}", addr), None),
            "agent_1",
            Arc::new(tools),
            false,
            audio.clone(),
            callbacks,
        )
        .with_workspace(dir.path().to_path_buf())
        .start_session()
        .await
        .unwrap();

        let conversation_id = session.wait_for_session_end().await.unwrap();
        let (uri, replies) = server.await.unwrap();

        assert_eq!(conversation_id.as_deref(), Some("conv_1"));
        assert_eq!(uri, "/v1/convai/conversation?agent_id=agent_1");

        let pong = replies.iter().find(|r| r["type"] == "pong").unwrap();
        assert_eq!(pong["event_id"], 7);

        let result = replies
            .iter()
            .find(|r| r["type"] == "client_tool_result")
            .unwrap();
        assert_eq!(result["tool_call_id"], "call_1");
        assert_eq!(result["is_error"], false);
        assert!(result["result"].as_str().unwrap().ends_with("out.txt"));
        assert_eq!(
            std::fs::read_to_string(dir.path().join("notes/out.txt")).unwrap(),
            "hello\n"
        );

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "latency: 42".to_string(),
                "agent: Hello there".to_string(),
                "user: Thanks".to_string(),
            ]
        );
        assert!(audio.started.load(Ordering::SeqCst));
        assert!(audio.stops.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn end_session_flushes_and_closes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (_, mut ws) = accept(&listener).await;
            let mut received = Vec::new();
            while let Some(message) = next_json(&mut ws).await {
                received.push(message);
            }
            received
        });

        let session = Conversation::new(
            ElevenLabsClient::new(format!("http://{}", addr), None),
            "agent_1",
            Arc::new(ToolRegistry::new()),
            false,
            Arc::new(RecordingAudio::default()),
            Callbacks::default(),
        )
        .with_config(ConversationConfig {
            dynamic_variables: Some(json!({"user_name": "Sam"})),
            ..Default::default()
        })
        .start_session()
        .await
        .unwrap();

        let controller = session.controller();
        controller.send_user_message("hello agent").unwrap();
        session.end_session();
        session.end_session();

        assert!(controller.is_ended());
        assert!(matches!(
            controller.send_user_message("too late"),
            Err(ConversationError::SessionClosed)
        ));

        let conversation_id = session.wait_for_session_end().await.unwrap();
        assert!(conversation_id.is_none());

        let received = server.await.unwrap();
        assert_eq!(received[0]["type"], "conversation_initiation_client_data");
        assert_eq!(received[0]["dynamic_variables"]["user_name"], "Sam");
        assert_eq!(
            received[1],
            json!({"type": "user_message", "text": "hello agent"})
        );
    }

    #[tokio::test]
    async fn private_agent_uses_signed_url() {
        use httpmock::prelude::*;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let api = MockServer::start_async().await;
        api.mock_async(|when, then| {
            when.method(GET)
                .path("/v1/convai/conversation/get-signed-url")
                .query_param("agent_id", "agent_private")
                .header("xi-api-key", "xi-secret");
            then.status(200).json_body(json!({
                "signed_url": format!("ws://{}/signed?conversation_signature=sig", addr)
            }));
        })
        .await;

        let server = tokio::spawn(async move {
            let (uri, mut ws) = accept(&listener).await;
            let _init = next_json(&mut ws).await;
            ws.close(None).await.unwrap();
            uri
        });

        let session = Conversation::new(
            ElevenLabsClient::new(api.base_url(), Some("xi-secret".to_string())),
            "agent_private",
            Arc::new(ToolRegistry::new()),
            true,
            Arc::new(RecordingAudio::default()),
            Callbacks::default(),
        )
        .start_session()
        .await
        .unwrap();

        session.wait_for_session_end().await.unwrap();
        assert_eq!(server.await.unwrap(), "/signed?conversation_signature=sig");
    }
}
