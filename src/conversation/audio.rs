//! Audio device seam.
//!
//! The session only moves bytes: microphone chunks go out as base64, agent
//! speech comes back as raw PCM. Capture and playback live behind
//! [`AudioInterface`].

use std::sync::atomic::{AtomicU64, Ordering};

use base64::Engine;
use tokio::sync::mpsc;

use super::protocol::ClientMessage;

/// Handle passed to [`AudioInterface::start`] for pushing captured audio.
#[derive(Debug, Clone)]
pub struct AudioInput {
    outgoing: mpsc::UnboundedSender<ClientMessage>,
}

impl AudioInput {
    pub(crate) fn new(outgoing: mpsc::UnboundedSender<ClientMessage>) -> Self {
        Self { outgoing }
    }

    /// Queue a chunk of 16-bit little-endian mono PCM at 16 kHz.
    ///
    /// Returns false once the session has ended.
    pub fn send(&self, pcm: &[u8]) -> bool {
        let chunk = base64::engine::general_purpose::STANDARD.encode(pcm);
        self.outgoing
            .send(ClientMessage::UserAudioChunk(chunk))
            .is_ok()
    }
}

/// Audio capture and playback used by a conversation.
///
/// `stop` may be called more than once.
pub trait AudioInterface: Send + Sync {
    /// Begin capturing; chunks are pushed through `input`.
    fn start(&self, input: AudioInput);

    /// Stop capturing and release devices.
    fn stop(&self);

    /// Play (or queue) a chunk of agent speech.
    fn output(&self, audio: Vec<u8>);

    /// Drop any queued agent speech; the user interrupted.
    fn interrupt(&self);
}

/// Text-only sessions: captures nothing and discards agent speech.
#[derive(Debug, Default)]
pub struct SilentAudio {
    discarded: AtomicU64,
}

impl SilentAudio {
    /// Bytes of agent speech dropped so far.
    pub fn discarded_bytes(&self) -> u64 {
        self.discarded.load(Ordering::Relaxed)
    }
}

impl AudioInterface for SilentAudio {
    fn start(&self, _input: AudioInput) {
        tracing::debug!("Silent audio interface: no capture device");
    }

    fn stop(&self) {
        tracing::debug!(
            "Silent audio interface stopped ({} bytes of agent audio discarded)",
            self.discarded_bytes()
        );
    }

    fn output(&self, audio: Vec<u8>) {
        self.discarded.fetch_add(audio.len() as u64, Ordering::Relaxed);
    }

    fn interrupt(&self) {}
}
