use std::path::Path;

use async_trait::async_trait;

use crate::{chat::ChatId, error::EngineError};

/// Raw audio contract with the broadcast engine: interleaved signed 16-bit
/// little-endian samples, stereo, 48 kHz. Non-negotiable.
pub const SAMPLE_RATE_HZ: u32 = 48_000;
pub const CHANNELS: u16 = 2;

/// Call-lifecycle events emitted by the engine, delivered over a channel
/// into the control loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineEvent {
    NetworkChanged { connected: bool },
    PlayoutEnded,
}

/// The voice-call broadcast engine. Feed it a raw PCM file and it streams
/// the samples into the live call.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    /// Join the group call of `chat` and start broadcasting.
    async fn join(&self, chat: ChatId) -> Result<(), EngineError>;

    /// Lower-level fallback: create the group call explicitly when `join`
    /// reports that none exists yet.
    async fn create_call(&self, chat: ChatId, random_id: u32) -> Result<(), EngineError>;

    async fn leave(&self) -> Result<(), EngineError>;

    /// Point playout at a raw PCM file (see the format constants above).
    async fn set_input(&self, path: &Path) -> Result<(), EngineError>;

    /// Detach the current playout input, if any.
    async fn clear_input(&self);

    async fn pause(&self);

    async fn resume(&self);
}
