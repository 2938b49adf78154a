//! Queue-driven playback pipeline for a group voice-call music bot.
//!
//! Users submit song requests (link, search term, or attached audio); each
//! is downloaded and transcoded into raw PCM and fed sequentially into a
//! live voice-call broadcast, advancing automatically on playout end or
//! skip. The chat transport and the broadcast engine are injected through
//! the traits in [`chat`] and [`engine`]; a single [`control::Control`]
//! loop owns all mutable state.

pub mod chat;
pub mod control;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod queue;
pub mod request;
pub mod resolver;
pub mod session;
pub mod util;

pub use crate::{
    chat::{ButtonPress, ChatId, ChatTransport, MessageId, MessageRef, User, UserId},
    control::{Command, CommandKind, Config, Control},
    engine::{Broadcaster, EngineEvent},
    pipeline::{Pipeline, TrackPipeline, YtDlp},
    queue::PlaybackQueue,
    request::Request,
    resolver::{SearchBackend, YtDlpSearch},
    session::{Session, SessionState},
};
