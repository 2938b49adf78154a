use std::path::PathBuf;

use crate::{
    chat::{AudioMeta, MessageRef, User},
    resolver::{self, SearchHit},
};

/// Where a request's media comes from.
#[derive(Clone, Debug)]
pub enum MediaSource {
    /// A recognized video link, pasted directly.
    DirectLink(String),
    /// Free-text search, already resolved to a link at enqueue time.
    Search(String),
    /// An audio file attached to a chat message.
    Attachment(AudioMeta),
}

/// One queued song. Lives in the queue until popped for playback and is
/// discarded after its playback slot ends.
#[derive(Clone, Debug)]
pub struct Request {
    pub id: uuid::Uuid,
    pub added_on: time::OffsetDateTime,
    pub source: MediaSource,
    /// Display title, lazily resolved. The downloader's title is
    /// authoritative and overrides this once the track materializes.
    pub title: Option<String>,
    pub link: Option<String>,
    pub requester: User,
    /// The message that carries the media or triggered the request.
    pub origin: MessageRef,
}

impl Request {
    fn new(source: MediaSource, title: Option<String>, link: Option<String>, origin: MessageRef) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            added_on: time::OffsetDateTime::now_utc(),
            source,
            title,
            link,
            requester: origin.from.clone(),
            origin,
        }
    }

    pub fn direct_link(link: String, origin: MessageRef) -> Self {
        Self::new(MediaSource::DirectLink(link.clone()), None, Some(link), origin)
    }

    pub fn searched(query: String, hit: SearchHit, origin: MessageRef) -> Self {
        Self::new(
            MediaSource::Search(query),
            Some(hit.title),
            Some(hit.link),
            origin,
        )
    }

    /// `origin` is the message the audio is attached to; the requester is
    /// whoever issued the play command.
    pub fn attachment(meta: AudioMeta, origin: MessageRef, requester: User) -> Self {
        let mut this = Self::new(
            MediaSource::Attachment(meta.clone()),
            meta.title,
            origin.link.clone(),
            origin,
        );
        this.requester = requester;
        this
    }

    /// Title/link pair for queue listings. Resolved metadata wins, then the
    /// origin message's rendered link entity, then the raw link text.
    pub fn display(&self) -> (String, String) {
        if let MediaSource::Attachment(meta) = &self.source {
            let title = meta.title.clone().unwrap_or_else(|| "Song".into());
            return (title, self.origin.link.clone().unwrap_or_default());
        }

        if let (Some(title), Some(link)) = (&self.title, &self.link) {
            return (title.clone(), link.clone());
        }

        if let Some(pair) = self.origin.link_entity_title() {
            return pair;
        }

        let link = self
            .link
            .clone()
            .or_else(|| resolver::parse_video_link(&self.origin.text))
            .unwrap_or_default();
        ("Song".into(), link)
    }
}

/// Output of the fetch-and-transcode pipeline for one request.
#[derive(Clone, Debug)]
pub struct MaterializedTrack {
    pub title: String,
    /// Seconds, when the backend reports one.
    pub duration: Option<u32>,
    /// The canonical raw PCM artifact consumed by the broadcast engine.
    pub raw_path: PathBuf,
}
