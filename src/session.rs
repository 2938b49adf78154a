use std::time::{Duration, Instant};

use hashbrown::{HashMap, HashSet};

use crate::chat::{ChatId, MessageId, UserId};

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum SessionState {
    /// No chat joined.
    #[default]
    Idle,
    Joining,
    /// Joined, nothing playing.
    JoinedIdle,
    /// Fetch/transcode in progress for the head of the queue.
    Preparing,
    Playing,
}

impl SessionState {
    pub const fn is_joined(&self) -> bool {
        matches!(self, Self::JoinedIdle | Self::Preparing | Self::Playing)
    }

    /// A request currently owns the playback slot (possibly still
    /// materializing).
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Preparing | Self::Playing)
    }

    pub const fn is_playing(&self) -> bool {
        matches!(self, Self::Playing)
    }
}

/// One broadcast target at a time; everything the control loop mutates
/// lives here.
pub struct Session {
    pub chat: Option<ChatId>,
    pub chat_title: String,
    pub state: SessionState,
    /// The single live "now playing" message-with-buttons; superseded
    /// instances are deleted before a new one is shown.
    pub now_playing_msg: Option<MessageId>,
    /// Last rendered now-playing text, restored by the "back" button.
    pub now_playing_text: String,
    pub now_playing_link: Option<String>,
    /// Set when skip/stop arrives while a materialize is still in flight;
    /// its completion is dropped instead of starting playout.
    pub discard_in_flight: bool,
    pub admins: AdminCache,
}

impl Session {
    pub fn new(admin_ttl: Duration) -> Self {
        Self {
            chat: None,
            chat_title: String::new(),
            state: SessionState::default(),
            now_playing_msg: None,
            now_playing_text: String::new(),
            now_playing_link: None,
            discard_in_flight: false,
            admins: AdminCache::new(admin_ttl),
        }
    }

    /// Back to not-joined. Pending queue entries are the caller's concern.
    pub fn reset(&mut self) {
        self.chat = None;
        self.chat_title.clear();
        self.state = SessionState::Idle;
        self.now_playing_msg = None;
        self.now_playing_text.clear();
        self.now_playing_link = None;
        self.discard_in_flight = false;
    }

    pub fn is_playing(&self) -> bool {
        self.state.is_playing()
    }
}

struct CachedAdmins {
    ids: HashSet<UserId>,
    fetched_at: Instant,
}

/// Per-chat admin sets, populated lazily on the first skip attempt and
/// re-fetched once they outlive the TTL.
pub struct AdminCache {
    map: HashMap<ChatId, CachedAdmins>,
    ttl: Duration,
}

impl AdminCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            map: HashMap::new(),
            ttl,
        }
    }

    pub fn get(&self, chat: ChatId) -> Option<&HashSet<UserId>> {
        let cached = self.map.get(&chat)?;
        (cached.fetched_at.elapsed() < self.ttl).then_some(&cached.ids)
    }

    pub fn insert(&mut self, chat: ChatId, ids: HashSet<UserId>) {
        self.map.insert(
            chat,
            CachedAdmins {
                ids,
                fetched_at: Instant::now(),
            },
        );
    }

    pub fn invalidate(&mut self, chat: ChatId) {
        self.map.remove(&chat);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_cache_hit() {
        let mut cache = AdminCache::new(Duration::from_secs(600));
        cache.insert(ChatId(1), HashSet::from_iter([UserId(10)]));

        assert!(cache.get(ChatId(1)).unwrap().contains(&UserId(10)));
        assert!(cache.get(ChatId(2)).is_none());
    }

    #[test]
    fn admin_cache_expiry() {
        let mut cache = AdminCache::new(Duration::ZERO);
        cache.insert(ChatId(1), HashSet::from_iter([UserId(10)]));
        assert!(cache.get(ChatId(1)).is_none());
    }

    #[test]
    fn admin_cache_invalidate() {
        let mut cache = AdminCache::new(Duration::from_secs(600));
        cache.insert(ChatId(1), HashSet::from_iter([UserId(10)]));
        cache.invalidate(ChatId(1));
        assert!(cache.get(ChatId(1)).is_none());
    }

    #[test]
    fn reset_clears_call_state() {
        let mut session = Session::new(Duration::from_secs(600));
        session.chat = Some(ChatId(5));
        session.chat_title = "somewhere".into();
        session.state = SessionState::Playing;
        session.now_playing_msg = Some(MessageId(9));
        session.now_playing_text = "text".into();
        session.discard_in_flight = true;

        session.reset();

        assert!(session.chat.is_none());
        assert_eq!(session.state, SessionState::Idle);
        assert!(session.now_playing_msg.is_none());
        assert!(session.now_playing_text.is_empty());
        assert!(!session.discard_in_flight);
        assert!(!session.is_playing());
    }
}
