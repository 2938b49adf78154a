use std::path::{Path, PathBuf};

use async_trait::async_trait;
use hashbrown::HashSet;

use crate::error::ChatError;

#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::serde::Serialize, ::serde::Deserialize,
)]
pub struct ChatId(pub i64);

#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::serde::Serialize, ::serde::Deserialize,
)]
pub struct MessageId(pub i64);

#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::serde::Serialize, ::serde::Deserialize,
)]
pub struct UserId(pub i64);

#[derive(::serde::Serialize, ::serde::Deserialize, Clone, Debug, PartialEq)]
pub struct User {
    pub id: UserId,
    pub name: String,
}

/// Metadata of an audio attachment, as reported by the transport.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioMeta {
    /// Opaque transport handle used to fetch the attachment bytes.
    pub file_id: String,
    pub title: Option<String>,
    /// Seconds.
    pub duration: Option<u32>,
}

/// A rendered link inside a message, byte offsets into `MessageRef::text`.
#[derive(Clone, Debug, PartialEq)]
pub struct LinkEntity {
    pub offset: usize,
    pub length: usize,
    pub url: String,
}

/// Handle back to a transport message, enough to reply to it, delete it,
/// and recover display metadata from it later.
#[derive(Clone, Debug)]
pub struct MessageRef {
    pub chat: ChatId,
    pub chat_title: String,
    pub id: MessageId,
    pub from: User,
    pub text: String,
    pub entities: Vec<LinkEntity>,
    pub audio: Option<AudioMeta>,
    /// Permalink to this message, when the chat has one.
    pub link: Option<String>,
    pub reply: Option<Box<MessageRef>>,
}

impl MessageRef {
    /// Title/link pair recovered from the first rendered link entity.
    pub fn link_entity_title(&self) -> Option<(String, String)> {
        let entity = self.entities.first()?;
        let title = self
            .text
            .get(entity.offset..entity.offset + entity.length)?
            .to_string();
        Some((title, entity.url.clone()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ButtonAction {
    Skip,
    Queue,
    Back,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Button {
    pub text: String,
    pub action: ButtonAction,
}

#[derive(Clone, Debug, PartialEq, Default)]
pub struct Markup {
    pub rows: Vec<Vec<Button>>,
}

pub fn default_markup() -> Markup {
    Markup {
        rows: vec![vec![
            Button {
                text: "Skip".into(),
                action: ButtonAction::Skip,
            },
            Button {
                text: "Queue".into(),
                action: ButtonAction::Queue,
            },
        ]],
    }
}

pub fn back_markup() -> Markup {
    Markup {
        rows: vec![vec![Button {
            text: "Back".into(),
            action: ButtonAction::Back,
        }]],
    }
}

/// A button press on the now-playing control message.
#[derive(Clone, Debug)]
pub struct ButtonPress {
    pub chat: ChatId,
    pub message: MessageId,
    pub from: User,
    pub action: ButtonAction,
}

/// Outgoing message payload.
#[derive(Clone, Debug, Default)]
pub struct Outgoing {
    pub text: String,
    pub reply_to: Option<MessageId>,
    pub markup: Option<Markup>,
    pub disable_preview: bool,
}

impl Outgoing {
    pub fn text(text: impl ToString) -> Self {
        Self {
            text: text.to_string(),
            reply_to: None,
            markup: None,
            disable_preview: true,
        }
    }

    pub fn reply_to(mut self, id: MessageId) -> Self {
        self.reply_to = Some(id);
        self
    }

    pub fn markup(mut self, markup: Markup) -> Self {
        self.markup = Some(markup);
        self
    }
}

/// The messaging side of the bot. Implementations wrap a concrete chat
/// platform; the control loop only ever talks through this trait.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send(&self, chat: ChatId, out: Outgoing) -> Result<MessageId, ChatError>;

    async fn edit(&self, chat: ChatId, id: MessageId, out: Outgoing) -> Result<(), ChatError>;

    async fn delete(&self, chat: ChatId, id: MessageId) -> Result<(), ChatError>;

    /// Current creator/administrator set for a chat.
    async fn admins(&self, chat: ChatId) -> Result<HashSet<UserId>, ChatError>;

    /// Download an audio attachment into `dest`, returning the local path.
    async fn fetch_attachment(
        &self,
        audio: &AudioMeta,
        dest: &Path,
    ) -> Result<PathBuf, ChatError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User {
            id: UserId(7),
            name: "tester".into(),
        }
    }

    #[test]
    fn entity_title_recovery() {
        let msg = MessageRef {
            chat: ChatId(1),
            chat_title: "chat".into(),
            id: MessageId(2),
            from: user(),
            text: "Some Song Title".into(),
            entities: vec![LinkEntity {
                offset: 0,
                length: 9,
                url: "https://youtu.be/dQw4w9WgXcQ".into(),
            }],
            audio: None,
            link: None,
            reply: None,
        };

        let (title, link) = msg.link_entity_title().unwrap();
        assert_eq!(title, "Some Song");
        assert_eq!(link, "https://youtu.be/dQw4w9WgXcQ");
    }

    #[test]
    fn entity_title_out_of_bounds() {
        let msg = MessageRef {
            chat: ChatId(1),
            chat_title: "chat".into(),
            id: MessageId(2),
            from: user(),
            text: "hi".into(),
            entities: vec![LinkEntity {
                offset: 0,
                length: 99,
                url: "https://example.com".into(),
            }],
            audio: None,
            link: None,
            reply: None,
        };

        assert!(msg.link_entity_title().is_none());
    }
}
