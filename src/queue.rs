use std::collections::VecDeque;

use crate::request::Request;

/// Ordered pending requests, insertion order is play order. Unbounded by
/// design, with no reordering or de-duplication.
#[derive(Default)]
pub struct PlaybackQueue {
    items: VecDeque<Request>,
}

impl PlaybackQueue {
    /// Append to the tail, returning the 1-based position for "scheduled
    /// at position N" messages.
    pub fn enqueue(&mut self, request: Request) -> usize {
        self.items.push_back(request);
        self.items.len()
    }

    pub fn dequeue_next(&mut self) -> Option<Request> {
        self.items.pop_front()
    }

    pub fn peek_all(&self) -> impl Iterator<Item = &Request> {
        self.items.iter()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::{ChatId, MessageId, MessageRef, User, UserId};

    fn request(title: &str) -> Request {
        let origin = MessageRef {
            chat: ChatId(1),
            chat_title: "chat".into(),
            id: MessageId(1),
            from: User {
                id: UserId(1),
                name: "user".into(),
            },
            text: title.into(),
            entities: Vec::new(),
            audio: None,
            link: None,
            reply: None,
        };
        Request::direct_link(format!("https://youtu.be/{title}"), origin)
    }

    #[test]
    fn fifo_order_and_positions() {
        let mut queue = PlaybackQueue::default();
        assert_eq!(queue.enqueue(request("a")), 1);
        assert_eq!(queue.enqueue(request("b")), 2);
        assert_eq!(queue.enqueue(request("c")), 3);

        let links: Vec<_> = queue
            .peek_all()
            .map(|r| r.link.clone().unwrap())
            .collect();
        assert_eq!(
            links,
            [
                "https://youtu.be/a",
                "https://youtu.be/b",
                "https://youtu.be/c"
            ]
        );

        assert_eq!(
            queue.dequeue_next().unwrap().link.as_deref(),
            Some("https://youtu.be/a")
        );
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn dequeue_empty() {
        let mut queue = PlaybackQueue::default();
        assert!(queue.dequeue_next().is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn clear_drops_everything() {
        let mut queue = PlaybackQueue::default();
        queue.enqueue(request("a"));
        queue.enqueue(request("b"));
        queue.clear();
        assert!(queue.is_empty());
        assert!(queue.dequeue_next().is_none());
    }
}
