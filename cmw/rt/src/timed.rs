//! Deadline-ordered list of pending timed messages.
//!
//! The list is kept sorted by ascending deadline. A new message goes before
//! every message whose deadline is equal or later, so among equal deadlines
//! the latest insertion comes first. The queue does no locking; one owner
//! polls it (see [`TimerService`](crate::timer::TimerService)).

use cmw_core::Timestamp;

/// Identity of a queued message, stable until it is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimedMessageId(u64);

/// A pending timed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedMessage {
    pub id: TimedMessageId,
    pub deadline: Timestamp,
    pub payload: Vec<u8>,
}

struct Node {
    message: TimedMessage,
    next: Option<Box<Node>>,
}

/// Singly-linked, deadline-sorted queue.
#[derive(Default)]
pub struct TimedQueue {
    head: Option<Box<Node>>,
    len: usize,
    next_id: u64,
}

impl TimedQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Link at logical position `pos` (`pos == len` is the tail link).
    fn link_at(&mut self, pos: usize) -> &mut Option<Box<Node>> {
        let mut link = &mut self.head;
        for _ in 0..pos {
            if let Some(node) = link {
                link = &mut node.next;
            }
        }
        link
    }

    /// Queues a copy of `payload` due at `deadline`.
    pub fn add(&mut self, payload: &[u8], deadline: Timestamp) -> TimedMessageId {
        let id = TimedMessageId(self.next_id);
        self.next_id += 1;

        let pos = self.iter().take_while(|m| m.deadline < deadline).count();
        let link = self.link_at(pos);
        let next = link.take();
        *link = Some(Box::new(Node {
            message: TimedMessage {
                id,
                deadline,
                payload: payload.to_vec(),
            },
            next,
        }));
        self.len += 1;
        id
    }

    /// Unlinks the message `id`, returning it, or `None` if it is not queued.
    pub fn delete(&mut self, id: TimedMessageId) -> Option<TimedMessage> {
        let pos = self.iter().position(|m| m.id == id)?;
        let link = self.link_at(pos);
        let mut node = link.take()?;
        *link = node.next.take();
        self.len -= 1;
        Some(node.message)
    }

    /// Earliest scheduled message.
    pub fn peek(&self) -> Option<&TimedMessage> {
        self.head.as_ref().map(|node| &node.message)
    }

    /// Deadline of the earliest scheduled message.
    pub fn next_deadline(&self) -> Option<Timestamp> {
        self.peek().map(|m| m.deadline)
    }

    pub fn iter(&self) -> Iter<'_> {
        Iter {
            next: self.head.as_deref(),
        }
    }

    pub fn clear(&mut self) {
        let mut link = self.head.take();
        while let Some(mut node) = link {
            link = node.next.take();
        }
        self.len = 0;
    }
}

impl Drop for TimedQueue {
    fn drop(&mut self) {
        self.clear();
    }
}

/// Iterator in deadline order.
pub struct Iter<'a> {
    next: Option<&'a Node>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a TimedMessage;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.next?;
        self.next = node.next.as_deref();
        Some(&node.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deadlines(queue: &TimedQueue) -> Vec<i64> {
        queue.iter().map(|m| m.deadline.as_nanos()).collect()
    }

    #[test]
    fn keeps_ascending_order() {
        let mut queue = TimedQueue::new();
        for d in [50, 10, 30] {
            queue.add(&[], Timestamp::from_nanos(d));
        }
        assert_eq!(deadlines(&queue), vec![10, 30, 50]);
        assert_eq!(queue.next_deadline(), Some(Timestamp::from_nanos(10)));
    }

    #[test]
    fn equal_deadline_goes_first() {
        let mut queue = TimedQueue::new();
        let first = queue.add(b"old", Timestamp::from_nanos(30));
        let second = queue.add(b"new", Timestamp::from_nanos(30));
        let ids: Vec<_> = queue.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![second, first]);
    }

    #[test]
    fn delete_by_identity() {
        let mut queue = TimedQueue::new();
        let a = queue.add(b"a", Timestamp::from_nanos(1));
        let b = queue.add(b"b", Timestamp::from_nanos(2));
        let c = queue.add(b"c", Timestamp::from_nanos(3));

        let removed = queue.delete(b).unwrap();
        assert_eq!(removed.payload, b"b");
        let ids: Vec<_> = queue.iter().map(|m| m.id).collect();
        assert_eq!(ids, [a, c]);
        assert!(queue.delete(b).is_none());
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn long_queue_drops_without_recursion() {
        let mut queue = TimedQueue::new();
        for d in 0..100_000 {
            queue.add(&[], Timestamp::from_nanos(-d));
        }
        assert_eq!(queue.len(), 100_000);
        drop(queue);
    }
}
