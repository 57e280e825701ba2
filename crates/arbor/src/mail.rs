//! Inter-node mail.
//!
//! A [`Mail`] is either addressed to a node name or broadcast to the whole
//! tree. Nodes post into the shared [`Mailbox`] while handling pulses; the
//! root drains it once per frame, after the time pulse and before render.
//!
//! ```text
//!   post ──► [ m3 | m2 | m1 ] ──► drain_one ──► mail pulse
//!            tail          head
//! ```
//!
//! Draining re-checks the queue after every pop, so mail posted by a mail
//! handler is delivered within the same frame.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Four-field in-process message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mail {
    /// Destination node name. `None` broadcasts to every node.
    pub to: Option<String>,
    pub from: String,
    pub subject: String,
    pub body: String,
}

impl Mail {
    /// Mail addressed to a single node name.
    pub fn to(
        to: impl Into<String>,
        from: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            to: Some(to.into()),
            from: from.into(),
            subject: subject.into(),
            body: body.into(),
        }
    }

    /// Mail delivered to every node with an open mail valve.
    pub fn broadcast(
        from: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            to: None,
            from: from.into(),
            subject: subject.into(),
            body: body.into(),
        }
    }

    pub fn is_broadcast(&self) -> bool {
        self.to.is_none()
    }

    /// Whether a node with this name should have its mail hook invoked.
    pub fn is_for(&self, name: &str) -> bool {
        match &self.to {
            None => true,
            Some(to) => to == name,
        }
    }
}

/// Unbounded FIFO of pending mail.
#[derive(Debug, Default)]
pub struct Mailbox {
    queue: VecDeque<Mail>,
    posted: u64,
    drained: u64,
}

impl Mailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the tail.
    pub fn post(&mut self, mail: Mail) {
        log::trace!(
            "mail posted: {} -> {:?} '{}'",
            mail.from,
            mail.to,
            mail.subject
        );
        self.posted += 1;
        self.queue.push_back(mail);
    }

    /// Pop the head, or `None` when empty.
    pub fn drain_one(&mut self) -> Option<Mail> {
        let mail = self.queue.pop_front()?;
        self.drained += 1;
        Some(mail)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Drop everything pending.
    pub fn clear(&mut self) {
        self.queue.clear();
    }

    /// Total mail ever posted.
    pub fn posted(&self) -> u64 {
        self.posted
    }

    /// Total mail ever drained.
    pub fn drained(&self) -> u64 {
        self.drained
    }
}
