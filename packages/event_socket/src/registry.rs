//! Topic registry: topic name → listeners, plus the subscribe/unsubscribe
//! announcements owed to the peer.
//!
//! The registry performs no I/O. Mutations return the [`Control`] frame the
//! connection manager should send, and the manager decides whether it can be
//! sent right now (only while connected).

use std::collections::HashMap;

use serde_json::Value;

use crate::codec::Frame;
use crate::listener::{ListenerRef, Payload};

/// Transport lifecycle pseudo-topics. These are dispatched locally and never
/// announced to the peer.
pub const RESERVED_TOPICS: [&str; 7] = [
    "open",
    "close",
    "error",
    "message",
    "binary",
    "unresponsive",
    "json",
];

pub fn is_reserved(topic: &str) -> bool {
    RESERVED_TOPICS.iter().any(|reserved| *reserved == topic)
}

/// Control frame announcing a change of local interest in a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Control {
    Subscribe(String),
    Unsubscribe(String),
}

impl Control {
    pub fn topic(&self) -> &str {
        match self {
            Self::Subscribe(topic) | Self::Unsubscribe(topic) => topic,
        }
    }

    pub fn into_frame(self) -> Frame {
        match self {
            Self::Subscribe(topic) => Frame::new("subscribe", Value::String(topic)),
            Self::Unsubscribe(topic) => Frame::new("unsubscribe", Value::String(topic)),
        }
    }
}

#[derive(Debug, Default)]
pub struct TopicRegistry {
    topics: HashMap<String, Vec<ListenerRef>>,
}

impl TopicRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` for `topic`. Returns `Subscribe` when this is the
    /// topic's first listener and the topic is an application topic.
    /// Registering the same listener twice is a no-op.
    pub fn add(&mut self, topic: &str, listener: ListenerRef) -> Option<Control> {
        match self.topics.get_mut(topic) {
            Some(listeners) => {
                if !listeners.contains(&listener) {
                    listeners.push(listener);
                }
                None
            }
            None => {
                self.topics.insert(topic.to_string(), vec![listener]);
                (!is_reserved(topic)).then(|| Control::Subscribe(topic.to_string()))
            }
        }
    }

    /// Remove one listener, or every listener when `listener` is `None`.
    ///
    /// When the set ends up empty the entry is deleted and, for application
    /// topics, `Unsubscribe` is returned. Unknown topics are a no-op.
    pub fn remove(&mut self, topic: &str, listener: Option<&ListenerRef>) -> Option<Control> {
        let listeners = self.topics.get_mut(topic)?;
        if let Some(listener) = listener {
            listeners.retain(|l| l != listener);
        } else {
            listeners.clear();
        }

        if !listeners.is_empty() {
            return None;
        }
        self.topics.remove(topic);
        (!is_reserved(topic)).then(|| Control::Unsubscribe(topic.to_string()))
    }

    /// Invoke every listener registered for `topic`. Returns how many ran.
    pub fn dispatch(&self, topic: &str, payload: &Payload) -> usize {
        let Some(listeners) = self.topics.get(topic) else {
            return 0;
        };
        for listener in listeners {
            listener.call(payload);
        }
        listeners.len()
    }

    /// Application topics with at least one listener, for the subscribe
    /// replay after a reconnect.
    pub fn application_topics(&self) -> impl Iterator<Item = &str> {
        self.topics
            .keys()
            .map(String::as_str)
            .filter(|topic| !is_reserved(topic))
    }

    pub fn listener_count(&self, topic: &str) -> usize {
        self.topics.get(topic).map_or(0, Vec::len)
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.topics.contains_key(topic)
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }
}
