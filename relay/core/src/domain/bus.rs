// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Bus Trait - Anti-Corruption Layer for the pub/sub transport
//!
//! The alias relay does not own a transport. Everything it needs from one
//! (register topic metadata, publish, watch, read retained property values)
//! sits behind the `Bus` trait so the registry and mirrors can run against any
//! publish/subscribe backend. `infrastructure::event_bus::InMemoryBus` is the
//! in-process implementation.

use async_trait::async_trait;
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::pin::Pin;
use thiserror::Error;

/// Kind of primitive living at a topic path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicKind {
    /// Fire-and-forget notifications; nothing is retained
    Event,
    /// Settable value; the last published value is retained
    Property,
}

/// Metadata registered for a topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicInfo {
    pub path: String,
    pub kind: TopicKind,
    #[serde(default)]
    pub description: String,
}

impl TopicInfo {
    pub fn event(path: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: TopicKind::Event,
            description: description.into(),
        }
    }

    pub fn property(path: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: TopicKind::Property,
            description: description.into(),
        }
    }
}

/// A value published on a topic.
///
/// `origin` tags who published it; mirrors and the registry use it to ignore
/// their own writes when those come back through a watch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusMessage {
    pub path: String,
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

impl BusMessage {
    pub fn new(path: impl Into<String>, value: Value) -> Self {
        Self {
            path: path.into(),
            value,
            origin: None,
        }
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn is_from(&self, origin: &str) -> bool {
        self.origin.as_deref() == Some(origin)
    }
}

/// Stream of messages observed on one topic
pub type TopicStream = Pin<Box<dyn Stream<Item = BusMessage> + Send>>;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("Bus is closed")]
    Closed,

    #[error("Topic '{path}' is already registered as {kind:?}")]
    AlreadyRegistered { path: String, kind: TopicKind },

    #[error("Invalid topic path: '{0}'")]
    InvalidPath(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

#[async_trait]
pub trait Bus: Send + Sync {
    /// Register metadata for a topic
    async fn register(&self, info: TopicInfo) -> Result<(), BusError>;

    /// Drop a topic's registration (and retained value); watchers stay subscribed
    async fn unregister(&self, path: &str) -> Result<(), BusError>;

    /// Registered metadata for a topic, if any
    async fn topic(&self, path: &str) -> Option<TopicInfo>;

    /// Publish a value to a topic
    async fn publish(&self, message: BusMessage) -> Result<(), BusError>;

    /// Watch all future messages on a topic
    async fn watch(&self, path: &str) -> Result<TopicStream, BusError>;

    /// Last value published to a property topic
    async fn retained(&self, path: &str) -> Option<Value>;
}

/// Topic paths of the registry's control surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlTopics {
    pub add: String,
    pub remove: String,
    pub aliases: String,
    pub error: String,
    pub resync: String,
}

impl ControlTopics {
    pub const DEFAULT_PREFIX: &'static str = "meta/alias";

    pub fn from_prefix(prefix: &str) -> Self {
        let prefix = prefix.trim_end_matches('/');
        Self {
            add: format!("{}/add", prefix),
            remove: format!("{}/remove", prefix),
            aliases: format!("{}/aliases", prefix),
            error: format!("{}/error", prefix),
            resync: format!("{}/resync", prefix),
        }
    }
}

impl Default for ControlTopics {
    fn default() -> Self {
        Self::from_prefix(Self::DEFAULT_PREFIX)
    }
}
