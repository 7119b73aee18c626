// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Event Bus Implementation - In-process Pub/Sub for topic paths
//
// Provides an in-memory `Bus` using one tokio broadcast channel per topic path.
// Property topics retain their last published value; event topics retain
// nothing. Used by the standalone daemon and by tests.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::domain::bus::{Bus, BusError, BusMessage, TopicInfo, TopicKind, TopicStream};

struct TopicSlot {
    info: Option<TopicInfo>,
    sender: broadcast::Sender<BusMessage>,
    retained: Option<Value>,
}

impl TopicSlot {
    fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            info: None,
            sender,
            retained: None,
        }
    }

    fn is_property(&self) -> bool {
        matches!(&self.info, Some(info) if info.kind == TopicKind::Property)
    }

    /// Unregistered and unwatched; retains nothing once unregistered
    fn is_idle(&self) -> bool {
        self.info.is_none() && self.sender.receiver_count() == 0
    }
}

/// In-process bus for publishing and watching topic paths
pub struct InMemoryBus {
    capacity: usize,
    topics: RwLock<HashMap<String, TopicSlot>>,
}

impl InMemoryBus {
    /// Create a bus whose per-topic channels buffer `capacity` messages
    /// before slow watchers start lagging
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            topics: RwLock::new(HashMap::new()),
        }
    }

    /// Create bus with default capacity (1024)
    pub fn with_default_capacity() -> Self {
        Self::new(1024)
    }

    /// Number of topic paths currently tracked
    pub fn topic_count(&self) -> usize {
        self.topics.read().len()
    }

    /// Number of active watchers on a topic
    pub fn watcher_count(&self, path: &str) -> usize {
        self.topics
            .read()
            .get(path)
            .map(|slot| slot.sender.receiver_count())
            .unwrap_or(0)
    }

    fn validate_path(path: &str) -> Result<(), BusError> {
        if path.is_empty() || path.starts_with('/') || path.ends_with('/') || path.contains("//") {
            return Err(BusError::InvalidPath(path.to_string()));
        }
        Ok(())
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

#[async_trait]
impl Bus for InMemoryBus {
    async fn register(&self, info: TopicInfo) -> Result<(), BusError> {
        Self::validate_path(&info.path)?;

        let mut topics = self.topics.write();
        let slot = topics
            .entry(info.path.clone())
            .or_insert_with(|| TopicSlot::new(self.capacity));

        if let Some(existing) = &slot.info {
            if existing.kind != info.kind {
                return Err(BusError::AlreadyRegistered {
                    path: info.path,
                    kind: existing.kind,
                });
            }
        }

        debug!(path = %info.path, kind = ?info.kind, "Registering topic");
        if info.kind == TopicKind::Event {
            slot.retained = None;
        }
        slot.info = Some(info);
        Ok(())
    }

    async fn unregister(&self, path: &str) -> Result<(), BusError> {
        let mut topics = self.topics.write();
        if let Some(slot) = topics.get_mut(path) {
            debug!(path = %path, "Unregistering topic");
            slot.info = None;
            slot.retained = None;
            if slot.is_idle() {
                topics.remove(path);
            }
        }
        Ok(())
    }

    async fn topic(&self, path: &str) -> Option<TopicInfo> {
        self.topics.read().get(path).and_then(|slot| slot.info.clone())
    }

    async fn publish(&self, message: BusMessage) -> Result<(), BusError> {
        Self::validate_path(&message.path)?;

        let mut topics = self.topics.write();
        let Some(slot) = topics.get_mut(&message.path) else {
            debug!(path = %message.path, "No watchers on published topic");
            return Ok(());
        };

        if slot.is_property() {
            slot.retained = Some(message.value.clone());
        }

        let path = message.path.clone();
        // send() only fails when nobody is watching
        let receiver_count = slot.sender.send(message).unwrap_or(0);
        if receiver_count == 0 {
            debug!(path = %path, "No watchers on published topic");
        }
        if slot.is_idle() {
            topics.remove(&path);
        }
        Ok(())
    }

    async fn watch(&self, path: &str) -> Result<TopicStream, BusError> {
        Self::validate_path(path)?;

        let receiver = {
            let mut topics = self.topics.write();
            // Slots of watchers that have since gone away
            topics.retain(|_, slot| !slot.is_idle());
            topics
                .entry(path.to_string())
                .or_insert_with(|| TopicSlot::new(self.capacity))
                .sender
                .subscribe()
        };

        let stream = futures::stream::unfold(receiver, |mut receiver| async move {
            loop {
                match receiver.recv().await {
                    Ok(message) => return Some((message, receiver)),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Topic watcher lagged by {} messages", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });

        Ok(Box::pin(stream))
    }

    async fn retained(&self, path: &str) -> Option<Value> {
        self.topics.read().get(path).and_then(|slot| slot.retained.clone())
    }
}
