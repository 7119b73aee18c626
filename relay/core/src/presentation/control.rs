// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Control Surface
//!
//! Binds the registry to its bus topics under a configurable prefix:
//!
//! | Topic | Kind | Handling |
//! |-------|------|----------|
//! | `{prefix}/add` | event | declare one alias |
//! | `{prefix}/remove` | event | remove one alias by path |
//! | `{prefix}/aliases` | property | external writes replace the whole set |
//! | `{prefix}/resync` | event | retry stale aliases |
//! | `{prefix}/error` | event | published by the registry, never read |
//!
//! Every outcome is visible through the canonical republication on the
//! aliases topic or a message on the error topic; nothing is replied to.

use futures::StreamExt;
use serde_json::Value;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::application::registry::AliasRegistry;
use crate::application::reporting::{ErrorReporter, REGISTRY_ORIGIN};
use crate::domain::alias::{AliasDeclaration, RegistryState};
use crate::domain::bus::{Bus, BusError, BusMessage, ControlTopics, TopicInfo, TopicStream};

pub struct ControlSurface {
    handler: ControlHandler,
    streams: ControlStreams,
}

/// Subscriptions made by `bind`, moved out of the surface while it runs
struct ControlStreams {
    add: TopicStream,
    remove: TopicStream,
    aliases: TopicStream,
    resync: TopicStream,
}

struct ControlHandler {
    registry: Arc<AliasRegistry>,
    reporter: ErrorReporter,
    topics: ControlTopics,
}

impl ControlSurface {
    /// Register the request topics and subscribe to them.
    ///
    /// Watches are established here rather than in `run`, so requests
    /// published after `bind` returns are never missed.
    pub async fn bind(bus: Arc<dyn Bus>, registry: Arc<AliasRegistry>) -> Result<Self, BusError> {
        let topics = registry.topics().clone();

        bus.register(TopicInfo::event(
            topics.add.clone(),
            "Declare an alias: [target, alias] or {target, alias, transform, inverse, description}",
        ))
        .await?;
        bus.register(TopicInfo::event(topics.remove.clone(), "Remove an alias by path"))
            .await?;
        bus.register(TopicInfo::event(topics.resync.clone(), "Retry mirrors for stale aliases"))
            .await?;

        let add = bus.watch(&topics.add).await?;
        let remove = bus.watch(&topics.remove).await?;
        let aliases = bus.watch(&topics.aliases).await?;
        let resync = bus.watch(&topics.resync).await?;

        Ok(Self {
            handler: ControlHandler {
                reporter: registry.reporter().clone(),
                registry,
                topics,
            },
            streams: ControlStreams {
                add,
                remove,
                aliases,
                resync,
            },
        })
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }

    /// Dispatch control requests until cancelled
    pub async fn run(self, cancel: CancellationToken) {
        let Self { handler, mut streams } = self;
        info!(add = %handler.topics.add, aliases = %handler.topics.aliases, "Alias control surface listening");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                Some(message) = streams.add.next() => handler.handle_add(message).await,
                Some(message) = streams.remove.next() => handler.handle_remove(message).await,
                Some(message) = streams.aliases.next() => handler.handle_aliases(message).await,
                Some(_) = streams.resync.next() => {
                    info!("Resync requested");
                    if let Err(e) = handler.registry.resync().await {
                        debug!("Resync rejected: {}", e);
                    }
                }
                else => break,
            }
        }

        info!("Alias control surface stopped");
    }
}

impl ControlHandler {
    async fn handle_add(&self, message: BusMessage) {
        let declaration = match AliasDeclaration::from_value(message.value) {
            Ok(declaration) => declaration,
            Err(e) => {
                self.reporter.report(e.to_string()).await;
                return;
            }
        };

        if let Err(e) = self.registry.declare(declaration).await {
            debug!("Declaration rejected: {}", e);
        }
    }

    async fn handle_remove(&self, message: BusMessage) {
        let Value::String(alias) = message.value else {
            self.reporter
                .report(format!(
                    "Alias remove request on '{}' must be an alias path string",
                    self.topics.remove
                ))
                .await;
            return;
        };

        if let Err(e) = self.registry.remove(&alias).await {
            debug!(alias = %alias, "Removal rejected: {}", e);
        }
    }

    async fn handle_aliases(&self, message: BusMessage) {
        if message.is_from(REGISTRY_ORIGIN) {
            return;
        }

        let state: RegistryState = match serde_json::from_value(message.value) {
            Ok(state) => state,
            Err(e) => {
                self.reporter
                    .report(format!("Invalid alias set written to '{}': {}", self.topics.aliases, e))
                    .await;
                // Restore the canonical value the bad write overwrote
                self.registry.publish_current().await;
                return;
            }
        };

        info!(aliases = state.len(), "Replacing alias set");
        if let Err(e) = self.registry.replace(state).await {
            debug!("Replacement rejected: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::registry::RegistrySettings;
    use crate::infrastructure::event_bus::InMemoryBus;
    use crate::infrastructure::snapshots::NullSnapshotStore;
    use serde_json::json;
    use std::time::Duration;

    async fn setup() -> (Arc<InMemoryBus>, Arc<AliasRegistry>, CancellationToken) {
        let bus = Arc::new(InMemoryBus::new(64));
        let registry = AliasRegistry::open(bus.clone(), Arc::new(NullSnapshotStore), RegistrySettings::default())
            .await
            .unwrap();
        let surface = ControlSurface::bind(bus.clone(), registry.clone()).await.unwrap();
        let cancel = CancellationToken::new();
        surface.spawn(cancel.clone());
        (bus, registry, cancel)
    }

    async fn wait_for_state(registry: &AliasRegistry, check: impl Fn(&RegistryState) -> bool) {
        for _ in 0..100 {
            if check(&registry.current_state().await) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("alias state never reached the expected value");
    }

    fn assert_send<T: Send>(_: &T) {}

    #[tokio::test]
    async fn test_run_can_move_across_threads() {
        let bus = Arc::new(InMemoryBus::new(64));
        let registry = AliasRegistry::open(bus.clone(), Arc::new(NullSnapshotStore), RegistrySettings::default())
            .await
            .unwrap();
        let surface = ControlSurface::bind(bus.clone(), registry).await.unwrap();

        let cancel = CancellationToken::new();
        let run = surface.run(cancel.clone());
        assert_send(&run);

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), run).await.unwrap();
    }

    #[tokio::test]
    async fn test_add_and_remove_over_bus() {
        let (bus, registry, cancel) = setup().await;

        bus.publish(BusMessage::new("meta/alias/add", json!(["sensors/temp", "house/temp"])))
            .await
            .unwrap();
        wait_for_state(&registry, |state| state.contains("house/temp")).await;

        bus.publish(BusMessage::new("meta/alias/remove", json!("house/temp")))
            .await
            .unwrap();
        wait_for_state(&registry, RegistryState::is_empty).await;

        cancel.cancel();
    }

    #[tokio::test]
    async fn test_bad_payload_reports_error() {
        let (bus, registry, cancel) = setup().await;
        let mut errors = bus.watch("meta/alias/error").await.unwrap();

        bus.publish(BusMessage::new("meta/alias/add", json!(42))).await.unwrap();

        let error = tokio::time::timeout(Duration::from_secs(2), errors.next())
            .await
            .unwrap()
            .unwrap();
        assert!(error.value["message"].as_str().unwrap().contains("[target, alias]"));
        assert!(error.value["at"].is_string());
        assert!(registry.current_state().await.is_empty());

        cancel.cancel();
    }

    #[tokio::test]
    async fn test_external_aliases_write_replaces_state() {
        let (bus, registry, cancel) = setup().await;

        bus.publish(BusMessage::new(
            "meta/alias/aliases",
            json!({ "b": { "target": "a", "alias": "b", "description": "B" } }),
        ))
        .await
        .unwrap();

        wait_for_state(&registry, |state| state.contains("b")).await;
        assert_eq!(registry.running_aliases().await, vec!["b"]);

        cancel.cancel();
    }

    #[tokio::test]
    async fn test_invalid_aliases_write_restores_canonical_value() {
        let (bus, registry, cancel) = setup().await;
        registry.declare(AliasDeclaration::short("a", "b")).await.unwrap();
        let canonical = bus.retained("meta/alias/aliases").await.unwrap();

        bus.publish(BusMessage::new("meta/alias/aliases", json!("garbage")))
            .await
            .unwrap();

        for _ in 0..100 {
            if bus.retained("meta/alias/aliases").await.as_ref() == Some(&canonical) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(bus.retained("meta/alias/aliases").await, Some(canonical));
        assert!(registry.current_state().await.contains("b"));

        cancel.cancel();
    }
}
