// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Alias Mirror
//!
//! Runtime element for one alias. While started it:
//! - watches the target topic, applies `transform` and publishes to the alias
//! - when the alias is a settable property, also watches the alias, applies
//!   `inverse` and publishes back to the target
//!
//! Each direction runs as a spawned task cancelled through a shared
//! `CancellationToken`. Every message a mirror publishes carries its origin
//! tag, and a direction ignores messages carrying that tag, so a mirror never
//! re-propagates its own writes. Messages from other mirrors are propagated,
//! which lets chains of aliases compose.

use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::reporting::ErrorReporter;
use crate::domain::alias::AliasSpec;
use crate::domain::bus::{Bus, BusError, BusMessage, TopicInfo, TopicKind, TopicStream};
use crate::domain::transform::{TransformError, ValueTransform};

#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("Invalid {field} expression for alias '{alias}': {source}")]
    Expression {
        alias: String,
        field: &'static str,
        #[source]
        source: TransformError,
    },

    #[error("Bus error while mirroring alias '{alias}': {source}")]
    Bus {
        alias: String,
        #[source]
        source: BusError,
    },

    #[error("Mirror task for alias '{alias}' panicked")]
    TaskPanicked { alias: String },

    #[error("Mirror {operation} for alias '{alias}' timed out after {timeout:?}")]
    Timeout {
        alias: String,
        operation: &'static str,
        timeout: Duration,
    },
}

/// Origin tag used by the mirror of `alias`
pub fn mirror_origin(alias: &str) -> String {
    format!("alias-mirror:{}", alias)
}

struct MirrorRuntime {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    registered_alias: bool,
    started: bool,
}

impl MirrorRuntime {
    fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
            registered_alias: false,
            started: false,
        }
    }
}

pub struct AliasMirror {
    spec: AliasSpec,
    bus: Arc<dyn Bus>,
    reporter: ErrorReporter,
    runtime: Option<MirrorRuntime>,
}

impl AliasMirror {
    pub fn new(spec: AliasSpec, bus: Arc<dyn Bus>, reporter: ErrorReporter) -> Self {
        Self {
            spec,
            bus,
            reporter,
            runtime: None,
        }
    }

    pub fn spec(&self) -> &AliasSpec {
        &self.spec
    }

    pub fn is_running(&self) -> bool {
        self.runtime
            .as_ref()
            .map(|rt| rt.started && !rt.cancel.is_cancelled())
            .unwrap_or(false)
    }

    fn bus_error(&self, source: BusError) -> MirrorError {
        MirrorError::Bus {
            alias: self.spec.alias.clone(),
            source,
        }
    }

    fn parse(&self, expr: Option<&str>, field: &'static str) -> Result<Option<ValueTransform>, MirrorError> {
        expr.map(ValueTransform::parse)
            .transpose()
            .map_err(|source| MirrorError::Expression {
                alias: self.spec.alias.clone(),
                field,
                source,
            })
    }

    /// Begin mirroring. Calling it on a running mirror does nothing.
    ///
    /// Progress is recorded as it happens, so a start that fails or is
    /// abandoned half-way is fully undone by `stop`.
    pub async fn start(&mut self) -> Result<(), MirrorError> {
        if self.is_running() {
            return Ok(());
        }
        if self.runtime.is_some() {
            self.stop().await?;
        }

        let forward = self.parse(self.spec.transform.as_deref(), "transform")?;
        let inverse = self.parse(self.spec.inverse.as_deref(), "inverse")?;

        let origin = mirror_origin(&self.spec.alias);
        let target_kind = self
            .bus
            .topic(&self.spec.target)
            .await
            .map(|info| info.kind)
            .unwrap_or(TopicKind::Event);

        self.runtime = Some(MirrorRuntime::new());

        let alias_kind = match self.bus.topic(&self.spec.alias).await {
            Some(existing) => existing.kind,
            None => {
                self.bus
                    .register(TopicInfo {
                        path: self.spec.alias.clone(),
                        kind: target_kind,
                        description: self.spec.description.clone(),
                    })
                    .await
                    .map_err(|e| self.bus_error(e))?;
                self.runtime_mut().registered_alias = true;
                target_kind
            }
        };

        let forward_link = Link {
            alias: self.spec.alias.clone(),
            from: self.spec.target.clone(),
            to: self.spec.alias.clone(),
            field: "transform",
            transform: forward,
            origin: origin.clone(),
            bus: self.bus.clone(),
            reporter: self.reporter.clone(),
        };
        let forward_stream = self
            .bus
            .watch(&self.spec.target)
            .await
            .map_err(|e| self.bus_error(e))?;
        self.spawn_link(forward_link.clone(), forward_stream);

        if alias_kind == TopicKind::Property {
            let backward_link = Link {
                alias: self.spec.alias.clone(),
                from: self.spec.alias.clone(),
                to: self.spec.target.clone(),
                field: "inverse",
                transform: inverse,
                origin,
                bus: self.bus.clone(),
                reporter: self.reporter.clone(),
            };
            let backward_stream = self
                .bus
                .watch(&self.spec.alias)
                .await
                .map_err(|e| self.bus_error(e))?;
            self.spawn_link(backward_link, backward_stream);
        }

        if let Some(value) = self.bus.retained(&self.spec.target).await {
            forward_link
                .propagate(BusMessage::new(self.spec.target.clone(), value))
                .await;
        }

        self.runtime_mut().started = true;
        info!(
            alias = %self.spec.alias,
            target = %self.spec.target,
            bidirectional = alias_kind == TopicKind::Property,
            "Alias mirror started"
        );
        Ok(())
    }

    /// Stop mirroring and release the alias registration. Safe on a mirror
    /// that never started or only partially started.
    pub async fn stop(&mut self) -> Result<(), MirrorError> {
        let Some(runtime) = self.runtime.take() else {
            return Ok(());
        };

        runtime.cancel.cancel();

        let mut panicked = false;
        for task in runtime.tasks {
            if let Err(e) = task.await {
                panicked |= e.is_panic();
            }
        }

        if runtime.registered_alias {
            self.bus
                .unregister(&self.spec.alias)
                .await
                .map_err(|e| self.bus_error(e))?;
        }

        if panicked {
            return Err(MirrorError::TaskPanicked {
                alias: self.spec.alias.clone(),
            });
        }

        info!(alias = %self.spec.alias, "Alias mirror stopped");
        Ok(())
    }

    fn runtime_mut(&mut self) -> &mut MirrorRuntime {
        self.runtime.get_or_insert_with(MirrorRuntime::new)
    }

    fn spawn_link(&mut self, link: Link, stream: TopicStream) {
        let runtime = self.runtime_mut();
        let cancel = runtime.cancel.clone();
        runtime.tasks.push(tokio::spawn(link.run(stream, cancel)));
    }
}

impl Drop for AliasMirror {
    fn drop(&mut self) {
        if let Some(runtime) = &self.runtime {
            runtime.cancel.cancel();
        }
    }
}

/// One direction of a mirror
#[derive(Clone)]
struct Link {
    alias: String,
    from: String,
    to: String,
    field: &'static str,
    transform: Option<ValueTransform>,
    origin: String,
    bus: Arc<dyn Bus>,
    reporter: ErrorReporter,
}

impl Link {
    async fn run(self, mut stream: TopicStream, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                next = stream.next() => match next {
                    Some(message) => self.propagate(message).await,
                    None => {
                        debug!(alias = %self.alias, from = %self.from, "Watch closed");
                        break;
                    }
                },
            }
        }
    }

    async fn propagate(&self, message: BusMessage) {
        if message.is_from(&self.origin) {
            return;
        }

        let value = match &self.transform {
            Some(transform) => match transform.apply(&message.value) {
                Ok(value) => value,
                Err(e) => {
                    warn!(
                        alias = %self.alias,
                        from = %self.from,
                        "Skipping value, {} failed: {}", self.field, e
                    );
                    self.reporter
                        .report(format!(
                            "Alias '{}': {} '{}' failed on value from '{}': {}",
                            self.alias, self.field, transform, self.from, e
                        ))
                        .await;
                    return;
                }
            },
            None => message.value,
        };

        debug!(alias = %self.alias, from = %self.from, to = %self.to, "Propagating value");
        if let Err(e) = self
            .bus
            .publish(BusMessage::new(self.to.clone(), value).with_origin(self.origin.clone()))
            .await
        {
            self.reporter
                .report(format!(
                    "Alias '{}': failed to publish to '{}': {}",
                    self.alias, self.to, e
                ))
                .await;
        }
    }
}
