// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Error event publisher shared by the registry and its mirrors
//!
//! Rejections and mirror failures have no synchronous reply channel on the
//! bus; they become visible to clients only as messages on the error topic.

use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, warn};

use crate::domain::bus::{Bus, BusMessage};

/// Origin tag on everything the registry itself publishes
pub const REGISTRY_ORIGIN: &str = "alias-registry";

#[derive(Clone)]
pub struct ErrorReporter {
    bus: Arc<dyn Bus>,
    topic: String,
}

impl ErrorReporter {
    pub fn new(bus: Arc<dyn Bus>, topic: impl Into<String>) -> Self {
        Self {
            bus,
            topic: topic.into(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Log and publish a human-readable error message
    pub async fn report(&self, message: impl Into<String>) {
        let message = message.into();
        warn!(topic = %self.topic, "{}", message);

        let payload = json!({
            "message": message,
            "at": Utc::now().to_rfc3339(),
        });

        if let Err(e) = self
            .bus
            .publish(BusMessage::new(self.topic.clone(), payload).with_origin(REGISTRY_ORIGIN))
            .await
        {
            error!("Failed to publish error event to {}: {}", self.topic, e);
        }
    }
}
