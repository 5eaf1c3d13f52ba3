// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Broker listener.
//!
//! Subscribes to the readings topic and durably records every delivered
//! message to the journal.
//!
//! # Operation
//!
//! 1. Connect to the broker and subscribe (QoS 1)
//! 2. Per message: parse, enrich, validate, append to the journal
//! 3. Acknowledge only after the append is durable
//! 4. On disconnect, reconnect with capped exponential backoff, forever
//!
//! A malformed payload is logged and skipped (and acknowledged, so the
//! broker does not redeliver garbage); a journal write failure is logged
//! loudly and NOT acknowledged, so the broker may redeliver the reading.

use crate::backoff::Backoff;
use crate::config::{BrokerConfig, Config};
use crate::enrich::Enricher;
use crate::journal::{Journal, JournalError, Reading};
use crate::mqtt::{MqttClient, MqttOptions};
use crate::schema::PayloadSchema;
use anyhow::Result;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;

/// Listener errors for a single message.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// The message body is not valid JSON or violates the payload schema.
    /// Recoverable: skip the record, keep ingesting.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// The journal append failed. Fatal for this record; the message is not
    /// acknowledged.
    #[error("journal write failed: {0}")]
    LogWriteFailure(#[from] JournalError),
}

/// Listener statistics.
#[derive(Debug, Default, Clone)]
pub struct ListenerStats {
    /// Messages delivered by the broker.
    pub received: u64,
    /// Readings durably appended.
    pub persisted: u64,
    /// Messages skipped as malformed.
    pub malformed: u64,
    /// Journal append failures.
    pub write_failures: u64,
}

/// Broker-to-journal listener.
pub struct Listener {
    broker: BrokerConfig,
    journal: Journal,
    schema: Option<PayloadSchema>,
    enricher: Option<Enricher>,
    stats: ListenerStats,
}

impl Listener {
    /// Create a listener from configuration.
    pub fn new(config: &Config, journal: Journal) -> Self {
        Self {
            broker: config.broker.clone(),
            journal,
            schema: config.schema.clone(),
            enricher: config.enrich.clone().map(Enricher::new),
            stats: ListenerStats::default(),
        }
    }

    /// Get listener statistics.
    pub fn stats(&self) -> &ListenerStats {
        &self.stats
    }

    /// Process one message body: parse, enrich, validate, persist.
    ///
    /// Called synchronously from the delivery loop, one message at a time,
    /// so append order matches arrival order.
    pub fn handle_message(&mut self, body: &[u8]) -> Result<(), ListenerError> {
        self.stats.received += 1;

        let mut payload = match serde_json::from_slice::<serde_json::Value>(body) {
            Ok(value) => value,
            Err(e) => {
                self.stats.malformed += 1;
                return Err(ListenerError::MalformedPayload(e.to_string()));
            }
        };

        if let Some(enricher) = &mut self.enricher {
            enricher.enrich(&mut payload);
        }

        if let Some(schema) = &self.schema {
            if let Err(violation) = schema.validate(&payload) {
                self.stats.malformed += 1;
                return Err(ListenerError::MalformedPayload(violation.to_string()));
            }
        }

        match self.journal.append(&Reading(payload)) {
            Ok(()) => {
                self.stats.persisted += 1;
                Ok(())
            }
            Err(e) => {
                self.stats.write_failures += 1;
                Err(ListenerError::LogWriteFailure(e))
            }
        }
    }

    /// Run the listener until the shutdown signal fires.
    ///
    /// Never exits due to broker trouble: connection failures retry forever
    /// with capped exponential backoff, and the subscription is
    /// re-established identically after every reconnect.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let options = MqttOptions {
            client_id: self.broker.client_id.clone(),
            keep_alive: Duration::from_secs(self.broker.keep_alive_secs),
            clean_session: true,
        };
        let mut backoff = Backoff::new(
            Duration::from_millis(self.broker.reconnect_base_ms),
            Duration::from_millis(self.broker.reconnect_max_ms),
        );

        tracing::info!(
            addr = %self.broker.addr,
            topic = %self.broker.topic,
            "listener starting"
        );

        'reconnect: loop {
            if *shutdown.borrow() {
                break;
            }

            let mut client = match MqttClient::connect(&self.broker.addr, &options).await {
                Ok(client) => client,
                Err(e) => {
                    let delay = backoff.next_delay();
                    tracing::warn!("broker unreachable: {}; retrying in {:?}", e, delay);
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => continue 'reconnect,
                        _ = shutdown.changed() => break 'reconnect,
                    }
                }
            };

            if let Err(e) = client.subscribe(&self.broker.topic).await {
                let delay = backoff.next_delay();
                tracing::warn!("subscribe failed: {}; reconnecting in {:?}", e, delay);
                tokio::select! {
                    _ = tokio::time::sleep(delay) => continue 'reconnect,
                    _ = shutdown.changed() => break 'reconnect,
                }
            }

            backoff.reset();
            tracing::info!(topic = %self.broker.topic, "subscribed, recording readings");

            loop {
                tokio::select! {
                    _ = shutdown.changed() => {
                        tracing::info!("listener shutting down");
                        if let Err(e) = client.disconnect().await {
                            tracing::debug!("disconnect: {}", e);
                        }
                        break 'reconnect;
                    }
                    delivery = client.next_publish() => {
                        let publish = match delivery {
                            Ok(publish) => publish,
                            Err(e) => {
                                tracing::warn!("broker connection lost: {}", e);
                                continue 'reconnect;
                            }
                        };

                        match self.handle_message(&publish.payload) {
                            Ok(()) => {
                                if let Some(id) = publish.packet_id {
                                    if let Err(e) = client.ack(id).await {
                                        tracing::warn!("connection lost during ack: {}", e);
                                        continue 'reconnect;
                                    }
                                }
                            }
                            Err(ListenerError::MalformedPayload(reason)) => {
                                tracing::warn!(%reason, "skipping malformed payload");
                                // Acknowledge anyway: redelivering garbage helps nobody.
                                if let Some(id) = publish.packet_id {
                                    if client.ack(id).await.is_err() {
                                        continue 'reconnect;
                                    }
                                }
                            }
                            Err(ListenerError::LogWriteFailure(e)) => {
                                // Left unacknowledged so the broker may redeliver.
                                tracing::error!(
                                    "journal write failed, reading NOT acknowledged: {}",
                                    e
                                );
                            }
                        }
                    }
                }
            }
        }

        tracing::info!(stats = ?self.stats, "listener stopped");
        Ok(())
    }
}
