// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Journal uploader.
//!
//! Drains the readings journal to the remote ingestion endpoint, one POST
//! per reading, in append order. Progress is tracked by a durable [`Cursor`]
//! that advances only after the endpoint confirms receipt, so a crash at any
//! point causes bounded redelivery, never loss.
//!
//! Failure handling distinguishes the endpoint saying "no" from the endpoint
//! being away:
//! * 2xx: delivered, advance the cursor.
//! * 4xx: the endpoint rejected this reading. Retried on later cycles up to
//!   a configured attempt limit, then moved to the dead-letter journal so one
//!   poison record cannot block the backlog forever.
//! * 5xx or transport error: the endpoint is unreachable. The batch stops
//!   and the cursor stays put; everything retries next cycle.

use crate::config::UploadConfig;
use crate::cursor::{Cursor, CursorError, CursorFile};
use crate::journal::{Journal, JournalError, Reading};
use anyhow::Result;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;

/// Upload errors.
#[derive(Debug, Error)]
pub enum UploadError {
    /// The endpoint could not be reached, timed out, or answered 5xx.
    /// Transient: the same readings are retried next cycle.
    #[error("ingestion endpoint unreachable: {0}")]
    Unreachable(String),

    /// The endpoint answered 4xx: it received the reading and refused it.
    #[error("ingestion endpoint rejected reading: HTTP {status}")]
    Rejected { status: u16 },

    #[error(transparent)]
    Journal(#[from] JournalError),

    #[error(transparent)]
    Cursor(#[from] CursorError),
}

/// Outcome of one upload cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UploadReport {
    /// Readings confirmed delivered this cycle.
    pub uploaded: u64,
    /// Readings moved to the dead-letter journal this cycle.
    pub dead_lettered: u64,
}

/// Client for the remote ingestion endpoint.
///
/// One reading per call; the implementation maps the transport outcome onto
/// the [`UploadError`] taxonomy the uploader's retry logic is built on.
pub trait IngestClient {
    async fn post(&self, reading: &Reading) -> Result<(), UploadError>;
}

/// HTTP POST client for the ingestion endpoint.
pub struct HttpIngestClient {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpIngestClient {
    /// Build a client with the configured request timeout.
    pub fn new(config: &UploadConfig) -> Result<Self, UploadError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| UploadError::Unreachable(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
        })
    }
}

impl IngestClient for HttpIngestClient {
    async fn post(&self, reading: &Reading) -> Result<(), UploadError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(reading.payload())
            .send()
            .await
            .map_err(|e| UploadError::Unreachable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else if status.is_client_error() {
            Err(UploadError::Rejected {
                status: status.as_u16(),
            })
        } else {
            Err(UploadError::Unreachable(format!(
                "endpoint answered HTTP {}",
                status.as_u16()
            )))
        }
    }
}

/// Journal-to-endpoint uploader.
pub struct Uploader<C: IngestClient> {
    journal: Journal,
    cursor_file: CursorFile,
    dead_letter: Journal,
    client: C,
    max_reject_attempts: u32,
}

impl<C: IngestClient> Uploader<C> {
    pub fn new(
        journal: Journal,
        cursor_file: CursorFile,
        dead_letter: Journal,
        client: C,
        max_reject_attempts: u32,
    ) -> Self {
        Self {
            journal,
            cursor_file,
            dead_letter,
            client,
            max_reject_attempts,
        }
    }

    /// Upload every pending reading from the cursor position onward.
    ///
    /// The cursor is persisted after every confirmed delivery, so progress
    /// within a cycle survives a crash. Stops at the first unreachable or
    /// not-yet-dead-lettered rejection; the remainder is picked up next
    /// cycle.
    pub async fn run_once(&self) -> Result<UploadReport, UploadError> {
        let mut cursor = self.cursor_file.load()?;
        let backlog = self.journal.read_from(cursor.position)?;
        let mut report = UploadReport::default();

        for (index, reading) in &backlog {
            let index = *index;
            match self.client.post(reading).await {
                Ok(()) => {
                    cursor = Cursor {
                        position: index + 1,
                        reject_attempts: 0,
                    };
                    self.cursor_file.store(cursor)?;
                    report.uploaded += 1;
                    tracing::debug!(index, "reading delivered");
                }
                Err(UploadError::Rejected { status }) => {
                    cursor.reject_attempts += 1;

                    if cursor.reject_attempts >= self.max_reject_attempts {
                        self.write_dead_letter(reading, index, status)?;
                        report.dead_lettered += 1;
                        tracing::warn!(
                            index,
                            status,
                            attempts = cursor.reject_attempts,
                            "reading dead-lettered after repeated rejection"
                        );
                        cursor = Cursor {
                            position: index + 1,
                            reject_attempts: 0,
                        };
                        self.cursor_file.store(cursor)?;
                    } else {
                        // Persist the attempt count so the limit holds
                        // across restarts.
                        self.cursor_file.store(cursor)?;
                        return Err(UploadError::Rejected { status });
                    }
                }
                // Unreachable: cursor untouched, whole remainder retries.
                Err(e) => return Err(e),
            }
        }

        Ok(report)
    }

    /// Run upload cycles on an interval until the shutdown signal fires.
    pub async fn run(
        &self,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        tracing::info!(interval_secs = interval.as_secs(), "uploader starting");

        loop {
            match self.run_once().await {
                Ok(report) if report.uploaded > 0 || report.dead_lettered > 0 => {
                    tracing::info!(
                        uploaded = report.uploaded,
                        dead_lettered = report.dead_lettered,
                        "upload cycle complete"
                    );
                }
                Ok(_) => tracing::debug!("journal drained, nothing to upload"),
                Err(UploadError::Unreachable(reason)) => {
                    tracing::warn!(%reason, "endpoint unreachable, retrying next cycle");
                }
                Err(UploadError::Rejected { status }) => {
                    tracing::warn!(status, "endpoint rejected reading, retrying next cycle");
                }
                // Journal or cursor corruption needs an operator.
                Err(e) => return Err(e.into()),
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.changed() => {
                    tracing::info!("uploader shutting down");
                    return Ok(());
                }
            }
        }
    }

    fn write_dead_letter(
        &self,
        reading: &Reading,
        index: u64,
        status: u16,
    ) -> Result<(), UploadError> {
        let entry = Reading(json!({
            "record": reading.payload(),
            "journal_index": index,
            "http_status": status,
            "dead_lettered_at": chrono::Utc::now().to_rfc3339(),
        }));
        self.dead_letter.append(&entry)?;
        Ok(())
    }
}
