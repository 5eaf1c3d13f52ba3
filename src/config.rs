// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Service configuration.
//!
//! Loaded from a YAML file; individual fields can be overridden by CLI flags
//! in the binaries. Every field has an operational default so a bare
//! `coldtrace-listen` against a local broker works out of the box.

use crate::enrich::EnrichConfig;
use crate::schema::PayloadSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Top-level service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Broker connection settings.
    #[serde(default)]
    pub broker: BrokerConfig,

    /// Journal, cursor, and dead-letter paths.
    #[serde(default)]
    pub journal: JournalConfig,

    /// Remote ingestion endpoint settings.
    #[serde(default)]
    pub upload: UploadConfig,

    /// Optional required-field payload schema, enforced at intake.
    #[serde(default)]
    pub schema: Option<PayloadSchema>,

    /// Optional intake enrichment.
    #[serde(default)]
    pub enrich: Option<EnrichConfig>,
}

/// MQTT broker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Broker address, host:port.
    #[serde(default = "default_broker_addr")]
    pub addr: String,

    /// Topic carrying sensor readings.
    #[serde(default = "default_topic")]
    pub topic: String,

    /// MQTT client identifier.
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Keep-alive interval in seconds (0 disables pings).
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,

    /// Base reconnect delay in milliseconds.
    #[serde(default = "default_reconnect_base_ms")]
    pub reconnect_base_ms: u64,

    /// Maximum reconnect delay in milliseconds.
    #[serde(default = "default_reconnect_max_ms")]
    pub reconnect_max_ms: u64,
}

/// Journal file locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalConfig {
    /// Append-only readings journal (NDJSON).
    #[serde(default = "default_journal_path")]
    pub path: PathBuf,

    /// Upload cursor state file.
    #[serde(default = "default_cursor_path")]
    pub cursor_path: PathBuf,

    /// Dead-letter journal for repeatedly rejected readings.
    #[serde(default = "default_dead_letter_path")]
    pub dead_letter_path: PathBuf,
}

/// Remote ingestion endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// HTTP endpoint receiving one reading per POST.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Poll interval between upload cycles in seconds.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Rejected (4xx) attempts before a reading is dead-lettered.
    #[serde(default = "default_max_reject_attempts")]
    pub max_reject_attempts: u32,
}

fn default_broker_addr() -> String {
    "localhost:1883".to_string()
}

fn default_topic() -> String {
    "medicine/data".to_string()
}

fn default_client_id() -> String {
    "coldtrace-listener".to_string()
}

fn default_keep_alive_secs() -> u64 {
    30
}

fn default_reconnect_base_ms() -> u64 {
    500
}

fn default_reconnect_max_ms() -> u64 {
    30_000
}

fn default_journal_path() -> PathBuf {
    PathBuf::from("iot_readings.jsonl")
}

fn default_cursor_path() -> PathBuf {
    PathBuf::from("iot_readings.cursor")
}

fn default_dead_letter_path() -> PathBuf {
    PathBuf::from("iot_readings.deadletter.jsonl")
}

fn default_endpoint() -> String {
    "http://localhost:5000/api/iot".to_string()
}

fn default_interval_secs() -> u64 {
    30
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_max_reject_attempts() -> u32 {
    5
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            addr: default_broker_addr(),
            topic: default_topic(),
            client_id: default_client_id(),
            keep_alive_secs: default_keep_alive_secs(),
            reconnect_base_ms: default_reconnect_base_ms(),
            reconnect_max_ms: default_reconnect_max_ms(),
        }
    }
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            path: default_journal_path(),
            cursor_path: default_cursor_path(),
            dead_letter_path: default_dead_letter_path(),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            interval_secs: default_interval_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            max_reject_attempts: default_max_reject_attempts(),
        }
    }
}

impl Config {
    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Parse configuration from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldKind;

    const FULL_YAML: &str = r#"
broker:
  addr: "broker.example.com:1883"
  topic: "pharma/shipments"
  client_id: "depot-7"
  keep_alive_secs: 60
journal:
  path: "/var/lib/coldtrace/readings.jsonl"
  cursor_path: "/var/lib/coldtrace/upload.cursor"
  dead_letter_path: "/var/lib/coldtrace/rejected.jsonl"
upload:
  endpoint: "https://api.example.com/iot-logs/ingest"
  interval_secs: 15
  request_timeout_secs: 5
  max_reject_attempts: 3
schema:
  required:
    - name: temperature
      kind: number
    - name: rfid_tag
      kind: string
enrich:
  stamp_logged_at: true
  carry_forward: true
  fault_thresholds:
    temperature_min: 2.0
    temperature_max: 8.0
    humidity_min: 35.0
    humidity_max: 75.0
"#;

    #[test]
    fn test_empty_yaml_uses_defaults() {
        let config = Config::from_yaml("{}").expect("parse");

        assert_eq!(config.broker.addr, "localhost:1883");
        assert_eq!(config.broker.topic, "medicine/data");
        assert_eq!(config.journal.path, PathBuf::from("iot_readings.jsonl"));
        assert_eq!(config.upload.endpoint, "http://localhost:5000/api/iot");
        assert_eq!(config.upload.max_reject_attempts, 5);
        assert!(config.schema.is_none());
        assert!(config.enrich.is_none());
    }

    #[test]
    fn test_full_yaml_parses() {
        let config = Config::from_yaml(FULL_YAML).expect("parse");

        assert_eq!(config.broker.addr, "broker.example.com:1883");
        assert_eq!(config.broker.topic, "pharma/shipments");
        assert_eq!(config.broker.keep_alive_secs, 60);
        assert_eq!(
            config.journal.dead_letter_path,
            PathBuf::from("/var/lib/coldtrace/rejected.jsonl")
        );
        assert_eq!(config.upload.interval_secs, 15);
        assert_eq!(config.upload.max_reject_attempts, 3);

        let schema = config.schema.expect("schema");
        assert_eq!(schema.required.len(), 2);
        assert_eq!(schema.required[0].kind, FieldKind::Number);

        let enrich = config.enrich.expect("enrich");
        assert!(enrich.carry_forward);
        let thresholds = enrich.fault_thresholds.expect("thresholds");
        assert_eq!(thresholds.temperature_max, 8.0);
    }

    #[test]
    fn test_partial_section_fills_defaults() {
        let config = Config::from_yaml("broker:\n  topic: \"other/topic\"\n").expect("parse");

        assert_eq!(config.broker.topic, "other/topic");
        assert_eq!(config.broker.addr, "localhost:1883");
        assert_eq!(config.broker.keep_alive_secs, 30);
    }
}
