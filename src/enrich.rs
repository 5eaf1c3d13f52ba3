// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Intake enrichment.
//!
//! Optional per-connection annotation of readings before they reach the
//! journal: intake timestamp, carry-forward of missing RFID/GPS values from
//! the last valid sample, and cold-chain fault flags computed from
//! configured thresholds. The journal line is otherwise the payload
//! verbatim.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Fault detection thresholds for cold-chain readings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FaultThresholds {
    pub temperature_min: f64,
    pub temperature_max: f64,
    pub humidity_min: f64,
    pub humidity_max: f64,
}

impl Default for FaultThresholds {
    fn default() -> Self {
        Self {
            temperature_min: -10.0,
            temperature_max: 50.0,
            humidity_min: 10.0,
            humidity_max: 90.0,
        }
    }
}

/// Enrichment configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichConfig {
    /// Stamp `logged_at` (UTC, RFC 3339) if the payload has none.
    #[serde(default = "default_true")]
    pub stamp_logged_at: bool,

    /// Replace a missing `rfid_tag` or an all-zero `gps` fix with the last
    /// valid value seen on this connection.
    #[serde(default)]
    pub carry_forward: bool,

    /// Annotate a `faults` object when thresholds are configured.
    #[serde(default)]
    pub fault_thresholds: Option<FaultThresholds>,
}

fn default_true() -> bool {
    true
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            stamp_logged_at: true,
            carry_forward: false,
            fault_thresholds: None,
        }
    }
}

/// Stateful reading enricher.
///
/// Carry-forward state is per-connection and resets with the enricher.
#[derive(Debug)]
pub struct Enricher {
    config: EnrichConfig,
    last_rfid: Option<Value>,
    last_gps: Option<Value>,
}

impl Enricher {
    /// Create an enricher from configuration.
    pub fn new(config: EnrichConfig) -> Self {
        Self {
            config,
            last_rfid: None,
            last_gps: None,
        }
    }

    /// Annotate one payload in place. Non-object payloads pass unchanged.
    pub fn enrich(&mut self, payload: &mut Value) {
        let Some(object) = payload.as_object_mut() else {
            return;
        };

        if self.config.carry_forward {
            self.carry_forward(object);
        }

        if self.config.stamp_logged_at && !object.contains_key("logged_at") {
            object.insert(
                "logged_at".to_string(),
                Value::String(chrono::Utc::now().to_rfc3339()),
            );
        }

        if let Some(thresholds) = self.config.fault_thresholds {
            let faults = detect_faults(object, &thresholds);
            object.insert("faults".to_string(), faults);
        }
    }

    fn carry_forward(&mut self, object: &mut Map<String, Value>) {
        match object.get("rfid_tag") {
            Some(tag) if is_valid_rfid(tag) => {
                self.last_rfid = Some(tag.clone());
            }
            _ => {
                if let Some(last) = &self.last_rfid {
                    object.insert("rfid_tag".to_string(), last.clone());
                }
            }
        }

        match object.get("gps") {
            Some(gps) if is_valid_gps(gps) => {
                self.last_gps = Some(gps.clone());
            }
            _ => {
                if let Some(last) = &self.last_gps {
                    object.insert("gps".to_string(), last.clone());
                }
            }
        }
    }
}

fn is_valid_rfid(value: &Value) -> bool {
    matches!(value, Value::String(s) if !s.is_empty())
}

/// A GPS fix is valid if it is an object with non-zero lat and lon.
/// Devices report 0.0/0.0 before the first satellite fix.
fn is_valid_gps(value: &Value) -> bool {
    let (Some(lat), Some(lon)) = (
        value.get("lat").and_then(Value::as_f64),
        value.get("lon").and_then(Value::as_f64),
    ) else {
        return false;
    };
    lat != 0.0 || lon != 0.0
}

fn detect_faults(object: &Map<String, Value>, thresholds: &FaultThresholds) -> Value {
    let temperature = object.get("temperature").and_then(Value::as_f64);
    let humidity = object.get("humidity").and_then(Value::as_f64);

    serde_json::json!({
        "temperature_high": temperature.map(|t| t > thresholds.temperature_max).unwrap_or(false),
        "temperature_low": temperature.map(|t| t < thresholds.temperature_min).unwrap_or(false),
        "humidity_high": humidity.map(|h| h > thresholds.humidity_max).unwrap_or(false),
        "humidity_low": humidity.map(|h| h < thresholds.humidity_min).unwrap_or(false),
    })
}
