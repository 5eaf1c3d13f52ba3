// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Coldtrace: durable store-and-forward for pharma cold-chain telemetry.
//!
//! Shipments publish sensor readings (temperature, humidity, RFID, GPS) over
//! MQTT. Coldtrace splits ingestion into two halves joined by an append-only
//! NDJSON journal on local disk:
//!
//! * **Listener** ([`listener::Listener`]): subscribes to the readings topic,
//!   validates and enriches each payload, appends it to the journal, and
//!   acknowledges the broker only once the record is fsynced.
//! * **Uploader** ([`uploader::Uploader`]): drains the journal to a remote
//!   HTTP ingestion endpoint, tracking progress with a durable cursor that
//!   advances only on confirmed delivery.
//!
//! The journal is the contract between the two: the listener only appends,
//! the uploader only reads, and either side can crash and restart without
//! losing a reading. Delivery to the endpoint is at-least-once.

pub mod backoff;
pub mod config;
pub mod cursor;
pub mod enrich;
pub mod journal;
pub mod listener;
pub mod mqtt;
pub mod schema;
pub mod uploader;

pub use config::Config;
pub use cursor::{Cursor, CursorFile};
pub use journal::{Journal, Reading};
pub use listener::Listener;
pub use uploader::{HttpIngestClient, UploadReport, Uploader};
