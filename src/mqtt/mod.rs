// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Minimal MQTT 3.1.1 client.
//!
//! Just enough protocol for the listener: connect, subscribe at QoS 1,
//! receive publishes, acknowledge, keep the connection alive. Reconnection
//! policy lives with the caller.

pub mod client;
pub mod packet;

pub use client::{InboundPublish, MqttClient, MqttError, MqttOptions};
pub use packet::{CodecError, Packet};
