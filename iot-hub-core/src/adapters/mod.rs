// SPDX-License-Identifier: MIT
//
// IoT Sensor Hub: Message-Bus-Centric Telemetry Gateway
// Copyright (c) 2025 IoT Sensor Hub Contributors
//
// https://github.com/iot-sensor-hub/iot-sensor-hub

//! Bridges between the bus and external transports

pub mod http;
pub mod mqtt;

pub use http::{HttpAdapter, HttpSettings};
pub use mqtt::{BrokerAddress, MqttAdapter, MqttSettings};

use serde_json::Value;

/// Interpret an inbound body as JSON, falling back to a JSON string
pub(crate) fn decode_inbound(body: &[u8]) -> Value {
    serde_json::from_slice(body)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned()))
}
