// SPDX-License-Identifier: MIT
//
// IoT Sensor Hub: Message-Bus-Centric Telemetry Gateway
// Copyright (c) 2025 IoT Sensor Hub Contributors
//
// https://github.com/iot-sensor-hub/iot-sensor-hub

//! The uniform event record carried by the bus

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// Telemetry event produced at the moment of observation
///
/// A `Message` is immutable once constructed: fields are only reachable through
/// accessors, so any number of subscribers may read the same instance concurrently.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    source_id: String,
    topic: String,
    payload: Value,
    timestamp: DateTime<Utc>,
}

impl Message {
    /// Create a message stamped with the current time
    pub fn new(source_id: impl Into<String>, topic: impl Into<String>, payload: Value) -> Self {
        Self {
            source_id: source_id.into(),
            topic: topic.into(),
            payload,
            timestamp: Utc::now(),
        }
    }

    /// Identifier of the producer
    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// Hierarchical topic, e.g. `lin/16/signals`
    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn timestamp_millis(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_fields() {
        let before = Utc::now();
        let msg = Message::new("PIR_1", "sensors/pir", json!({"motion": true}));
        assert_eq!(msg.source_id(), "PIR_1");
        assert_eq!(msg.topic(), "sensors/pir");
        assert_eq!(msg.payload()["motion"], json!(true));
        assert!(msg.timestamp() >= before);
    }
}
