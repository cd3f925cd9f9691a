// SPDX-License-Identifier: MIT
//
// IoT Sensor Hub: Message-Bus-Centric Telemetry Gateway
// Copyright (c) 2025 IoT Sensor Hub Contributors
//
// https://github.com/iot-sensor-hub/iot-sensor-hub

use crate::MAX_FRAME_LEN;
use chrono::{DateTime, Utc};

/// One frame as received from the bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinFrame {
    pub id: u8,
    pub data: [u8; MAX_FRAME_LEN],
    /// Declared payload length; only `data[..dlc]` is meaningful
    pub dlc: u8,
    pub timestamp: DateTime<Utc>,
}

impl LinFrame {
    /// Build a frame from a received payload, stamped now
    ///
    /// Bytes beyond the eighth are discarded and `dlc` is set to the number kept.
    pub fn from_payload(id: u8, payload: &[u8]) -> Self {
        let len = payload.len().min(MAX_FRAME_LEN);
        let mut data = [0u8; MAX_FRAME_LEN];
        data[..len].copy_from_slice(&payload[..len]);
        Self {
            id,
            data,
            dlc: len as u8,
            timestamp: Utc::now(),
        }
    }

    /// Meaningful payload bytes
    pub fn payload(&self) -> &[u8] {
        &self.data[..usize::from(self.dlc).min(MAX_FRAME_LEN)]
    }
}
