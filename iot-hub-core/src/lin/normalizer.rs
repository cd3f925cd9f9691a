// SPDX-License-Identifier: MIT
//
// IoT Sensor Hub: Message-Bus-Centric Telemetry Gateway
// Copyright (c) 2025 IoT Sensor Hub Contributors
//
// https://github.com/iot-sensor-hub/iot-sensor-hub

//! Byte-level signal decoding
//!
//! A [`SignalSpec`] names a byte range within one frame id and how to turn it into a
//! physical value: `raw * scale + offset`. Decoding never fails. A spec whose range
//! runs past the frame's declared length, or whose type is not understood, is left
//! out of the result.

use super::frame::LinFrame;
use crate::MAX_FRAME_LEN;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::trace;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueType {
    Bool,
    U8,
    U16,
    I16,
    /// Declared in configuration but not decodable; always skipped
    Unsupported(String),
}

impl ValueType {
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "bool" => Self::Bool,
            "u8" => Self::U8,
            "u16" => Self::U16,
            "i16" => Self::I16,
            _ => Self::Unsupported(s.to_string()),
        }
    }

    /// Bytes consumed by one value of this type
    pub fn width(&self) -> usize {
        match self {
            Self::U16 | Self::I16 => 2,
            _ => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Endianness {
    #[default]
    Little,
    Big,
}

impl Endianness {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "le" | "little" | "little_endian" => Some(Self::Little),
            "be" | "big" | "big_endian" => Some(Self::Big),
            _ => None,
        }
    }
}

/// `signals` item in a sensor configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SignalConfig {
    pub frame_id: u8,
    pub name: String,
    pub byte: u8,
    #[serde(default)]
    pub len: Option<u8>,
    #[serde(rename = "type")]
    pub value_type: String,
    #[serde(default = "default_scale")]
    pub scale: f64,
    #[serde(default)]
    pub offset: f64,
    #[serde(default)]
    pub endian: Option<String>,
}

fn default_scale() -> f64 {
    1.0
}

/// Static decode rule
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "SignalConfig")]
pub struct SignalSpec {
    pub frame_id: u8,
    pub name: String,
    pub byte_offset: usize,
    pub length: usize,
    pub value_type: ValueType,
    pub scale: f64,
    pub offset: f64,
    pub endianness: Endianness,
}

impl SignalSpec {
    /// Convenience constructor for a little-endian spec whose length is the type width
    pub fn new(
        frame_id: u8,
        name: impl Into<String>,
        byte_offset: usize,
        value_type: ValueType,
        scale: f64,
        offset: f64,
    ) -> Self {
        Self {
            frame_id,
            name: name.into(),
            byte_offset,
            length: value_type.width(),
            value_type,
            scale,
            offset,
            endianness: Endianness::Little,
        }
    }

    pub fn with_length(mut self, length: usize) -> Self {
        self.length = length;
        self
    }

    pub fn with_endianness(mut self, endianness: Endianness) -> Self {
        self.endianness = endianness;
        self
    }

    /// Raw value at this spec's position, if the frame is long enough
    fn decode_raw(&self, frame: &LinFrame) -> Option<f64> {
        let payload = frame.payload();
        if self.byte_offset + self.length > payload.len() {
            return None;
        }
        let bytes = payload.get(self.byte_offset..self.byte_offset + self.value_type.width())?;

        let pair = |b: &[u8]| -> [u8; 2] { [b[0], b[1]] };
        let value = match &self.value_type {
            ValueType::Bool => {
                if bytes[0] != 0 {
                    1.0
                } else {
                    0.0
                }
            }
            ValueType::U8 => f64::from(bytes[0]),
            ValueType::U16 => f64::from(match self.endianness {
                Endianness::Little => u16::from_le_bytes(pair(bytes)),
                Endianness::Big => u16::from_be_bytes(pair(bytes)),
            }),
            ValueType::I16 => f64::from(match self.endianness {
                Endianness::Little => i16::from_le_bytes(pair(bytes)),
                Endianness::Big => i16::from_be_bytes(pair(bytes)),
            }),
            ValueType::Unsupported(_) => return None,
        };
        Some(value)
    }
}

impl TryFrom<SignalConfig> for SignalSpec {
    type Error = String;

    fn try_from(config: SignalConfig) -> Result<Self, Self::Error> {
        let value_type = ValueType::parse(&config.value_type);
        let length = config
            .len
            .map(usize::from)
            .unwrap_or_else(|| value_type.width());
        if usize::from(config.byte) >= MAX_FRAME_LEN {
            return Err(format!(
                "signal '{}': byte offset {} outside 0..{}",
                config.name, config.byte, MAX_FRAME_LEN
            ));
        }
        if !(1..=2).contains(&length) {
            return Err(format!(
                "signal '{}': length {} must be 1 or 2",
                config.name, length
            ));
        }
        let endianness = match config.endian.as_deref() {
            None => Endianness::default(),
            Some(s) => Endianness::parse(s)
                .ok_or_else(|| format!("signal '{}': unknown endianness '{}'", config.name, s))?,
        };

        Ok(Self {
            frame_id: config.frame_id,
            name: config.name,
            byte_offset: usize::from(config.byte),
            length,
            value_type,
            scale: config.scale,
            offset: config.offset,
            endianness,
        })
    }
}

/// Normalizer output for one frame
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedFrame {
    pub source: String,
    pub frame_id: u8,
    pub signals: BTreeMap<String, f64>,
    /// Frame reception time, milliseconds since the Unix epoch
    pub timestamp: i64,
}

impl DecodedFrame {
    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    pub fn into_payload(self) -> Value {
        json!({
            "source": self.source,
            "frame_id": self.frame_id,
            "signals": self.signals,
            "timestamp": self.timestamp,
        })
    }
}

/// Decoder built once from an immutable list of specs
#[derive(Debug, Clone)]
pub struct LinNormalizer {
    source: String,
    specs: Vec<SignalSpec>,
}

impl LinNormalizer {
    pub fn new(source: impl Into<String>, specs: Vec<SignalSpec>) -> Self {
        Self {
            source: source.into(),
            specs,
        }
    }

    pub fn specs(&self) -> &[SignalSpec] {
        &self.specs
    }

    pub fn normalize(&self, frame: &LinFrame) -> DecodedFrame {
        let mut signals = BTreeMap::new();

        for spec in self.specs.iter().filter(|spec| spec.frame_id == frame.id) {
            match spec.decode_raw(frame) {
                Some(raw) => {
                    signals.insert(spec.name.clone(), raw * spec.scale + spec.offset);
                }
                None => trace!(
                    frame_id = frame.id,
                    signal = %spec.name,
                    dlc = frame.dlc,
                    "Signal skipped"
                ),
            }
        }

        DecodedFrame {
            source: self.source.clone(),
            frame_id: frame.id,
            signals,
            timestamp: frame.timestamp.timestamp_millis(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn frame(id: u8, bytes: &[u8]) -> LinFrame {
        LinFrame::from_payload(id, bytes)
    }

    #[test]
    fn test_scaled_u8() {
        let normalizer =
            LinNormalizer::new("LIN", vec![SignalSpec::new(0x10, "t", 0, ValueType::U8, 2.0, 1.0)]);
        let out = normalizer.normalize(&frame(0x10, &[10, 0, 0, 0, 0, 0, 0, 0]));
        assert_eq!(out.signals["t"], 21.0);
        assert_eq!(out.frame_id, 0x10);
        assert_eq!(out.source, "LIN");
    }

    #[test]
    fn test_bounds_skip() {
        let normalizer = LinNormalizer::new(
            "LIN",
            vec![
                SignalSpec::new(0x10, "tail", 6, ValueType::U16, 1.0, 0.0),
                SignalSpec::new(0x10, "head", 0, ValueType::U8, 1.0, 0.0),
            ],
        );
        let out = normalizer.normalize(&frame(0x10, &[7, 0, 0, 0]));
        assert!(!out.signals.contains_key("tail"));
        assert_eq!(out.signals["head"], 7.0);
    }

    #[test]
    fn test_other_frame_ids_ignored() {
        let normalizer =
            LinNormalizer::new("LIN", vec![SignalSpec::new(0x11, "seat", 0, ValueType::Bool, 1.0, 0.0)]);
        assert!(normalizer.normalize(&frame(0x10, &[1; 8])).is_empty());
    }

    #[test]
    fn test_bool_nonzero() {
        let normalizer =
            LinNormalizer::new("LIN", vec![SignalSpec::new(0x11, "seat", 0, ValueType::Bool, 1.0, 0.0)]);
        assert_eq!(normalizer.normalize(&frame(0x11, &[0x80])).signals["seat"], 1.0);
        assert_eq!(normalizer.normalize(&frame(0x11, &[0])).signals["seat"], 0.0);
    }

    #[test]
    fn test_sixteen_bit_endianness() {
        let normalizer = LinNormalizer::new(
            "LIN",
            vec![
                SignalSpec::new(1, "le", 0, ValueType::U16, 1.0, 0.0),
                SignalSpec::new(1, "be", 0, ValueType::U16, 1.0, 0.0)
                    .with_endianness(Endianness::Big),
                SignalSpec::new(1, "neg", 2, ValueType::I16, 0.5, 0.0),
            ],
        );
        let out = normalizer.normalize(&frame(1, &[0x34, 0x12, 0xFE, 0xFF]));
        assert_eq!(out.signals["le"], f64::from(0x1234u16));
        assert_eq!(out.signals["be"], f64::from(0x3412u16));
        assert_eq!(out.signals["neg"], -1.0);
    }

    #[test]
    fn test_unsupported_type_skipped() {
        let normalizer = LinNormalizer::new(
            "LIN",
            vec![SignalSpec::new(1, "f", 0, ValueType::parse("f32"), 1.0, 0.0)],
        );
        assert!(normalizer.normalize(&frame(1, &[1; 8])).is_empty());
    }

    #[test]
    fn test_declared_length_enforced() {
        // A u8 declared two bytes wide needs both bytes present
        let normalizer = LinNormalizer::new(
            "LIN",
            vec![SignalSpec::new(1, "wide", 3, ValueType::U8, 1.0, 0.0).with_length(2)],
        );
        assert!(normalizer.normalize(&frame(1, &[0, 0, 0, 9])).is_empty());
        assert_eq!(normalizer.normalize(&frame(1, &[0, 0, 0, 9, 0])).signals["wide"], 9.0);
    }

    #[test]
    fn test_spec_from_config() {
        let spec: SignalSpec = serde_json::from_value(json!({
            "frame_id": 16, "name": "temp_c", "byte": 0, "type": "u16",
            "scale": 0.1, "offset": -40.0, "endian": "be"
        }))
        .unwrap();
        assert_eq!(spec.length, 2);
        assert_eq!(spec.value_type, ValueType::U16);
        assert_eq!(spec.endianness, Endianness::Big);
        assert_eq!(spec.offset, -40.0);
    }

    #[test]
    fn test_spec_from_config_rejects_bad_offset() {
        let result = serde_json::from_value::<SignalSpec>(json!({
            "frame_id": 16, "name": "x", "byte": 8, "type": "u8"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_payload_shape() {
        let normalizer =
            LinNormalizer::new("LIN", vec![SignalSpec::new(16, "temp_c", 0, ValueType::U8, 1.0, 0.0)]);
        let payload = normalizer.normalize(&frame(16, &[25])).into_payload();
        assert_eq!(payload["source"], "LIN");
        assert_eq!(payload["frame_id"], 16);
        assert_eq!(payload["signals"]["temp_c"].as_f64(), Some(25.0));
        assert!(payload["timestamp"].as_i64().unwrap() > 0);
    }

    proptest! {
        #[test]
        fn prop_never_reads_past_dlc(
            bytes in proptest::collection::vec(any::<u8>(), 0..=8),
            offset in 0usize..8,
        ) {
            let normalizer = LinNormalizer::new(
                "LIN",
                vec![SignalSpec::new(1, "v", offset, ValueType::I16, 1.0, 0.0)],
            );
            let out = normalizer.normalize(&frame(1, &bytes));
            prop_assert_eq!(out.signals.contains_key("v"), offset + 2 <= bytes.len());
        }
    }
}
