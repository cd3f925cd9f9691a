// SPDX-License-Identifier: MIT
//
// IoT Sensor Hub: Message-Bus-Centric Telemetry Gateway
// Copyright (c) 2025 IoT Sensor Hub Contributors
//
// https://github.com/iot-sensor-hub/iot-sensor-hub

//! Periodic binary bus support (LIN-style)
//!
//! - `frame`: the raw frame record
//! - `scheduler`: which frame ids are due at a given instant
//! - `normalizer`: byte-level signal decoding into a structured map
//! - `source`: where frame payloads come from (driver or simulator)
//! - `gateway`: the sensor loop tying the above to the message bus

pub mod frame;
pub mod gateway;
pub mod normalizer;
pub mod scheduler;
pub mod source;

pub use frame::LinFrame;
pub use gateway::{LinGatewaySensor, LinSensorSettings};
pub use normalizer::{DecodedFrame, Endianness, LinNormalizer, SignalSpec, ValueType};
pub use scheduler::{LinScheduler, ScheduleConfig, ScheduleEntry};
pub use source::{FrameSource, SimulatedLinBus};
