// SPDX-License-Identifier: MIT
//
// IoT Sensor Hub: Message-Bus-Centric Telemetry Gateway
// Copyright (c) 2025 IoT Sensor Hub Contributors
//
// https://github.com/iot-sensor-hub/iot-sensor-hub

//! Running producers

use crate::Result;

/// A producer that owns a background loop publishing onto the bus
///
/// Instances are created by a Sensor-capable plugin's factory. `stop` raises the
/// loop's stop flag and joins its thread; it is safe to call more than once.
pub trait Sensor: Send {
    fn name(&self) -> &str;

    /// Spawn the producer loop. Fails if the sensor was already started.
    fn start(&mut self) -> Result<()>;

    fn stop(&mut self);

    fn is_running(&self) -> bool;
}
