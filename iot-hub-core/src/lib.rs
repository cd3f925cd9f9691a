// SPDX-License-Identifier: MIT
//
// IoT Sensor Hub: Message-Bus-Centric Telemetry Gateway
// Copyright (c) 2025 IoT Sensor Hub Contributors
//
// https://github.com/iot-sensor-hub/iot-sensor-hub

//! IoT Sensor Hub Core Library
//!
//! This crate provides the building blocks of the gateway: an in-process message bus,
//! producers that turn periodic binary bus frames into telemetry, adapters that bridge
//! the bus to external transports, and the plugin registry that wires them at runtime.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   frames   ┌──────────────┐  publish  ┌──────────────┐  forward  ┌────────────┐
//! │  LIN source  │ ─────────> │ LIN gateway  │ ────────> │  MessageBus  │ ────────> │  Adapters  │
//! │ (FrameSource)│            │  (scheduler, │           │  (snapshot   │ <──────── │ (MQTT/HTTP)│
//! └──────────────┘            │  normalizer) │           │   dispatch)  │  inbound  └────────────┘
//!                             └──────────────┘           └──────────────┘
//! ```
//!
//! The library is organized into modules representing core concerns:
//! - `message` / `bus`: the immutable event record and the publish/subscribe hub
//! - `lin`: schedule table, signal decoder, frame sources and the gateway sensor loop
//! - `certs` / `tls`: certificate authority provisioning and the TLS client context
//! - `adapters`: MQTT and HTTP bridges
//! - `plugins`: capability model, built-in plugins and the registry
//! - `config`: configuration document model with validation
//! - `runtime`: wiring of registry, bus and configuration
//! - `error`: unified error types

pub mod adapters;
pub mod bus;
pub mod certs;
pub mod config;
pub mod error;
pub mod lin;
pub mod logging;
pub mod message;
pub mod metrics;
pub mod plugins;
pub mod retry;
pub mod runtime;
pub mod sensor;
pub mod tls;

pub use bus::MessageBus;
pub use error::{Error, ErrorKind, Result};
pub use message::Message;
pub use plugins::{Plugin, PluginType};
pub use sensor::Sensor;

/// Library version reported at startup
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Maximum payload length of a single bus frame
pub const MAX_FRAME_LEN: usize = 8;
