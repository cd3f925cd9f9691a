// SPDX-License-Identifier: MIT
//
// IoT Sensor Hub: Message-Bus-Centric Telemetry Gateway
// Copyright (c) 2025 IoT Sensor Hub Contributors
//
// https://github.com/iot-sensor-hub/iot-sensor-hub

//! IoT Sensor Hub Gateway
//!
//! Loads the configuration document, provisions certificates, activates every
//! configured plugin, adapter and sensor, then runs until SIGINT or SIGTERM.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  publish  ┌──────────────┐  forward  ┌──────────────┐
//! │   Sensors    │ ────────> │  MessageBus  │ ────────> │   Adapters   │ ───> MQTT / HTTP
//! │ (LIN, ...)   │           │              │ ────────> │   Loggers    │ ───> log / file
//! └──────────────┘           └──────────────┘ <──────── └──────────────┘
//!                                               inbound
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use iot_hub_core::config::{EnvOverrides, GatewayConfig};
use iot_hub_core::logging::RotatingFile;
use iot_hub_core::runtime::GatewayRuntime;
use iot_hub_core::MessageBus;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "iot-hub-gateway")]
#[command(about = "IoT Sensor Hub - message-bus-centric telemetry gateway", long_about = None)]
struct Args {
    /// Path of the JSON configuration document
    #[arg(short, long, default_value = "config/config.json")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short, long)]
    log_level: Option<String>,

    /// Emit JSON log lines on stdout
    #[arg(long)]
    json_logs: bool,
}

fn init_tracing(level: &str, json: bool, file: Option<RotatingFile>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let file_layer = file.map(|file| {
        fmt::layer()
            .with_ansi(false)
            .with_thread_names(true)
            .with_writer(file)
    });
    let registry = tracing_subscriber::registry().with(filter).with(file_layer);

    if json {
        registry
            .with(fmt::layer().json().with_thread_ids(true))
            .init();
    } else {
        registry.with(fmt::layer().with_target(false)).init();
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let overrides = EnvOverrides::from_env().context("Invalid IOT_HUB_* environment")?;
    let mut config = GatewayConfig::from_file(&args.config)
        .with_context(|| format!("Failed to load configuration {}", args.config.display()))?;
    config.apply_overrides(&overrides);

    let log_file = config
        .log_file
        .as_ref()
        .map(|path| RotatingFile::open(path, config.log_max_bytes))
        .transpose()
        .context("Failed to open log file")?;
    let level = args
        .log_level
        .or(overrides.log_level)
        .unwrap_or_else(|| "info".to_string());
    init_tracing(&level, args.json_logs, log_file);

    info!("IoT Sensor Hub Gateway v{}", iot_hub_core::VERSION);
    info!(config = %args.config.display(), "Configuration loaded");

    let shutdown = Arc::new(AtomicBool::new(false));
    for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
        signal_hook::flag::register(signal, Arc::clone(&shutdown))
            .context("Failed to register signal handler")?;
    }

    let mut runtime =
        GatewayRuntime::start(&config, MessageBus::new()).context("Gateway startup failed")?;

    let report = runtime.report();
    for (entry, reason) in &report.failed {
        warn!(entry = %entry, "Entry disabled: {}", reason);
    }
    for adapter in &report.disconnected {
        warn!(adapter = %adapter, "Adapter running without a connection");
    }
    info!(
        plugins = ?report.activated,
        sensors = ?report.sensors,
        "Gateway running, press Ctrl+C to stop"
    );

    while !shutdown.load(Ordering::Relaxed) {
        thread::sleep(Duration::from_secs(1));
    }

    info!("Shutdown signal received");
    runtime.stop();
    info!("Gateway shut down gracefully");
    Ok(())
}
