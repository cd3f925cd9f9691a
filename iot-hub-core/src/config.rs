// SPDX-License-Identifier: MIT
//
// IoT Sensor Hub: Message-Bus-Centric Telemetry Gateway
// Copyright (c) 2025 IoT Sensor Hub Contributors
//
// https://github.com/iot-sensor-hub/iot-sensor-hub

//! Gateway configuration document
//!
//! ```json
//! {
//!   "log_file": "logs/app.log",
//!   "certificates": { "directory": "certs", "certificates": [ ... ] },
//!   "plugins":  [ { "type": "LoggingPlugin" } ],
//!   "adapters": [ { "type": "MQTTAdapter", "broker": "mqtts://broker:8883", "topic": "cmd/#" } ],
//!   "sensors":  [ { "type": "LinSensor", "config": { "schedule": [ ... ] } } ]
//! }
//! ```
//!
//! Only problems that make the whole process pointless are rejected here. Settings
//! specific to one plugin are checked when that plugin is activated, so a bad entry
//! disables itself and nothing else.

use crate::certs::CertificateConfig;
use crate::logging::{DEFAULT_LOG_FILE, DEFAULT_MAX_BYTES};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

/// Prefix of environment variables overriding the document
pub const ENV_PREFIX: &str = "IOT_HUB_";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayConfig {
    /// Rotating log file; `null` disables file logging
    #[serde(default = "default_log_file")]
    pub log_file: Option<PathBuf>,

    #[serde(default = "default_log_max_bytes")]
    pub log_max_bytes: u64,

    #[serde(default)]
    pub certificates: Option<CertificateConfig>,

    #[serde(default)]
    pub plugins: Vec<PluginEntry>,

    #[serde(default)]
    pub adapters: Vec<PluginEntry>,

    #[serde(default)]
    pub sensors: Vec<PluginEntry>,
}

/// One item of the `plugins`, `adapters` or `sensors` lists
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PluginEntry {
    /// Built-in identifier or plugin type name
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(rename = "_disabled", default)]
    pub disabled: bool,

    #[serde(default)]
    pub name: Option<String>,

    /// Path of a dynamic plugin module; overrides `type` for resolution
    #[serde(default)]
    pub module: Option<PathBuf>,

    #[serde(default)]
    pub config: Value,

    /// Remaining top-level keys such as `broker` or `endpoint`
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PluginEntry {
    /// What the registry resolves: the module path if given, else the type
    pub fn identifier(&self) -> String {
        match &self.module {
            Some(module) => module.display().to_string(),
            None => self.kind.clone(),
        }
    }

    /// Human-readable label for log lines
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.kind)
    }

    /// Effective plugin settings
    ///
    /// Starts from the nested `config` object, then adds top-level extra keys and
    /// `name` where `config` does not already define them.
    pub fn settings(&self) -> Value {
        let mut merged = match &self.config {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        for (key, value) in &self.extra {
            merged.entry(key.clone()).or_insert_with(|| value.clone());
        }
        if let Some(name) = &self.name {
            merged
                .entry("name".to_string())
                .or_insert_with(|| Value::String(name.clone()));
        }
        Value::Object(merged)
    }
}

/// Environment overrides, e.g. `IOT_HUB_LOG_FILE=/var/log/hub.log`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EnvOverrides {
    pub log_file: Option<PathBuf>,
    pub log_max_bytes: Option<u64>,
    pub log_level: Option<String>,
}

impl EnvOverrides {
    pub fn from_env() -> Result<Self> {
        envy::prefixed(ENV_PREFIX)
            .from_env()
            .map_err(|e| Error::Config(format!("Failed to parse environment variables: {}", e)))
    }

    pub fn from_vars<I>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        envy::prefixed(ENV_PREFIX)
            .from_iter(vars)
            .map_err(|e| Error::Config(format!("Failed to parse environment variables: {}", e)))
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            log_file: default_log_file(),
            log_max_bytes: default_log_max_bytes(),
            certificates: None,
            plugins: Vec::new(),
            adapters: Vec::new(),
            sensors: Vec::new(),
        }
    }
}

impl GatewayConfig {
    /// Parse and validate a document from disk
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Cannot read configuration {}: {}", path.display(), e))
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)
            .map_err(|e| Error::Config(format!("Invalid configuration document: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_overrides(&mut self, overrides: &EnvOverrides) {
        if let Some(log_file) = &overrides.log_file {
            self.log_file = Some(log_file.clone());
        }
        if let Some(max_bytes) = overrides.log_max_bytes {
            self.log_max_bytes = max_bytes;
        }
    }

    /// Every entry in `plugins`, `adapters`, `sensors` order
    pub fn entries(&self) -> impl Iterator<Item = &PluginEntry> {
        self.plugins
            .iter()
            .chain(self.adapters.iter())
            .chain(self.sensors.iter())
    }

    pub fn enabled_entries(&self) -> impl Iterator<Item = &PluginEntry> {
        self.entries().filter(|entry| !entry.disabled)
    }

    pub fn validate(&self) -> Result<()> {
        if self.enabled_entries().next().is_none() {
            return Err(Error::Config(
                "Configuration has no enabled plugin, adapter or sensor entries".to_string(),
            ));
        }

        if let Some(entry) = self.entries().find(|entry| entry.kind.trim().is_empty()) {
            return Err(Error::Config(format!(
                "Entry '{}' has an empty type",
                entry.name.as_deref().unwrap_or("<unnamed>")
            )));
        }

        if let Some(certificates) = &self.certificates {
            certificates.validate()?;
        }

        Ok(())
    }
}

fn default_log_file() -> Option<PathBuf> {
    Some(PathBuf::from(DEFAULT_LOG_FILE))
}

fn default_log_max_bytes() -> u64 {
    DEFAULT_MAX_BYTES
}
