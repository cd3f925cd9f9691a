// SPDX-License-Identifier: MIT
//
// IoT Sensor Hub: Message-Bus-Centric Telemetry Gateway
// Copyright (c) 2025 IoT Sensor Hub Contributors
//
// https://github.com/iot-sensor-hub/iot-sensor-hub

//! Error types for the gateway core
//!
//! Provides a unified error taxonomy using `thiserror`. Frames that cannot be decoded
//! are not errors: the normalizer skips them without producing a value here.

pub type Result<T> = std::result::Result<T, Error>;

/// Broad failure classes used to decide how a caller reacts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or invalid configuration; fatal to the affected component only
    Configuration,
    /// File, module or cryptographic resource unavailable
    Resource,
    /// External transport unreachable or rejecting traffic
    Transport,
    /// Anything else
    Internal,
}

/// Core error type for gateway operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration validation failed
    #[error("Configuration error: {0}")]
    Config(String),

    /// A required configuration item is absent
    #[error("Configuration incomplete: {0}")]
    ConfigurationIncomplete(String),

    /// Plugin module could not be resolved
    #[error("Plugin module not found: {0}")]
    ModuleNotFound(String),

    /// Plugin module lacks one of the ABI symbols
    #[error("Symbol '{symbol}' not found in module {module}")]
    SymbolNotFound { module: String, symbol: String },

    /// Plugin factory returned no instance
    #[error("Plugin instantiation failed: {0}")]
    InstantiationFailed(String),

    /// Plugin lookup by name failed
    #[error("Plugin not loaded: {0}")]
    PluginNotFound(String),

    /// Capability not offered by this plugin
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// External transport failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// HTTP communication failed
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Operation timed out
    #[error("Operation timed out")]
    Timeout,

    /// Key or certificate generation failed
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// TLS context construction failed
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Classify the error into one of the broad failure classes
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Config(_) | Error::ConfigurationIncomplete(_) | Error::Serialization(_) => {
                ErrorKind::Configuration
            }
            Error::ModuleNotFound(_)
            | Error::SymbolNotFound { .. }
            | Error::InstantiationFailed(_)
            | Error::PluginNotFound(_)
            | Error::Crypto(_)
            | Error::Tls(_)
            | Error::Io(_) => ErrorKind::Resource,
            Error::Transport(_) | Error::Network(_) | Error::Timeout => ErrorKind::Transport,
            Error::Unsupported(_) | Error::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Check if error is transient and retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Network(e) => match e.status() {
                Some(status) => status.is_server_error() || status.as_u16() == 429,
                None => !e.is_builder() && !e.is_decode(),
            },
            Error::Timeout => true,
            _ => false,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<rcgen::Error> for Error {
    fn from(e: rcgen::Error) -> Self {
        Error::Crypto(e.to_string())
    }
}

impl From<libloading::Error> for Error {
    fn from(e: libloading::Error) -> Self {
        Error::ModuleNotFound(e.to_string())
    }
}

impl From<rumqttc::ClientError> for Error {
    fn from(e: rumqttc::ClientError) -> Self {
        Error::Transport(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(Error::Config("x".into()).kind(), ErrorKind::Configuration);
        assert_eq!(
            Error::ConfigurationIncomplete("ca".into()).kind(),
            ErrorKind::Configuration
        );
        assert_eq!(Error::ModuleNotFound("m".into()).kind(), ErrorKind::Resource);
        assert_eq!(Error::Transport("down".into()).kind(), ErrorKind::Transport);
        assert_eq!(Error::Timeout.kind(), ErrorKind::Transport);
    }

    #[test]
    fn test_retryable() {
        assert!(Error::Timeout.is_retryable());
        assert!(!Error::Config("bad".into()).is_retryable());
        assert!(!Error::Transport("refused".into()).is_retryable());
    }
}
