// SPDX-License-Identifier: MIT
//
// IoT Sensor Hub: Message-Bus-Centric Telemetry Gateway
// Copyright (c) 2025 IoT Sensor Hub Contributors
//
// https://github.com/iot-sensor-hub/iot-sensor-hub

//! Mutual-TLS client context
//!
//! Built from the CA certificate plus the Client key/certificate pair produced by
//! [`crate::certs::generate_certificates`]. Only TLS 1.3 is offered and the peer
//! chain is verified against the CA alone.

use crate::certs::{CertRole, CertificateConfig};
use crate::{Error, Result};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::{ClientConfig, RootCertStore};
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Shareable client TLS configuration handed to transport adapters
#[derive(Clone)]
pub struct TlsContext {
    config: Arc<ClientConfig>,
}

impl TlsContext {
    pub fn from_pem_files(ca_cert: &Path, client_cert: &Path, client_key: &Path) -> Result<Self> {
        let mut roots = RootCertStore::empty();
        for cert in load_certs(ca_cert)? {
            roots.add(cert)?;
        }

        let chain = load_certs(client_cert)?;
        let key = load_key(client_key)?;

        let config = ClientConfig::builder_with_protocol_versions(&[&rustls::version::TLS13])
            .with_root_certificates(roots)
            .with_client_auth_cert(chain, key)?;

        Ok(Self {
            config: Arc::new(config),
        })
    }

    pub fn client_config(&self) -> Arc<ClientConfig> {
        Arc::clone(&self.config)
    }
}

impl fmt::Debug for TlsContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsContext")
            .field("alpn_protocols", &self.config.alpn_protocols)
            .finish_non_exhaustive()
    }
}

/// Build the client context from the CA record and the first Client record
pub fn create_tls_context(config: &CertificateConfig) -> Result<TlsContext> {
    let ca = config
        .records(CertRole::Ca)
        .next()
        .ok_or_else(|| Error::ConfigurationIncomplete("CA certificate path".to_string()))?;
    let client = config
        .records(CertRole::Client)
        .next()
        .ok_or_else(|| Error::ConfigurationIncomplete("client certificate path".to_string()))?;

    for (what, path) in [
        ("CA certificate path", &ca.cert_file),
        ("client certificate path", &client.cert_file),
        ("client key path", &client.key_file),
    ] {
        if path.as_os_str().is_empty() {
            return Err(Error::ConfigurationIncomplete(what.to_string()));
        }
    }

    let context = TlsContext::from_pem_files(
        &config.resolve(&ca.cert_file),
        &config.resolve(&client.cert_file),
        &config.resolve(&client.key_file),
    )?;
    info!(client = %client.common_name, "TLS client context ready");
    Ok(context)
}

fn open(path: &Path) -> Result<BufReader<File>> {
    File::open(path).map(BufReader::new).map_err(|e| {
        Error::Io(std::io::Error::new(
            e.kind(),
            format!("{}: {}", path.display(), e),
        ))
    })
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let certs = rustls_pemfile::certs(&mut open(path)?)
        .collect::<std::result::Result<Vec<_>, _>>()?;
    if certs.is_empty() {
        return Err(Error::Config(format!(
            "no certificates found in {}",
            path.display()
        )));
    }
    Ok(certs)
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    rustls_pemfile::private_key(&mut open(path)?)?
        .ok_or_else(|| Error::Config(format!("no private key found in {}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certs::{generate_certificates, CertificateRecord};
    use std::path::PathBuf;

    fn record(role: CertRole, stem: &str) -> CertificateRecord {
        CertificateRecord {
            role,
            key_file: PathBuf::from(format!("{stem}.key")),
            cert_file: PathBuf::from(format!("{stem}.crt")),
            common_name: stem.to_string(),
            bits: 2048,
            days: 1,
            san: Vec::new(),
            serial: None,
        }
    }

    #[test]
    fn test_context_from_generated_material() {
        let tmp = tempfile::tempdir().unwrap();
        let config = CertificateConfig {
            directory: Some(tmp.path().to_path_buf()),
            certificates: vec![record(CertRole::Ca, "ca"), record(CertRole::Client, "client")],
        };
        generate_certificates(&config).unwrap();

        let context = create_tls_context(&config).unwrap();
        assert!(context.client_config().alpn_protocols.is_empty());
        assert!(format!("{context:?}").starts_with("TlsContext"));
    }

    #[test]
    fn test_missing_client_record_is_incomplete() {
        let config = CertificateConfig {
            directory: None,
            certificates: vec![record(CertRole::Ca, "ca")],
        };
        assert!(matches!(
            create_tls_context(&config),
            Err(Error::ConfigurationIncomplete(_))
        ));
    }

    #[test]
    fn test_missing_files_are_io_errors() {
        let tmp = tempfile::tempdir().unwrap();
        let config = CertificateConfig {
            directory: Some(tmp.path().to_path_buf()),
            certificates: vec![record(CertRole::Ca, "ca"), record(CertRole::Client, "client")],
        };
        assert!(matches!(create_tls_context(&config), Err(Error::Io(_))));
    }
}
