// SPDX-License-Identifier: MIT
//
// IoT Sensor Hub: Message-Bus-Centric Telemetry Gateway
// Copyright (c) 2025 IoT Sensor Hub Contributors
//
// https://github.com/iot-sensor-hub/iot-sensor-hub

//! Certificate authority provisioning
//!
//! [`generate_certificates`] creates a CA key/certificate pair and issues Server and
//! Client certificates signed by it, writing PEM files to the configured paths.
//!
//! # Idempotence
//!
//! A record is considered provisioned when both of its files exist. Contents, validity
//! and expiry are not inspected, so re-running never regenerates present files.
//!
//! # Failure
//!
//! Generation stops at the first failing step and returns the error. Files written
//! before the failure are left in place.

use crate::{Error, Result};
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DistinguishedName, DnType,
    ExtendedKeyUsagePurpose, IsCa, KeyPair, KeyUsagePurpose, SerialNumber,
};
use serde::{Deserialize, Serialize};
use std::fs::{self, DirBuilder, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// What a certificate is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum CertRole {
    #[serde(rename = "CA", alias = "ca")]
    Ca,
    #[serde(alias = "server")]
    Server,
    #[serde(alias = "client")]
    Client,
}

/// One `certificates` entry
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateRecord {
    #[serde(rename = "type")]
    pub role: CertRole,

    pub key_file: PathBuf,

    pub cert_file: PathBuf,

    pub common_name: String,

    /// Requested key strength; above 2048 selects P-384, otherwise P-256
    #[serde(default = "default_bits")]
    pub bits: u32,

    /// Validity window in days starting now
    #[serde(default = "default_days")]
    pub days: u32,

    /// Subject alternative names (DNS names or IP addresses)
    #[serde(default)]
    pub san: Vec<String>,

    /// Explicit serial number; random when absent
    #[serde(default)]
    pub serial: Option<u64>,
}

fn default_bits() -> u32 {
    2048
}

fn default_days() -> u32 {
    365
}

/// `certificates` section of the configuration document
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CertificateConfig {
    /// Base directory for relative file paths; created if absent
    #[serde(default)]
    pub directory: Option<PathBuf>,

    #[serde(default)]
    pub certificates: Vec<CertificateRecord>,
}

impl CertificateConfig {
    /// The single CA record
    pub fn ca(&self) -> Result<&CertificateRecord> {
        let mut cas = self.records(CertRole::Ca);
        let ca = cas.next().ok_or_else(|| {
            Error::ConfigurationIncomplete("no CA record in certificate configuration".to_string())
        })?;
        if cas.next().is_some() {
            return Err(Error::Config(
                "certificate configuration must contain exactly one CA record".to_string(),
            ));
        }
        Ok(ca)
    }

    pub fn records(&self, role: CertRole) -> impl Iterator<Item = &CertificateRecord> {
        self.certificates.iter().filter(move |r| r.role == role)
    }

    /// Path of a record file after applying `directory`
    pub fn resolve(&self, path: &Path) -> PathBuf {
        match &self.directory {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_path_buf(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.ca()?;
        for record in &self.certificates {
            if record.key_file.as_os_str().is_empty() || record.cert_file.as_os_str().is_empty() {
                return Err(Error::ConfigurationIncomplete(format!(
                    "certificate '{}' needs both keyFile and certFile",
                    record.common_name
                )));
            }
            if record.days == 0 {
                return Err(Error::Config(format!(
                    "certificate '{}' has a zero-day validity",
                    record.common_name
                )));
            }
        }
        Ok(())
    }
}

/// Which certificates a run wrote and which it found already present
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationReport {
    pub generated: Vec<PathBuf>,
    pub reused: Vec<PathBuf>,
}

/// CA key and a certificate handle able to sign leaves
struct Issuer {
    cert: Certificate,
    key: KeyPair,
}

/// Ensure every configured key/certificate pair exists on disk
pub fn generate_certificates(config: &CertificateConfig) -> Result<GenerationReport> {
    config.validate()?;
    if let Some(dir) = &config.directory {
        ensure_dir(dir)?;
    }

    let ca = config.ca()?;
    let ca_key_path = config.resolve(&ca.key_file);
    let ca_cert_path = config.resolve(&ca.cert_file);
    let mut report = GenerationReport::default();

    let pending: Vec<&CertificateRecord> = config
        .certificates
        .iter()
        .filter(|r| r.role != CertRole::Ca)
        .filter(|r| {
            let present = is_provisioned(&config.resolve(&r.key_file), &config.resolve(&r.cert_file));
            if present {
                debug!(common_name = %r.common_name, "Certificate already present");
                report.reused.push(config.resolve(&r.cert_file));
            }
            !present
        })
        .collect();

    let ca_present = is_provisioned(&ca_key_path, &ca_cert_path);
    if ca_present {
        report.reused.insert(0, ca_cert_path.clone());
        if pending.is_empty() {
            return Ok(report);
        }
    }

    let issuer = if ca_present {
        load_issuer(&ca_key_path, &ca_cert_path)?
    } else {
        let issuer = create_ca(ca)?;
        write_pair(&ca_key_path, &ca_cert_path, &issuer.key, &issuer.cert)?;
        info!(path = %ca_cert_path.display(), common_name = %ca.common_name, "Generated CA certificate");
        report.generated.push(ca_cert_path);
        issuer
    };

    for record in pending {
        let key_path = config.resolve(&record.key_file);
        let cert_path = config.resolve(&record.cert_file);

        let key = generate_key(record.bits)?;
        let cert = leaf_params(record)?.signed_by(&key, &issuer.cert, &issuer.key)?;
        write_pair(&key_path, &cert_path, &key, &cert)?;

        info!(
            path = %cert_path.display(),
            common_name = %record.common_name,
            role = ?record.role,
            "Issued certificate"
        );
        report.generated.push(cert_path);
    }

    Ok(report)
}

fn is_provisioned(key_path: &Path, cert_path: &Path) -> bool {
    key_path.exists() && cert_path.exists()
}

fn generate_key(bits: u32) -> Result<KeyPair> {
    let algorithm = if bits > 2048 {
        &rcgen::PKCS_ECDSA_P384_SHA384
    } else {
        &rcgen::PKCS_ECDSA_P256_SHA256
    };
    Ok(KeyPair::generate_for(algorithm)?)
}

fn create_ca(record: &CertificateRecord) -> Result<Issuer> {
    let mut params = CertificateParams::new(record.san.clone())?;
    params.distinguished_name = distinguished_name(&record.common_name);
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![
        KeyUsagePurpose::KeyCertSign,
        KeyUsagePurpose::CrlSign,
        KeyUsagePurpose::DigitalSignature,
    ];
    apply_validity(&mut params, record);

    let key = generate_key(record.bits)?;
    let cert = params.self_signed(&key)?;
    Ok(Issuer { cert, key })
}

/// Rebuild a signing handle from CA files written by an earlier run
///
/// The certificate is re-signed in memory with the same key and subject, which is all
/// a leaf's issuer fields and signature depend on. Nothing is written back.
fn load_issuer(key_path: &Path, cert_path: &Path) -> Result<Issuer> {
    let key = KeyPair::from_pem(&fs::read_to_string(key_path)?)?;
    let params = CertificateParams::from_ca_cert_pem(&fs::read_to_string(cert_path)?)?;
    let cert = params.self_signed(&key)?;
    Ok(Issuer { cert, key })
}

fn leaf_params(record: &CertificateRecord) -> Result<CertificateParams> {
    // Peers verify server names against SANs only
    let sans = if record.san.is_empty() && record.role == CertRole::Server {
        vec![record.common_name.clone()]
    } else {
        record.san.clone()
    };

    let mut params = CertificateParams::new(sans)?;
    params.distinguished_name = distinguished_name(&record.common_name);
    params.is_ca = IsCa::NoCa;
    params.use_authority_key_identifier_extension = true;
    params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
    params.extended_key_usages = match record.role {
        CertRole::Server => vec![ExtendedKeyUsagePurpose::ServerAuth],
        CertRole::Client => vec![ExtendedKeyUsagePurpose::ClientAuth],
        CertRole::Ca => Vec::new(),
    };
    apply_validity(&mut params, record);
    Ok(params)
}

fn distinguished_name(common_name: &str) -> DistinguishedName {
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, common_name);
    dn
}

fn apply_validity(params: &mut CertificateParams, record: &CertificateRecord) {
    let now = time::OffsetDateTime::now_utc();
    params.not_before = now;
    params.not_after = now + time::Duration::days(i64::from(record.days));

    let serial = record.serial.unwrap_or_else(|| rand::random::<u64>() >> 1);
    params.serial_number = Some(SerialNumber::from_slice(&serial.to_be_bytes()));
}

fn write_pair(key_path: &Path, cert_path: &Path, key: &KeyPair, cert: &Certificate) -> Result<()> {
    write_pem(key_path, &key.serialize_pem(), true)?;
    write_pem(cert_path, &cert.pem(), false)
}

fn write_pem(path: &Path, pem: &str, private: bool) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    if private {
        owner_only_file(&mut options);
    }
    let mut file = options.open(path)?;
    file.write_all(pem.as_bytes())?;
    Ok(())
}

fn ensure_dir(dir: &Path) -> Result<()> {
    if dir.as_os_str().is_empty() || dir.is_dir() {
        return Ok(());
    }
    let mut builder = DirBuilder::new();
    builder.recursive(true);
    owner_only_dir(&mut builder);
    builder.create(dir)?;
    debug!(path = %dir.display(), "Created certificate directory");
    Ok(())
}

#[cfg(unix)]
fn owner_only_file(options: &mut OpenOptions) {
    use std::os::unix::fs::OpenOptionsExt;
    options.mode(0o600);
}

#[cfg(not(unix))]
fn owner_only_file(_options: &mut OpenOptions) {}

#[cfg(unix)]
fn owner_only_dir(builder: &mut DirBuilder) {
    use std::os::unix::fs::DirBuilderExt;
    builder.mode(0o700);
}

#[cfg(not(unix))]
fn owner_only_dir(_builder: &mut DirBuilder) {}
