// SPDX-License-Identifier: MIT
//
// IoT Sensor Hub: Message-Bus-Centric Telemetry Gateway
// Copyright (c) 2025 IoT Sensor Hub Contributors
//
// https://github.com/iot-sensor-hub/iot-sensor-hub

//! Size-capped log file for `tracing_subscriber::fmt`
//!
//! When the active file has reached its limit, the next record first moves it to
//! `<path>.1` (replacing any previous backup) and starts a fresh file. Rotation happens
//! between records, so a record is never split and the active file may exceed the
//! limit by at most one record.

use crate::Result;
use parking_lot::{Mutex, MutexGuard};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;

pub const DEFAULT_LOG_FILE: &str = "logs/app.log";
pub const DEFAULT_MAX_BYTES: u64 = 5 * 1024 * 1024;

#[derive(Clone)]
pub struct RotatingFile {
    inner: Arc<Mutex<RotatingInner>>,
}

struct RotatingInner {
    path: PathBuf,
    max_bytes: u64,
    file: File,
    written: u64,
}

impl RotatingFile {
    /// Open (or create) `path` for appending, creating parent directories
    pub fn open(path: impl Into<PathBuf>, max_bytes: u64) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = open_append(&path)?;
        let written = file.metadata()?.len();

        Ok(Self {
            inner: Arc::new(Mutex::new(RotatingInner {
                path,
                max_bytes,
                file,
                written,
            })),
        })
    }

    pub fn path(&self) -> PathBuf {
        self.inner.lock().path.clone()
    }

    pub fn backup_path(&self) -> PathBuf {
        backup_path(&self.inner.lock().path)
    }
}

impl RotatingInner {
    fn needs_rotation(&self) -> bool {
        self.max_bytes > 0 && self.written >= self.max_bytes
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;
        fs::rename(&self.path, backup_path(&self.path))?;
        self.file = open_append(&self.path)?;
        self.written = 0;
        Ok(())
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".1");
    PathBuf::from(name)
}

/// Exclusive handle for writing one record
pub struct RotatingWriter<'a>(MutexGuard<'a, RotatingInner>);

impl Write for RotatingWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.0.file.write(buf)?;
        self.0.written += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.file.flush()
    }
}

impl<'a> MakeWriter<'a> for RotatingFile {
    type Writer = RotatingWriter<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        let mut inner = self.inner.lock();
        if inner.needs_rotation() {
            if let Err(e) = inner.rotate() {
                // Keep appending to the current file; the subscriber cannot log its own failure
                eprintln!("log rotation of {} failed: {}", inner.path.display(), e);
            }
        }
        RotatingWriter(inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_record(file: &RotatingFile, record: &str) {
        let mut writer = file.make_writer();
        writer.write_all(record.as_bytes()).unwrap();
        writer.flush().unwrap();
    }

    #[test]
    fn test_creates_parent_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let file = RotatingFile::open(tmp.path().join("logs/app.log"), 1024).unwrap();
        write_record(&file, "hello\n");
        assert_eq!(fs::read_to_string(file.path()).unwrap(), "hello\n");
    }

    #[test]
    fn test_rotates_after_limit() {
        let tmp = tempfile::tempdir().unwrap();
        let file = RotatingFile::open(tmp.path().join("app.log"), 10).unwrap();

        write_record(&file, "first-record\n");
        write_record(&file, "second\n");

        assert_eq!(fs::read_to_string(file.backup_path()).unwrap(), "first-record\n");
        assert_eq!(fs::read_to_string(file.path()).unwrap(), "second\n");
    }

    #[test]
    fn test_single_backup_kept() {
        let tmp = tempfile::tempdir().unwrap();
        let file = RotatingFile::open(tmp.path().join("app.log"), 4).unwrap();

        for record in ["aaaa\n", "bbbb\n", "cccc\n"] {
            write_record(&file, record);
        }

        assert_eq!(fs::read_to_string(file.backup_path()).unwrap(), "bbbb\n");
        assert_eq!(fs::read_to_string(file.path()).unwrap(), "cccc\n");
        assert!(!tmp.path().join("app.log.2").exists());
    }

    #[test]
    fn test_existing_size_counts_toward_limit() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("app.log");
        fs::write(&path, "previous run\n").unwrap();

        let file = RotatingFile::open(&path, 8).unwrap();
        write_record(&file, "new\n");

        assert_eq!(fs::read_to_string(file.backup_path()).unwrap(), "previous run\n");
        assert_eq!(fs::read_to_string(&path).unwrap(), "new\n");
    }

    #[test]
    fn test_zero_limit_never_rotates() {
        let tmp = tempfile::tempdir().unwrap();
        let file = RotatingFile::open(tmp.path().join("app.log"), 0).unwrap();
        write_record(&file, "a\n");
        write_record(&file, "b\n");
        assert!(!file.backup_path().exists());
    }
}
