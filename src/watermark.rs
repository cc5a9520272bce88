// src/watermark.rs
//! Persisted "last successfully synced" instant.
//!
//! On disk this is an append-only log of local-time stamps, one per line; the
//! last non-blank line wins. Reading never fails: a missing, empty or corrupt
//! log degrades to the configured default, which means first-run semantics.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Lexical layout of one watermark record.
pub const STAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("creating watermark directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("appending watermark to {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid watermark stamp {0:?}")]
    InvalidStamp(String),
}

/// Format an instant as a local-time record.
pub fn format_stamp(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format(STAMP_FORMAT).to_string()
}

/// Parse a local-time record. A stamp that falls into a DST gap is rejected;
/// an ambiguous one resolves to the earlier instant.
pub fn parse_stamp(raw: &str) -> Result<DateTime<Utc>, PersistenceError> {
    let raw = raw.trim();
    let naive = NaiveDateTime::parse_from_str(raw, STAMP_FORMAT)
        .map_err(|_| PersistenceError::InvalidStamp(raw.to_string()))?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
        .ok_or_else(|| PersistenceError::InvalidStamp(raw.to_string()))
}

#[async_trait]
pub trait WatermarkStore: Send + Sync {
    /// Last committed watermark, or the default when there is none to read.
    async fn read_last(&self) -> DateTime<Utc>;

    /// Record `at` as the watermark future reads return.
    async fn commit(&self, at: DateTime<Utc>) -> Result<(), PersistenceError>;
}

pub struct FileWatermarkStore {
    path: PathBuf,
    default: DateTime<Utc>,
}

impl FileWatermarkStore {
    pub fn new(path: impl Into<PathBuf>, default: DateTime<Utc>) -> Self {
        Self {
            path: path.into(),
            default,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl WatermarkStore for FileWatermarkStore {
    async fn read_last(&self) -> DateTime<Utc> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(
                    path = %self.path.display(),
                    "no watermark log yet, using default {}",
                    format_stamp(self.default)
                );
                return self.default;
            }
            Err(e) => {
                tracing::error!(path = %self.path.display(), "reading watermark log: {e}");
                return self.default;
            }
        };

        let Some(last) = content.lines().rev().find(|l| !l.trim().is_empty()) else {
            tracing::info!(
                path = %self.path.display(),
                "watermark log is empty, using default {}",
                format_stamp(self.default)
            );
            return self.default;
        };

        match parse_stamp(last) {
            Ok(at) => at,
            Err(e) => {
                tracing::error!(path = %self.path.display(), "corrupt watermark record: {e}");
                self.default
            }
        }
    }

    async fn commit(&self, at: DateTime<Utc>) -> Result<(), PersistenceError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .await
                .map_err(|source| PersistenceError::CreateDir {
                    path: dir.to_path_buf(),
                    source,
                })?;
        }

        let write_err = |source| PersistenceError::Write {
            path: self.path.clone(),
            source,
        };
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(write_err)?;
        let line = format!("{}\n", format_stamp(at));
        file.write_all(line.as_bytes()).await.map_err(write_err)?;
        file.sync_all().await.map_err(write_err)?;
        Ok(())
    }
}

/// In-process store; keeps every commit for inspection.
#[derive(Debug)]
pub struct MemoryWatermarkStore {
    default: DateTime<Utc>,
    commits: Mutex<Vec<DateTime<Utc>>>,
}

impl MemoryWatermarkStore {
    pub fn new(default: DateTime<Utc>) -> Self {
        Self {
            default,
            commits: Mutex::new(Vec::new()),
        }
    }

    pub fn commits(&self) -> Vec<DateTime<Utc>> {
        self.commits
            .lock()
            .map(|v| v.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl WatermarkStore for MemoryWatermarkStore {
    async fn read_last(&self) -> DateTime<Utc> {
        self.commits
            .lock()
            .ok()
            .and_then(|v| v.last().copied())
            .unwrap_or(self.default)
    }

    async fn commit(&self, at: DateTime<Utc>) -> Result<(), PersistenceError> {
        if let Ok(mut v) = self.commits.lock() {
            v.push(at);
        }
        Ok(())
    }
}
