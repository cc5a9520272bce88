// src/config/app.rs
use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::feed::SourceDescriptor;
use crate::sync::{EntryOrder, SyncConfig, DEFAULT_WORKER_CAP};
use crate::watermark::parse_stamp;

pub const ENV_CONFIG_PATH: &str = "RSS_FORWARDER_CONFIG";
/// Overrides `endpoint`; the save URL embeds a token, so it often lives in the environment.
pub const ENV_ENDPOINT: &str = "CUBOX_API";

const DEFAULT_TOML_PATH: &str = "config/rss_forwarder.toml";
const DEFAULT_JSON_PATH: &str = "config/rss_forwarder.json";

fn default_folder() -> String {
    "RSS".to_string()
}
fn default_start_time() -> String {
    "2024-01-01 00:00:00".to_string()
}
fn default_watermark_path() -> PathBuf {
    PathBuf::from("state/last_synced.txt")
}
fn default_worker_cap() -> usize {
    DEFAULT_WORKER_CAP
}
fn default_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Save endpoint URL. `$CUBOX_API` wins when set.
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default = "default_folder")]
    pub folder: String,
    #[serde(default)]
    pub feeds: Vec<String>,
    /// Watermark used before the first successful run, `YYYY-MM-DD HH:MM:SS` local time.
    #[serde(default = "default_start_time")]
    pub start_time: String,
    #[serde(default = "default_watermark_path")]
    pub watermark_path: PathBuf,
    #[serde(default = "default_worker_cap")]
    pub worker_cap: usize,
    #[serde(default = "default_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub forward_timeout_secs: u64,
    #[serde(default)]
    pub entry_order: EntryOrder,
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    #[serde(skip)]
    pub endpoint_from_env: bool,
}

impl AppConfig {
    /// Load from an explicit path. Supports TOML or JSON formats.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading configuration from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let cfg = Self::parse(&content, ext.as_str())
            .with_context(|| format!("parsing configuration {}", path.display()))?;
        cfg.finalize()
    }

    /// Load using env var + fallbacks:
    /// 1) $RSS_FORWARDER_CONFIG
    /// 2) config/rss_forwarder.toml
    /// 3) config/rss_forwarder.json
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            }
            bail!("{ENV_CONFIG_PATH} points to non-existent path {}", pb.display());
        }
        let toml_p = PathBuf::from(DEFAULT_TOML_PATH);
        if toml_p.exists() {
            return Self::load_from(&toml_p);
        }
        let json_p = PathBuf::from(DEFAULT_JSON_PATH);
        if json_p.exists() {
            return Self::load_from(&json_p);
        }
        Err(anyhow!(
            "no configuration found: set {ENV_CONFIG_PATH} or create {DEFAULT_TOML_PATH}"
        ))
    }

    fn parse(s: &str, hint_ext: &str) -> Result<Self> {
        match hint_ext {
            "toml" => return toml::from_str(s).context("invalid TOML"),
            "json" => return serde_json::from_str(s).context("invalid JSON"),
            _ => {}
        }
        // No usable extension: JSON documents start with a brace, everything else is tried as TOML.
        if s.trim_start().starts_with('{') {
            serde_json::from_str(s).context("invalid JSON")
        } else {
            toml::from_str(s).context("invalid TOML")
        }
    }

    /// Clean lists, apply environment overrides and validate.
    fn finalize(mut self) -> Result<Self> {
        self.feeds = clean_list(std::mem::take(&mut self.feeds));
        self.tags = self.tags.take().map(clean_list);

        if let Ok(endpoint) = std::env::var(ENV_ENDPOINT) {
            if !endpoint.trim().is_empty() {
                self.endpoint = endpoint.trim().to_string();
                self.endpoint_from_env = true;
            }
        }
        self.endpoint = self.endpoint.trim().to_string();
        if self.endpoint.is_empty() {
            bail!("save endpoint missing: set `endpoint` or {ENV_ENDPOINT}");
        }

        self.start_instant()?;
        if self.worker_cap == 0 {
            self.worker_cap = 1;
        }
        if self.fetch_timeout_secs == 0 {
            self.fetch_timeout_secs = default_timeout_secs();
        }
        if self.forward_timeout_secs == 0 {
            self.forward_timeout_secs = default_timeout_secs();
        }
        Ok(self)
    }

    pub fn start_instant(&self) -> Result<DateTime<Utc>> {
        parse_stamp(&self.start_time).with_context(|| {
            format!(
                "start_time {:?} is not `YYYY-MM-DD HH:MM:SS`",
                self.start_time
            )
        })
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn forward_timeout(&self) -> Duration {
        Duration::from_secs(self.forward_timeout_secs)
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig::new(
            self.feeds.iter().map(|f| SourceDescriptor::new(f.as_str())).collect(),
            self.folder.clone(),
        )
        .with_tags(self.tags.clone().unwrap_or_default())
        .with_worker_cap(self.worker_cap)
        .with_entry_order(self.entry_order)
    }
}

/// Trim, drop blanks and repeats; first occurrence keeps its position.
fn clean_list(items: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for it in items {
        let t = it.trim();
        if !t.is_empty() && !out.iter().any(|seen| seen == t) {
            out.push(t.to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_with_defaults() {
        let cfg = AppConfig::parse(
            r#"
endpoint = "https://save.test/api/TOKEN"
feeds = [" https://a.test/feed ", "", "https://b.test/rss", "https://a.test/feed"]
"#,
            "toml",
        )
        .unwrap();
        assert_eq!(cfg.folder, "RSS");
        assert_eq!(cfg.worker_cap, 5);
        assert_eq!(cfg.fetch_timeout_secs, 10);
        assert_eq!(cfg.entry_order, EntryOrder::Source);
        assert_eq!(cfg.tags, None);
        assert_eq!(clean_list(cfg.feeds), vec!["https://a.test/feed", "https://b.test/rss"]);
    }

    #[test]
    fn json_is_sniffed_without_extension() {
        let cfg = AppConfig::parse(
            r#"{"endpoint":"https://save.test/x","feeds":["https://a.test/feed"],"entry_order":"chronological","tags":["rss"]}"#,
            "",
        )
        .unwrap();
        assert_eq!(cfg.entry_order, EntryOrder::Chronological);
        assert_eq!(cfg.tags, Some(vec!["rss".to_string()]));
    }

    #[test]
    fn sync_config_carries_settings() {
        let cfg = AppConfig::parse(
            r#"
endpoint = "https://save.test/x"
feeds = ["https://a.test/feed"]
folder = "Reading"
tags = ["rss", "auto"]
worker_cap = 2
"#,
            "toml",
        )
        .unwrap();
        let sync = cfg.sync_config();
        assert_eq!(sync.sources, vec![SourceDescriptor::new("https://a.test/feed")]);
        assert_eq!(sync.folder, "Reading");
        assert_eq!(sync.tags, vec!["rss", "auto"]);
        assert_eq!(sync.worker_cap, 2);
    }
}
