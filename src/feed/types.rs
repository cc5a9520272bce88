// src/feed/types.rs
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Address of one configured feed. Opaque to the sync engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceDescriptor(String);

impl SourceDescriptor {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn url(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceDescriptor {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// One syndicated item, normalized from RSS or Atom.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub link: Option<String>,
    pub id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub published: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
    pub created: Option<DateTime<Utc>>,
    /// Wall-clock time the entry was fetched; last resort for `resolved_at`.
    pub fetched_at: DateTime<Utc>,
}

impl Entry {
    /// Entry with only a link, title and fetch time. Timestamps are attached with the builders below.
    pub fn new(link: impl Into<String>, title: impl Into<String>, fetched_at: DateTime<Utc>) -> Self {
        Self {
            link: Some(link.into()),
            id: None,
            title: title.into(),
            description: None,
            published: None,
            updated: None,
            created: None,
            fetched_at,
        }
    }

    pub fn published(mut self, at: DateTime<Utc>) -> Self {
        self.published = Some(at);
        self
    }

    pub fn updated(mut self, at: DateTime<Utc>) -> Self {
        self.updated = Some(at);
        self
    }

    pub fn created(mut self, at: DateTime<Utc>) -> Self {
        self.created = Some(at);
        self
    }

    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    /// Timestamp used for eligibility: published, else updated, else created, else fetch time.
    pub fn resolved_at(&self) -> DateTime<Utc> {
        self.published
            .or(self.updated)
            .or(self.created)
            .unwrap_or(self.fetched_at)
    }
}

/// A successfully fetched, non-empty feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedFeed {
    pub title: Option<String>,
    /// Source-level "last updated" instant, already resolved with fallbacks.
    pub updated_at: DateTime<Utc>,
    pub entries: Vec<Entry>,
    /// Non-fatal parse problems (malformed markup, unreadable dates).
    pub warnings: Vec<String>,
}

impl FetchedFeed {
    /// Resolve the source-level instant: explicit feed update time, else the first
    /// entry's resolved timestamp, else `fetched_at`.
    pub fn resolve(
        title: Option<String>,
        feed_updated: Option<DateTime<Utc>>,
        entries: Vec<Entry>,
        warnings: Vec<String>,
        fetched_at: DateTime<Utc>,
    ) -> Self {
        let updated_at = feed_updated
            .or_else(|| entries.first().map(Entry::resolved_at))
            .unwrap_or(fetched_at);
        Self {
            title,
            updated_at,
            entries,
            warnings,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchFailure {
    #[error("fetch timed out after {}s", .0.as_secs())]
    Timeout(Duration),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("source returned HTTP {0}")]
    Status(u16),
    #[error("unparseable feed: {0}")]
    Parse(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchResult {
    Ok(FetchedFeed),
    /// Transport succeeded and the document is a feed, but it carries no entries.
    Empty,
    Failed(FetchFailure),
}

#[async_trait::async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Retrieve and parse one source. Never panics on transport or parse problems;
    /// those are reported as `FetchResult::Failed`.
    async fn fetch(&self, source: &SourceDescriptor) -> FetchResult;
}
