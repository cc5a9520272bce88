// src/feed/http.rs
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use metrics::{counter, histogram};
use reqwest::Client;

use crate::feed::parser::parse_feed;
use crate::feed::types::{FetchFailure, FetchResult, FetchedFeed, SourceDescriptor, SourceFetcher};

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Fetches feeds over HTTP(S) and parses them best-effort.
#[derive(Clone)]
pub struct HttpSourceFetcher {
    client: Client,
    timeout: Duration,
}

impl HttpSourceFetcher {
    pub fn new() -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("rss-forwarder/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("building feed http client")?;
        Ok(Self {
            client,
            timeout: DEFAULT_FETCH_TIMEOUT,
        })
    }

    /// Cap for the whole fetch, body download included.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn download(&self, url: &str) -> Result<String, FetchFailure> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchFailure::Transport(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchFailure::Status(status.as_u16()));
        }
        let body = resp
            .bytes()
            .await
            .map_err(|e| FetchFailure::Transport(e.to_string()))?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}

#[async_trait]
impl SourceFetcher for HttpSourceFetcher {
    async fn fetch(&self, source: &SourceDescriptor) -> FetchResult {
        let t0 = std::time::Instant::now();
        let body = match tokio::time::timeout(self.timeout, self.download(source.url())).await {
            Ok(Ok(body)) => body,
            Ok(Err(failure)) => return FetchResult::Failed(failure),
            Err(_) => return FetchResult::Failed(FetchFailure::Timeout(self.timeout)),
        };
        histogram!("feed_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

        let fetched_at = Utc::now();
        let parsed = match parse_feed(&body, fetched_at) {
            Ok(parsed) => parsed,
            Err(e) => return FetchResult::Failed(FetchFailure::Parse(e.to_string())),
        };
        for warning in &parsed.warnings {
            tracing::warn!(source = %source, "feed parse warning: {warning}");
        }
        counter!("feed_entries_total").increment(parsed.entries.len() as u64);

        if parsed.entries.is_empty() {
            return FetchResult::Empty;
        }
        FetchResult::Ok(FetchedFeed::resolve(
            parsed.title,
            parsed.updated,
            parsed.entries,
            parsed.warnings,
            fetched_at,
        ))
    }
}
