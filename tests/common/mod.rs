// tests/common/mod.rs
// Shared fakes for the sync engine: a scripted fetcher, a recording sink and a
// throwaway local HTTP server.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use rss_forwarder::feed::{
    Entry, FetchFailure, FetchResult, FetchedFeed, SourceDescriptor, SourceFetcher,
};
use rss_forwarder::forward::{ForwardResult, ForwardSink, Rejection};

pub fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
}

pub fn entry(title: &str, published: DateTime<Utc>) -> Entry {
    Entry::new(
        format!("https://feeds.test/{}", title.replace(' ', "-")),
        title,
        Utc::now(),
    )
    .published(published)
}

pub fn feed(updated: Option<DateTime<Utc>>, entries: Vec<Entry>) -> FetchedFeed {
    FetchedFeed::resolve(Some("test feed".into()), updated, entries, vec![], Utc::now())
}

#[derive(Clone)]
pub enum Script {
    Feed(FetchedFeed),
    Empty,
    Fail(FetchFailure),
    Panic,
}

/// Answers each source URL from a script and tracks how many fetches overlap.
#[derive(Default)]
pub struct ScriptedFetcher {
    scripts: HashMap<String, Script>,
    delays: HashMap<String, Duration>,
    default_delay: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: &str, script: Script) -> Self {
        self.scripts.insert(url.to_string(), script);
        self
    }

    pub fn with_delay_for(mut self, url: &str, delay: Duration) -> Self {
        self.delays.insert(url.to_string(), delay);
        self
    }

    pub fn with_default_delay(mut self, delay: Duration) -> Self {
        self.default_delay = delay;
        self
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceFetcher for ScriptedFetcher {
    async fn fetch(&self, source: &SourceDescriptor) -> FetchResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let delay = self
            .delays
            .get(source.url())
            .copied()
            .unwrap_or(self.default_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match self.scripts.get(source.url()) {
            Some(Script::Feed(f)) => FetchResult::Ok(f.clone()),
            Some(Script::Empty) => FetchResult::Empty,
            Some(Script::Fail(reason)) => FetchResult::Failed(reason.clone()),
            Some(Script::Panic) => panic!("scripted fetcher blew up on {source}"),
            None => FetchResult::Failed(FetchFailure::Transport(format!("unscripted {source}"))),
        }
    }
}

/// Records every forward attempt; rejects entries whose title is listed.
#[derive(Default)]
pub struct RecordingSink {
    reject_titles: HashSet<String>,
    attempts: Mutex<Vec<String>>,
    delivered: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejecting(titles: &[&str]) -> Self {
        Self {
            reject_titles: titles.iter().map(|t| t.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn delivered(&self) -> Vec<String> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl ForwardSink for RecordingSink {
    async fn forward(&self, entry: &Entry, _tags: &[String], _folder: &str) -> ForwardResult {
        self.attempts.lock().unwrap().push(entry.title.clone());
        if self.reject_titles.contains(&entry.title) {
            return ForwardResult::Rejected(Rejection::Endpoint {
                code: Some(-1),
                message: Some("rejected by test".into()),
            });
        }
        self.delivered.lock().unwrap().push(entry.title.clone());
        ForwardResult::Delivered
    }
}

/// Serve `app` on an ephemeral localhost port for the rest of the test.
pub async fn spawn_server(app: axum::Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}
