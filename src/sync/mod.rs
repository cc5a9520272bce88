// src/sync/mod.rs
pub mod eligibility;
pub mod orchestrator;
pub mod worker;

pub use orchestrator::SyncOrchestrator;

use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::{describe_counter, describe_histogram};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::feed::{FetchFailure, SourceDescriptor};

pub const DEFAULT_WORKER_CAP: usize = 5;

/// One-time metrics registration (so series show up once a recorder is installed).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("sync_runs_total", "Sync runs started.");
        describe_counter!("feed_entries_total", "Entries parsed from sources.");
        describe_counter!(
            "feed_fetch_failures_total",
            "Sources whose fetch or parse failed."
        );
        describe_counter!("forward_delivered_total", "Entries accepted by the save endpoint.");
        describe_counter!("forward_rejected_total", "Entries the save endpoint did not take.");
        describe_counter!("watermark_commits_total", "Watermark advances persisted.");
        describe_counter!(
            "orchestration_faults_total",
            "Source workers that panicked or could not be scheduled."
        );
        describe_histogram!("feed_fetch_ms", "Feed download time in milliseconds.");
    });
}

/// Order in which a source's entries are considered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryOrder {
    /// As the transport returned them.
    #[default]
    Source,
    /// Oldest resolved timestamp first (stable).
    Chronological,
}

/// Immutable inputs of one run.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub sources: Vec<SourceDescriptor>,
    pub tags: Vec<String>,
    pub folder: String,
    pub worker_cap: usize,
    pub entry_order: EntryOrder,
}

impl SyncConfig {
    pub fn new(sources: Vec<SourceDescriptor>, folder: impl Into<String>) -> Self {
        Self {
            sources,
            tags: Vec::new(),
            folder: folder.into(),
            worker_cap: DEFAULT_WORKER_CAP,
            entry_order: EntryOrder::Source,
        }
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// A cap of 0 is treated as 1.
    pub fn with_worker_cap(mut self, cap: usize) -> Self {
        self.worker_cap = cap.max(1);
        self
    }

    pub fn with_entry_order(mut self, order: EntryOrder) -> Self {
        self.entry_order = order;
        self
    }

    /// Number of workers allowed to run at once: `min(cap, sources)`.
    pub fn pool_size(&self) -> usize {
        self.worker_cap.max(1).min(self.sources.len())
    }
}

/// Terminal result of one source in one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceOutcome {
    AllForwarded(usize),
    NoNewContent,
    /// A forward was rejected; `delivered` entries went through before it.
    ForwardingFailed { delivered: usize },
    FetchFailed(FetchFailure),
}

impl SourceOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            SourceOutcome::AllForwarded(_) => "all_forwarded",
            SourceOutcome::NoNewContent => "no_new_content",
            SourceOutcome::ForwardingFailed { .. } => "forwarding_failed",
            SourceOutcome::FetchFailed(_) => "fetch_failed",
        }
    }
}

/// A worker that ended outside the modeled outcomes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrchestrationFault {
    #[error("worker panicked: {0}")]
    Panicked(String),
    #[error("worker was cancelled")]
    Cancelled,
    #[error("worker pool closed before the worker got a slot")]
    PoolClosed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceReport {
    pub source: SourceDescriptor,
    pub result: Result<SourceOutcome, OrchestrationFault>,
}

/// Every source's result, in configuration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutcome {
    pub sources: Vec<SourceReport>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitDecision {
    /// At least one source forwarded everything and nothing faulted.
    Commit,
    /// Nothing faulted, but no source forwarded anything end to end.
    NothingNew,
    /// A worker faulted; this run's observations are not trusted.
    Blocked,
}

impl RunOutcome {
    pub fn faults(&self) -> impl Iterator<Item = (&SourceDescriptor, &OrchestrationFault)> {
        self.sources
            .iter()
            .filter_map(|r| r.result.as_ref().err().map(|f| (&r.source, f)))
    }

    pub fn has_faults(&self) -> bool {
        self.faults().next().is_some()
    }

    pub fn forwarded_sources(&self) -> usize {
        self.sources
            .iter()
            .filter(|r| matches!(r.result, Ok(SourceOutcome::AllForwarded(_))))
            .count()
    }

    /// Watermark commit policy. A fault blocks the commit; ordinary fetch or
    /// forwarding failures do not.
    pub fn decide(&self) -> CommitDecision {
        if self.has_faults() {
            CommitDecision::Blocked
        } else if self.forwarded_sources() > 0 {
            CommitDecision::Commit
        } else {
            CommitDecision::NothingNew
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub watermark: DateTime<Utc>,
    pub outcome: RunOutcome,
    pub decision: CommitDecision,
    /// Whether a new watermark was actually persisted.
    pub committed: bool,
    pub elapsed: Duration,
}

impl RunReport {
    /// True when no worker faulted.
    pub fn completed(&self) -> bool {
        !self.outcome.has_faults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(url: &str, result: Result<SourceOutcome, OrchestrationFault>) -> SourceReport {
        SourceReport {
            source: SourceDescriptor::new(url),
            result,
        }
    }

    #[test]
    fn any_fault_blocks_even_with_success() {
        let outcome = RunOutcome {
            sources: vec![
                report("a", Ok(SourceOutcome::AllForwarded(1))),
                report("b", Err(OrchestrationFault::Panicked("boom".into()))),
            ],
        };
        assert_eq!(outcome.decide(), CommitDecision::Blocked);
    }

    #[test]
    fn one_full_success_commits_despite_ordinary_failures() {
        let outcome = RunOutcome {
            sources: vec![
                report("a", Ok(SourceOutcome::FetchFailed(FetchFailure::Status(503)))),
                report("b", Ok(SourceOutcome::ForwardingFailed { delivered: 2 })),
                report("c", Ok(SourceOutcome::AllForwarded(3))),
            ],
        };
        assert_eq!(outcome.decide(), CommitDecision::Commit);
    }

    #[test]
    fn partial_forwarding_alone_does_not_commit() {
        let outcome = RunOutcome {
            sources: vec![
                report("a", Ok(SourceOutcome::NoNewContent)),
                report("b", Ok(SourceOutcome::ForwardingFailed { delivered: 1 })),
                report("c", Ok(SourceOutcome::FetchFailed(FetchFailure::Timeout(Duration::from_secs(10))))),
            ],
        };
        assert_eq!(outcome.decide(), CommitDecision::NothingNew);
    }

    #[test]
    fn empty_run_has_nothing_new() {
        assert_eq!(RunOutcome::default().decide(), CommitDecision::NothingNew);
    }

    #[test]
    fn pool_size_is_bounded_by_sources_and_cap() {
        let sources: Vec<_> = (0..3).map(|i| SourceDescriptor::new(format!("s{i}"))).collect();
        let cfg = SyncConfig::new(sources, "RSS");
        assert_eq!(cfg.pool_size(), 3);
        assert_eq!(cfg.clone().with_worker_cap(2).pool_size(), 2);
        assert_eq!(cfg.with_worker_cap(0).pool_size(), 1);
    }
}
