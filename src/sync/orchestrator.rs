// src/sync/orchestrator.rs
//! One sync run: read the watermark, fan the sources out over a bounded worker
//! pool, join every worker in configuration order, then decide whether the
//! watermark may advance.
//!
//! The watermark store is touched twice per run, once before dispatch and at most
//! once after the join, and only from here.

use std::any::Any;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, SubsecRound, Utc};
use metrics::counter;
use tokio::sync::Semaphore;

use super::{
    ensure_metrics_described, worker, CommitDecision, OrchestrationFault, RunOutcome, RunReport,
    SourceOutcome, SourceReport, SyncConfig,
};
use crate::feed::SourceFetcher;
use crate::forward::ForwardSink;
use crate::watermark::{format_stamp, WatermarkStore};

pub struct SyncOrchestrator {
    cfg: Arc<SyncConfig>,
    fetcher: Arc<dyn SourceFetcher>,
    sink: Arc<dyn ForwardSink>,
    store: Arc<dyn WatermarkStore>,
}

impl SyncOrchestrator {
    pub fn new(
        cfg: SyncConfig,
        fetcher: Arc<dyn SourceFetcher>,
        sink: Arc<dyn ForwardSink>,
        store: Arc<dyn WatermarkStore>,
    ) -> Self {
        Self {
            cfg: Arc::new(cfg),
            fetcher,
            sink,
            store,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.cfg
    }

    pub async fn run(&self) -> RunReport {
        ensure_metrics_described();
        counter!("sync_runs_total").increment(1);

        let t0 = Instant::now();
        // Persisted stamps have second resolution; truncating down keeps the
        // in-memory and on-disk watermark identical and never skips an entry.
        let started_at = Utc::now().trunc_subsecs(0);
        tracing::info!("{}", "-".repeat(50));
        tracing::info!(sources = self.cfg.sources.len(), "sync run started");

        let watermark = self.store.read_last().await;
        tracing::info!("last synced at {}", format_stamp(watermark));

        let outcome = self.dispatch(watermark).await;
        let decision = outcome.decide();
        let committed = self.settle(decision, started_at, watermark).await;

        let elapsed = t0.elapsed();
        tracing::info!(
            forwarded_sources = outcome.forwarded_sources(),
            committed,
            "sync run finished in {:.2}s",
            elapsed.as_secs_f64()
        );
        tracing::info!("{}", "-".repeat(50));

        RunReport {
            started_at,
            watermark,
            outcome,
            decision,
            committed,
            elapsed,
        }
    }

    async fn dispatch(&self, watermark: DateTime<Utc>) -> RunOutcome {
        let pool = Arc::new(Semaphore::new(self.cfg.pool_size()));

        let handles: Vec<_> = self
            .cfg
            .sources
            .iter()
            .map(|source| {
                let pool = Arc::clone(&pool);
                let fetcher = Arc::clone(&self.fetcher);
                let sink = Arc::clone(&self.sink);
                let cfg = Arc::clone(&self.cfg);
                let task_source = source.clone();
                let handle = tokio::spawn(async move {
                    let _permit = match pool.acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => return Err(OrchestrationFault::PoolClosed),
                    };
                    Ok(worker::sync_source(
                        fetcher.as_ref(),
                        sink.as_ref(),
                        &task_source,
                        watermark,
                        &cfg,
                    )
                    .await)
                });
                (source.clone(), handle)
            })
            .collect();

        let mut sources = Vec::with_capacity(handles.len());
        for (source, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) if e.is_panic() => {
                    Err(OrchestrationFault::Panicked(panic_message(e.into_panic())))
                }
                Err(_) => Err(OrchestrationFault::Cancelled),
            };
            log_result(&source, &result);
            sources.push(SourceReport { source, result });
        }
        RunOutcome { sources }
    }

    /// Apply the commit decision. Returns whether a new watermark was persisted.
    async fn settle(
        &self,
        decision: CommitDecision,
        started_at: DateTime<Utc>,
        watermark: DateTime<Utc>,
    ) -> bool {
        match decision {
            CommitDecision::Blocked => {
                tracing::warn!("worker faults during run, watermark not updated");
                false
            }
            CommitDecision::NothingNew => {
                tracing::info!("no new content forwarded, watermark not updated");
                false
            }
            CommitDecision::Commit if started_at < watermark => {
                tracing::warn!(
                    "clock is behind the stored watermark ({} < {}), not moving it back",
                    format_stamp(started_at),
                    format_stamp(watermark)
                );
                false
            }
            CommitDecision::Commit => match self.store.commit(started_at).await {
                Ok(()) => {
                    counter!("watermark_commits_total").increment(1);
                    tracing::info!("watermark advanced to {}", format_stamp(started_at));
                    true
                }
                Err(e) => {
                    tracing::error!("persisting watermark failed: {e}");
                    false
                }
            },
        }
    }
}

fn log_result(source: &crate::feed::SourceDescriptor, result: &Result<SourceOutcome, OrchestrationFault>) {
    match result {
        Ok(SourceOutcome::AllForwarded(n)) => {
            tracing::info!(source = %source, outcome = "all_forwarded", forwarded = *n)
        }
        Ok(SourceOutcome::NoNewContent) => {
            tracing::info!(source = %source, outcome = "no_new_content")
        }
        Ok(outcome) => tracing::warn!(source = %source, outcome = outcome.label(), "source failed"),
        Err(fault) => {
            counter!("orchestration_faults_total").increment(1);
            tracing::error!(source = %source, "unexpected worker fault: {fault}");
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
