// src/sync/worker.rs
use chrono::{DateTime, Utc};
use metrics::counter;

use super::eligibility::{is_eligible, source_may_have_news};
use super::{EntryOrder, SourceOutcome, SyncConfig};
use crate::feed::{Entry, FetchResult, SourceDescriptor, SourceFetcher};
use crate::forward::{ForwardResult, ForwardSink};

/// Drive one source end to end: fetch, filter against `watermark`, forward
/// eligible entries one at a time. The first rejection ends the source; entries
/// already delivered stay delivered.
pub async fn sync_source(
    fetcher: &dyn SourceFetcher,
    sink: &dyn ForwardSink,
    source: &SourceDescriptor,
    watermark: DateTime<Utc>,
    cfg: &SyncConfig,
) -> SourceOutcome {
    tracing::info!(source = %source, "processing source");

    let feed = match fetcher.fetch(source).await {
        FetchResult::Ok(feed) => feed,
        FetchResult::Empty => {
            tracing::info!(source = %source, "source has no entries");
            return SourceOutcome::NoNewContent;
        }
        FetchResult::Failed(reason) => {
            tracing::error!(source = %source, "fetch failed: {reason}");
            counter!("feed_fetch_failures_total").increment(1);
            return SourceOutcome::FetchFailed(reason);
        }
    };

    if !source_may_have_news(feed.updated_at, watermark) {
        tracing::info!(source = %source, updated_at = %feed.updated_at, "source not updated since last sync");
        return SourceOutcome::NoNewContent;
    }

    let mut entries: Vec<&Entry> = feed.entries.iter().collect();
    if cfg.entry_order == EntryOrder::Chronological {
        entries.sort_by_key(|e| e.resolved_at());
    }

    let mut delivered = 0usize;
    for entry in entries {
        if !is_eligible(entry.resolved_at(), watermark) {
            continue;
        }
        if entry.link.is_none() {
            tracing::warn!(source = %source, title = %entry.title, "skipping entry without a link");
            continue;
        }
        match sink.forward(entry, &cfg.tags, &cfg.folder).await {
            ForwardResult::Delivered => {
                delivered += 1;
                counter!("forward_delivered_total").increment(1);
                tracing::info!(source = %source, title = %entry.title, "forwarded");
            }
            ForwardResult::Rejected(reason) => {
                counter!("forward_rejected_total").increment(1);
                tracing::error!(
                    source = %source,
                    title = %entry.title,
                    transport = reason.is_transport(),
                    "forward rejected: {reason}"
                );
                return SourceOutcome::ForwardingFailed { delivered };
            }
        }
    }

    tracing::info!(source = %source, delivered, "source done");
    if delivered == 0 {
        SourceOutcome::NoNewContent
    } else {
        SourceOutcome::AllForwarded(delivered)
    }
}
