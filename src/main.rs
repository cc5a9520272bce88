//! rss-forwarder: run one incremental sync and exit.
//! Exit status is 0 when the run completed without a worker fault.

use std::process::ExitCode;

use rss_forwarder::{logging, AppConfig};

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env in local/dev; CUBOX_API and RSS_FORWARDER_CONFIG usually live there.
    let _ = dotenvy::dotenv();

    let cfg = match AppConfig::load_default() {
        Ok(cfg) => cfg,
        Err(e) => {
            logging::init(None);
            tracing::error!("loading configuration: {e:#}");
            return ExitCode::FAILURE;
        }
    };
    logging::init(cfg.log_file.as_deref());

    match rss_forwarder::run_once(&cfg).await {
        Ok(report) if report.completed() => ExitCode::SUCCESS,
        Ok(_) => {
            tracing::warn!("run incomplete: at least one source worker faulted");
            ExitCode::FAILURE
        }
        Err(e) => {
            tracing::error!("sync setup failed: {e:#}");
            ExitCode::FAILURE
        }
    }
}
