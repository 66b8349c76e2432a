//! Sentinel — binary entrypoint.
//! Loads config, wires feed discoverers and schedules, exports Prometheus
//! metrics and runs until Ctrl-C.

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use opportunity_sentinel::jobs::JobEvent;
use opportunity_sentinel::telemetry::{describe_metrics, init_tracing};
use opportunity_sentinel::{FeedDiscoverer, InMemoryRepository, SentinelConfig, SentinelService};

const ENV_METRICS_ADDR: &str = "SENTINEL_METRICS_ADDR";
const DEFAULT_METRICS_ADDR: &str = "0.0.0.0:9000";

fn install_metrics_exporter() -> Result<()> {
    let addr: SocketAddr = std::env::var(ENV_METRICS_ADDR)
        .unwrap_or_else(|_| DEFAULT_METRICS_ADDR.to_string())
        .parse()
        .with_context(|| format!("{ENV_METRICS_ADDR} is not a socket address"))?;
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("installing Prometheus exporter")?;
    describe_metrics();
    info!(%addr, "metrics exporter listening");
    Ok(())
}

async fn register_feeds(svc: &SentinelService) -> usize {
    let feeds: Vec<(String, String)> = svc
        .config()
        .sources
        .iter()
        .filter_map(|(name, sc)| sc.feed_url.clone().map(|u| (name.clone(), u)))
        .collect();

    let mut n = 0;
    for (name, url) in feeds {
        let base = match svc.discoverer_base(&name) {
            Ok(b) => b,
            Err(e) => {
                warn!(source = %name, error = %e, "feed discoverer not built");
                continue;
            }
        };
        let feed = FeedDiscoverer::from_url(name.clone(), url, base);
        match svc.register_discoverer(Arc::new(feed)).await {
            Ok(()) => n += 1,
            Err(e) => warn!(source = %name, error = %e, "feed discoverer not registered"),
        }
    }
    n
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    if let Err(e) = install_metrics_exporter() {
        warn!(error = %e, "running without metrics exporter");
    }

    let cfg = SentinelConfig::load_default().context("loading sentinel config")?;
    let svc = SentinelService::new(cfg, Arc::new(InMemoryRepository::new()));

    let feeds = register_feeds(&svc).await;
    let schedules = svc.add_default_schedules();
    info!(feeds, schedules, "sentinel started");

    let mut events = svc.subscribe();
    let listener = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(JobEvent::Completed { job_id, results }) => {
                    info!(%job_id, results, "job completed")
                }
                Ok(JobEvent::Failed { job_id, error }) => warn!(%job_id, %error, "job failed"),
                Ok(_) => {}
                Err(RecvError::Lagged(n)) => warn!(missed = n, "job event listener lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
    info!("shutting down");
    svc.shutdown();
    listener.abort();
    Ok(())
}
