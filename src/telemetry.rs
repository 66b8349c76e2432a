//! Tracing setup, metric descriptions and log-safe fingerprints.

use metrics::{describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const ENV_LOG_JSON: &str = "SENTINEL_LOG_JSON";
const DEFAULT_FILTER: &str = "opportunity_sentinel=info,sentinel=info,warn";

/// Install the global subscriber. Call once from the binary, never from the library.
/// `RUST_LOG` wins over the default filter; `SENTINEL_LOG_JSON=1` switches to JSON lines.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let json = std::env::var(ENV_LOG_JSON).ok().is_some_and(|v| v == "1");

    let registry = tracing_subscriber::registry().with(filter);
    let res = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
    if res.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

/// One-time metrics registration (so series show up on /metrics).
pub fn describe_metrics() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("discovery_runs_total", "Discoverer runs started.");
        describe_counter!(
            "discovery_items_total",
            "Candidate records returned by discoverers."
        );
        describe_counter!(
            "discovery_errors_total",
            "Discoverer runs that failed or timed out."
        );
        describe_histogram!("discovery_run_ms", "Discoverer run time in milliseconds.");
        describe_histogram!("feed_parse_ms", "Feed document parse time in milliseconds.");
        describe_counter!(
            "pipeline_rejected_total",
            "Items dropped by extraction or validation."
        );
        describe_counter!(
            "pipeline_low_quality_total",
            "Items flagged low_quality by the validator."
        );
        describe_counter!(
            "discovery_item_errors_total",
            "Discovered items dropped because extraction failed."
        );
        describe_counter!("dedup_exact_total", "Exact (url/hash) duplicate hits.");
        describe_counter!("dedup_fuzzy_total", "Fuzzy duplicate hits.");
        describe_counter!(
            "rate_limit_waits_total",
            "Acquisitions that had to wait for a window reset."
        );
        describe_counter!(
            "rate_limit_exceeded_total",
            "Acquisitions refused because the daily quota is used."
        );
        describe_gauge!("jobs_running", "Discoverer runs currently executing.");
    });
}

/// Short SHA-256 fingerprint, safe to log in place of raw text.
pub fn anon_hash(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(text.as_bytes());
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anon_hash_is_short_and_stable() {
        let a = anon_hash("Residency call 2026");
        assert_eq!(a.len(), 12);
        assert_eq!(a, anon_hash("Residency call 2026"));
        assert_ne!(a, anon_hash("Residency call 2027"));
    }
}
