//! Shared plumbing for discoverers: one HTTP client with a per-call timeout,
//! the source's rate limiter in front of every request, change detection,
//! and batch extraction that skips bad items.

use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::SourceConfig;
use crate::discovery::change_cache::ChangeCache;
use crate::error::{DiscoveryError, DiscoveryResult, InitError};
use crate::pipeline::DataExtractor;
use crate::rate_limiter::RateLimiter;
use crate::telemetry::anon_hash;
use crate::types::{CandidateOpportunity, RawContent, SourceType};

pub struct DiscovererBase {
    name: String,
    config: SourceConfig,
    client: reqwest::Client,
    limiter: Arc<RateLimiter>,
    cache: Arc<ChangeCache>,
}

impl DiscovererBase {
    pub fn new(
        name: impl Into<String>,
        config: SourceConfig,
        limiter: Arc<RateLimiter>,
        cache: Arc<ChangeCache>,
    ) -> Result<Self, InitError> {
        let name = name.into();
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("opportunity-sentinel/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| InitError::InvalidConfig(format!("{name}: http client: {e}")))?;
        Ok(Self {
            name,
            config,
            client,
            limiter,
            cache,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Rate-limited GET returning the body. Non-2xx is an error.
    pub async fn fetch(&self, url: &str) -> DiscoveryResult<String> {
        self.limiter.acquire().await?;
        let timeout = self.config.timeout();
        let resp = match tokio::time::timeout(timeout, self.client.get(url).send()).await {
            Ok(r) => r?,
            Err(_) => return Err(DiscoveryError::Timeout(timeout)),
        };
        let status = resp.status();
        if !status.is_success() {
            counter!("discovery_errors_total", "source" => self.name.clone()).increment(1);
            return Err(DiscoveryError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        match tokio::time::timeout(timeout, resp.text()).await {
            Ok(body) => Ok(body?),
            Err(_) => Err(DiscoveryError::Timeout(timeout)),
        }
    }

    /// `None` when the body is identical to the last poll of the same url.
    pub async fn fetch_if_changed(&self, url: &str) -> DiscoveryResult<Option<String>> {
        let body = self.fetch(url).await?;
        if self.cache.has_changed(&self.name, url, &body) {
            Ok(Some(body))
        } else {
            debug!(target: "discovery", source = %self.name, url, "content unchanged since last poll");
            Ok(None)
        }
    }
}

/// Extract each payload in input order. A payload that fails extraction is
/// logged and comes back as `None` in its slot.
pub fn extract_each(
    source: &str,
    raws: &[RawContent],
    source_type: SourceType,
) -> Vec<Option<CandidateOpportunity>> {
    let extractor = DataExtractor::new();
    raws.iter()
        .map(|raw| {
            let r = extractor.extract(raw, source_type);
            match r.data {
                Some(c) if r.success => Some(c),
                _ => {
                    counter!("discovery_item_errors_total", "source" => source.to_string()).increment(1);
                    warn!(
                        target: "discovery",
                        source,
                        content_hash = %anon_hash(&raw.content),
                        errors = ?r.errors,
                        "item skipped"
                    );
                    None
                }
            }
        })
        .collect()
}

/// Retry delay after `attempt` failures: 1s, 2s, 4s … capped at 30s.
pub fn backoff_delay(attempt: u32) -> Duration {
    let secs = 1u64.checked_shl(attempt.min(16)).unwrap_or(u64::MAX);
    Duration::from_secs(secs.min(30))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ContentType;

    #[test]
    fn backoff_doubles_then_caps() {
        assert_eq!(backoff_delay(0), Duration::from_secs(1));
        assert_eq!(backoff_delay(1), Duration::from_secs(2));
        assert_eq!(backoff_delay(2), Duration::from_secs(4));
        assert_eq!(backoff_delay(5), Duration::from_secs(30));
        assert_eq!(backoff_delay(100), Duration::from_secs(30));
    }

    #[test]
    fn extract_each_keeps_slots_in_order() {
        let raws = vec![
            RawContent::new(r#"{"title": "First"}"#, ContentType::Json),
            RawContent::new("{broken", ContentType::Json),
            RawContent::new(r#"{"title": "Third"}"#, ContentType::Json),
        ];
        let out = extract_each("t", &raws, SourceType::Manual);
        let titles: Vec<Option<&str>> = out.iter().map(|c| c.as_ref().map(|c| c.title.as_str())).collect();
        assert_eq!(titles, [Some("First"), None, Some("Third")]);
    }
}
