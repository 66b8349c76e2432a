// src/config.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_CONFIG_PATH: &str = "SENTINEL_CONFIG";
pub const ENV_MAX_CONCURRENT_JOBS: &str = "SENTINEL_MAX_CONCURRENT_JOBS";
pub const ENV_QUALITY_THRESHOLD: &str = "SENTINEL_QUALITY_THRESHOLD";

pub const DEFAULT_CONFIG_TOML: &str = "config/sentinel.toml";
pub const DEFAULT_CONFIG_JSON: &str = "config/sentinel.json";

fn default_max_concurrent_jobs() -> usize {
    5
}
fn default_run_timeout_ms() -> u64 {
    300_000
}
fn default_quality_threshold() -> f32 {
    0.6
}
fn default_job_retention() -> usize {
    100
}
fn default_true() -> bool {
    true
}
fn default_rate_limit() -> u32 {
    60
}
fn default_timeout_ms() -> u64 {
    30_000
}
fn default_retry_attempts() -> u32 {
    3
}

/// Per-source settings: rate limit (requests/minute), timeouts, retries, cadence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_rate_limit")]
    pub rate_limit: u32,
    /// Hard cap per UTC day; `None` means unmetered.
    #[serde(default)]
    pub daily_quota: Option<u32>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default)]
    pub schedule: Option<String>,
    /// Used by the binary to wire feed discoverers from config.
    #[serde(default)]
    pub feed_url: Option<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rate_limit: default_rate_limit(),
            daily_quota: None,
            timeout_ms: default_timeout_ms(),
            retry_attempts: default_retry_attempts(),
            schedule: None,
            feed_url: None,
        }
    }
}

impl SourceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Tunable similarity weights and scan bounds for deduplication.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DedupConfig {
    pub title_weight: f32,
    pub organization_weight: f32,
    pub description_weight: f32,
    pub deadline_weight: f32,
    pub url_weight: f32,
    /// A pair scoring strictly above this is a duplicate.
    pub duplicate_threshold: f32,
    pub recent_window_days: i64,
    pub recent_sample_limit: usize,
    pub batch_size: usize,
    pub description_prefix_chars: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            title_weight: 0.4,
            organization_weight: 0.3,
            description_weight: 0.2,
            deadline_weight: 0.05,
            url_weight: 0.05,
            duplicate_threshold: 0.85,
            recent_window_days: 30,
            recent_sample_limit: 500,
            batch_size: 100,
            description_prefix_chars: 500,
        }
    }
}

impl DedupConfig {
    fn sanitize(&mut self) {
        for w in [
            &mut self.title_weight,
            &mut self.organization_weight,
            &mut self.description_weight,
            &mut self.deadline_weight,
            &mut self.url_weight,
            &mut self.duplicate_threshold,
        ] {
            *w = if w.is_finite() { w.clamp(0.0, 1.0) } else { 0.0 };
        }
        if self.batch_size == 0 {
            self.batch_size = 1;
        }
        if self.recent_window_days <= 0 {
            self.recent_window_days = 30;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SentinelConfig {
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
    #[serde(default = "default_run_timeout_ms")]
    pub discoverer_run_timeout_ms: u64,
    #[serde(default = "default_quality_threshold")]
    pub quality_threshold: f32,
    #[serde(default)]
    pub strict_validation: bool,
    #[serde(default = "default_job_retention")]
    pub job_retention: usize,
    #[serde(default)]
    pub dedup: DedupConfig,
    #[serde(default)]
    pub sources: HashMap<String, SourceConfig>,
}

impl Default for SentinelConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: default_max_concurrent_jobs(),
            discoverer_run_timeout_ms: default_run_timeout_ms(),
            quality_threshold: default_quality_threshold(),
            strict_validation: false,
            job_retention: default_job_retention(),
            dedup: DedupConfig::default(),
            sources: HashMap::new(),
        }
    }
}

impl SentinelConfig {
    /// Load from an explicit path. TOML or JSON, picked by extension with fallback.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading sentinel config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let mut cfg = parse_config(&content, &ext)?;
        cfg.apply_env_overrides();
        cfg.sanitize();
        Ok(cfg)
    }

    /// Resolve config using env var + fallbacks:
    /// 1) $SENTINEL_CONFIG
    /// 2) config/sentinel.toml
    /// 3) config/sentinel.json
    /// 4) built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            }
            return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
        }
        for candidate in [DEFAULT_CONFIG_TOML, DEFAULT_CONFIG_JSON] {
            let p = PathBuf::from(candidate);
            if p.exists() {
                return Self::load_from(&p);
            }
        }
        let mut cfg = Self::default();
        cfg.apply_env_overrides();
        cfg.sanitize();
        Ok(cfg)
    }

    /// Settings for `name`, or defaults when the source is not configured.
    pub fn source(&self, name: &str) -> SourceConfig {
        self.sources.get(name).cloned().unwrap_or_default()
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_millis(self.discoverer_run_timeout_ms)
    }

    fn apply_env_overrides(&mut self) {
        if let Some(n) = std::env::var(ENV_MAX_CONCURRENT_JOBS)
            .ok()
            .and_then(|v| v.trim().parse::<usize>().ok())
        {
            self.max_concurrent_jobs = n;
        }
        if let Some(t) = std::env::var(ENV_QUALITY_THRESHOLD)
            .ok()
            .and_then(|v| v.trim().parse::<f32>().ok())
        {
            self.quality_threshold = t;
        }
    }

    fn sanitize(&mut self) {
        if self.max_concurrent_jobs == 0 {
            self.max_concurrent_jobs = 1;
        }
        if !self.quality_threshold.is_finite() {
            self.quality_threshold = default_quality_threshold();
        }
        self.quality_threshold = self.quality_threshold.clamp(0.0, 1.0);
        self.dedup.sanitize();
        for sc in self.sources.values_mut() {
            if sc.rate_limit == 0 {
                sc.rate_limit = 1;
            }
        }
    }
}

fn parse_config(s: &str, hint_ext: &str) -> Result<SentinelConfig> {
    if hint_ext == "json" {
        if let Ok(v) = serde_json::from_str(s) {
            return Ok(v);
        }
        return toml::from_str(s).map_err(|e| anyhow!("unsupported config format: {e}"));
    }
    match toml::from_str(s) {
        Ok(v) => Ok(v),
        Err(toml_err) => serde_json::from_str(s)
            .map_err(|_| anyhow!("unsupported config format: {toml_err}")),
    }
}
