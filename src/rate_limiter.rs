//! # Rate limiting
//! Per-source fixed-window limiter with an optional hard daily quota.
//!
//! - Windows are aligned to wall-clock boundaries (a 60s window resets at the
//!   top of each minute) and measured on the tokio clock, so paused-time tests
//!   see deterministic resets.
//! - `acquire` returns immediately while the window has room, otherwise sleeps
//!   until the next boundary. It fails fast with `RateLimitExceeded` once the
//!   daily quota is gone.
//! - Counters live in process memory only; a restart resets them.

use chrono::{NaiveDate, Utc};
use metrics::counter;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::Instant;

use crate::config::SourceConfig;
use crate::error::RateLimitExceeded;

/// Outcome of a non-blocking attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acquire {
    Granted,
    /// Window is full; retry after this long.
    Wait(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimiterStats {
    pub used_in_window: u32,
    pub limit: u32,
    pub used_today: u32,
    pub daily_quota: Option<u32>,
}

#[derive(Debug)]
struct WindowState {
    window_idx: u64,
    count: u32,
    day: NaiveDate,
    day_count: u32,
}

#[derive(Debug)]
pub struct RateLimiter {
    source_name: String,
    limit: u32,
    window: Duration,
    daily_quota: Option<u32>,
    /// Tokio instant corresponding to the start of the wall-clock window we were created in.
    anchor: Instant,
    state: Mutex<WindowState>,
}

impl RateLimiter {
    /// `limit` requests per `window`; zero limit or zero window are bumped to 1.
    pub fn new(source_name: impl Into<String>, limit: u32, window: Duration) -> Self {
        let window = if window.is_zero() {
            Duration::from_millis(1)
        } else {
            window
        };
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let into_window = Duration::from_millis((now_ms % window.as_millis().max(1)) as u64);
        let now = Instant::now();
        let anchor = now.checked_sub(into_window).unwrap_or(now);

        Self {
            source_name: source_name.into(),
            limit: limit.max(1),
            window,
            daily_quota: None,
            anchor,
            state: Mutex::new(WindowState {
                window_idx: 0,
                count: 0,
                day: Utc::now().date_naive(),
                day_count: 0,
            }),
        }
    }

    /// Requests-per-minute limiter, as configured per source.
    pub fn per_minute(source_name: impl Into<String>, rpm: u32) -> Self {
        Self::new(source_name, rpm, Duration::from_secs(60))
    }

    pub fn with_daily_quota(mut self, quota: Option<u32>) -> Self {
        self.daily_quota = quota;
        self
    }

    pub fn from_source_config(source_name: &str, cfg: &SourceConfig) -> Self {
        Self::per_minute(source_name, cfg.rate_limit).with_daily_quota(cfg.daily_quota)
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    fn current_window(&self, now: Instant) -> u64 {
        let elapsed = now.saturating_duration_since(self.anchor);
        (elapsed.as_nanos() / self.window.as_nanos().max(1)) as u64
    }

    fn next_boundary(&self, idx: u64) -> Instant {
        let nanos = self.window.as_nanos().saturating_mul(idx as u128 + 1);
        self.anchor + Duration::from_nanos(nanos.min(u64::MAX as u128) as u64)
    }

    /// Take a slot without waiting.
    pub fn try_acquire(&self) -> Result<Acquire, RateLimitExceeded> {
        let now = Instant::now();
        let mut st = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        let today = Utc::now().date_naive();
        if st.day != today {
            st.day = today;
            st.day_count = 0;
        }
        if let Some(q) = self.daily_quota {
            if st.day_count >= q {
                counter!("rate_limit_exceeded_total").increment(1);
                return Err(RateLimitExceeded {
                    source_name: self.source_name.clone(),
                    quota: q,
                });
            }
        }

        let idx = self.current_window(now);
        if idx != st.window_idx {
            st.window_idx = idx;
            st.count = 0;
        }
        if st.count < self.limit {
            st.count += 1;
            st.day_count += 1;
            return Ok(Acquire::Granted);
        }
        let wait = self.next_boundary(idx).saturating_duration_since(now);
        Ok(Acquire::Wait(wait.max(Duration::from_millis(1))))
    }

    /// Proceed now, suspend until the window frees a slot, or fail on an exhausted quota.
    pub async fn acquire(&self) -> Result<(), RateLimitExceeded> {
        loop {
            match self.try_acquire()? {
                Acquire::Granted => return Ok(()),
                Acquire::Wait(d) => {
                    counter!("rate_limit_waits_total").increment(1);
                    tracing::debug!(
                        target: "rate_limit",
                        source = %self.source_name,
                        wait_ms = d.as_millis() as u64,
                        "window full, waiting"
                    );
                    tokio::time::sleep(d).await;
                }
            }
        }
    }

    pub fn stats(&self) -> LimiterStats {
        let now = Instant::now();
        let st = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let used_in_window = if self.current_window(now) == st.window_idx {
            st.count
        } else {
            0
        };
        let used_today = if st.day == Utc::now().date_naive() {
            st.day_count
        } else {
            0
        };
        LimiterStats {
            used_in_window,
            limit: self.limit,
            used_today,
            daily_quota: self.daily_quota,
        }
    }
}

/// One limiter per source, created lazily from that source's config.
#[derive(Debug, Default)]
pub struct RateLimiterRegistry {
    limiters: RwLock<HashMap<String, Arc<RateLimiter>>>,
    configs: HashMap<String, SourceConfig>,
}

impl RateLimiterRegistry {
    pub fn new(configs: HashMap<String, SourceConfig>) -> Self {
        Self {
            limiters: RwLock::new(HashMap::new()),
            configs,
        }
    }

    /// Install an explicit limiter, replacing any existing one.
    pub fn insert(&self, limiter: RateLimiter) -> Arc<RateLimiter> {
        let arc = Arc::new(limiter);
        self.limiters
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(arc.source_name().to_string(), arc.clone());
        arc
    }

    pub fn limiter_for(&self, source_name: &str) -> Arc<RateLimiter> {
        if let Some(l) = self
            .limiters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(source_name)
        {
            return l.clone();
        }
        let mut w = self.limiters.write().unwrap_or_else(PoisonError::into_inner);
        w.entry(source_name.to_string())
            .or_insert_with(|| {
                let cfg = self.configs.get(source_name).cloned().unwrap_or_default();
                Arc::new(RateLimiter::from_source_config(source_name, &cfg))
            })
            .clone()
    }

    pub async fn acquire(&self, source_name: &str) -> Result<(), RateLimitExceeded> {
        self.limiter_for(source_name).acquire().await
    }
}
