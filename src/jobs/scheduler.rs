//! Recurring schedules. One interval task per source; each tick submits a
//! single-source job to the manager. Completion is observed through the
//! manager's event channel, not through callbacks.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::{DiscoveryJobManager, JobOptions};
use crate::discovery::DiscovererRegistry;
use crate::error::SentinelError;
use crate::types::SourceType;

pub const MAX_PERIOD: Duration = Duration::from_secs(366 * 86_400);

/// Parsed cadence string.
///
/// Accepted forms: `@hourly`, `@daily`, `@weekly`, `every <n>(s|m|h|d)`,
/// `*/N * * * *` (every N minutes) and `0 */N * * *` (every N hours).
/// Periods longer than [`MAX_PERIOD`] are rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cadence {
    expr: String,
    period: Duration,
}

impl Cadence {
    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn expr(&self) -> &str {
        &self.expr
    }

    /// Fallback cadence when a source has none configured.
    pub fn default_for(source_type: SourceType) -> &'static str {
        match source_type {
            SourceType::WebSearch => "every 6h",
            SourceType::AiExtraction => "@daily",
            SourceType::Social => "every 2h",
            SourceType::BookmarkFeed => "every 1h",
            SourceType::Manual => "@daily",
        }
    }
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expr)
    }
}

fn parse_every(rest: &str) -> Option<Duration> {
    let rest = rest.trim();
    let split = rest.find(|c: char| !c.is_ascii_digit())?;
    let (num, unit) = rest.split_at(split);
    let n: u64 = num.parse().ok().filter(|n| *n > 0)?;
    let secs = match unit.trim() {
        "s" => n,
        "m" => n.checked_mul(60)?,
        "h" => n.checked_mul(3600)?,
        "d" => n.checked_mul(86_400)?,
        _ => return None,
    };
    Some(Duration::from_secs(secs))
}

fn parse_step(field: &str, unit_secs: u64) -> Option<Duration> {
    let n = field
        .strip_prefix("*/")?
        .parse::<u64>()
        .ok()
        .filter(|n| *n > 0)?;
    n.checked_mul(unit_secs).map(Duration::from_secs)
}

impl FromStr for Cadence {
    type Err = SentinelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let expr = s.trim().to_ascii_lowercase();
        let invalid = || SentinelError::InvalidCadence(s.to_string());

        let period = match expr.as_str() {
            "@hourly" => Some(Duration::from_secs(3600)),
            "@daily" => Some(Duration::from_secs(86_400)),
            "@weekly" => Some(Duration::from_secs(7 * 86_400)),
            e if e.starts_with("every ") => parse_every(&e["every ".len()..]),
            e => {
                let fields: Vec<&str> = e.split_whitespace().collect();
                match fields.as_slice() {
                    [min, "*", "*", "*", "*"] => parse_step(min, 60),
                    ["0", hour, "*", "*", "*"] => parse_step(hour, 3600),
                    _ => None,
                }
            }
        };

        period
            .filter(|p| *p <= MAX_PERIOD)
            .map(|period| Cadence { expr, period })
            .ok_or_else(invalid)
    }
}

struct ScheduleEntry {
    cadence: Cadence,
    handle: JoinHandle<()>,
}

pub struct JobScheduler {
    manager: DiscoveryJobManager,
    registry: Arc<DiscovererRegistry>,
    schedules: Mutex<HashMap<String, ScheduleEntry>>,
}

impl JobScheduler {
    pub fn new(manager: DiscoveryJobManager, registry: Arc<DiscovererRegistry>) -> Self {
        Self {
            manager,
            registry,
            schedules: Mutex::new(HashMap::new()),
        }
    }

    /// Install (or replace) the schedule of one source. First run is one
    /// period from now.
    pub fn add_schedule(&self, source_name: &str, cadence: &str) -> Result<Cadence, SentinelError> {
        if self.registry.get(source_name).is_none() {
            return Err(SentinelError::UnknownDiscoverer(source_name.to_string()));
        }
        let cadence: Cadence = cadence.parse()?;
        let period = cadence.period();
        let manager = self.manager.clone();
        let name = source_name.to_string();

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                match manager.start_job(vec![name.clone()], JobOptions::default()) {
                    Ok(job_id) => debug!(target: "jobs", source = %name, %job_id, "scheduled run submitted"),
                    Err(e) => warn!(target: "jobs", source = %name, error = %e, "scheduled run not submitted"),
                }
            }
        });

        let mut map = self.schedules.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(old) = map.insert(
            source_name.to_string(),
            ScheduleEntry {
                cadence: cadence.clone(),
                handle,
            },
        ) {
            old.handle.abort();
        }
        info!(target: "jobs", source = source_name, cadence = %cadence, "schedule installed");
        Ok(cadence)
    }

    /// Schedule every available source: its configured cadence, else the
    /// default for its source type. Returns how many were installed.
    pub fn add_default_schedules(&self) -> usize {
        let mut n = 0;
        for name in self.registry.available() {
            let Some(d) = self.registry.get(&name) else {
                continue;
            };
            let fallback = Cadence::default_for(d.source_type());
            let configured = self.registry.config_for(&name).and_then(|c| c.schedule);
            let cadence = configured.as_deref().unwrap_or(fallback);
            let res = match self.add_schedule(&name, cadence) {
                Err(SentinelError::InvalidCadence(bad)) => {
                    warn!(target: "jobs", source = %name, cadence = %bad, fallback, "invalid cadence; using default");
                    self.add_schedule(&name, fallback)
                }
                other => other,
            };
            if res.is_ok() {
                n += 1;
            }
        }
        n
    }

    pub fn remove_schedule(&self, source_name: &str) -> bool {
        match self
            .schedules
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(source_name)
        {
            Some(e) => {
                e.handle.abort();
                true
            }
            None => false,
        }
    }

    /// `(source, cadence)` pairs, sorted by source.
    pub fn schedules(&self) -> Vec<(String, Cadence)> {
        let map = self.schedules.lock().unwrap_or_else(PoisonError::into_inner);
        let mut v: Vec<(String, Cadence)> = map
            .iter()
            .map(|(k, e)| (k.clone(), e.cadence.clone()))
            .collect();
        v.sort_by(|a, b| a.0.cmp(&b.0));
        v
    }

    pub fn shutdown(&self) {
        let mut map = self.schedules.lock().unwrap_or_else(PoisonError::into_inner);
        for (_, e) in map.drain() {
            e.handle.abort();
        }
    }
}

impl Drop for JobScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn period(s: &str) -> Option<Duration> {
        s.parse::<Cadence>().ok().map(|c| c.period())
    }

    #[test]
    fn cadence_forms() {
        assert_eq!(period("@hourly"), Some(Duration::from_secs(3600)));
        assert_eq!(period("@DAILY"), Some(Duration::from_secs(86_400)));
        assert_eq!(period("@weekly"), Some(Duration::from_secs(604_800)));
        assert_eq!(period("every 6h"), Some(Duration::from_secs(21_600)));
        assert_eq!(period("every 90 s"), Some(Duration::from_secs(90)));
        assert_eq!(period("every 2d"), Some(Duration::from_secs(172_800)));
        assert_eq!(period("*/15 * * * *"), Some(Duration::from_secs(900)));
        assert_eq!(period("0 */4 * * *"), Some(Duration::from_secs(14_400)));
    }

    #[test]
    fn bad_cadences_are_rejected() {
        for s in ["", "every 0h", "every h", "every 5y", "@monthly", "5 4 * * *", "*/0 * * * *"] {
            assert!(s.parse::<Cadence>().is_err(), "{s:?} should be rejected");
        }
    }

    #[test]
    fn oversized_periods_are_rejected_not_overflowed() {
        for s in [
            "*/400000000000000000 * * * *",
            "0 */18446744073709551615 * * *",
            "every 18446744073709551615d",
            "every 400d",
            "*/600000 * * * *",
        ] {
            assert!(
                matches!(s.parse::<Cadence>(), Err(SentinelError::InvalidCadence(_))),
                "{s:?} should be rejected"
            );
        }
        assert_eq!(period("every 366d"), Some(MAX_PERIOD));
        assert_eq!(period("0 */8784 * * *"), Some(MAX_PERIOD));
    }

    #[test]
    fn defaults_per_source_type() {
        assert_eq!(Cadence::default_for(SourceType::WebSearch), "every 6h");
        assert_eq!(Cadence::default_for(SourceType::Social), "every 2h");
        assert_eq!(Cadence::default_for(SourceType::BookmarkFeed), "every 1h");
        assert_eq!(Cadence::default_for(SourceType::AiExtraction), "@daily");
    }
}
