//! # Job manager
//!
//! Runs discovery jobs against the registry with a bounded worker pool.
//!
//! - At most `max_concurrent_jobs` discoverer runs execute at once, across
//!   all jobs; waiting runs are served FIFO by the semaphore.
//! - Each source of a job runs on its own task; a failing source is recorded
//!   and never fails its siblings. Results are merged once every source of
//!   the job has returned or timed out.
//! - The health check and every attempt are each bounded by the per-run
//!   timeout; retryable failures are retried with backoff.
//! - `stop_job` is cooperative: the job is marked failed/"cancelled" at once,
//!   queued sources never start, in-flight ones finish and are discarded.

use async_trait::async_trait;
use chrono::Utc;
use metrics::{counter, gauge, histogram};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{
    DiscoveryJob, JobEvent, JobEvents, JobOptions, JobRegistry, JobStatus, QueueStats,
    SourceOutcome, CANCELLED,
};
use crate::config::SentinelConfig;
use crate::discovery::{backoff_delay, DiscovererRegistry};
use crate::error::{DiscoveryError, SentinelError};
use crate::types::{CandidateOpportunity, DiscoveryContext};

/// Everything one source returned for a job.
#[derive(Debug, Clone)]
pub struct SourceBatch {
    pub source: String,
    pub version: String,
    pub items: Vec<CandidateOpportunity>,
}

/// Per-job counters after processing. Item failures land in `errors`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BatchOutcome {
    pub processed: usize,
    pub inserted: usize,
    /// Exact duplicates linked to an existing record.
    pub linked: usize,
    /// Fuzzy duplicates archived under a master.
    pub merged: usize,
    pub rejected: usize,
    pub low_quality: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ProcessedBatch {
    pub accepted: Vec<CandidateOpportunity>,
    pub summary: BatchOutcome,
}

/// Post-merge hook: validation, dedup and persistence of a job's results.
#[async_trait]
pub trait JobProcessor: Send + Sync {
    async fn process(&self, job_id: Uuid, batches: Vec<SourceBatch>) -> ProcessedBatch;
}

struct Inner {
    registry: Arc<DiscovererRegistry>,
    jobs: JobRegistry,
    slots: Arc<Semaphore>,
    max_concurrent: usize,
    run_timeout: Duration,
    events: JobEvents,
    processor: Option<Arc<dyn JobProcessor>>,
    cancels: Mutex<HashMap<Uuid, CancellationToken>>,
}

#[derive(Clone)]
pub struct DiscoveryJobManager {
    inner: Arc<Inner>,
}

struct SourceRun {
    outcome: SourceOutcome,
    batch: Option<SourceBatch>,
}

impl SourceRun {
    fn failed(source: &str, attempts: u32, started: Instant, error: impl Into<String>) -> Self {
        Self {
            outcome: SourceOutcome {
                source: source.to_string(),
                success: false,
                items: 0,
                attempts,
                duration_ms: started.elapsed().as_millis() as u64,
                error: Some(error.into()),
            },
            batch: None,
        }
    }
}

impl DiscoveryJobManager {
    pub fn new(
        registry: Arc<DiscovererRegistry>,
        cfg: &SentinelConfig,
        events: JobEvents,
        processor: Option<Arc<dyn JobProcessor>>,
    ) -> Self {
        let max = cfg.max_concurrent_jobs.max(1);
        Self {
            inner: Arc::new(Inner {
                registry,
                jobs: JobRegistry::new(cfg.job_retention),
                slots: Arc::new(Semaphore::new(max)),
                max_concurrent: max,
                run_timeout: cfg.run_timeout(),
                events,
                processor,
                cancels: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.inner.events.subscribe()
    }

    /// Create a job and dispatch it. Returns as soon as the job is queued.
    pub fn start_job(&self, source_names: Vec<String>, options: JobOptions) -> Result<Uuid, SentinelError> {
        let mut sources: Vec<String> = Vec::with_capacity(source_names.len());
        for s in source_names {
            if !sources.contains(&s) {
                sources.push(s);
            }
        }
        if sources.is_empty() {
            return Err(SentinelError::EmptyJob);
        }
        for s in &sources {
            if self.inner.registry.get(s).is_none() {
                return Err(SentinelError::UnknownDiscoverer(s.clone()));
            }
            if !self.inner.registry.is_available(s) {
                return Err(SentinelError::Unavailable(s.clone()));
            }
        }

        let job = DiscoveryJob::new(sources.clone(), options.clone());
        let id = job.id;
        self.inner.jobs.insert(job);
        let token = CancellationToken::new();
        self.inner
            .cancels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, token.clone());

        info!(target: "jobs", job_id = %id, sources = ?sources, "job queued");
        let inner = self.inner.clone();
        tokio::spawn(async move {
            run_job(inner, id, sources, options.context, token).await;
        });
        Ok(id)
    }

    /// Cancel a pending or running job. `false` if unknown or already finished.
    pub fn stop_job(&self, id: Uuid) -> bool {
        let changed = self
            .inner
            .jobs
            .update(id, |j| {
                if j.status.is_terminal() {
                    return false;
                }
                j.status = JobStatus::Failed;
                j.error = Some(CANCELLED.to_string());
                j.completed_at = Some(Utc::now());
                true
            })
            .unwrap_or(false);
        if !changed {
            return false;
        }
        if let Some(t) = self
            .inner
            .cancels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
        {
            t.cancel();
        }
        info!(target: "jobs", job_id = %id, "job cancelled");
        self.inner.events.emit(JobEvent::Failed {
            job_id: id,
            error: CANCELLED.to_string(),
        });
        true
    }

    pub fn get_job_status(&self, id: Uuid) -> Option<DiscoveryJob> {
        self.inner.jobs.get(id)
    }

    pub fn get_job_results(
        &self,
        id: Uuid,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<CandidateOpportunity>, SentinelError> {
        let job = self.inner.jobs.get(id).ok_or(SentinelError::JobNotFound(id))?;
        Ok(job.results.into_iter().skip(offset).take(limit).collect())
    }

    pub fn get_queue_stats(&self) -> QueueStats {
        let (pending, running, completed, failed) = self.inner.jobs.counts();
        QueueStats {
            pending,
            running,
            completed,
            failed,
            total: pending + running + completed + failed,
            max_concurrent: self.inner.max_concurrent,
            available_slots: self.inner.slots.available_permits(),
        }
    }
}

async fn run_job(
    inner: Arc<Inner>,
    job_id: Uuid,
    sources: Vec<String>,
    context: Option<DiscoveryContext>,
    token: CancellationToken,
) {
    let total = sources.len();
    let mut set = JoinSet::new();
    for name in sources {
        let inner = inner.clone();
        let token = token.clone();
        let context = context.clone();
        set.spawn(async move { run_source(&inner, job_id, &name, context.as_ref(), &token).await });
    }

    let mut done = 0usize;
    let mut batches: Vec<SourceBatch> = Vec::new();
    let mut failures: Vec<String> = Vec::new();
    while let Some(joined) = set.join_next().await {
        done += 1;
        let run = match joined {
            Ok(r) => r,
            Err(e) => {
                warn!(target: "jobs", %job_id, error = %e, "source task aborted");
                failures.push(format!("source task aborted: {e}"));
                continue;
            }
        };
        let outcome = run.outcome.clone();
        inner.jobs.update(job_id, |j| {
            j.progress = done as f32 / total as f32 * 100.0;
            j.sources.push(outcome.clone());
        });
        if token.is_cancelled() {
            continue;
        }
        if outcome.success {
            inner.events.emit(JobEvent::SourceCompleted {
                job_id,
                source: outcome.source.clone(),
                items: outcome.items,
            });
        } else {
            let err = outcome.error.clone().unwrap_or_default();
            failures.push(format!("{}: {err}", outcome.source));
            inner.events.emit(JobEvent::SourceFailed {
                job_id,
                source: outcome.source.clone(),
                error: err,
            });
        }
        if let Some(b) = run.batch {
            batches.push(b);
        }
    }

    inner
        .cancels
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(&job_id);

    if token.is_cancelled() {
        debug!(target: "jobs", %job_id, discarded = batches.len(), "cancelled job results discarded");
        return;
    }

    if batches.is_empty() && !failures.is_empty() {
        let error = format!("all sources failed: {}", failures.join("; "));
        let changed = inner
            .jobs
            .update(job_id, |j| {
                if j.status.is_terminal() {
                    return false;
                }
                j.status = JobStatus::Failed;
                j.error = Some(error.clone());
                j.completed_at = Some(Utc::now());
                true
            })
            .unwrap_or(false);
        if changed {
            warn!(target: "jobs", %job_id, %error, "job failed");
            inner.events.emit(JobEvent::Failed { job_id, error });
        }
        return;
    }

    let (results, summary) = match &inner.processor {
        Some(p) => {
            let processed = p.process(job_id, batches).await;
            (processed.accepted, Some(processed.summary))
        }
        None => (batches.into_iter().flat_map(|b| b.items).collect(), None),
    };
    let count = results.len();

    let changed = inner
        .jobs
        .update(job_id, move |j| {
            if j.status.is_terminal() {
                return false;
            }
            j.status = JobStatus::Completed;
            j.progress = 100.0;
            j.started_at.get_or_insert_with(Utc::now);
            j.completed_at = Some(Utc::now());
            j.results = results;
            j.summary = summary;
            true
        })
        .unwrap_or(false);
    if changed {
        info!(target: "jobs", %job_id, results = count, "job completed");
        inner.events.emit(JobEvent::Completed {
            job_id,
            results: count,
        });
    }
}

async fn run_source(
    inner: &Inner,
    job_id: Uuid,
    name: &str,
    context: Option<&DiscoveryContext>,
    token: &CancellationToken,
) -> SourceRun {
    let queued = Instant::now();

    let permit = tokio::select! {
        biased;
        _ = token.cancelled() => return SourceRun::failed(name, 0, queued, CANCELLED),
        p = inner.slots.clone().acquire_owned() => match p {
            Ok(p) => p,
            Err(_) => return SourceRun::failed(name, 0, queued, "worker pool closed"),
        },
    };

    let first = inner
        .jobs
        .update(job_id, |j| {
            if j.status == JobStatus::Pending {
                j.status = JobStatus::Running;
                j.started_at = Some(Utc::now());
                true
            } else {
                false
            }
        })
        .unwrap_or(false);
    if first {
        let sources = inner
            .jobs
            .get(job_id)
            .map(|j| j.source_names)
            .unwrap_or_default();
        inner.events.emit(JobEvent::Started { job_id, sources });
    }

    gauge!("jobs_running").increment(1.0);
    let run = run_discoverer(inner, name, context, token).await;
    gauge!("jobs_running").decrement(1.0);
    drop(permit);
    run
}

async fn run_discoverer(
    inner: &Inner,
    name: &str,
    context: Option<&DiscoveryContext>,
    token: &CancellationToken,
) -> SourceRun {
    let started = Instant::now();
    let Some(discoverer) = inner.registry.get(name) else {
        return SourceRun::failed(name, 0, started, format!("unknown discoverer `{name}`"));
    };
    let cfg = inner
        .registry
        .config_for(name)
        .unwrap_or_else(|| discoverer.default_config());

    match tokio::time::timeout(inner.run_timeout, discoverer.check_health()).await {
        Ok(true) => {}
        Ok(false) => {
            counter!("discovery_errors_total", "source" => name.to_string()).increment(1);
            warn!(target: "discovery", source = name, "health check failed; run skipped");
            return SourceRun::failed(name, 0, started, "health check failed");
        }
        Err(_) => {
            counter!("discovery_errors_total", "source" => name.to_string()).increment(1);
            let e = DiscoveryError::Timeout(inner.run_timeout);
            warn!(target: "discovery", source = name, error = %e, "health check timed out; run skipped");
            return SourceRun::failed(name, 0, started, e.to_string());
        }
    }

    let max_attempts = cfg.retry_attempts.saturating_add(1);
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        counter!("discovery_runs_total", "source" => name.to_string()).increment(1);

        let result = match tokio::time::timeout(inner.run_timeout, discoverer.discover(context)).await {
            Ok(r) => r,
            Err(_) => Err(DiscoveryError::Timeout(inner.run_timeout)),
        };

        match result {
            Ok(items) => {
                let ms = started.elapsed().as_millis() as u64;
                histogram!("discovery_run_ms", "source" => name.to_string()).record(ms as f64);
                counter!("discovery_items_total", "source" => name.to_string()).increment(items.len() as u64);
                info!(target: "discovery", source = name, items = items.len(), attempt, ms, "discoverer run finished");
                return SourceRun {
                    outcome: SourceOutcome {
                        source: name.to_string(),
                        success: true,
                        items: items.len(),
                        attempts: attempt,
                        duration_ms: ms,
                        error: None,
                    },
                    batch: Some(SourceBatch {
                        source: name.to_string(),
                        version: discoverer.version().to_string(),
                        items,
                    }),
                };
            }
            Err(e) => {
                counter!("discovery_errors_total", "source" => name.to_string()).increment(1);
                if !e.is_retryable() || attempt >= max_attempts {
                    warn!(target: "discovery", source = name, attempt, error = %e, "discoverer run failed");
                    return SourceRun::failed(name, attempt, started, e.to_string());
                }
                let delay = backoff_delay(attempt - 1);
                debug!(target: "discovery", source = name, attempt, error = %e, delay_ms = delay.as_millis() as u64, "retrying");
                tokio::select! {
                    _ = token.cancelled() => return SourceRun::failed(name, attempt, started, CANCELLED),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::Discoverer;
    use crate::error::DiscoveryResult;
    use crate::types::SourceType;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Flaky {
        fails_left: AtomicU32,
        retryable: bool,
    }

    #[async_trait]
    impl Discoverer for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }
        fn source_type(&self) -> SourceType {
            SourceType::WebSearch
        }
        async fn discover(&self, _c: Option<&DiscoveryContext>) -> DiscoveryResult<Vec<CandidateOpportunity>> {
            if self.fails_left.load(Ordering::SeqCst) > 0 {
                self.fails_left.fetch_sub(1, Ordering::SeqCst);
                return Err(if self.retryable {
                    DiscoveryError::Timeout(Duration::from_secs(1))
                } else {
                    DiscoveryError::Parse("bad".into())
                });
            }
            Ok(vec![CandidateOpportunity::new(SourceType::WebSearch)])
        }
    }

    async fn manager_with(d: Flaky) -> DiscoveryJobManager {
        let reg = Arc::new(DiscovererRegistry::default());
        reg.register(Arc::new(d)).await.unwrap();
        DiscoveryJobManager::new(reg, &SentinelConfig::default(), JobEvents::default(), None)
    }

    async fn wait_terminal(m: &DiscoveryJobManager, id: Uuid) -> DiscoveryJob {
        let mut rx = m.subscribe();
        loop {
            if let Some(j) = m.get_job_status(id) {
                if j.status.is_terminal() {
                    return j;
                }
            }
            let _ = tokio::time::timeout(Duration::from_secs(60), rx.recv()).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retryable_errors_are_retried_with_backoff() {
        let m = manager_with(Flaky {
            fails_left: AtomicU32::new(2),
            retryable: true,
        })
        .await;
        let id = m.start_job(vec!["flaky".into()], JobOptions::default()).unwrap();
        let job = wait_terminal(&m, id).await;
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.sources[0].attempts, 3);
        assert_eq!(job.results.len(), 1);
        assert_eq!(job.progress, 100.0);
    }

    #[tokio::test(start_paused = true)]
    async fn parse_errors_are_not_retried() {
        let m = manager_with(Flaky {
            fails_left: AtomicU32::new(1),
            retryable: false,
        })
        .await;
        let id = m.start_job(vec!["flaky".into()], JobOptions::default()).unwrap();
        let job = wait_terminal(&m, id).await;
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.sources[0].attempts, 1);
        assert!(job.error.unwrap().contains("all sources failed"));
    }

    struct Hanging;

    #[async_trait]
    impl Discoverer for Hanging {
        fn name(&self) -> &str {
            "hanging"
        }
        fn source_type(&self) -> SourceType {
            SourceType::Social
        }
        async fn check_health(&self) -> bool {
            std::future::pending::<bool>().await
        }
        async fn discover(&self, _c: Option<&DiscoveryContext>) -> DiscoveryResult<Vec<CandidateOpportunity>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_health_check_times_out_and_frees_the_slot() {
        let reg = Arc::new(DiscovererRegistry::default());
        reg.register(Arc::new(Hanging)).await.unwrap();
        let cfg = SentinelConfig {
            max_concurrent_jobs: 1,
            discoverer_run_timeout_ms: 1_000,
            ..SentinelConfig::default()
        };
        let m = DiscoveryJobManager::new(reg, &cfg, JobEvents::default(), None);

        let id = m.start_job(vec!["hanging".into()], JobOptions::default()).unwrap();
        let job = wait_terminal(&m, id).await;
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.sources[0].error.as_deref().unwrap_or_default().contains("timed out"));
        assert_eq!(m.get_queue_stats().available_slots, 1);
    }

    #[tokio::test]
    async fn unknown_and_empty_jobs_are_rejected() {
        let m = manager_with(Flaky {
            fails_left: AtomicU32::new(0),
            retryable: false,
        })
        .await;
        assert!(matches!(m.start_job(vec![], JobOptions::default()), Err(SentinelError::EmptyJob)));
        assert!(matches!(
            m.start_job(vec!["nope".into()], JobOptions::default()),
            Err(SentinelError::UnknownDiscoverer(_))
        ));
        assert!(!m.stop_job(Uuid::new_v4()));
        assert!(matches!(
            m.get_job_results(Uuid::new_v4(), 10, 0),
            Err(SentinelError::JobNotFound(_))
        ));
    }
}
