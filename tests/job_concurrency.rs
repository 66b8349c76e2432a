// tests/job_concurrency.rs
use async_trait::async_trait;
use opportunity_sentinel::config::SentinelConfig;
use opportunity_sentinel::discovery::{Discoverer, DiscovererRegistry};
use opportunity_sentinel::error::DiscoveryResult;
use opportunity_sentinel::jobs::{DiscoveryJobManager, JobEvent, JobEvents, JobOptions, JobStatus};
use opportunity_sentinel::types::{CandidateOpportunity, DiscoveryContext, SourceType};
use opportunity_sentinel::{InMemoryRepository, SentinelService};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct Gauge {
    now: AtomicUsize,
    peak: AtomicUsize,
    runs: AtomicUsize,
}

struct Slow {
    name: String,
    gauge: Arc<Gauge>,
}

#[async_trait]
impl Discoverer for Slow {
    fn name(&self) -> &str {
        &self.name
    }
    fn source_type(&self) -> SourceType {
        SourceType::WebSearch
    }
    async fn discover(&self, _ctx: Option<&DiscoveryContext>) -> DiscoveryResult<Vec<CandidateOpportunity>> {
        let n = self.gauge.now.fetch_add(1, Ordering::SeqCst) + 1;
        self.gauge.peak.fetch_max(n, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(5)).await;
        self.gauge.now.fetch_sub(1, Ordering::SeqCst);
        self.gauge.runs.fetch_add(1, Ordering::SeqCst);
        let mut c = CandidateOpportunity::new(SourceType::WebSearch);
        c.title = format!("Result from {}", self.name);
        Ok(vec![c])
    }
}

#[tokio::test(start_paused = true)]
async fn never_more_than_max_concurrent_discoverers() {
    let gauge = Arc::new(Gauge::default());
    let reg = Arc::new(DiscovererRegistry::default());
    for i in 0..6 {
        reg.register(Arc::new(Slow {
            name: format!("d{i}"),
            gauge: gauge.clone(),
        }))
        .await
        .unwrap();
    }
    let cfg = SentinelConfig {
        max_concurrent_jobs: 2,
        ..Default::default()
    };
    let mgr = DiscoveryJobManager::new(reg, &cfg, JobEvents::default(), None);
    let mut rx = mgr.subscribe();

    // Three jobs submitted at the same instant, eight discoverer runs in total.
    let a = mgr
        .start_job(vec!["d0".into(), "d1".into(), "d2".into()], JobOptions::default())
        .unwrap();
    let b = mgr
        .start_job(vec!["d3".into(), "d4".into(), "d5".into()], JobOptions::default())
        .unwrap();
    let c = mgr
        .start_job(vec!["d0".into(), "d5".into()], JobOptions::default())
        .unwrap();

    let stats = mgr.get_queue_stats();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.max_concurrent, 2);

    let mut pending: HashSet<_> = [a, b, c].into_iter().collect();
    while !pending.is_empty() {
        match rx.recv().await.unwrap() {
            JobEvent::Completed { job_id, .. } => {
                pending.remove(&job_id);
            }
            JobEvent::Failed { job_id, error } => panic!("job {job_id} failed: {error}"),
            _ => {}
        }
    }

    assert!(gauge.peak.load(Ordering::SeqCst) <= 2);
    assert_eq!(gauge.peak.load(Ordering::SeqCst), 2);
    assert_eq!(gauge.runs.load(Ordering::SeqCst), 8);

    let job_a = mgr.get_job_status(a).unwrap();
    assert_eq!(job_a.status, JobStatus::Completed);
    assert_eq!(job_a.results.len(), 3);
    assert_eq!(job_a.sources.len(), 3);

    let stats = mgr.get_queue_stats();
    assert_eq!(stats.completed, 3);
    assert_eq!(stats.running, 0);
    assert_eq!(stats.available_slots, 2);
}

#[tokio::test(start_paused = true)]
async fn schedules_firing_together_share_the_worker_pool() {
    let gauge = Arc::new(Gauge::default());
    let cfg = SentinelConfig {
        max_concurrent_jobs: 1,
        ..Default::default()
    };
    let svc = SentinelService::new(cfg, Arc::new(InMemoryRepository::new()));
    for i in 0..3 {
        svc.register_discoverer(Arc::new(Slow {
            name: format!("s{i}"),
            gauge: gauge.clone(),
        }))
        .await
        .unwrap();
    }
    let mut rx = svc.subscribe();

    for i in 0..3 {
        svc.add_schedule(&format!("s{i}"), "every 10m").unwrap();
    }

    let mut completed = 0;
    while completed < 3 {
        match rx.recv().await.unwrap() {
            JobEvent::Completed { .. } => completed += 1,
            JobEvent::Failed { job_id, error } => panic!("job {job_id} failed: {error}"),
            _ => {}
        }
    }
    svc.shutdown();

    assert_eq!(gauge.peak.load(Ordering::SeqCst), 1);
    assert_eq!(gauge.runs.load(Ordering::SeqCst), 3);
    assert_eq!(svc.get_queue_stats().available_slots, 1);
}
