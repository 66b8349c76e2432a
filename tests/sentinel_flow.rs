// tests/sentinel_flow.rs
use opportunity_sentinel::jobs::{JobEvent, JobOptions, JobStatus};
use opportunity_sentinel::{
    FeedDiscoverer, InMemoryRepository, OpportunityRepository, SentinelConfig, SentinelError,
    SentinelService,
};
use std::sync::Arc;
use uuid::Uuid;

const FEED_A: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>Calls A</title>
<item><title>Open Call: Harbor Mural</title><link>https://harbor.gov/mural</link>
<description>Budget $20,000 for a public art mural.</description></item>
<item><title>Film Lab Residency</title><link>https://filmlab.org/residency</link>
<description>Two months of editing suites for documentary makers.</description></item>
</channel></rss>"#;

const FEED_B: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>Calls B</title>
<item><title>Open Call: Harbor Mural</title><link>https://harbor.gov/mural?utm_source=rss</link>
<description>Budget $20,000 for a public art mural.</description></item>
<item><title></title><link>https://nowhere.org/x</link></item>
</channel></rss>"#;

async fn service() -> SentinelService {
    let svc = SentinelService::new(SentinelConfig::default(), Arc::new(InMemoryRepository::new()));
    svc.register_discoverer(Arc::new(FeedDiscoverer::from_fixture_str("feed_a", FEED_A)))
        .await
        .unwrap();
    svc.register_discoverer(Arc::new(FeedDiscoverer::from_fixture_str("feed_b", FEED_B)))
        .await
        .unwrap();
    svc
}

#[tokio::test]
async fn job_runs_sources_dedups_and_persists() {
    let svc = service().await;
    let mut rx = svc.subscribe();

    let id = svc
        .start_job(vec!["feed_a".into(), "feed_b".into(), "feed_a".into()], JobOptions::default())
        .unwrap();

    let mut seen = Vec::new();
    loop {
        let ev = rx.recv().await.unwrap();
        if ev.job_id() != id {
            continue;
        }
        let done = ev.is_terminal();
        seen.push(ev);
        if done {
            break;
        }
    }
    assert!(matches!(seen.first(), Some(JobEvent::Started { .. })));
    assert_eq!(
        seen.iter()
            .filter(|e| matches!(e, JobEvent::SourceCompleted { .. }))
            .count(),
        2
    );
    assert!(matches!(seen.last(), Some(JobEvent::Completed { results: 2, .. })));

    let job = svc.get_job_status(id).unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.source_names, vec!["feed_a".to_string(), "feed_b".to_string()]);
    assert_eq!(job.progress, 100.0);
    assert!(job.started_at.is_some() && job.completed_at.is_some());

    let summary = svc.get_job_summary(id).unwrap().unwrap();
    assert_eq!(summary.processed, 3);
    assert_eq!(summary.inserted, 2);
    assert_eq!(summary.linked, 1);
    assert_eq!(summary.rejected, 0);

    assert_eq!(svc.repository().count_active().await.unwrap(), 2);
    // feed_b's copy of the shared item is kept archived under feed_a's record.
    let links = svc.repository().duplicate_links().await.unwrap();
    assert_eq!(links.len(), 1);
    assert_eq!(svc.get_job_results(id, 10, 0).unwrap().len(), 2);
    assert_eq!(svc.get_job_results(id, 1, 1).unwrap().len(), 1);
    assert!(svc.get_job_results(id, 10, 5).unwrap().is_empty());

    let stats = svc.get_queue_stats();
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.pending + stats.running, 0);

    assert!(!svc.stop_job(id), "finished jobs cannot be stopped");

    let report = svc.run_deduplication().await.unwrap();
    assert_eq!(report.processed, 3);
    assert_eq!(report.duplicates_found, 0);
}

#[tokio::test]
async fn bad_requests_are_typed_errors() {
    let svc = service().await;
    assert!(matches!(
        svc.start_job(vec!["nope".into()], JobOptions::default()),
        Err(SentinelError::UnknownDiscoverer(_))
    ));
    assert!(matches!(
        svc.start_job(Vec::new(), JobOptions::default()),
        Err(SentinelError::EmptyJob)
    ));
    assert!(matches!(
        svc.get_job_status(Uuid::new_v4()),
        Err(SentinelError::JobNotFound(_))
    ));
    let dup = svc
        .register_discoverer(Arc::new(FeedDiscoverer::from_fixture_str("feed_a", FEED_A)))
        .await;
    assert!(dup.is_err());
}
