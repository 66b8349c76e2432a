// tests/rate_limiter_burst.rs
use opportunity_sentinel::config::SourceConfig;
use opportunity_sentinel::rate_limiter::{RateLimiter, RateLimiterRegistry};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn burst_never_exceeds_limit_per_window() {
    let rl = Arc::new(RateLimiter::per_minute("serp", 5));

    let mut handles = Vec::new();
    for _ in 0..20 {
        let rl = rl.clone();
        handles.push(tokio::spawn(async move {
            rl.acquire().await.unwrap();
            Instant::now()
        }));
    }
    let mut grants = Vec::new();
    for h in handles {
        grants.push(h.await.unwrap());
    }
    grants.sort();

    // Waiters wake together at a window boundary, so each window is one instant.
    let mut groups: Vec<(Instant, usize)> = Vec::new();
    for g in grants {
        match groups.last_mut() {
            Some((t, n)) if *t == g => *n += 1,
            _ => groups.push((g, 1)),
        }
    }
    assert_eq!(groups.len(), 4, "20 requests at 5/window need 4 windows");
    for (_, n) in &groups {
        assert!(*n <= 5, "window granted {n} > 5");
    }
    for pair in groups.windows(2) {
        assert!(pair[1].0 - pair[0].0 <= Duration::from_secs(60));
    }
}

#[tokio::test(start_paused = true)]
async fn daily_quota_fails_fast() {
    let mut sources = HashMap::new();
    sources.insert(
        "serp".to_string(),
        SourceConfig {
            rate_limit: 100,
            daily_quota: Some(3),
            ..Default::default()
        },
    );
    let reg = RateLimiterRegistry::new(sources);
    for _ in 0..3 {
        reg.acquire("serp").await.unwrap();
    }
    let err = reg.acquire("serp").await.unwrap_err();
    assert_eq!(err.source_name, "serp");
    assert_eq!(err.quota, 3);

    // Other sources keep their own budget.
    reg.acquire("feed").await.unwrap();
    assert!(Arc::ptr_eq(&reg.limiter_for("serp"), &reg.limiter_for("serp")));
}
