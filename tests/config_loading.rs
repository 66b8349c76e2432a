// tests/config_loading.rs
use opportunity_sentinel::config::{
    SentinelConfig, ENV_CONFIG_PATH, ENV_MAX_CONCURRENT_JOBS, ENV_QUALITY_THRESHOLD,
};
use std::{env, fs};

fn clear_env() {
    env::remove_var(ENV_CONFIG_PATH);
    env::remove_var(ENV_MAX_CONCURRENT_JOBS);
    env::remove_var(ENV_QUALITY_THRESHOLD);
}

#[test]
fn load_from_toml_and_json() {
    let dir = tempfile::tempdir().unwrap();

    let p_toml = dir.path().join("sentinel.toml");
    fs::write(
        &p_toml,
        r#"
max_concurrent_jobs = 4
strict_validation = true

[dedup]
title_weight = 0.5
duplicate_threshold = 0.9

[sources.bookmarks]
rate_limit = 12
schedule = "every 30m"
feed_url = "https://example.org/feed.xml"
"#,
    )
    .unwrap();
    let cfg = SentinelConfig::load_from(&p_toml).unwrap();
    assert_eq!(cfg.max_concurrent_jobs, 4);
    assert!(cfg.strict_validation);
    assert!((cfg.dedup.title_weight - 0.5).abs() < 1e-6);
    assert!((cfg.dedup.organization_weight - 0.3).abs() < 1e-6);
    let bm = cfg.source("bookmarks");
    assert_eq!(bm.rate_limit, 12);
    assert_eq!(bm.schedule.as_deref(), Some("every 30m"));
    assert_eq!(bm.feed_url.as_deref(), Some("https://example.org/feed.xml"));

    let p_json = dir.path().join("sentinel.json");
    fs::write(
        &p_json,
        r#"{"quality_threshold": 0.4, "sources": {"serp": {"rate_limit": 0, "daily_quota": 50}}}"#,
    )
    .unwrap();
    let cj = SentinelConfig::load_from(&p_json).unwrap();
    assert!((cj.quality_threshold - 0.4).abs() < 1e-6);
    assert_eq!(cj.source("serp").rate_limit, 1);
    assert_eq!(cj.source("serp").daily_quota, Some(50));
    assert_eq!(cj.max_concurrent_jobs, 5);
}

#[serial_test::serial]
#[test]
fn default_uses_env_then_fallbacks() {
    // Isolate CWD so the test never reads a real config/ directory.
    let old = env::current_dir().unwrap();
    let tmp = tempfile::tempdir().unwrap();
    env::set_current_dir(tmp.path()).unwrap();
    clear_env();

    // 1) Nothing anywhere: built-in defaults.
    let cfg = SentinelConfig::load_default().unwrap();
    assert_eq!(cfg, SentinelConfig::default());

    // 2) Fallback JSON in ./config/
    fs::create_dir_all("config").unwrap();
    fs::write("config/sentinel.json", r#"{"max_concurrent_jobs": 2}"#).unwrap();
    assert_eq!(SentinelConfig::load_default().unwrap().max_concurrent_jobs, 2);

    // 3) TOML wins over JSON
    fs::write("config/sentinel.toml", "max_concurrent_jobs = 3\n").unwrap();
    assert_eq!(SentinelConfig::load_default().unwrap().max_concurrent_jobs, 3);

    // 4) Env path wins over fallbacks; env overrides win over the file.
    let custom = tmp.path().join("custom.toml");
    fs::write(&custom, "max_concurrent_jobs = 7\nquality_threshold = 0.2\n").unwrap();
    env::set_var(ENV_CONFIG_PATH, &custom);
    assert_eq!(SentinelConfig::load_default().unwrap().max_concurrent_jobs, 7);
    env::set_var(ENV_MAX_CONCURRENT_JOBS, "9");
    env::set_var(ENV_QUALITY_THRESHOLD, "0.75");
    let cfg = SentinelConfig::load_default().unwrap();
    assert_eq!(cfg.max_concurrent_jobs, 9);
    assert!((cfg.quality_threshold - 0.75).abs() < 1e-6);

    // 5) Env path to a missing file is an error.
    env::set_var(ENV_CONFIG_PATH, tmp.path().join("missing.toml"));
    assert!(SentinelConfig::load_default().is_err());

    clear_env();
    env::set_current_dir(old).unwrap();
}
