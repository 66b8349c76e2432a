// tests/deadline_sanity_window.rs
use chrono::{Duration, Utc};
use opportunity_sentinel::pipeline::extractor::parse_date;
use opportunity_sentinel::pipeline::DataExtractor;
use opportunity_sentinel::types::{ContentType, RawContent, SourceType};

#[test]
fn deadline_400_days_in_the_past_is_dropped() {
    let stale = (Utc::now() - Duration::days(400)).format("%Y-%m-%d").to_string();
    assert!(parse_date(&stale).is_none());

    let json = serde_json::json!({
        "title": "Community Mural Grant",
        "description": "Funding for a mural painted with neighborhood youth groups.",
        "url": "https://arts.example.org/mural",
        "deadline": stale,
    });
    let raw = RawContent::new(json.to_string(), ContentType::Json);
    let res = DataExtractor::new().extract(&raw, SourceType::WebSearch);

    assert!(res.success);
    let data = res.data.unwrap();
    assert!(data.deadline.is_none());
    assert!(res.warnings.iter().any(|w| w.contains("sanity window")));
}

#[test]
fn dates_inside_the_window_are_kept() {
    let soon = (Utc::now() + Duration::days(30)).format("%B %d, %Y").to_string();
    let parsed = parse_date(&soon).unwrap();
    assert!(parsed > Utc::now());

    let recent = (Utc::now() - Duration::days(200)).format("%Y-%m-%d").to_string();
    assert!(parse_date(&recent).is_some());

    let far = (Utc::now() + Duration::days(6 * 365)).format("%Y-%m-%d").to_string();
    assert!(parse_date(&far).is_none());
}
