// tests/source_hash.rs
use chrono::{TimeZone, Utc};
use opportunity_sentinel::dedup::generate_source_hash;

#[test]
fn hash_ignores_case_punctuation_and_spacing() {
    let d = Utc.with_ymd_and_hms(2026, 3, 1, 23, 59, 59).single();
    let same_day = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).single();

    let base = generate_source_hash("Open Call: Harbor Mural", Some("City of Harbor"), d);
    let variants = [
        generate_source_hash("open call harbor mural", Some("city of harbor"), d),
        generate_source_hash("  OPEN   CALL -- Harbor   Mural!! ", Some("City of Harbor."), d),
        generate_source_hash("Open Call: Harbor Mural", Some(" City, of Harbor "), same_day),
    ];
    for v in variants {
        assert_eq!(v, base);
    }
    assert_eq!(base.len(), 64);
    assert!(base.chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn hash_changes_with_any_identity_field() {
    let d = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).single();
    let base = generate_source_hash("Harbor Mural", Some("City"), d);
    assert_ne!(base, generate_source_hash("Harbor Murals", Some("City"), d));
    assert_ne!(base, generate_source_hash("Harbor Mural", None, d));
    assert_ne!(base, generate_source_hash("Harbor Mural", Some("City"), None));
    assert_ne!(
        base,
        generate_source_hash("Harbor Mural", Some("City"), Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).single())
    );
}
