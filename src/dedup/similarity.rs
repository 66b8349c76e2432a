//! Canonical hashing and field-level similarity.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use strsim::{normalized_levenshtein, sorensen_dice};

use crate::config::DedupConfig;
use crate::types::{CandidateOpportunity, SimilarityFactors};

/// Lowercase, punctuation to spaces, whitespace collapsed.
pub fn normalize_for_match(s: &str) -> String {
    let lowered: String = s
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    lowered.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// SHA-256 (hex) of normalized `title|organization|deadline-date`.
pub fn generate_source_hash(
    title: &str,
    organization: Option<&str>,
    deadline: Option<DateTime<Utc>>,
) -> String {
    let key = format!(
        "{}|{}|{}",
        normalize_for_match(title),
        organization.map(normalize_for_match).unwrap_or_default(),
        deadline
            .map(|d| d.date_naive().to_string())
            .unwrap_or_default()
    );
    let digest = Sha256::digest(key.as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

pub fn candidate_hash(c: &CandidateOpportunity) -> String {
    generate_source_hash(&c.title, c.organization.as_deref(), c.deadline)
}

/// Normalized edit / bigram similarity in [0,1]; the higher of the two so
/// both typos and reordered words score well.
pub fn text_similarity(a: &str, b: &str) -> f32 {
    let a = normalize_for_match(a);
    let b = normalize_for_match(b);
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    let lev = normalized_levenshtein(&a, &b);
    let dice = sorensen_dice(&a, &b);
    lev.max(dice).clamp(0.0, 1.0) as f32
}

fn optional_similarity(a: Option<&str>, b: Option<&str>) -> f32 {
    match (a.filter(|s| !s.trim().is_empty()), b.filter(|s| !s.trim().is_empty())) {
        (None, None) => 1.0,
        (Some(x), Some(y)) => text_similarity(x, y),
        _ => 0.0,
    }
}

fn prefix_chars(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}

/// Day-distance buckets: 0d 1.0, ≤1d 0.9, ≤7d 0.7, ≤30d 0.3, else 0.
pub fn deadline_similarity(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> f32 {
    match (a, b) {
        (None, None) => 1.0,
        (Some(x), Some(y)) => {
            let days = (x.date_naive() - y.date_naive()).num_days().abs();
            match days {
                0 => 1.0,
                1 => 0.9,
                2..=7 => 0.7,
                8..=30 => 0.3,
                _ => 0.0,
            }
        }
        _ => 0.0,
    }
}

fn url_key(u: &str) -> (String, String) {
    let u = u.trim().to_ascii_lowercase();
    let rest = u
        .strip_prefix("https://")
        .or_else(|| u.strip_prefix("http://"))
        .unwrap_or(&u);
    let rest = rest.strip_prefix("www.").unwrap_or(rest);
    let rest = rest.split(['?', '#']).next().unwrap_or(rest);
    let rest = rest.trim_end_matches('/');
    match rest.split_once('/') {
        Some((host, path)) => (host.to_string(), path.to_string()),
        None => (rest.to_string(), String::new()),
    }
}

/// 1.0 same page, 0.5 same host, else 0.
pub fn url_similarity(a: &str, b: &str) -> f32 {
    if a.trim().is_empty() || b.trim().is_empty() {
        return 0.0;
    }
    let (ha, pa) = url_key(a);
    let (hb, pb) = url_key(b);
    if ha == hb && pa == pb {
        1.0
    } else if ha == hb {
        0.5
    } else {
        0.0
    }
}

/// Weighted blend and the per-field breakdown.
pub fn score_pair(
    a: &CandidateOpportunity,
    b: &CandidateOpportunity,
    cfg: &DedupConfig,
) -> (f32, SimilarityFactors) {
    let n = cfg.description_prefix_chars;
    let f = SimilarityFactors {
        title: text_similarity(&a.title, &b.title),
        organization: optional_similarity(a.organization.as_deref(), b.organization.as_deref()),
        description: text_similarity(prefix_chars(&a.description, n), prefix_chars(&b.description, n)),
        deadline: deadline_similarity(a.deadline, b.deadline),
        url: url_similarity(&a.url, &b.url),
    };
    let score = cfg.title_weight * f.title
        + cfg.organization_weight * f.organization
        + cfg.description_weight * f.description
        + cfg.deadline_weight * f.deadline
        + cfg.url_weight * f.url;
    (score.clamp(0.0, 1.0), f)
}
