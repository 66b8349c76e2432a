//! # Data cleaning
//! Field normalization applied to validated candidates before attribution.
//!
//! - Text: entity decode, tag strip, ASCII quotes, collapsed whitespace.
//! - Caps: title 200 chars, description 5000 chars.
//! - Url: lowercase scheme/host, tracking params and fragment dropped, no trailing slash.
//! - Tags: lowercase, trimmed, deduplicated, at most 20.

use once_cell::sync::OnceCell;
use regex::Regex;
use std::collections::BTreeSet;
use url::Url;

use crate::types::CandidateOpportunity;

pub const TITLE_MAX_CHARS: usize = 200;
pub const DESCRIPTION_MAX_CHARS: usize = 5000;
pub const MAX_TAGS: usize = 20;

const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "mc_cid", "mc_eid", "ref_src"];

/// Decode entities, strip tags, normalize quotes and collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'")
        .replace('\u{00A0}', " ");

    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").unwrap());
    re_ws.replace_all(&out, " ").trim().to_string()
}

fn cap_chars(s: String, max: usize) -> String {
    if s.chars().count() > max {
        s.chars().take(max).collect::<String>().trim_end().to_string()
    } else {
        s
    }
}

/// Canonical form of an opportunity url. Unparseable input comes back trimmed.
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let Ok(mut u) = Url::parse(trimmed) else {
        return trimmed.to_string();
    };
    u.set_fragment(None);

    let kept: Vec<(String, String)> = u
        .query_pairs()
        .filter(|(k, _)| {
            let k = k.to_ascii_lowercase();
            !k.starts_with("utm_") && !TRACKING_PARAMS.contains(&k.as_str())
        })
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        u.set_query(None);
    } else {
        u.query_pairs_mut().clear().extend_pairs(kept);
    }

    // `Url` already lowercases scheme and host.
    let mut out = u.to_string();
    if u.query().is_none() && out.ends_with('/') {
        out.pop();
    }
    out
}

/// Whitespace collapsed; currency symbols and separators kept as written.
pub fn normalize_amount(raw: &str) -> Option<String> {
    let out = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    (!out.is_empty()).then_some(out)
}

pub fn normalize_tags(tags: &BTreeSet<String>) -> BTreeSet<String> {
    let all: BTreeSet<String> = tags
        .iter()
        .map(|t| normalize_text(t).to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();
    all.into_iter().take(MAX_TAGS).collect()
}

fn clean_opt(v: &Option<String>) -> Option<String> {
    v.as_deref()
        .map(normalize_text)
        .filter(|s| !s.is_empty())
}

#[derive(Debug, Clone, Default)]
pub struct DataCleaner;

impl DataCleaner {
    pub fn new() -> Self {
        Self
    }

    pub fn clean(&self, c: &CandidateOpportunity) -> CandidateOpportunity {
        CandidateOpportunity {
            title: cap_chars(normalize_text(&c.title), TITLE_MAX_CHARS),
            description: cap_chars(normalize_text(&c.description), DESCRIPTION_MAX_CHARS),
            url: normalize_url(&c.url),
            organization: clean_opt(&c.organization),
            deadline: c.deadline,
            amount: c.amount.as_deref().and_then(normalize_amount),
            location: clean_opt(&c.location),
            tags: normalize_tags(&c.tags),
            source_type: c.source_type,
            source_metadata: c.source_metadata.clone(),
        }
    }
}
