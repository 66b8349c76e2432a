//! # Content validation
//! Independent field checks plus quality metrics for a candidate.
//!
//! Severity table (issue → severity, accuracy penalty):
//!
//! | check                                   | severity | penalty |
//! |-----------------------------------------|----------|---------|
//! | title / description / url missing       | critical | 0.40    |
//! | title < 5 chars, description < 20 chars | error    | 0.30    |
//! | url not absolute http(s)                | error    | 0.30    |
//! | spam pattern                            | error    | 0.30    |
//! | title > 200 chars, description < 50     | warning  | 0.10    |
//! | placeholder text, excessive caps        | warning  | 0.10    |
//! | deadline already passed                 | warning  | 0.10    |
//! | amount without digits, deadline > 2y    | info     | 0.02    |
//! | description > 10000 chars, > 30 tags    | info     | 0.02    |
//!
//! Validation never fails; issues drive accept/flag/reject in the caller.

use chrono::{DateTime, Duration, Utc};
use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use url::Url;

use crate::types::CandidateOpportunity;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    pub fn penalty(self) -> f32 {
        match self {
            Severity::Critical => 0.4,
            Severity::Error => 0.3,
            Severity::Warning => 0.1,
            Severity::Info => 0.02,
        }
    }
}

/// One per-field finding. Never thrown; collected into `ValidationResult`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationIssue {
    pub field: String,
    pub code: String,
    pub severity: Severity,
    pub message: String,
}

impl ValidationIssue {
    fn new(field: &str, code: &str, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            code: code.to_string(),
            severity,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct QualityMetrics {
    pub completeness: f32,
    pub accuracy: f32,
    pub relevance: f32,
    pub freshness: f32,
    pub overall: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub issues: Vec<ValidationIssue>,
    pub metrics: QualityMetrics,
    /// `metrics.overall` below the configured threshold.
    pub low_quality: bool,
}

impl ValidationResult {
    pub fn has_severity(&self, sev: Severity) -> bool {
        self.issues.iter().any(|i| i.severity == sev)
    }

    pub fn count(&self, sev: Severity) -> usize {
        self.issues.iter().filter(|i| i.severity == sev).count()
    }
}

const POSITIVE_KEYWORDS: &[&str] = &[
    "art",
    "arts",
    "artist",
    "artists",
    "artistic",
    "grant",
    "grants",
    "residency",
    "fellowship",
    "commission",
    "exhibition",
    "award",
    "prize",
    "funding",
    "scholarship",
    "studio",
    "curator",
    "curatorial",
    "gallery",
    "museum",
    "creative",
    "painting",
    "painter",
    "sculpture",
    "photography",
    "printmaking",
    "ceramics",
    "illustration",
    "music",
    "composer",
    "dance",
    "choreographer",
    "theater",
    "theatre",
    "film",
    "filmmaker",
    "literature",
    "writer",
    "writers",
    "poet",
    "poetry",
    "performance",
    "installation",
    "mural",
    "submission",
    "submissions",
    "application",
    "stipend",
    "honorarium",
    "competition",
];

const STRONG_PHRASES: &[&str] = &[
    "open call",
    "call for artists",
    "call for entries",
    "call for proposals",
    "call for submissions",
    "artist residency",
    "artist in residence",
    "artist grant",
    "arts funding",
    "public art",
    "fellowship program",
    "project grant",
];

const NEGATIVE_KEYWORDS: &[&str] = &[
    "casino",
    "betting",
    "loan",
    "loans",
    "mortgage",
    "crypto",
    "forex",
    "dating",
    "pharmacy",
    "viagra",
    "mlm",
    "payday",
];

const PLACEHOLDERS: &[&str] = &[
    "lorem ipsum",
    "tbd",
    "tba",
    "untitled",
    "placeholder",
    "click here",
    "coming soon",
    "n/a",
];

fn spam_regex() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(buy now|act now|limited time offer|100% free|guaranteed (income|winner)|earn \$?\d+ (a|per) (day|week)|work from home and earn|crypto giveaway|click (here|below) to claim|casino bonus)\b",
        )
        .unwrap()
    })
}

fn tokenize(s: &str) -> HashSet<String> {
    s.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

fn caps_ratio(s: &str) -> f32 {
    let letters: Vec<char> = s.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.is_empty() {
        return 0.0;
    }
    letters.iter().filter(|c| c.is_uppercase()).count() as f32 / letters.len() as f32
}

fn is_placeholder(s: &str) -> bool {
    let l = s.trim().to_lowercase();
    PLACEHOLDERS
        .iter()
        .any(|p| l == *p || (p.len() > 3 && l.contains(p)))
}

/// Domain-keyword relevance in [0,1], base 0.5.
pub fn relevance_score(c: &CandidateOpportunity) -> f32 {
    let mut text = format!("{} {}", c.title, c.description);
    for t in &c.tags {
        text.push(' ');
        text.push_str(t);
    }
    let lower = text.to_lowercase();
    let tokens = tokenize(&lower);

    let mut score = 0.5f32;
    score += 0.02
        * POSITIVE_KEYWORDS
            .iter()
            .filter(|k| tokens.contains(**k))
            .count() as f32;
    score += 0.1 * STRONG_PHRASES.iter().filter(|p| lower.contains(**p)).count() as f32;
    score -= 0.1
        * NEGATIVE_KEYWORDS
            .iter()
            .filter(|k| tokens.contains(**k))
            .count() as f32;
    score.clamp(0.0, 1.0)
}

/// Deadline proximity: past 0.1, ≤7d 0.9, ≤30d 0.8, ≤90d 0.7, else 0.5, none 0.7.
pub fn freshness_score(deadline: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f32 {
    let Some(d) = deadline else {
        return 0.7;
    };
    if d < now {
        return 0.1;
    }
    let days = (d - now).num_days();
    match days {
        0..=7 => 0.9,
        8..=30 => 0.8,
        31..=90 => 0.7,
        _ => 0.5,
    }
}

/// Fraction of optional fields populated.
pub fn completeness_score(c: &CandidateOpportunity) -> f32 {
    let filled = [
        c.organization.as_deref().is_some_and(|s| !s.trim().is_empty()),
        c.deadline.is_some(),
        c.amount.as_deref().is_some_and(|s| !s.trim().is_empty()),
        c.location.as_deref().is_some_and(|s| !s.trim().is_empty()),
        !c.tags.is_empty(),
    ];
    filled.iter().filter(|b| **b).count() as f32 / filled.len() as f32
}

#[derive(Debug, Clone)]
pub struct ContentValidator {
    strict: bool,
    quality_threshold: f32,
}

impl Default for ContentValidator {
    fn default() -> Self {
        Self::new(false, 0.6)
    }
}

impl ContentValidator {
    pub fn new(strict: bool, quality_threshold: f32) -> Self {
        Self {
            strict,
            quality_threshold: if quality_threshold.is_finite() {
                quality_threshold.clamp(0.0, 1.0)
            } else {
                0.6
            },
        }
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    pub fn validate(&self, c: &CandidateOpportunity) -> ValidationResult {
        self.validate_at(c, Utc::now())
    }

    pub fn validate_at(&self, c: &CandidateOpportunity, now: DateTime<Utc>) -> ValidationResult {
        let issues = check_fields(c, now);

        let penalty: f32 = issues.iter().map(|i| i.severity.penalty()).sum();
        let completeness = completeness_score(c);
        let accuracy = (1.0 - penalty).max(0.0);
        let relevance = relevance_score(c);
        let freshness = freshness_score(c.deadline, now);
        let overall = (0.25 * completeness + 0.35 * accuracy + 0.25 * relevance + 0.15 * freshness)
            .clamp(0.0, 1.0);

        let has_critical = issues.iter().any(|i| i.severity == Severity::Critical);
        let has_error = issues.iter().any(|i| i.severity == Severity::Error);
        let is_valid = !has_critical && !(self.strict && has_error);

        ValidationResult {
            is_valid,
            low_quality: overall < self.quality_threshold,
            issues,
            metrics: QualityMetrics {
                completeness,
                accuracy,
                relevance,
                freshness,
                overall,
            },
        }
    }
}

fn check_fields(c: &CandidateOpportunity, now: DateTime<Utc>) -> Vec<ValidationIssue> {
    use Severity::*;
    let mut out = Vec::new();

    let title = c.title.trim();
    let desc = c.description.trim();
    let url = c.url.trim();

    for (field, value) in [("title", title), ("description", desc), ("url", url)] {
        if value.is_empty() {
            out.push(ValidationIssue::new(
                field,
                "required_field_missing",
                Critical,
                format!("{field} is required"),
            ));
        }
    }

    if !title.is_empty() {
        let n = title.chars().count();
        if n < 5 {
            out.push(ValidationIssue::new("title", "title_too_short", Error, "title shorter than 5 chars"));
        } else if n > 200 {
            out.push(ValidationIssue::new("title", "title_too_long", Warning, "title longer than 200 chars"));
        }
        if is_placeholder(title) {
            out.push(ValidationIssue::new("title", "placeholder_text", Warning, "title looks like placeholder text"));
        }
        if n > 10 && caps_ratio(title) > 0.7 {
            out.push(ValidationIssue::new("title", "excessive_caps", Warning, "title is mostly upper case"));
        }
    }

    if !desc.is_empty() {
        let n = desc.chars().count();
        if n < 20 {
            out.push(ValidationIssue::new(
                "description",
                "description_too_short",
                Error,
                "description shorter than 20 chars",
            ));
        } else if n < 50 {
            out.push(ValidationIssue::new(
                "description",
                "description_short",
                Warning,
                "description shorter than 50 chars",
            ));
        } else if n > 10_000 {
            out.push(ValidationIssue::new(
                "description",
                "description_long",
                Info,
                "description longer than 10000 chars",
            ));
        }
        if is_placeholder(desc) {
            out.push(ValidationIssue::new(
                "description",
                "placeholder_text",
                Warning,
                "description looks like placeholder text",
            ));
        }
    }

    if spam_regex().is_match(title) || spam_regex().is_match(desc) {
        out.push(ValidationIssue::new("description", "spam_pattern", Error, "matches a spam pattern"));
    }

    if !url.is_empty() {
        let ok = Url::parse(url)
            .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
            .unwrap_or(false);
        if !ok {
            out.push(ValidationIssue::new("url", "invalid_url", Error, "url is not an absolute http(s) url"));
        }
    }

    if let Some(d) = c.deadline {
        if d < now {
            out.push(ValidationIssue::new("deadline", "deadline_passed", Warning, "deadline has passed"));
        } else if d > now + Duration::days(730) {
            out.push(ValidationIssue::new("deadline", "deadline_far_future", Info, "deadline more than 2 years out"));
        }
    }

    if let Some(a) = c.amount.as_deref() {
        if !a.chars().any(|ch| ch.is_ascii_digit()) {
            out.push(ValidationIssue::new("amount", "amount_unparseable", Info, "amount carries no number"));
        }
    }

    if c.tags.len() > 30 {
        out.push(ValidationIssue::new("tags", "too_many_tags", Info, "more than 30 tags"));
    }

    out
}
