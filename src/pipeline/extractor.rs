//! # Data extraction
//! Turns raw HTML / JSON / text / XML into a partial `CandidateOpportunity`.
//!
//! - HTML: ordered CSS selector candidates per field, first non-empty wins;
//!   description takes the longest candidate over 100 chars. JSON-LD and
//!   regex scans fill what selectors miss.
//! - JSON: ordered key aliases per field; a nested `opportunity` / `job` /
//!   `grant` object is extracted too and overlaid on the outer record.
//! - Text: first non-empty line is the title, the whole text the description,
//!   regexes pick up url / date / currency.
//! - XML: self-closing tags expanded, then treated as HTML.
//!
//! Dates outside `[now - 1 year, now + 5 years]` are dropped.
//! Nothing here panics or returns `Err`; failures come back as
//! `ExtractionResult { success: false, errors, .. }`.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::{Lazy, OnceCell};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::{format_description::well_known::Rfc2822, OffsetDateTime};

use crate::types::{CandidateOpportunity, ContentType, RawContent, SourceType};

/// Minimum length for a description candidate to be considered "substantial".
const DESCRIPTION_MIN_PREFERRED: usize = 100;
const TITLE_MAX_CHARS: usize = 200;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractionResult {
    pub success: bool,
    pub data: Option<CandidateOpportunity>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    /// Share of canonical fields that were populated, in [0,1].
    pub confidence: f32,
}

impl ExtractionResult {
    fn failure(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            errors: vec![reason.into()],
            warnings: Vec::new(),
            confidence: 0.0,
        }
    }
}

/* ----------------------------
Selector tables
---------------------------- */

struct FieldSelector {
    sel: Selector,
    /// Read this attribute instead of the element text.
    attr: Option<&'static str>,
}

fn compile(specs: &[(&str, Option<&'static str>)]) -> Vec<FieldSelector> {
    specs
        .iter()
        .filter_map(|(s, attr)| {
            Selector::parse(s)
                .ok()
                .map(|sel| FieldSelector { sel, attr: *attr })
        })
        .collect()
}

static TITLE_SELECTORS: Lazy<Vec<FieldSelector>> = Lazy::new(|| {
    compile(&[
        (".opportunity-title", None),
        (".grant-title", None),
        (".job-title", None),
        ("[itemprop='title']", None),
        ("h1", None),
        ("meta[property='og:title']", Some("content")),
        ("title", None),
        ("h2", None),
    ])
});

static ORGANIZATION_SELECTORS: Lazy<Vec<FieldSelector>> = Lazy::new(|| {
    compile(&[
        (".organization", None),
        (".org-name", None),
        (".funder", None),
        (".company", None),
        ("[itemprop='hiringOrganization']", None),
        ("meta[property='og:site_name']", Some("content")),
    ])
});

static DESCRIPTION_SELECTORS: Lazy<Vec<FieldSelector>> = Lazy::new(|| {
    compile(&[
        (".opportunity-description", None),
        (".description", None),
        (".job-description", None),
        ("[itemprop='description']", None),
        ("article", None),
        ("main", None),
        ("meta[name='description']", Some("content")),
        ("meta[property='og:description']", Some("content")),
        ("p", None),
    ])
});

static DEADLINE_SELECTORS: Lazy<Vec<FieldSelector>> = Lazy::new(|| {
    compile(&[
        (".deadline", None),
        (".due-date", None),
        (".closing-date", None),
        ("[itemprop='validThrough']", None),
        ("time[datetime]", Some("datetime")),
    ])
});

static AMOUNT_SELECTORS: Lazy<Vec<FieldSelector>> = Lazy::new(|| {
    compile(&[
        (".amount", None),
        (".award", None),
        (".funding", None),
        (".salary", None),
        ("[itemprop='baseSalary']", None),
    ])
});

static LOCATION_SELECTORS: Lazy<Vec<FieldSelector>> = Lazy::new(|| {
    compile(&[
        (".location", None),
        ("[itemprop='jobLocation']", None),
        (".venue", None),
        (".address", None),
    ])
});

static TAG_SELECTORS: Lazy<Vec<FieldSelector>> = Lazy::new(|| {
    compile(&[
        (".tags a", None),
        (".tag", None),
        (".category", None),
        ("a[rel='tag']", None),
        ("meta[name='keywords']", Some("content")),
    ])
});

static URL_SELECTORS: Lazy<Vec<FieldSelector>> = Lazy::new(|| {
    compile(&[
        ("link[rel='canonical']", Some("href")),
        ("meta[property='og:url']", Some("content")),
    ])
});

static JSON_LD_SELECTOR: Lazy<Option<Selector>> =
    Lazy::new(|| Selector::parse("script[type='application/ld+json']").ok());

static BODY_SELECTOR: Lazy<Option<Selector>> = Lazy::new(|| Selector::parse("body").ok());

/* ----------------------------
JSON key aliases
---------------------------- */

const TITLE_KEYS: &[&str] = &["title", "name", "headline", "position", "job_title"];
const DESCRIPTION_KEYS: &[&str] = &["description", "summary", "content", "body", "details"];
const URL_KEYS: &[&str] = &["url", "link", "href", "applicationUrl", "apply_url", "website"];
const ORGANIZATION_KEYS: &[&str] = &[
    "organization",
    "organisation",
    "org",
    "company",
    "hiringOrganization",
    "funder",
    "sponsor",
    "host",
];
const DEADLINE_KEYS: &[&str] = &[
    "deadline",
    "applicationDeadline",
    "application_deadline",
    "due_date",
    "dueDate",
    "closingDate",
    "validThrough",
    "expires",
];
const AMOUNT_KEYS: &[&str] = &[
    "amount",
    "award",
    "funding",
    "prize",
    "stipend",
    "salary",
    "compensation",
    "baseSalary",
];
const LOCATION_KEYS: &[&str] = &["location", "city", "place", "jobLocation", "address"];
const TAG_KEYS: &[&str] = &["tags", "keywords", "categories", "disciplines"];
const NESTED_KEYS: &[&str] = &["opportunity", "job", "grant"];

/* ----------------------------
Regexes
---------------------------- */

fn re_url() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r#"https?://[^\s<>"')\]]+"#).unwrap())
}

fn re_currency() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)(?:[$£€]\s?\d[\d,]*(?:\.\d{1,2})?(?:\s?[kKmM]\b)?(?:\s?(?:-|–|to)\s?[$£€]?\s?\d[\d,]*(?:\.\d{1,2})?)?|\b\d[\d,]*(?:\.\d{1,2})?\s?(?:USD|EUR|GBP|CAD|AUD|dollars|euros|pounds)\b)",
        )
        .unwrap()
    })
}

fn re_deadline_context() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)(?:deadline|due(?:\s+date)?|closing\s+date|closes|apply\s+by|submissions?\s+close)\s*(?:is|on|:|-)?\s*([A-Za-z0-9,./\- ]{6,32})",
        )
        .unwrap()
    })
}

fn re_date_any() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(?:\d{4}-\d{2}-\d{2}|\d{1,2}/\d{1,2}/\d{4}|(?:jan|feb|mar|apr|may|jun|jul|aug|sep|sept|oct|nov|dec)[a-z]*\.?\s+\d{1,2}(?:st|nd|rd|th)?,?\s+\d{4}|\d{1,2}(?:st|nd|rd|th)?\s+(?:jan|feb|mar|apr|may|jun|jul|aug|sep|sept|oct|nov|dec)[a-z]*\.?,?\s+\d{4})\b",
        )
        .unwrap()
    })
}

fn re_ordinal() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(\d{1,2})(?:st|nd|rd|th)\b").unwrap())
}

fn re_self_closing() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"<([A-Za-z][\w:.-]*)((?:\s[^<>]*?)?)\s*/>").unwrap())
}

fn re_xml_decl() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"(?s)<\?xml.*?\?>").unwrap())
}

fn re_cdata() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"(?s)<!\[CDATA\[(.*?)\]\]>").unwrap())
}

fn re_ws() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"\s+").unwrap())
}

/// Keywords harvested as tags when no explicit tags are present.
const TAG_VOCABULARY: &[&str] = &[
    "residency",
    "grant",
    "fellowship",
    "commission",
    "exhibition",
    "open call",
    "competition",
    "prize",
    "award",
    "scholarship",
    "job",
    "internship",
    "public art",
    "mural",
    "photography",
    "painting",
    "sculpture",
    "music",
    "dance",
    "film",
    "writing",
    "performance",
];

/* ----------------------------
Date parsing
---------------------------- */

/// Parse a date in any of the common formats and keep it only when it falls
/// within `[now - 1 year, now + 5 years]`.
pub fn parse_date(input: &str) -> Option<DateTime<Utc>> {
    parse_date_at(input, Utc::now())
}

/// Same as [`parse_date`] with an explicit "now".
pub fn parse_date_at(input: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let dt = parse_date_unchecked(input)?;
    within_sanity_window(dt, now).then_some(dt)
}

fn within_sanity_window(dt: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    let lower = now - Duration::days(365);
    let upper = now + Duration::days(5 * 365);
    dt >= lower && dt <= upper
}

fn parse_date_unchecked(input: &str) -> Option<DateTime<Utc>> {
    let s = input.trim().trim_end_matches(['.', ',', ';']).trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(odt) = OffsetDateTime::parse(s, &Rfc2822) {
        return Utc.timestamp_opt(odt.unix_timestamp(), 0).single();
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&ndt));
        }
    }

    let cleaned = re_ordinal().replace_all(s, "$1").to_string();
    let cleaned = cleaned.replace("Sept", "Sep").replace("sept", "sep");
    for fmt in [
        "%Y-%m-%d",
        "%Y/%m/%d",
        "%m/%d/%Y",
        "%d.%m.%Y",
        "%B %d, %Y",
        "%B %d %Y",
        "%b %d, %Y",
        "%b %d %Y",
        "%b. %d, %Y",
        "%d %B %Y",
        "%d %b %Y",
        "%d %B, %Y",
        "%A, %B %d, %Y",
    ] {
        if let Ok(d) = NaiveDate::parse_from_str(&cleaned, fmt) {
            return d.and_hms_opt(23, 59, 59).map(|ndt| Utc.from_utc_datetime(&ndt));
        }
    }

    // Unix seconds (or millis) as text.
    if let Ok(n) = s.parse::<i64>() {
        let secs = if n > 10_000_000_000 { n / 1000 } else { n };
        if secs > 0 {
            return Utc.timestamp_opt(secs, 0).single();
        }
    }
    None
}

/// Find the first plausible deadline in free text: context phrases first, then any date.
pub fn find_deadline(text: &str) -> Option<DateTime<Utc>> {
    let in_context = re_deadline_context()
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .filter_map(|m| re_date_any().find(m.as_str()))
        .find_map(|d| parse_date(d.as_str()));
    if in_context.is_some() {
        return in_context;
    }
    re_date_any()
        .find_iter(text)
        .find_map(|m| parse_date(m.as_str()))
}

/// First currency-looking amount in free text.
pub fn find_amount(text: &str) -> Option<String> {
    re_currency()
        .find(text)
        .map(|m| m.as_str().trim().to_string())
}

/// First http(s) url in free text, trailing punctuation removed.
pub fn find_url(text: &str) -> Option<String> {
    re_url()
        .find(text)
        .map(|m| m.as_str().trim_end_matches(['.', ',', ';', ':']).to_string())
}

fn collapse_ws(s: &str) -> String {
    re_ws().replace_all(s, " ").trim().to_string()
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        s.chars().take(max).collect()
    } else {
        s.to_string()
    }
}

fn harvest_tags(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    TAG_VOCABULARY
        .iter()
        .filter(|k| lower.contains(*k))
        .map(|k| k.to_string())
        .collect()
}

/* ----------------------------
Extractor
---------------------------- */

/// Stateless converter from raw content to a partial canonical record.
#[derive(Debug, Clone, Default)]
pub struct DataExtractor;

/// Accumulates per-field state while one payload is extracted.
struct Draft {
    candidate: CandidateOpportunity,
    warnings: Vec<String>,
}

impl Draft {
    fn new(source_type: SourceType) -> Self {
        Self {
            candidate: CandidateOpportunity::new(source_type),
            warnings: Vec::new(),
        }
    }

    fn set_deadline_from(&mut self, raw: &str) {
        if self.candidate.deadline.is_some() {
            return;
        }
        match parse_date_unchecked(raw) {
            Some(dt) if within_sanity_window(dt, Utc::now()) => self.candidate.deadline = Some(dt),
            Some(_) => self
                .warnings
                .push(format!("deadline `{}` outside sanity window, dropped", raw.trim())),
            None => self
                .warnings
                .push(format!("unparseable deadline `{}`", truncate_chars(raw.trim(), 40))),
        }
    }
}

impl DataExtractor {
    pub fn new() -> Self {
        Self
    }

    pub fn extract(&self, raw: &RawContent, source_type: SourceType) -> ExtractionResult {
        if raw.content.trim().is_empty() {
            return ExtractionResult::failure("empty content");
        }

        let outcome = match raw.content_type {
            ContentType::Html => Ok(self.extract_html(&raw.content, source_type)),
            ContentType::Json => self.extract_json(&raw.content, source_type),
            ContentType::Text => Ok(self.extract_text(&raw.content, source_type)),
            ContentType::Xml => Ok(self.extract_html(&xml_to_html(&raw.content), source_type)),
        };

        let mut draft = match outcome {
            Ok(d) => d,
            Err(reason) => return ExtractionResult::failure(reason),
        };

        if draft.candidate.url.trim().is_empty() {
            if let Some(u) = raw.source_url.as_deref().filter(|u| !u.trim().is_empty()) {
                draft.candidate.url = u.trim().to_string();
            }
        }
        for (k, v) in &raw.metadata {
            draft
                .candidate
                .source_metadata
                .entry(k.clone())
                .or_insert_with(|| v.clone());
        }

        let c = &draft.candidate;
        if c.title.trim().is_empty() && c.description.trim().is_empty() {
            return ExtractionResult {
                success: false,
                data: None,
                errors: vec!["no recognizable opportunity fields".to_string()],
                warnings: draft.warnings,
                confidence: 0.0,
            };
        }

        let filled = [
            !c.title.is_empty(),
            !c.description.is_empty(),
            !c.url.is_empty(),
            c.organization.is_some(),
            c.deadline.is_some(),
            c.amount.is_some(),
            c.location.is_some(),
            !c.tags.is_empty(),
        ]
        .iter()
        .filter(|b| **b)
        .count();

        ExtractionResult {
            success: true,
            confidence: filled as f32 / 8.0,
            data: Some(draft.candidate),
            errors: Vec::new(),
            warnings: draft.warnings,
        }
    }

    /* -------- HTML -------- */

    fn extract_html(&self, html: &str, source_type: SourceType) -> Draft {
        let doc = Html::parse_document(html);
        let mut d = Draft::new(source_type);

        if let Some(t) = first_match(&doc, &TITLE_SELECTORS) {
            d.candidate.title = truncate_chars(&t, TITLE_MAX_CHARS);
        }
        d.candidate.organization = first_match(&doc, &ORGANIZATION_SELECTORS);
        if let Some(desc) = best_description(&doc) {
            d.candidate.description = desc;
        }
        if let Some(raw) = first_match(&doc, &DEADLINE_SELECTORS) {
            d.set_deadline_from(&raw);
        }
        d.candidate.amount = first_match(&doc, &AMOUNT_SELECTORS);
        d.candidate.location = first_match(&doc, &LOCATION_SELECTORS);
        for sel in TAG_SELECTORS.iter() {
            for v in all_matches(&doc, sel) {
                for t in v.split(',') {
                    let t = t.trim().to_lowercase();
                    if !t.is_empty() {
                        d.candidate.tags.insert(t);
                    }
                }
            }
        }
        if let Some(u) = first_match(&doc, &URL_SELECTORS) {
            d.candidate.url = u;
        }

        self.apply_json_ld(&doc, &mut d);

        // Regex fallbacks over the visible text.
        let body_text = BODY_SELECTOR
            .as_ref()
            .and_then(|s| doc.select(s).next())
            .map(|el| collapse_ws(&el.text().collect::<Vec<_>>().join(" ")))
            .unwrap_or_default();
        if d.candidate.deadline.is_none() {
            d.candidate.deadline = find_deadline(&body_text);
        }
        if d.candidate.amount.is_none() {
            d.candidate.amount = find_amount(&body_text);
        }
        if d.candidate.tags.is_empty() {
            let haystack = format!("{} {}", d.candidate.title, d.candidate.description);
            d.candidate.tags.extend(harvest_tags(&haystack));
        }
        d
    }

    fn apply_json_ld(&self, doc: &Html, d: &mut Draft) {
        let Some(sel) = JSON_LD_SELECTOR.as_ref() else {
            return;
        };
        for el in doc.select(sel) {
            let text = el.text().collect::<String>();
            let Ok(v) = serde_json::from_str::<Value>(text.trim()) else {
                d.warnings.push("unparseable JSON-LD block skipped".to_string());
                continue;
            };
            let Some(obj) = find_ld_object(&v) else {
                continue;
            };
            let mut ld = Draft::new(d.candidate.source_type);
            fill_from_object(obj, &mut ld);
            d.candidate.fill_missing_from(&ld.candidate);
            d.warnings.extend(ld.warnings);
        }
    }

    /* -------- JSON -------- */

    fn extract_json(&self, content: &str, source_type: SourceType) -> Result<Draft, String> {
        let v: Value =
            serde_json::from_str(content).map_err(|e| format!("invalid JSON: {e}"))?;
        let obj = match &v {
            Value::Object(map) => map,
            Value::Array(items) => items
                .iter()
                .find_map(|i| i.as_object())
                .ok_or_else(|| "JSON array holds no objects".to_string())?,
            _ => return Err("expected a JSON object".to_string()),
        };

        let mut d = Draft::new(source_type);
        fill_from_object(obj, &mut d);

        for key in NESTED_KEYS {
            if let Some(Value::Object(nested)) = obj.get(*key) {
                let mut inner = Draft::new(source_type);
                fill_from_object(nested, &mut inner);
                d.candidate.overlay(&inner.candidate);
                d.warnings.extend(inner.warnings);
                break;
            }
        }
        Ok(d)
    }

    /* -------- Text -------- */

    fn extract_text(&self, content: &str, source_type: SourceType) -> Draft {
        let mut d = Draft::new(source_type);
        if let Some(first) = content.lines().map(str::trim).find(|l| !l.is_empty()) {
            d.candidate.title = truncate_chars(first, TITLE_MAX_CHARS);
        }
        d.candidate.description = content.trim().to_string();
        if let Some(u) = find_url(content) {
            d.candidate.url = u;
        }
        d.candidate.deadline = find_deadline(content);
        d.candidate.amount = find_amount(content);
        d.candidate.tags.extend(harvest_tags(content));
        d
    }
}

/* ----------------------------
HTML helpers
---------------------------- */

fn element_value(el: ElementRef<'_>, attr: Option<&str>) -> String {
    match attr {
        Some(a) => el.value().attr(a).map(collapse_ws).unwrap_or_default(),
        None => collapse_ws(&el.text().collect::<Vec<_>>().join(" ")),
    }
}

fn first_match(doc: &Html, selectors: &[FieldSelector]) -> Option<String> {
    for fs in selectors {
        for el in doc.select(&fs.sel) {
            let v = element_value(el, fs.attr);
            if !v.is_empty() {
                return Some(v);
            }
        }
    }
    None
}

fn all_matches(doc: &Html, fs: &FieldSelector) -> Vec<String> {
    doc.select(&fs.sel)
        .map(|el| element_value(el, fs.attr))
        .filter(|v| !v.is_empty())
        .collect()
}

/// Longest candidate over the preferred minimum, else the first non-empty one.
fn best_description(doc: &Html) -> Option<String> {
    let mut first: Option<String> = None;
    let mut longest: Option<String> = None;
    for fs in DESCRIPTION_SELECTORS.iter() {
        for v in all_matches(doc, fs) {
            if first.is_none() {
                first = Some(v.clone());
            }
            let len = v.chars().count();
            if len > DESCRIPTION_MIN_PREFERRED
                && longest.as_ref().is_none_or(|l| len > l.chars().count())
            {
                longest = Some(v);
            }
        }
    }
    longest.or(first)
}

fn find_ld_object(v: &Value) -> Option<&Map<String, Value>> {
    const TYPES: &[&str] = &[
        "JobPosting",
        "Grant",
        "MonetaryGrant",
        "Event",
        "Scholarship",
        "CreativeWork",
    ];
    match v {
        Value::Object(map) => {
            let ty_matches = |t: &Value| t.as_str().is_some_and(|s| TYPES.contains(&s));
            let is_match = match map.get("@type") {
                Some(Value::Array(arr)) => arr.iter().any(ty_matches),
                Some(t) => ty_matches(t),
                None => false,
            };
            if is_match {
                return Some(map);
            }
            map.values().find_map(find_ld_object)
        }
        Value::Array(arr) => arr.iter().find_map(find_ld_object),
        _ => None,
    }
}

fn xml_to_html(xml: &str) -> String {
    let out = re_xml_decl().replace_all(xml, "");
    let out = re_cdata().replace_all(&out, "$1");
    re_self_closing().replace_all(&out, "<$1$2></$1>").to_string()
}

/* ----------------------------
JSON helpers
---------------------------- */

fn value_to_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => {
            let s = collapse_ws(s);
            (!s.is_empty()).then_some(s)
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Object(map) => ["name", "value", "addressLocality", "text", "title"]
            .iter()
            .find_map(|k| map.get(*k).and_then(value_to_text)),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(value_to_text).collect();
            (!parts.is_empty()).then(|| parts.join(", "))
        }
        _ => None,
    }
}

fn first_key<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .find(|v| !v.is_null())
}

fn fill_from_object(obj: &Map<String, Value>, d: &mut Draft) {
    if let Some(t) = first_key(obj, TITLE_KEYS).and_then(value_to_text) {
        d.candidate.title = truncate_chars(&t, TITLE_MAX_CHARS);
    }
    if let Some(t) = first_key(obj, DESCRIPTION_KEYS).and_then(value_to_text) {
        d.candidate.description = t;
    }
    if let Some(t) = first_key(obj, URL_KEYS).and_then(value_to_text) {
        d.candidate.url = t;
    }
    d.candidate.organization = first_key(obj, ORGANIZATION_KEYS).and_then(value_to_text);
    match first_key(obj, DEADLINE_KEYS) {
        Some(Value::Number(n)) => d.set_deadline_from(&n.to_string()),
        Some(v) => {
            if let Some(s) = value_to_text(v) {
                d.set_deadline_from(&s);
            }
        }
        None => {}
    }
    d.candidate.amount = first_key(obj, AMOUNT_KEYS).and_then(value_to_text);
    d.candidate.location = first_key(obj, LOCATION_KEYS).and_then(value_to_text);
    match first_key(obj, TAG_KEYS) {
        Some(Value::Array(items)) => {
            for t in items.iter().filter_map(value_to_text) {
                d.candidate.tags.insert(t.to_lowercase());
            }
        }
        Some(Value::String(s)) => {
            for t in s.split(',').map(str::trim).filter(|t| !t.is_empty()) {
                d.candidate.tags.insert(t.to_lowercase());
            }
        }
        _ => {}
    }
}
