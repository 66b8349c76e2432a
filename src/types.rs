//! # Core records
//! The canonical shapes that flow through discovery: raw content from a
//! source, the partially-filled candidate record, the persisted opportunity
//! and the duplicate link between two opportunities.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

/// Format of a raw payload handed over by a discoverer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Html,
    Json,
    Text,
    Xml,
}

impl ContentType {
    /// Case-insensitive parse; accepts MIME-ish names like `text/html`.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().to_ascii_lowercase();
        let tail = s.rsplit('/').next().unwrap_or(&s);
        match tail {
            "html" | "xhtml+xml" => Some(Self::Html),
            "json" => Some(Self::Json),
            "text" | "plain" => Some(Self::Text),
            "xml" | "rss+xml" | "atom+xml" => Some(Self::Xml),
            _ => None,
        }
    }
}

/// Raw content as fetched; lives only until extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawContent {
    pub content: String,
    pub content_type: ContentType,
    pub source_url: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl RawContent {
    pub fn new(content: impl Into<String>, content_type: ContentType) -> Self {
        Self {
            content: content.into(),
            content_type,
            source_url: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }
}

/// Family of source a record came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    WebSearch,
    AiExtraction,
    Social,
    BookmarkFeed,
    Manual,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::WebSearch => "websearch",
            SourceType::AiExtraction => "llm_extraction",
            SourceType::Social => "social",
            SourceType::BookmarkFeed => "bookmark",
            SourceType::Manual => "manual",
        }
    }
}

/// Partially populated canonical record, filled in by the pipeline stages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CandidateOpportunity {
    pub title: String,
    pub description: String,
    pub url: String,
    pub organization: Option<String>,
    pub deadline: Option<DateTime<Utc>>,
    pub amount: Option<String>,
    pub location: Option<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    pub source_type: SourceType,
    #[serde(default)]
    pub source_metadata: HashMap<String, serde_json::Value>,
}

impl CandidateOpportunity {
    pub fn new(source_type: SourceType) -> Self {
        Self {
            title: String::new(),
            description: String::new(),
            url: String::new(),
            organization: None,
            deadline: None,
            amount: None,
            location: None,
            tags: BTreeSet::new(),
            source_type,
            source_metadata: HashMap::new(),
        }
    }

    /// Title, description and url are all non-blank.
    pub fn has_required_fields(&self) -> bool {
        !self.title.trim().is_empty()
            && !self.description.trim().is_empty()
            && !self.url.trim().is_empty()
    }

    /// Fill every empty field of `self` from `other`, leaving populated ones alone.
    pub fn fill_missing_from(&mut self, other: &CandidateOpportunity) {
        if self.title.trim().is_empty() {
            self.title = other.title.clone();
        }
        if self.description.trim().is_empty() {
            self.description = other.description.clone();
        }
        if self.url.trim().is_empty() {
            self.url = other.url.clone();
        }
        if self.organization.is_none() {
            self.organization = other.organization.clone();
        }
        if self.deadline.is_none() {
            self.deadline = other.deadline;
        }
        if self.amount.is_none() {
            self.amount = other.amount.clone();
        }
        if self.location.is_none() {
            self.location = other.location.clone();
        }
        self.tags.extend(other.tags.iter().cloned());
    }

    /// Overlay every populated field of `other` on top of `self`.
    pub fn overlay(&mut self, other: &CandidateOpportunity) {
        if !other.title.trim().is_empty() {
            self.title = other.title.clone();
        }
        if !other.description.trim().is_empty() {
            self.description = other.description.clone();
        }
        if !other.url.trim().is_empty() {
            self.url = other.url.clone();
        }
        if other.organization.is_some() {
            self.organization = other.organization.clone();
        }
        if other.deadline.is_some() {
            self.deadline = other.deadline;
        }
        if other.amount.is_some() {
            self.amount = other.amount.clone();
        }
        if other.location.is_some() {
            self.location = other.location.clone();
        }
        self.tags.extend(other.tags.iter().cloned());
    }
}

/// Search hints passed to a discoverer run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscoveryContext {
    #[serde(default)]
    pub search_terms: Vec<String>,
    pub location: Option<String>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub max_results: Option<usize>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OpportunityStatus {
    New,
    Reviewed,
    Applied,
    Archived,
}

/// Persisted entity, owned by the repository.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Opportunity {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub url: String,
    pub organization: Option<String>,
    pub deadline: Option<DateTime<Utc>>,
    pub amount: Option<String>,
    pub location: Option<String>,
    pub tags: BTreeSet<String>,
    pub source_type: SourceType,
    pub source_metadata: HashMap<String, serde_json::Value>,
    pub status: OpportunityStatus,
    pub source_hash: String,
    pub relevance_score: Option<f32>,
    /// Every url this opportunity was seen at, first one included.
    pub source_urls: Vec<String>,
    pub discovered_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Opportunity {
    /// View the stored record as a candidate again (for similarity checks).
    pub fn as_candidate(&self) -> CandidateOpportunity {
        CandidateOpportunity {
            title: self.title.clone(),
            description: self.description.clone(),
            url: self.url.clone(),
            organization: self.organization.clone(),
            deadline: self.deadline,
            amount: self.amount.clone(),
            location: self.location.clone(),
            tags: self.tags.clone(),
            source_type: self.source_type,
            source_metadata: self.source_metadata.clone(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status != OpportunityStatus::Archived
    }
}

/// Fields the repository is allowed to patch on an existing record.
#[derive(Debug, Clone, Default)]
pub struct OpportunityUpdate {
    pub status: Option<OpportunityStatus>,
    pub relevance_score: Option<f32>,
    pub source_metadata: Option<HashMap<String, serde_json::Value>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Live ingest: the new record is archived under the existing master.
    KeepMaster,
    /// Corpus re-scan: the later of two stored records is archived.
    ArchiveDuplicate,
}

/// Per-field similarity breakdown of a pair.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct SimilarityFactors {
    pub title: f32,
    pub organization: f32,
    pub description: f32,
    pub deadline: f32,
    pub url: f32,
}

/// Link between a master opportunity and a record judged to duplicate it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DuplicateCandidate {
    pub master_id: Uuid,
    pub duplicate_id: Uuid,
    pub similarity_score: f32,
    pub similarity_factors: SimilarityFactors,
    pub merge_strategy: MergeStrategy,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_parse_accepts_mime_names() {
        assert_eq!(ContentType::parse("text/html"), Some(ContentType::Html));
        assert_eq!(ContentType::parse("JSON"), Some(ContentType::Json));
        assert_eq!(ContentType::parse("application/rss+xml"), Some(ContentType::Xml));
        assert_eq!(ContentType::parse("image/png"), None);
    }

    #[test]
    fn overlay_prefers_populated_fields_of_other() {
        let mut outer = CandidateOpportunity::new(SourceType::WebSearch);
        outer.title = "Outer".into();
        outer.organization = Some("Org A".into());
        let mut inner = CandidateOpportunity::new(SourceType::WebSearch);
        inner.title = "Inner".into();
        inner.amount = Some("$500".into());
        outer.overlay(&inner);
        assert_eq!(outer.title, "Inner");
        assert_eq!(outer.organization.as_deref(), Some("Org A"));
        assert_eq!(outer.amount.as_deref(), Some("$500"));
    }

    #[test]
    fn required_fields_rejects_whitespace() {
        let mut c = CandidateOpportunity::new(SourceType::Manual);
        c.title = "  ".into();
        c.description = "d".into();
        c.url = "https://x.org".into();
        assert!(!c.has_required_fields());
    }
}
