//! # Source attribution
//!
//! Wraps a validated record with provenance and a credibility estimate.
//!
//! - Domain authority: curated tiers first (alias → exact host → parent
//!   domain), then `.gov` / `.edu` / `.org` heuristics, then a default.
//! - Credibility = `0.3·domain + 0.4·content + 0.2·update_frequency + 0.1·historical_accuracy`.
//! - Historical accuracy is learned per discoverer from accept/reject outcomes
//!   and starts from a neutral prior until enough samples exist.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use url::Url;

use crate::pipeline::validator::ValidationResult;
use crate::types::CandidateOpportunity;

pub const FLAG_LOW_DOMAIN_AUTHORITY: &str = "low_domain_authority";
pub const FLAG_LOW_CONTENT_QUALITY: &str = "low_content_quality";
pub const FLAG_LOW_OVERALL_CREDIBILITY: &str = "low_overall_credibility";

const LOW_DOMAIN_AUTHORITY: f32 = 0.3;
const LOW_CONTENT_QUALITY: f32 = 0.4;
const LOW_OVERALL_CREDIBILITY: f32 = 0.3;

/// Prior used until a discoverer has this many recorded outcomes.
const HISTORY_MIN_SAMPLES: u32 = 5;
const HISTORY_PRIOR: f32 = 0.7;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessingStep {
    pub step_name: String,
    pub processor: String,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: u64,
    pub success: bool,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct CredibilityScore {
    pub domain_authority: f32,
    pub content_quality: f32,
    pub update_frequency: f32,
    pub historical_accuracy: f32,
    pub overall: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Attribution {
    pub discoverer: String,
    pub discoverer_version: String,
    pub source_url: String,
    pub source_domain: Option<String>,
    pub discovered_at: DateTime<Utc>,
    pub processing_steps: Vec<ProcessingStep>,
    pub credibility: CredibilityScore,
    pub flags: Vec<String>,
}

/// Curated authority tiers for arts-opportunity domains.
#[derive(Debug, Clone)]
pub struct DomainTiers {
    pub default_weight: f32,
    pub weights: HashMap<String, f32>,
    pub aliases: HashMap<String, String>,
}

impl Default for DomainTiers {
    fn default() -> Self {
        Self::default_seed()
    }
}

impl DomainTiers {
    pub fn default_seed() -> Self {
        let mut weights = HashMap::new();
        for (k, v) in [
            // high
            ("arts.gov", 0.95),
            ("nea.gov", 0.95),
            ("artscouncil.org.uk", 0.92),
            ("creative-capital.org", 0.9),
            ("nyfa.org", 0.9),
            ("artistcommunities.org", 0.9),
            ("resartis.org", 0.9),
            ("transartists.org", 0.88),
            ("e-flux.com", 0.88),
            ("callforentry.org", 0.85),
            ("zapplication.org", 0.85),
            ("americansforthearts.org", 0.85),
            // medium
            ("artrabbit.com", 0.75),
            ("artsy.net", 0.72),
            ("hyperallergic.com", 0.72),
            ("artforum.com", 0.72),
            ("artdeadline.com", 0.7),
            ("submittable.com", 0.7),
            ("linkedin.com", 0.6),
            // social
            ("instagram.com", 0.45),
            ("facebook.com", 0.4),
            ("twitter.com", 0.4),
        ] {
            weights.insert(k.to_string(), v);
        }

        let mut aliases = HashMap::new();
        for (a, c) in [
            ("x.com", "twitter.com"),
            ("m.facebook.com", "facebook.com"),
            ("fb.com", "facebook.com"),
            ("lnkd.in", "linkedin.com"),
            ("nyfa.submittable.com", "nyfa.org"),
        ] {
            aliases.insert(a.to_string(), c.to_string());
        }

        Self {
            default_weight: 0.4,
            weights,
            aliases,
        }
    }

    /// Authority for a host. `None` host (unparseable url) scores 0.2.
    pub fn weight_for_host(&self, host: Option<&str>) -> f32 {
        let Some(host) = host else {
            return 0.2;
        };
        let h = normalize_host(host);

        if let Some(canon) = self.aliases.get(&h) {
            if let Some(&w) = self.weights.get(canon) {
                return clamp01(w);
            }
        }
        if let Some(&w) = self.weights.get(&h) {
            return clamp01(w);
        }
        // Closest curated parent wins (a.b.nyfa.org → b.nyfa.org → nyfa.org).
        let parent = h
            .match_indices('.')
            .map(|(i, _)| &h[i + 1..])
            .find_map(|suffix| self.weights.get(suffix));
        if let Some(&w) = parent {
            return clamp01(w);
        }

        let generic = if h.ends_with(".gov") || h.contains(".gov.") {
            0.8
        } else if h.ends_with(".edu") || h.contains(".ac.") {
            0.75
        } else if h.ends_with(".org") || h.contains(".org.") {
            0.6
        } else {
            self.default_weight
        };
        clamp01(generic)
    }
}

fn normalize_host(h: &str) -> String {
    let h = h.trim().trim_end_matches('.').to_ascii_lowercase();
    h.strip_prefix("www.").map(str::to_string).unwrap_or(h)
}

fn clamp01(x: f32) -> f32 {
    if x.is_finite() {
        x.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct History {
    accepted: u32,
    total: u32,
}

#[derive(Debug, Default)]
pub struct SourceAttributor {
    tiers: DomainTiers,
    history: RwLock<HashMap<String, History>>,
}

impl SourceAttributor {
    pub fn new(tiers: DomainTiers) -> Self {
        Self {
            tiers,
            history: RwLock::new(HashMap::new()),
        }
    }

    pub fn domain_authority(&self, url: &str) -> (Option<String>, f32) {
        let host = Url::parse(url.trim())
            .ok()
            .and_then(|u| u.host_str().map(normalize_host));
        let w = self.tiers.weight_for_host(host.as_deref());
        (host, w)
    }

    /// Feed back whether a record from `discoverer` was accepted downstream.
    pub fn record_outcome(&self, discoverer: &str, accepted: bool) {
        let mut h = self.history.write().unwrap_or_else(PoisonError::into_inner);
        let e = h.entry(discoverer.to_string()).or_default();
        e.total += 1;
        if accepted {
            e.accepted += 1;
        }
    }

    pub fn historical_accuracy(&self, discoverer: &str) -> f32 {
        let h = self.history.read().unwrap_or_else(PoisonError::into_inner);
        match h.get(discoverer) {
            Some(x) if x.total >= HISTORY_MIN_SAMPLES => x.accepted as f32 / x.total as f32,
            _ => HISTORY_PRIOR,
        }
    }

    pub fn attribute(
        &self,
        candidate: &CandidateOpportunity,
        validation: &ValidationResult,
        discoverer: &str,
        discoverer_version: &str,
        processing_steps: Vec<ProcessingStep>,
    ) -> Attribution {
        let (source_domain, domain_authority) = self.domain_authority(&candidate.url);
        let content_quality = clamp01(validation.metrics.overall);
        // How current the listing looks; deadline proximity stands in for update cadence.
        let update_frequency = clamp01(validation.metrics.freshness);
        let historical_accuracy = self.historical_accuracy(discoverer);

        let overall = clamp01(
            0.3 * domain_authority
                + 0.4 * content_quality
                + 0.2 * update_frequency
                + 0.1 * historical_accuracy,
        );

        let mut flags = Vec::new();
        if domain_authority < LOW_DOMAIN_AUTHORITY {
            flags.push(FLAG_LOW_DOMAIN_AUTHORITY.to_string());
        }
        if content_quality < LOW_CONTENT_QUALITY {
            flags.push(FLAG_LOW_CONTENT_QUALITY.to_string());
        }
        if overall < LOW_OVERALL_CREDIBILITY {
            flags.push(FLAG_LOW_OVERALL_CREDIBILITY.to_string());
        }

        Attribution {
            discoverer: discoverer.to_string(),
            discoverer_version: discoverer_version.to_string(),
            source_url: candidate.url.clone(),
            source_domain,
            discovered_at: Utc::now(),
            processing_steps,
            credibility: CredibilityScore {
                domain_authority,
                content_quality,
                update_frequency,
                historical_accuracy,
                overall,
            },
            flags,
        }
    }
}
