//! # Processing pipeline
//! extract → validate → reject on critical (or error in strict mode) → clean → attribute.
//!
//! One bad item never aborts a batch: every item yields either a
//! `ProcessedOpportunity` or a `Rejection` in input order.

pub mod attribution;
pub mod cleaner;
pub mod extractor;
pub mod validator;

use chrono::Utc;
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, warn};

use crate::config::SentinelConfig;
use crate::telemetry::anon_hash;
use crate::types::{CandidateOpportunity, RawContent, SourceType};

pub use attribution::{Attribution, CredibilityScore, DomainTiers, ProcessingStep, SourceAttributor};
pub use cleaner::DataCleaner;
pub use extractor::{DataExtractor, ExtractionResult};
pub use validator::{ContentValidator, QualityMetrics, Severity, ValidationIssue, ValidationResult};

/// Who produced the item; carried into attribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    pub discoverer: String,
    pub version: String,
}

impl Origin {
    pub fn new(discoverer: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            discoverer: discoverer.into(),
            version: version.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessedOpportunity {
    pub candidate: CandidateOpportunity,
    pub validation: ValidationResult,
    pub attribution: Attribution,
    pub low_quality: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RejectStage {
    Extraction,
    Validation,
    Cleaning,
}

/// An item the pipeline dropped, with the reasons.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Rejection {
    pub stage: RejectStage,
    pub reasons: Vec<String>,
}

pub type ProcessOutcome = Result<ProcessedOpportunity, Rejection>;

#[derive(Debug, Default)]
pub struct ProcessingPipeline {
    extractor: DataExtractor,
    validator: ContentValidator,
    cleaner: DataCleaner,
    attributor: SourceAttributor,
}

fn step(name: &str, processor: &str, started: Instant, success: bool) -> ProcessingStep {
    ProcessingStep {
        step_name: name.to_string(),
        processor: processor.to_string(),
        timestamp: Utc::now(),
        duration_ms: started.elapsed().as_millis() as u64,
        success,
    }
}

impl ProcessingPipeline {
    pub fn new(validator: ContentValidator, attributor: SourceAttributor) -> Self {
        Self {
            extractor: DataExtractor::new(),
            validator,
            cleaner: DataCleaner::new(),
            attributor,
        }
    }

    pub fn from_config(cfg: &SentinelConfig) -> Self {
        Self::new(
            ContentValidator::new(cfg.strict_validation, cfg.quality_threshold),
            SourceAttributor::default(),
        )
    }

    pub fn extractor(&self) -> &DataExtractor {
        &self.extractor
    }

    pub fn attributor(&self) -> &SourceAttributor {
        &self.attributor
    }

    /// Full path for raw content.
    pub fn process(&self, raw: &RawContent, source_type: SourceType, origin: &Origin) -> ProcessOutcome {
        let t0 = Instant::now();
        let extracted = self.extractor.extract(raw, source_type);
        let extract_step = step("extract", "DataExtractor", t0, extracted.success);

        let candidate = match extracted.data {
            Some(c) if extracted.success => c,
            _ => {
                counter!("pipeline_rejected_total", "stage" => "extraction").increment(1);
                warn!(
                    target: "pipeline",
                    source = %origin.discoverer,
                    content_hash = %anon_hash(&raw.content),
                    errors = ?extracted.errors,
                    "extraction failed; item skipped"
                );
                return Err(Rejection {
                    stage: RejectStage::Extraction,
                    reasons: extracted.errors,
                });
            }
        };
        self.run_stages(candidate, origin, vec![extract_step])
    }

    /// Path for records a discoverer already extracted.
    pub fn process_candidate(&self, candidate: CandidateOpportunity, origin: &Origin) -> ProcessOutcome {
        self.run_stages(candidate, origin, Vec::new())
    }

    /// Processes in input order; never stops early.
    pub fn process_batch(
        &self,
        raws: &[RawContent],
        source_type: SourceType,
        origin: &Origin,
    ) -> Vec<ProcessOutcome> {
        raws.iter()
            .map(|r| self.process(r, source_type, origin))
            .collect()
    }

    fn run_stages(
        &self,
        candidate: CandidateOpportunity,
        origin: &Origin,
        mut steps: Vec<ProcessingStep>,
    ) -> ProcessOutcome {
        let t = Instant::now();
        let validation = self.validator.validate(&candidate);
        steps.push(step("validate", "ContentValidator", t, validation.is_valid));

        if !validation.is_valid {
            counter!("pipeline_rejected_total", "stage" => "validation").increment(1);
            self.attributor.record_outcome(&origin.discoverer, false);
            let reasons: Vec<String> = validation
                .issues
                .iter()
                .filter(|i| {
                    i.severity == Severity::Critical
                        || (self.validator.is_strict() && i.severity == Severity::Error)
                })
                .map(|i| format!("{}: {}", i.field, i.message))
                .collect();
            debug!(
                target: "pipeline",
                source = %origin.discoverer,
                title_hash = %anon_hash(&candidate.title),
                ?reasons,
                "validation rejected item"
            );
            return Err(Rejection {
                stage: RejectStage::Validation,
                reasons,
            });
        }

        let t = Instant::now();
        let cleaned = self.cleaner.clean(&candidate);
        let ok = cleaned.has_required_fields();
        steps.push(step("clean", "DataCleaner", t, ok));
        if !ok {
            counter!("pipeline_rejected_total", "stage" => "cleaning").increment(1);
            self.attributor.record_outcome(&origin.discoverer, false);
            return Err(Rejection {
                stage: RejectStage::Cleaning,
                reasons: vec!["required field empty after cleaning".to_string()],
            });
        }

        let t = Instant::now();
        let mut attribution =
            self.attributor
                .attribute(&cleaned, &validation, &origin.discoverer, &origin.version, steps);
        attribution
            .processing_steps
            .push(step("attribute", "SourceAttributor", t, true));
        self.attributor.record_outcome(&origin.discoverer, true);

        let low_quality = validation.low_quality;
        if low_quality {
            counter!("pipeline_low_quality_total").increment(1);
        }

        let mut cleaned = cleaned;
        cleaned
            .source_metadata
            .insert("discoverer".into(), origin.discoverer.clone().into());
        cleaned.source_metadata.insert(
            "credibility".into(),
            serde_json::json!(attribution.credibility.overall),
        );
        cleaned.source_metadata.insert(
            "quality".into(),
            serde_json::json!(validation.metrics.overall),
        );
        if low_quality {
            cleaned
                .source_metadata
                .insert("low_quality".into(), serde_json::Value::Bool(true));
        }

        Ok(ProcessedOpportunity {
            candidate: cleaned,
            validation,
            attribution,
            low_quality,
        })
    }
}
