// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod types;

// Source adapters, per-source limits and change detection
pub mod discovery;
pub mod rate_limiter;

// Extraction, validation, cleaning and attribution
pub mod pipeline;

// Duplicate detection and storage
pub mod dedup;
pub mod repository;

// Background jobs and the orchestrator
pub mod jobs;
pub mod sentinel;

// ---- Re-exports for stable public API ----
pub use crate::config::{DedupConfig, SentinelConfig, SourceConfig};
pub use crate::discovery::{Discoverer, DiscovererRegistry, FeedDiscoverer};
pub use crate::error::{DiscoveryError, SentinelError};
pub use crate::jobs::{DiscoveryJob, JobEvent, JobOptions, JobStatus, QueueStats};
pub use crate::repository::{InMemoryRepository, OpportunityRepository};
pub use crate::sentinel::SentinelService;
pub use crate::types::{CandidateOpportunity, DiscoveryContext, Opportunity, RawContent, SourceType};
