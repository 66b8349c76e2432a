//! # Orchestrator
//! `SentinelService` wires registry, rate limiters, change cache, pipeline,
//! dedup, job manager and scheduler once, and exposes the orchestrator API.
//! Everything is constructed here and passed down explicitly.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::SentinelConfig;
use crate::dedup::{DedupOutcome, DeduplicationReport, DeduplicationService};
use crate::discovery::{ChangeCache, Discoverer, DiscovererBase, DiscovererRegistry};
use crate::error::{InitError, SentinelError};
use crate::jobs::{
    BatchOutcome, Cadence, DiscoveryJob, DiscoveryJobManager, JobEvent, JobEvents, JobOptions,
    JobProcessor, JobScheduler, ProcessedBatch, QueueStats, SourceBatch,
};
use crate::pipeline::{Origin, ProcessingPipeline};
use crate::rate_limiter::RateLimiterRegistry;
use crate::repository::OpportunityRepository;
use crate::types::CandidateOpportunity;

/// Runs a job's merged results through the pipeline and dedup into the repository.
pub struct IngestProcessor {
    pipeline: Arc<ProcessingPipeline>,
    dedup: Arc<DeduplicationService>,
}

impl IngestProcessor {
    pub fn new(pipeline: Arc<ProcessingPipeline>, dedup: Arc<DeduplicationService>) -> Self {
        Self { pipeline, dedup }
    }
}

#[async_trait]
impl JobProcessor for IngestProcessor {
    async fn process(&self, job_id: Uuid, batches: Vec<SourceBatch>) -> ProcessedBatch {
        let mut out = ProcessedBatch::default();
        for batch in batches {
            let origin = Origin::new(&batch.source, &batch.version);
            for item in batch.items {
                out.summary.processed += 1;
                let processed = match self.pipeline.process_candidate(item, &origin) {
                    Ok(p) => p,
                    Err(rej) => {
                        out.summary.rejected += 1;
                        out.summary
                            .errors
                            .push(format!("{}: {}", batch.source, rej.reasons.join(", ")));
                        continue;
                    }
                };
                if processed.low_quality {
                    out.summary.low_quality += 1;
                }
                let relevance = Some(processed.validation.metrics.relevance);
                match self.dedup.check_and_insert(&processed.candidate, relevance).await {
                    Ok(DedupOutcome::Inserted(_)) => {
                        out.summary.inserted += 1;
                        out.accepted.push(processed.candidate);
                    }
                    Ok(DedupOutcome::Linked { .. }) => out.summary.linked += 1,
                    Ok(DedupOutcome::Merged { .. }) => out.summary.merged += 1,
                    Err(e) => {
                        warn!(target: "pipeline", %job_id, source = %batch.source, error = %e, "persist failed");
                        out.summary.errors.push(format!("{}: {e}", batch.source));
                    }
                }
            }
        }
        info!(
            target: "pipeline",
            %job_id,
            processed = out.summary.processed,
            inserted = out.summary.inserted,
            linked = out.summary.linked,
            merged = out.summary.merged,
            rejected = out.summary.rejected,
            "job results processed"
        );
        out
    }
}

pub struct SentinelService {
    config: SentinelConfig,
    registry: Arc<DiscovererRegistry>,
    limiters: Arc<RateLimiterRegistry>,
    change_cache: Arc<ChangeCache>,
    repository: Arc<dyn OpportunityRepository>,
    pipeline: Arc<ProcessingPipeline>,
    dedup: Arc<DeduplicationService>,
    manager: DiscoveryJobManager,
    scheduler: JobScheduler,
}

impl SentinelService {
    pub fn new(config: SentinelConfig, repository: Arc<dyn OpportunityRepository>) -> Self {
        let registry = Arc::new(DiscovererRegistry::new(config.sources.clone()));
        let limiters = Arc::new(RateLimiterRegistry::new(config.sources.clone()));
        let pipeline = Arc::new(ProcessingPipeline::from_config(&config));
        let dedup = Arc::new(DeduplicationService::new(repository.clone(), config.dedup.clone()));
        let processor: Arc<dyn JobProcessor> =
            Arc::new(IngestProcessor::new(pipeline.clone(), dedup.clone()));
        let manager =
            DiscoveryJobManager::new(registry.clone(), &config, JobEvents::default(), Some(processor));
        let scheduler = JobScheduler::new(manager.clone(), registry.clone());

        Self {
            config,
            registry,
            limiters,
            change_cache: Arc::new(ChangeCache::new()),
            repository,
            pipeline,
            dedup,
            manager,
            scheduler,
        }
    }

    pub fn config(&self) -> &SentinelConfig {
        &self.config
    }

    pub fn repository(&self) -> &Arc<dyn OpportunityRepository> {
        &self.repository
    }

    pub fn pipeline(&self) -> &Arc<ProcessingPipeline> {
        &self.pipeline
    }

    pub fn registry(&self) -> &Arc<DiscovererRegistry> {
        &self.registry
    }

    /// Shared HTTP plumbing for a new HTTP-backed discoverer named `name`,
    /// using this service's limiter and change cache.
    pub fn discoverer_base(&self, name: &str) -> Result<DiscovererBase, InitError> {
        DiscovererBase::new(
            name,
            self.config.source(name),
            self.limiters.limiter_for(name),
            self.change_cache.clone(),
        )
    }

    pub async fn register_discoverer(&self, d: Arc<dyn Discoverer>) -> Result<(), SentinelError> {
        self.registry.register(d).await.map_err(SentinelError::from)
    }

    pub fn start_job(&self, source_names: Vec<String>, options: JobOptions) -> Result<Uuid, SentinelError> {
        self.manager.start_job(source_names, options)
    }

    pub fn stop_job(&self, id: Uuid) -> bool {
        self.manager.stop_job(id)
    }

    pub fn get_job_status(&self, id: Uuid) -> Result<DiscoveryJob, SentinelError> {
        self.manager
            .get_job_status(id)
            .ok_or(SentinelError::JobNotFound(id))
    }

    pub fn get_job_results(
        &self,
        id: Uuid,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<CandidateOpportunity>, SentinelError> {
        self.manager.get_job_results(id, limit, offset)
    }

    pub fn get_job_summary(&self, id: Uuid) -> Result<Option<BatchOutcome>, SentinelError> {
        Ok(self.get_job_status(id)?.summary)
    }

    pub fn get_queue_stats(&self) -> QueueStats {
        self.manager.get_queue_stats()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.manager.subscribe()
    }

    pub fn add_schedule(&self, source_name: &str, cadence: &str) -> Result<Cadence, SentinelError> {
        self.scheduler.add_schedule(source_name, cadence)
    }

    pub fn add_default_schedules(&self) -> usize {
        self.scheduler.add_default_schedules()
    }

    pub fn remove_schedule(&self, source_name: &str) -> bool {
        self.scheduler.remove_schedule(source_name)
    }

    pub fn schedules(&self) -> Vec<(String, Cadence)> {
        self.scheduler.schedules()
    }

    pub async fn run_deduplication(&self) -> Result<DeduplicationReport, SentinelError> {
        Ok(self.dedup.run_deduplication().await?)
    }

    pub fn shutdown(&self) {
        self.scheduler.shutdown();
    }
}
