//! # Discovery jobs
//! Job records, the in-memory job registry, the completion event channel,
//! the bounded job manager and the recurring scheduler.

pub mod events;
pub mod manager;
pub mod scheduler;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{PoisonError, RwLock};
use uuid::Uuid;

use crate::types::{CandidateOpportunity, DiscoveryContext};

pub use events::{JobEvent, JobEvents};
pub use manager::{BatchOutcome, DiscoveryJobManager, JobProcessor, ProcessedBatch, SourceBatch};
pub use scheduler::{Cadence, JobScheduler};

pub const CANCELLED: &str = "cancelled";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobOptions {
    pub context: Option<DiscoveryContext>,
}

/// One discoverer's contribution to a job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceOutcome {
    pub source: String,
    pub success: bool,
    pub items: usize,
    pub attempts: u32,
    pub duration_ms: u64,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryJob {
    pub id: Uuid,
    pub source_names: Vec<String>,
    pub options: JobOptions,
    pub status: JobStatus,
    /// Completed sources / total sources, in percent.
    pub progress: f32,
    pub results: Vec<CandidateOpportunity>,
    pub sources: Vec<SourceOutcome>,
    pub summary: Option<BatchOutcome>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl DiscoveryJob {
    pub fn new(source_names: Vec<String>, options: JobOptions) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_names,
            options,
            status: JobStatus::Pending,
            progress: 0.0,
            results: Vec::new(),
            sources: Vec::new(),
            summary: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == JobStatus::Failed && self.error.as_deref() == Some(CANCELLED)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueStats {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub total: usize,
    pub max_concurrent: usize,
    pub available_slots: usize,
}

#[derive(Debug, Default)]
struct RegistryInner {
    jobs: HashMap<Uuid, DiscoveryJob>,
    /// Terminal job ids, oldest first.
    finished: VecDeque<Uuid>,
}

/// In-memory job table. Each mutation holds the lock for one job only.
#[derive(Debug)]
pub struct JobRegistry {
    inner: RwLock<RegistryInner>,
    retention: usize,
}

impl JobRegistry {
    pub fn new(retention: usize) -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
            retention: retention.max(1),
        }
    }

    pub fn insert(&self, job: DiscoveryJob) {
        let mut g = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        g.jobs.insert(job.id, job);
    }

    pub fn get(&self, id: Uuid) -> Option<DiscoveryJob> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .jobs
            .get(&id)
            .cloned()
    }

    /// Apply `f` to the job; returns its result, or `None` for unknown ids.
    /// A transition into a terminal state triggers retention.
    pub fn update<R>(&self, id: Uuid, f: impl FnOnce(&mut DiscoveryJob) -> R) -> Option<R> {
        let mut g = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let job = g.jobs.get_mut(&id)?;
        let was_terminal = job.status.is_terminal();
        let out = f(job);
        let now_terminal = job.status.is_terminal();
        if !was_terminal && now_terminal {
            g.finished.push_back(id);
            while g.finished.len() > self.retention {
                if let Some(old) = g.finished.pop_front() {
                    g.jobs.remove(&old);
                }
            }
        }
        Some(out)
    }

    pub fn counts(&self) -> (usize, usize, usize, usize) {
        let g = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let mut c = (0, 0, 0, 0);
        for j in g.jobs.values() {
            match j.status {
                JobStatus::Pending => c.0 += 1,
                JobStatus::Running => c.1 += 1,
                JobStatus::Completed => c.2 += 1,
                JobStatus::Failed => c.3 += 1,
            }
        }
        c
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retention_evicts_oldest_terminal_jobs() {
        let reg = JobRegistry::new(2);
        let ids: Vec<Uuid> = (0..3)
            .map(|_| {
                let j = DiscoveryJob::new(vec!["a".into()], JobOptions::default());
                let id = j.id;
                reg.insert(j);
                id
            })
            .collect();
        let live = DiscoveryJob::new(vec!["a".into()], JobOptions::default());
        let live_id = live.id;
        reg.insert(live);

        for id in &ids {
            reg.update(*id, |j| j.status = JobStatus::Completed);
        }
        assert!(reg.get(ids[0]).is_none());
        assert!(reg.get(ids[1]).is_some());
        assert!(reg.get(ids[2]).is_some());
        assert!(reg.get(live_id).is_some());
        assert_eq!(reg.counts(), (1, 0, 2, 0));
    }

    #[test]
    fn cancelled_is_a_failed_job_with_reason() {
        let mut j = DiscoveryJob::new(vec![], JobOptions::default());
        j.status = JobStatus::Failed;
        j.error = Some(CANCELLED.into());
        assert!(j.is_cancelled());
    }
}
