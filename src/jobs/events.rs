//! Job lifecycle events over a broadcast channel.
//!
//! Delivery is at-most-once and in-memory: a slow receiver gets
//! `RecvError::Lagged` and misses events. Job status in the registry stays
//! the source of truth.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

const DEFAULT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    Started {
        job_id: Uuid,
        sources: Vec<String>,
    },
    SourceCompleted {
        job_id: Uuid,
        source: String,
        items: usize,
    },
    SourceFailed {
        job_id: Uuid,
        source: String,
        error: String,
    },
    Completed {
        job_id: Uuid,
        results: usize,
    },
    Failed {
        job_id: Uuid,
        error: String,
    },
}

impl JobEvent {
    pub fn job_id(&self) -> Uuid {
        match self {
            JobEvent::Started { job_id, .. }
            | JobEvent::SourceCompleted { job_id, .. }
            | JobEvent::SourceFailed { job_id, .. }
            | JobEvent::Completed { job_id, .. }
            | JobEvent::Failed { job_id, .. } => *job_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobEvent::Completed { .. } | JobEvent::Failed { .. })
    }
}

#[derive(Debug, Clone)]
pub struct JobEvents {
    sender: broadcast::Sender<JobEvent>,
}

impl Default for JobEvents {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl JobEvents {
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Fire-and-forget; returns how many receivers got it.
    pub fn emit(&self, event: JobEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_see_events_emitted_after_subscribe() {
        let bus = JobEvents::default();
        assert_eq!(bus.emit(JobEvent::Completed { job_id: Uuid::nil(), results: 0 }), 0);
        let mut rx = bus.subscribe();
        let id = Uuid::new_v4();
        bus.emit(JobEvent::Failed {
            job_id: id,
            error: "x".into(),
        });
        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.job_id(), id);
        assert!(ev.is_terminal());
    }
}
