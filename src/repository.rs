//! # Repository collaborator
//! Persistence contract used by deduplication and the orchestrator, plus an
//! in-memory implementation for tests and single-process runs.
//!
//! `link_duplicate` is an upsert keyed by duplicate id: at most one link (and
//! one archive write) per duplicate, however often it is called.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use uuid::Uuid;

use crate::error::{RepositoryError, RepositoryResult};
use crate::types::{
    CandidateOpportunity, DuplicateCandidate, Opportunity, OpportunityStatus, OpportunityUpdate,
};

/// Storage-side fields assigned when a candidate is persisted.
#[derive(Debug, Clone)]
pub struct NewOpportunity {
    pub source_hash: String,
    pub status: OpportunityStatus,
    pub relevance_score: Option<f32>,
}

#[async_trait]
pub trait OpportunityRepository: Send + Sync {
    async fn find_by_url(&self, url: &str) -> RepositoryResult<Option<Opportunity>>;

    async fn find_by_hash(&self, source_hash: &str) -> RepositoryResult<Option<Opportunity>>;

    /// Same url first, then same canonical hash.
    async fn find_existing(&self, url: &str, source_hash: &str) -> RepositoryResult<Option<Opportunity>> {
        if let Some(o) = self.find_by_url(url).await? {
            return Ok(Some(o));
        }
        self.find_by_hash(source_hash).await
    }

    async fn create(&self, candidate: &CandidateOpportunity, new: NewOpportunity) -> RepositoryResult<Opportunity>;

    async fn get(&self, id: Uuid) -> RepositoryResult<Option<Opportunity>>;

    async fn update(&self, id: Uuid, fields: OpportunityUpdate) -> RepositoryResult<Opportunity>;

    /// Record another url the opportunity was seen at. No-op if already known.
    async fn link_source(&self, id: Uuid, source_url: &str) -> RepositoryResult<()>;

    async fn link_duplicate(&self, link: DuplicateCandidate) -> RepositoryResult<()>;

    /// Active records discovered within the window, newest first.
    async fn list_recent(&self, window_days: i64, limit: usize) -> RepositoryResult<Vec<Opportunity>>;

    /// Every record (any status) oldest first.
    async fn list_page(&self, offset: usize, limit: usize) -> RepositoryResult<Vec<Opportunity>>;

    async fn count_active(&self) -> RepositoryResult<usize>;

    async fn duplicate_links(&self) -> RepositoryResult<Vec<DuplicateCandidate>>;

    /// Links whose master is `master_id`.
    async fn links_for(&self, master_id: Uuid) -> RepositoryResult<Vec<DuplicateCandidate>> {
        Ok(self
            .duplicate_links()
            .await?
            .into_iter()
            .filter(|l| l.master_id == master_id)
            .collect())
    }
}

#[derive(Debug, Default)]
struct Store {
    /// Insertion order == discovery order.
    records: Vec<Opportunity>,
    by_id: HashMap<Uuid, usize>,
    by_url: HashMap<String, Uuid>,
    by_hash: HashMap<String, Uuid>,
    links: HashMap<Uuid, DuplicateCandidate>,
}

#[derive(Debug, Default)]
pub struct InMemoryRepository {
    store: RwLock<Store>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OpportunityRepository for InMemoryRepository {
    async fn find_by_url(&self, url: &str) -> RepositoryResult<Option<Opportunity>> {
        let s = self.store.read().unwrap_or_else(PoisonError::into_inner);
        Ok(s.by_url
            .get(url)
            .and_then(|id| s.by_id.get(id))
            .map(|&i| s.records[i].clone()))
    }

    async fn find_by_hash(&self, source_hash: &str) -> RepositoryResult<Option<Opportunity>> {
        let s = self.store.read().unwrap_or_else(PoisonError::into_inner);
        Ok(s.by_hash
            .get(source_hash)
            .and_then(|id| s.by_id.get(id))
            .map(|&i| s.records[i].clone()))
    }

    async fn create(&self, c: &CandidateOpportunity, new: NewOpportunity) -> RepositoryResult<Opportunity> {
        if !c.has_required_fields() {
            return Err(RepositoryError::Storage(
                "title, description and url are required".to_string(),
            ));
        }
        let now = Utc::now();
        let opp = Opportunity {
            id: Uuid::new_v4(),
            title: c.title.clone(),
            description: c.description.clone(),
            url: c.url.clone(),
            organization: c.organization.clone(),
            deadline: c.deadline,
            amount: c.amount.clone(),
            location: c.location.clone(),
            tags: c.tags.clone(),
            source_type: c.source_type,
            source_metadata: c.source_metadata.clone(),
            status: new.status,
            source_hash: new.source_hash,
            relevance_score: new.relevance_score,
            source_urls: vec![c.url.clone()],
            discovered_at: now,
            updated_at: now,
        };

        let mut s = self.store.write().unwrap_or_else(PoisonError::into_inner);
        let idx = s.records.len();
        s.by_id.insert(opp.id, idx);
        // Archived duplicates never shadow the master in exact lookups.
        if opp.is_active() {
            s.by_url.entry(opp.url.clone()).or_insert(opp.id);
            s.by_hash.entry(opp.source_hash.clone()).or_insert(opp.id);
        }
        s.records.push(opp.clone());
        Ok(opp)
    }

    async fn get(&self, id: Uuid) -> RepositoryResult<Option<Opportunity>> {
        let s = self.store.read().unwrap_or_else(PoisonError::into_inner);
        Ok(s.by_id.get(&id).map(|&i| s.records[i].clone()))
    }

    async fn update(&self, id: Uuid, fields: OpportunityUpdate) -> RepositoryResult<Opportunity> {
        let mut s = self.store.write().unwrap_or_else(PoisonError::into_inner);
        let idx = *s.by_id.get(&id).ok_or(RepositoryError::NotFound(id))?;

        let rec = &mut s.records[idx];
        if let Some(st) = fields.status {
            rec.status = st;
        }
        if let Some(r) = fields.relevance_score {
            rec.relevance_score = Some(r);
        }
        if let Some(m) = fields.source_metadata {
            rec.source_metadata.extend(m);
        }
        rec.updated_at = Utc::now();
        let out = rec.clone();

        if !out.is_active() {
            if s.by_url.get(&out.url) == Some(&id) {
                s.by_url.remove(&out.url);
            }
            if s.by_hash.get(&out.source_hash) == Some(&id) {
                s.by_hash.remove(&out.source_hash);
            }
        }
        Ok(out)
    }

    async fn link_source(&self, id: Uuid, source_url: &str) -> RepositoryResult<()> {
        let mut s = self.store.write().unwrap_or_else(PoisonError::into_inner);
        let idx = *s.by_id.get(&id).ok_or(RepositoryError::NotFound(id))?;
        let rec = &mut s.records[idx];
        if !rec.source_urls.iter().any(|u| u == source_url) {
            rec.source_urls.push(source_url.to_string());
            rec.updated_at = Utc::now();
        }
        s.by_url.entry(source_url.to_string()).or_insert(id);
        Ok(())
    }

    async fn link_duplicate(&self, link: DuplicateCandidate) -> RepositoryResult<()> {
        let mut s = self.store.write().unwrap_or_else(PoisonError::into_inner);
        for id in [link.master_id, link.duplicate_id] {
            if !s.by_id.contains_key(&id) {
                return Err(RepositoryError::NotFound(id));
            }
        }
        s.links.insert(link.duplicate_id, link);
        Ok(())
    }

    async fn list_recent(&self, window_days: i64, limit: usize) -> RepositoryResult<Vec<Opportunity>> {
        let cutoff = Utc::now() - Duration::days(window_days.max(0));
        let s = self.store.read().unwrap_or_else(PoisonError::into_inner);
        Ok(s.records
            .iter()
            .rev()
            .filter(|o| o.is_active() && o.discovered_at >= cutoff)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn list_page(&self, offset: usize, limit: usize) -> RepositoryResult<Vec<Opportunity>> {
        let s = self.store.read().unwrap_or_else(PoisonError::into_inner);
        Ok(s.records.iter().skip(offset).take(limit).cloned().collect())
    }

    async fn count_active(&self) -> RepositoryResult<usize> {
        let s = self.store.read().unwrap_or_else(PoisonError::into_inner);
        Ok(s.records.iter().filter(|o| o.is_active()).count())
    }

    async fn duplicate_links(&self) -> RepositoryResult<Vec<DuplicateCandidate>> {
        let s = self.store.read().unwrap_or_else(PoisonError::into_inner);
        let mut v: Vec<DuplicateCandidate> = s.links.values().cloned().collect();
        v.sort_by_key(|l| s.by_id.get(&l.duplicate_id).copied().unwrap_or(usize::MAX));
        Ok(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MergeStrategy, SimilarityFactors, SourceType};

    fn cand(url: &str) -> CandidateOpportunity {
        let mut c = CandidateOpportunity::new(SourceType::Manual);
        c.title = "Grant".into();
        c.description = "A grant for artists".into();
        c.url = url.into();
        c
    }

    fn new(hash: &str) -> NewOpportunity {
        NewOpportunity {
            source_hash: hash.into(),
            status: OpportunityStatus::New,
            relevance_score: None,
        }
    }

    #[tokio::test]
    async fn exact_lookups_and_source_links() {
        let repo = InMemoryRepository::new();
        let a = repo.create(&cand("https://x.org/a"), new("h1")).await.unwrap();
        assert_eq!(repo.find_existing("https://x.org/a", "zz").await.unwrap().unwrap().id, a.id);
        assert_eq!(repo.find_existing("nope", "h1").await.unwrap().unwrap().id, a.id);

        repo.link_source(a.id, "https://mirror.org/a").await.unwrap();
        repo.link_source(a.id, "https://mirror.org/a").await.unwrap();
        let got = repo.get(a.id).await.unwrap().unwrap();
        assert_eq!(got.source_urls.len(), 2);
        assert_eq!(repo.find_by_url("https://mirror.org/a").await.unwrap().unwrap().id, a.id);
    }

    #[tokio::test]
    async fn duplicate_links_are_upserts() {
        let repo = InMemoryRepository::new();
        let a = repo.create(&cand("https://x.org/a"), new("h1")).await.unwrap();
        let b = repo.create(&cand("https://x.org/b"), new("h2")).await.unwrap();
        let link = DuplicateCandidate {
            master_id: a.id,
            duplicate_id: b.id,
            similarity_score: 0.9,
            similarity_factors: SimilarityFactors::default(),
            merge_strategy: MergeStrategy::ArchiveDuplicate,
        };
        repo.link_duplicate(link.clone()).await.unwrap();
        repo.link_duplicate(link).await.unwrap();
        assert_eq!(repo.duplicate_links().await.unwrap().len(), 1);
        assert_eq!(repo.links_for(a.id).await.unwrap().len(), 1);
        assert!(repo.links_for(b.id).await.unwrap().is_empty());

        repo.update(
            b.id,
            OpportunityUpdate {
                status: Some(OpportunityStatus::Archived),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(repo.count_active().await.unwrap(), 1);
        assert!(repo.find_by_hash("h2").await.unwrap().is_none());
        assert_eq!(repo.list_page(0, 10).await.unwrap().len(), 2);
        assert_eq!(repo.list_recent(30, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn update_unknown_is_not_found() {
        let repo = InMemoryRepository::new();
        let err = repo.update(Uuid::new_v4(), OpportunityUpdate::default()).await.unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound(_)));
    }
}
