//! # Deduplication
//!
//! Two phases, in order:
//! 1. Exact: same url or same canonical hash → the url is linked to the
//!    existing record. When a discoverer that has not reported it before
//!    brings it in, its copy is also stored `archived` under the master with
//!    `KeepMaster`; repeat sightings from a known discoverer create nothing.
//! 2. Fuzzy: weighted similarity against a bounded recent sample; strictly
//!    above the threshold the new record is stored `archived` and linked to
//!    the master with `KeepMaster`.
//!
//! `run_deduplication` re-scans the corpus in pages, comparing each record
//! only with earlier records sharing its title prefix, and archives the later
//! record of each duplicate pair with `ArchiveDuplicate`.

pub mod index;
pub mod similarity;

use metrics::counter;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::DedupConfig;
use crate::error::{DeduplicationError, RepositoryError};
use crate::repository::{NewOpportunity, OpportunityRepository};
use crate::telemetry::anon_hash;
use crate::types::{
    CandidateOpportunity, DuplicateCandidate, MergeStrategy, Opportunity, OpportunityStatus,
    OpportunityUpdate, SimilarityFactors,
};

pub use index::{title_prefix, TitlePrefixIndex};
pub use similarity::{candidate_hash, generate_source_hash, score_pair, text_similarity};

/// What happened to one incoming candidate.
#[derive(Debug, Clone, PartialEq)]
pub enum DedupOutcome {
    /// New active record.
    Inserted(Opportunity),
    /// Exact match; the url was linked to the existing record. `duplicate_id`
    /// is the archived copy kept for a newly reporting discoverer.
    Linked {
        existing_id: Uuid,
        duplicate_id: Option<Uuid>,
    },
    /// Fuzzy match; stored archived and linked to the master.
    Merged {
        master_id: Uuid,
        duplicate_id: Uuid,
        score: f32,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DuplicatePair {
    pub master_id: Uuid,
    pub duplicate_id: Uuid,
    pub similarity_score: f32,
    pub similarity_factors: SimilarityFactors,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DeduplicationReport {
    pub processed: usize,
    pub duplicates_found: usize,
    pub duplicates_removed: usize,
    pub duplicate_pairs: Vec<DuplicatePair>,
    pub processing_time_ms: u64,
    /// False when the scan stopped early; counters cover the work done.
    pub complete: bool,
    pub errors: Vec<String>,
}

pub struct DeduplicationService {
    repo: Arc<dyn OpportunityRepository>,
    cfg: DedupConfig,
}

impl DeduplicationService {
    pub fn new(repo: Arc<dyn OpportunityRepository>, cfg: DedupConfig) -> Self {
        Self { repo, cfg }
    }

    pub fn config(&self) -> &DedupConfig {
        &self.cfg
    }

    /// Best fuzzy match strictly above the threshold among `pool`.
    fn best_match<'a>(
        &self,
        candidate: &CandidateOpportunity,
        pool: impl Iterator<Item = &'a Opportunity>,
    ) -> Option<(&'a Opportunity, f32, SimilarityFactors)> {
        let mut best: Option<(&Opportunity, f32, SimilarityFactors)> = None;
        for o in pool {
            let (score, factors) = score_pair(candidate, &o.as_candidate(), &self.cfg);
            if score > self.cfg.duplicate_threshold && best.as_ref().is_none_or(|b| score > b.1) {
                best = Some((o, score, factors));
            }
        }
        best
    }

    /// Exact check, then fuzzy check, then insert.
    pub async fn check_and_insert(
        &self,
        candidate: &CandidateOpportunity,
        relevance_score: Option<f32>,
    ) -> Result<DedupOutcome, RepositoryError> {
        let hash = candidate_hash(candidate);

        if let Some(existing) = self.repo.find_existing(&candidate.url, &hash).await? {
            self.repo.link_source(existing.id, &candidate.url).await?;
            counter!("dedup_exact_total").increment(1);
            let duplicate_id = self
                .archive_new_source(&existing, candidate, hash, relevance_score)
                .await?;
            debug!(
                target: "dedup",
                existing_id = %existing.id,
                archived = duplicate_id.is_some(),
                title_hash = %anon_hash(&candidate.title),
                "exact duplicate linked"
            );
            return Ok(DedupOutcome::Linked {
                existing_id: existing.id,
                duplicate_id,
            });
        }

        let recent = self
            .repo
            .list_recent(self.cfg.recent_window_days, self.cfg.recent_sample_limit)
            .await?;
        let matched = self
            .best_match(candidate, recent.iter().filter(|o| o.is_active()))
            .map(|(o, s, f)| (o.id, s, f));

        match matched {
            Some((master_id, score, factors)) => {
                let dup = self
                    .repo
                    .create(
                        candidate,
                        NewOpportunity {
                            source_hash: hash,
                            status: OpportunityStatus::Archived,
                            relevance_score,
                        },
                    )
                    .await?;
                self.repo
                    .link_duplicate(DuplicateCandidate {
                        master_id,
                        duplicate_id: dup.id,
                        similarity_score: score,
                        similarity_factors: factors,
                        merge_strategy: MergeStrategy::KeepMaster,
                    })
                    .await?;
                counter!("dedup_fuzzy_total").increment(1);
                debug!(target: "dedup", %master_id, duplicate_id = %dup.id, score, "fuzzy duplicate archived");
                Ok(DedupOutcome::Merged {
                    master_id,
                    duplicate_id: dup.id,
                    score,
                })
            }
            None => {
                let created = self
                    .repo
                    .create(
                        candidate,
                        NewOpportunity {
                            source_hash: hash,
                            status: OpportunityStatus::New,
                            relevance_score,
                        },
                    )
                    .await?;
                Ok(DedupOutcome::Inserted(created))
            }
        }
    }

    /// Whether `discoverer` already contributed to `master`, either as its
    /// origin or through an archived copy.
    async fn has_reported(
        &self,
        master: &Opportunity,
        discoverer: Option<&str>,
    ) -> Result<bool, RepositoryError> {
        if discoverer_of(&master.source_metadata) == discoverer {
            return Ok(true);
        }
        for link in self.repo.links_for(master.id).await? {
            if let Some(dup) = self.repo.get(link.duplicate_id).await? {
                if discoverer_of(&dup.source_metadata) == discoverer {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Exact match from a discoverer new to `master`: keep its copy archived
    /// and linked so the second sighting stays on record.
    async fn archive_new_source(
        &self,
        master: &Opportunity,
        candidate: &CandidateOpportunity,
        hash: String,
        relevance_score: Option<f32>,
    ) -> Result<Option<Uuid>, RepositoryError> {
        let discoverer = discoverer_of(&candidate.source_metadata);
        if self.has_reported(master, discoverer).await? {
            return Ok(None);
        }
        let (_, factors) = score_pair(candidate, &master.as_candidate(), &self.cfg);
        let dup = self
            .repo
            .create(
                candidate,
                NewOpportunity {
                    source_hash: hash,
                    status: OpportunityStatus::Archived,
                    relevance_score,
                },
            )
            .await?;
        self.repo
            .link_duplicate(DuplicateCandidate {
                master_id: master.id,
                duplicate_id: dup.id,
                similarity_score: 1.0,
                similarity_factors: factors,
                merge_strategy: MergeStrategy::KeepMaster,
            })
            .await?;
        Ok(Some(dup.id))
    }

    /// Corpus re-scan. Errors after the first page end the scan early and are
    /// reported in the (partial) report; a failing first page is an error.
    pub async fn run_deduplication(&self) -> Result<DeduplicationReport, DeduplicationError> {
        let started = Instant::now();
        let mut report = DeduplicationReport::default();
        let mut index = TitlePrefixIndex::new();
        // Active records seen so far, by id, for comparison.
        let mut seen: HashMap<Uuid, Opportunity> = HashMap::new();
        let mut offset = 0usize;
        let batch = self.cfg.batch_size.max(1);

        loop {
            let page = match self.repo.list_page(offset, batch).await {
                Ok(p) => p,
                Err(e) if offset == 0 => {
                    return Err(DeduplicationError {
                        processed: 0,
                        source: e,
                    })
                }
                Err(e) => {
                    warn!(target: "dedup", offset, error = %e, "re-scan stopped early");
                    report.errors.push(e.to_string());
                    break;
                }
            };
            if page.is_empty() {
                report.complete = true;
                break;
            }
            offset += page.len();

            for rec in page {
                report.processed += 1;
                if !rec.is_active() {
                    continue;
                }
                let candidate = rec.as_candidate();
                let pool = index
                    .candidates(&rec.title)
                    .iter()
                    .filter_map(|id| seen.get(id));
                let found = self
                    .best_match(&candidate, pool)
                    .map(|(m, s, f)| (m.id, s, f));
                let Some((master_id, score, factors)) = found else {
                    index.insert(rec.id, &rec.title);
                    seen.insert(rec.id, rec);
                    continue;
                };
                report.duplicates_found += 1;

                if let Err(e) = self.archive_duplicate(master_id, &rec, score, factors).await {
                    warn!(target: "dedup", duplicate_id = %rec.id, error = %e, "archive failed");
                    report.errors.push(e.to_string());
                    continue;
                }
                report.duplicates_removed += 1;
                report.duplicate_pairs.push(DuplicatePair {
                    master_id,
                    duplicate_id: rec.id,
                    similarity_score: score,
                    similarity_factors: factors,
                });
            }
        }

        report.processing_time_ms = started.elapsed().as_millis() as u64;
        info!(
            target: "dedup",
            processed = report.processed,
            found = report.duplicates_found,
            removed = report.duplicates_removed,
            ms = report.processing_time_ms,
            "corpus re-scan finished"
        );
        Ok(report)
    }

    async fn archive_duplicate(
        &self,
        master_id: Uuid,
        dup: &Opportunity,
        score: f32,
        factors: SimilarityFactors,
    ) -> Result<(), RepositoryError> {
        self.repo
            .update(
                dup.id,
                OpportunityUpdate {
                    status: Some(OpportunityStatus::Archived),
                    ..Default::default()
                },
            )
            .await?;
        self.repo
            .link_duplicate(DuplicateCandidate {
                master_id,
                duplicate_id: dup.id,
                similarity_score: score,
                similarity_factors: factors,
                merge_strategy: MergeStrategy::ArchiveDuplicate,
            })
            .await
    }
}

fn discoverer_of(meta: &HashMap<String, serde_json::Value>) -> Option<&str> {
    meta.get("discoverer").and_then(|v| v.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryRepository;
    use crate::types::SourceType;

    fn cand(title: &str, org: &str, url: &str) -> CandidateOpportunity {
        let mut c = CandidateOpportunity::new(SourceType::WebSearch);
        c.title = title.into();
        c.organization = Some(org.into());
        c.description = "Funding for emerging painters working in the coastal region this year.".into();
        c.url = url.into();
        c
    }

    fn svc() -> (Arc<InMemoryRepository>, DeduplicationService) {
        let repo = Arc::new(InMemoryRepository::new());
        let s = DeduplicationService::new(repo.clone(), DedupConfig::default());
        (repo, s)
    }

    #[tokio::test]
    async fn same_url_links_instead_of_creating() {
        let (repo, s) = svc();
        let a = cand("Coastal Painting Grant", "Sea Arts", "https://x.org/grant");
        assert!(matches!(s.check_and_insert(&a, None).await.unwrap(), DedupOutcome::Inserted(_)));
        let mut b = a.clone();
        b.title = "Totally different wording".into();
        assert!(matches!(
            s.check_and_insert(&b, None).await.unwrap(),
            DedupOutcome::Linked { duplicate_id: None, .. }
        ));
        assert_eq!(repo.list_page(0, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn new_discoverer_on_exact_match_is_archived_once() {
        let (repo, s) = svc();
        let mut a = cand("Coastal Painting Grant", "Sea Arts", "https://x.org/grant");
        a.source_metadata.insert("discoverer".into(), "serp".into());
        let mut b = a.clone();
        b.source_metadata.insert("discoverer".into(), "bookmarks".into());

        s.check_and_insert(&a, None).await.unwrap();
        let out = s.check_and_insert(&b, None).await.unwrap();
        let DedupOutcome::Linked { duplicate_id: Some(dup), .. } = out else {
            panic!("expected archived copy, got {out:?}");
        };
        assert_eq!(repo.get(dup).await.unwrap().unwrap().status, OpportunityStatus::Archived);

        // Both discoverers seen again: nothing new.
        for c in [&a, &b] {
            let again = s.check_and_insert(c, None).await.unwrap();
            assert!(matches!(again, DedupOutcome::Linked { duplicate_id: None, .. }));
        }
        assert_eq!(repo.list_page(0, 10).await.unwrap().len(), 2);
        assert_eq!(repo.duplicate_links().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn fuzzy_match_archives_new_record() {
        let (repo, s) = svc();
        let a = cand("Coastal Painting Grant", "Sea Arts", "https://x.org/grant");
        let b = cand("Coastal Painting Grants", "Sea Arts", "https://mirror.net/coastal");
        s.check_and_insert(&a, None).await.unwrap();
        let out = s.check_and_insert(&b, None).await.unwrap();
        let DedupOutcome::Merged { duplicate_id, .. } = out else {
            panic!("expected merge, got {out:?}");
        };
        assert_eq!(repo.count_active().await.unwrap(), 1);
        let links = repo.duplicate_links().await.unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].duplicate_id, duplicate_id);
        assert_eq!(links[0].merge_strategy, MergeStrategy::KeepMaster);
    }

    #[tokio::test]
    async fn rescan_archives_later_record_once() {
        let (repo, s) = svc();
        let mut ids = Vec::new();
        for (t, u) in [
            ("Coastal Painting Grant", "https://x.org/a"),
            ("Mural Commission Downtown", "https://y.org/b"),
            ("Coastal Painting Grants", "https://z.org/c"),
        ] {
            let c = cand(t, "Sea Arts", u);
            let o = repo
                .create(
                    &c,
                    NewOpportunity {
                        source_hash: candidate_hash(&c),
                        status: OpportunityStatus::New,
                        relevance_score: None,
                    },
                )
                .await
                .unwrap();
            ids.push(o.id);
        }

        let report = s.run_deduplication().await.unwrap();
        assert!(report.complete);
        assert_eq!(report.processed, 3);
        assert_eq!(report.duplicates_found, 1);
        assert_eq!(report.duplicate_pairs[0].master_id, ids[0]);
        assert_eq!(report.duplicate_pairs[0].duplicate_id, ids[2]);
        assert_eq!(repo.count_active().await.unwrap(), 2);

        // Second pass finds nothing new.
        let again = s.run_deduplication().await.unwrap();
        assert_eq!(again.duplicates_found, 0);
        assert_eq!(repo.duplicate_links().await.unwrap().len(), 1);
    }
}
