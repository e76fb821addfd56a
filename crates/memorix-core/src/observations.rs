//! Observations Manager (§4.G). No teacher analogue exists for an
//! append-mostly, topic-key-upserted record store; built in the teacher's
//! general idiom (`Arc<RwLock<..>>` state, async methods returning
//! `MemorixResult`, reconcile-on-write persistence), with naming enriched by
//! `agentreplay-agentreplay`'s `agentreplay-memory::observation` module.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::atomic_io;
use crate::embeddings::EmbeddingManager;
use crate::error::{MemorixError, MemorixResult};
use crate::extractor;
use crate::model::{Observation, ObservationInput};
use crate::persistence;
use crate::search::SearchIndex;

pub struct ObservationsManager {
    data_root: PathBuf,
    observations: RwLock<Vec<Observation>>,
    next_id: RwLock<u64>,
}

/// `tokens` is a pure function of (title, narrative, facts, filesModified,
/// concepts) after enrichment (§3 invariant) — a whitespace-word-count
/// heuristic, cheap enough to recompute on every upsert.
pub fn compute_tokens(
    title: &str,
    narrative: &str,
    facts: &[String],
    files: &[String],
    concepts: &[String],
) -> u64 {
    let mut count = title.split_whitespace().count();
    count += narrative.split_whitespace().count();
    count += facts.iter().map(|f| f.split_whitespace().count()).sum::<usize>();
    count += files.len();
    count += concepts.len();
    count as u64
}

impl ObservationsManager {
    pub async fn load(data_root: PathBuf) -> MemorixResult<Self> {
        let observations = persistence::load_observations(&data_root).await?;
        let counter = persistence::load_counter(&data_root).await?;
        Ok(Self {
            data_root,
            observations: RwLock::new(observations),
            next_id: RwLock::new(counter.next_id),
        })
    }

    pub async fn snapshot(&self) -> Vec<Observation> {
        self.observations.read().await.clone()
    }

    /// Refresh the in-memory mirror from disk. Used after an out-of-band
    /// writer (the retention engine's archive pass, a migration) changes
    /// `observations.json` directly.
    pub async fn reload(&self) -> MemorixResult<()> {
        let observations = persistence::load_observations(&self.data_root).await?;
        *self.observations.write().await = observations;
        Ok(())
    }

    pub async fn get(&self, id: u64) -> Option<Observation> {
        self.observations.read().await.iter().find(|o| o.id == id).cloned()
    }

    pub async fn find_by_topic_key(&self, project_id: &str, topic_key: &str) -> Option<Observation> {
        self.observations
            .read()
            .await
            .iter()
            .find(|o| o.project_id == project_id && o.topic_key.as_deref() == Some(topic_key))
            .cloned()
    }

    /// `store(input)` (§4.G): dispatches to upsert when the topic key already
    /// exists for this project, otherwise allocates a new id, enriches,
    /// indexes, and persists under the project lock.
    pub async fn store(
        &self,
        input: ObservationInput,
        index: &RwLock<SearchIndex>,
        embeddings: &EmbeddingManager,
    ) -> MemorixResult<Observation> {
        if let Some(topic_key) = &input.topic_key {
            if let Some(existing) = self.find_by_topic_key(&input.project_id, topic_key).await {
                return self.upsert(existing, input, index, embeddings).await;
            }
        }

        let extracted = extractor::extract(&format!(
            "{} {} {}",
            input.title,
            input.narrative,
            input.facts.join(" ")
        ));
        let concepts = extractor::enrich_concepts(&input.concepts, &extracted);
        let files_modified = extractor::enrich_files(&input.files_modified, &extracted.files);
        let tokens = compute_tokens(&input.title, &input.narrative, &input.facts, &files_modified, &concepts);

        let now = chrono::Utc::now();
        let mut observation = Observation {
            id: 0,
            entity_name: input.entity_name,
            kind: input.kind,
            title: input.title,
            narrative: input.narrative,
            facts: input.facts,
            files_modified,
            concepts,
            tokens,
            created_at: now,
            updated_at: now,
            project_id: input.project_id,
            has_causal_language: extracted.has_causal_language,
            topic_key: input.topic_key,
            revision_count: 1,
            session_id: input.session_id,
            access_count: 0,
            last_accessed_at: None,
        };

        let embedding_text = format!(
            "{} {} {}",
            observation.title,
            observation.narrative,
            observation.facts.join(" ")
        );
        let embedding = embeddings.embed(&embedding_text).await?;

        let data_root = self.data_root.clone();
        atomic_io::with_lock(&data_root, || async {
            let mut on_disk = persistence::load_observations(&data_root).await?;
            let disk_counter = persistence::load_counter(&data_root).await?;
            let mut next_id = disk_counter.next_id.max(*self.next_id.read().await);
            // Id is allocated here, under the lock, from the freshly reconciled
            // counter: a pre-lock allocation would hand the same id to two
            // racing processes loaded from the same stale disk counter.
            if observation.id == 0 || on_disk.iter().any(|o| o.id == observation.id) {
                observation.id = next_id;
            }
            next_id = observation.id + 1;
            on_disk.push(observation.clone());
            persistence::save_observations(&data_root, &on_disk).await?;
            persistence::save_counter(&data_root, persistence::Counter { next_id }).await?;
            *self.next_id.write().await = next_id;
            *self.observations.write().await = on_disk;
            Ok(())
        })
        .await?;

        {
            let mut idx = index.write().await;
            idx.insert(&observation, embedding)?;
        }

        Ok(observation)
    }

    /// `upsert(existing, input)` (§4.G): replace content fields, bump
    /// `revisionCount`, preserve id and createdAt.
    pub async fn upsert(
        &self,
        existing: Observation,
        input: ObservationInput,
        index: &RwLock<SearchIndex>,
        embeddings: &EmbeddingManager,
    ) -> MemorixResult<Observation> {
        let extracted = extractor::extract(&format!(
            "{} {} {}",
            input.title,
            input.narrative,
            input.facts.join(" ")
        ));
        let concepts = extractor::enrich_concepts(&input.concepts, &extracted);
        let files_modified = extractor::enrich_files(&input.files_modified, &extracted.files);
        let tokens = compute_tokens(&input.title, &input.narrative, &input.facts, &files_modified, &concepts);

        let updated = Observation {
            id: existing.id,
            entity_name: input.entity_name,
            kind: input.kind,
            title: input.title,
            narrative: input.narrative,
            facts: input.facts,
            files_modified,
            concepts,
            tokens,
            created_at: existing.created_at,
            updated_at: chrono::Utc::now(),
            project_id: input.project_id,
            has_causal_language: extracted.has_causal_language,
            topic_key: input.topic_key,
            revision_count: existing.revision_count + 1,
            session_id: input.session_id.or(existing.session_id),
            access_count: existing.access_count,
            last_accessed_at: existing.last_accessed_at,
        };

        let embedding_text = format!(
            "{} {} {}",
            updated.title,
            updated.narrative,
            updated.facts.join(" ")
        );
        let embedding = embeddings.embed(&embedding_text).await?;

        {
            let mut idx = index.write().await;
            idx.remove(updated.id)?;
            idx.insert(&updated, embedding)?;
        }

        let data_root = self.data_root.clone();
        let result = updated.clone();
        atomic_io::with_lock(&data_root, || async {
            let mut on_disk = persistence::load_observations(&data_root).await?;
            if let Some(slot) = on_disk.iter_mut().find(|o| o.id == updated.id) {
                *slot = updated.clone();
            } else {
                on_disk.push(updated.clone());
            }
            persistence::save_observations(&data_root, &on_disk).await?;
            *self.observations.write().await = on_disk;
            Ok(())
        })
        .await?;

        Ok(result)
    }

    /// `reindex()` (§4.G): rebuild the search index from the observations
    /// file using one `embedBatch` call. Individual insertion failures are
    /// logged and skipped; batch embedding failure degrades to
    /// lexical-only rather than aborting.
    pub async fn reindex(&self, index: &RwLock<SearchIndex>, embeddings: &EmbeddingManager) -> MemorixResult<()> {
        let observations = self.observations.read().await.clone();
        let texts: Vec<String> = observations
            .iter()
            .map(|o| format!("{} {} {}", o.title, o.narrative, o.facts.join(" ")))
            .collect();

        let vectors = match embeddings.embed_batch(&texts).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "reindex batch embedding failed, degrading to lexical-only");
                None
            }
        };

        let mut idx = index.write().await;
        for (i, observation) in observations.iter().enumerate() {
            let embedding = vectors.as_ref().and_then(|v| v.get(i).cloned());
            if let Err(e) = idx.insert(observation, embedding) {
                warn!(id = observation.id, error = %e, "skipping observation during reindex");
            }
        }
        info!(count = observations.len(), "reindex complete");
        Ok(())
    }

    /// `migrateProjectIds(aliases, canonical)` (§4.G, §4.C): rewrite
    /// in-memory observations whose projectId is a non-canonical alias;
    /// persist once.
    pub async fn migrate_project_ids(&self, aliases: &[String], canonical: &str) -> MemorixResult<usize> {
        let mut count = 0;
        let data_root = self.data_root.clone();
        atomic_io::with_lock(&data_root, || async {
            let mut observations = persistence::load_observations(&data_root).await?;
            for obs in observations.iter_mut() {
                if aliases.iter().any(|a| a == &obs.project_id) && obs.project_id != canonical {
                    obs.project_id = canonical.to_string();
                    count += 1;
                }
            }
            persistence::save_observations(&data_root, &observations).await?;
            *self.observations.write().await = observations;
            Ok(())
        })
        .await?;
        Ok(count)
    }

    /// Increment accessCount/lastAccessedAt for returned hits. Fire-and-forget:
    /// errors are swallowed, caller is never blocked on this (§4.F.8, §9).
    pub fn record_access(self: &Arc<Self>, ids: Vec<u64>) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut observations = manager.observations.write().await;
            let now = chrono::Utc::now();
            for id in &ids {
                if let Some(obs) = observations.iter_mut().find(|o| o.id == *id) {
                    obs.access_count += 1;
                    obs.last_accessed_at = Some(now);
                }
            }
            let data_root = manager.data_root.clone();
            let snapshot = observations.clone();
            drop(observations);
            if let Err(e) = persistence::save_observations(&data_root, &snapshot).await {
                warn!(error = %e, "failed to persist access accounting update");
            }
        });
    }

    pub async fn delete(&self, id: u64, index: &RwLock<SearchIndex>) -> MemorixResult<()> {
        let data_root = self.data_root.clone();
        let mut found = false;
        atomic_io::with_lock(&data_root, || async {
            let mut observations = persistence::load_observations(&data_root).await?;
            let before = observations.len();
            observations.retain(|o| o.id != id);
            found = observations.len() != before;
            persistence::save_observations(&data_root, &observations).await?;
            *self.observations.write().await = observations;
            Ok(())
        })
        .await?;
        if !found {
            return Err(MemorixError::NotFound {
                kind: "observation",
                id: id.to_string(),
            });
        }
        index.write().await.remove(id)?;
        Ok(())
    }
}
