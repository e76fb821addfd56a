//! Hybrid search index (§4.F). Lexical side grounded in
//! `examples/tombelieber-claude-view`'s `crates/search` (schema/writer/reader
//! setup, per-token `FuzzyTermQuery`, `BooleanQuery` composition,
//! schema-version-triggered rebuild — the teacher has no lexical search of
//! its own). Vector side grounded in the teacher's
//! `EmbeddingManager::find_most_similar` (brute-force cosine similarity).

mod lexical;
mod vector;

use std::collections::HashMap;
use std::path::Path;

use tracing::debug;

pub use lexical::SCHEMA_VERSION;

use crate::error::MemorixResult;
use crate::model::{Observation, ObservationId, ObservationType};
use vector::VectorIndex;

/// Input to Layer 1 search (§4.F).
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    pub query: String,
    pub project_ids: Vec<String>,
    pub kind: Option<ObservationType>,
    pub since: Option<chrono::DateTime<chrono::Utc>>,
    pub until: Option<chrono::DateTime<chrono::Utc>>,
    pub limit: usize,
    pub max_tokens: Option<u64>,
}

/// A compact Layer 1 hit, costing ~50-100 tokens (§4.F).
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub id: ObservationId,
    pub time: chrono::DateTime<chrono::Utc>,
    pub kind: ObservationType,
    pub icon: &'static str,
    pub title: String,
    pub tokens: u64,
    pub matched_fields: Vec<&'static str>,
}

const FIELD_WEIGHTS: &[(&str, f32)] = &[
    ("title", 3.0),
    ("entity_name", 2.0),
    ("concepts", 1.5),
    ("narrative", 1.0),
    ("facts", 1.0),
    ("files_modified", 0.5),
];

const VECTOR_SIMILARITY_THRESHOLD: f32 = 0.5;
const TEXT_WEIGHT: f32 = 0.6;
const VECTOR_WEIGHT: f32 = 0.4;

pub struct SearchIndex {
    lexical: lexical::LexicalIndex,
    vector: VectorIndex,
    observations: HashMap<ObservationId, Observation>,
}

impl SearchIndex {
    pub fn open(path: &Path) -> MemorixResult<Self> {
        Ok(Self {
            lexical: lexical::LexicalIndex::open(path)?,
            vector: VectorIndex::new(),
            observations: HashMap::new(),
        })
    }

    pub fn open_in_ram() -> MemorixResult<Self> {
        Ok(Self {
            lexical: lexical::LexicalIndex::open_in_ram()?,
            vector: VectorIndex::new(),
            observations: HashMap::new(),
        })
    }

    pub fn insert(&mut self, observation: &Observation, embedding: Option<Vec<f32>>) -> MemorixResult<()> {
        self.lexical.insert(observation)?;
        self.lexical.commit()?;
        if let Some(vector) = embedding {
            self.vector.insert(observation.id, vector);
        }
        self.observations.insert(observation.id, observation.clone());
        Ok(())
    }

    pub fn remove(&mut self, id: ObservationId) -> MemorixResult<()> {
        self.lexical.remove(id)?;
        self.lexical.commit()?;
        self.vector.remove(id);
        self.observations.remove(&id);
        Ok(())
    }

    pub fn is_vector_active(&self) -> bool {
        !self.vector.is_empty()
    }

    /// Layer 1 search (§4.F.2-8). `query_embedding` is supplied by the
    /// façade when a vector provider is active and the query is non-empty.
    pub fn search(
        &self,
        query: &SearchQuery,
        query_embedding: Option<&[f32]>,
    ) -> MemorixResult<Vec<SearchHit>> {
        if query.query.trim().is_empty() {
            return Ok(self.search_by_filters_only(query));
        }

        let over_fetch = if query.project_ids.len() > 1 {
            query.limit.saturating_mul(3).max(query.limit)
        } else {
            query.limit.saturating_mul(4).max(20)
        };

        let lexical_hits = self.lexical.search(&query.query, over_fetch.max(1))?;

        let mut scored: Vec<(ObservationId, f32, Vec<&'static str>)> = Vec::new();
        for (id, text_score, matched_fields) in lexical_hits {
            let Some(obs) = self.observations.get(&id) else {
                continue;
            };
            if !query.project_ids.is_empty() && !query.project_ids.iter().any(|p| p == &obs.project_id) {
                continue;
            }
            if let Some(kind) = query.kind {
                if obs.kind != kind {
                    continue;
                }
            }

            let mut final_score = text_score;
            let mut matched = matched_fields;
            if let Some(q_vec) = query_embedding {
                if let Some(v_score) = self.vector.similarity(id, q_vec) {
                    if v_score < VECTOR_SIMILARITY_THRESHOLD {
                        continue;
                    }
                    final_score = TEXT_WEIGHT * text_score + VECTOR_WEIGHT * v_score;
                } else {
                    continue;
                }
            }
            if matched.is_empty() {
                matched.push("fuzzy");
            }
            scored.push((id, final_score, matched));
        }

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let mut hits = Vec::new();
        for (id, _score, matched_fields) in scored {
            let obs = &self.observations[&id];
            if let Some(since) = query.since {
                if obs.created_at < since {
                    continue;
                }
            }
            if let Some(until) = query.until {
                if obs.created_at > until {
                    continue;
                }
            }
            hits.push(SearchHit {
                id: obs.id,
                time: obs.created_at,
                kind: obs.kind,
                icon: obs.kind.icon(),
                title: obs.title.clone(),
                tokens: obs.tokens,
                matched_fields,
            });
        }

        hits.truncate(query.limit.max(1));

        if let Some(budget) = query.max_tokens {
            hits = apply_token_budget(hits, budget);
        }

        debug!(hits = hits.len(), query = %query.query, "search executed");
        Ok(hits)
    }

    /// Empty-query path (§8): no lexical or vector ranking applies, so
    /// filter-matching observations are returned in insertion (id) order
    /// instead of relevance order.
    fn search_by_filters_only(&self, query: &SearchQuery) -> Vec<SearchHit> {
        let mut ids: Vec<ObservationId> = self
            .observations
            .values()
            .filter(|obs| query.project_ids.is_empty() || query.project_ids.iter().any(|p| p == &obs.project_id))
            .filter(|obs| query.kind.is_none_or(|kind| obs.kind == kind))
            .filter(|obs| query.since.is_none_or(|since| obs.created_at >= since))
            .filter(|obs| query.until.is_none_or(|until| obs.created_at <= until))
            .map(|obs| obs.id)
            .collect();
        ids.sort_unstable();
        ids.truncate(query.limit.max(1));

        let mut hits: Vec<SearchHit> = ids
            .into_iter()
            .map(|id| {
                let obs = &self.observations[&id];
                SearchHit {
                    id: obs.id,
                    time: obs.created_at,
                    kind: obs.kind,
                    icon: obs.kind.icon(),
                    title: obs.title.clone(),
                    tokens: obs.tokens,
                    matched_fields: Vec::new(),
                }
            })
            .collect();

        if let Some(budget) = query.max_tokens {
            hits = apply_token_budget(hits, budget);
        }
        hits
    }
}

/// Accumulate hits in order until the next hit would exceed `budget`; always
/// include at least one hit even if it alone exceeds the budget (§4.F.6, S5).
fn apply_token_budget(hits: Vec<SearchHit>, budget: u64) -> Vec<SearchHit> {
    let mut out = Vec::new();
    let mut sum = 0u64;
    for hit in hits {
        if out.is_empty() {
            out.push(hit);
            sum = out[0].tokens;
            continue;
        }
        if sum + hit.tokens > budget {
            break;
        }
        sum += hit.tokens;
        out.push(hit);
    }
    out
}

pub(crate) fn field_weight(field: &str) -> f32 {
    FIELD_WEIGHTS
        .iter()
        .find(|(name, _)| *name == field)
        .map(|(_, w)| *w)
        .unwrap_or(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(tokens: u64) -> SearchHit {
        SearchHit {
            id: 1,
            time: chrono::Utc::now(),
            kind: ObservationType::Discovery,
            icon: "x",
            title: "t".into(),
            tokens,
            matched_fields: vec![],
        }
    }

    #[test]
    fn token_budget_takes_longest_prefix_under_budget() {
        let hits = vec![30, 40, 35, 50, 20, 25, 60, 10, 45, 30]
            .into_iter()
            .map(hit)
            .collect();
        let trimmed = apply_token_budget(hits, 120);
        let sums: Vec<u64> = trimmed.iter().map(|h| h.tokens).collect();
        assert_eq!(sums, vec![30, 40, 35]);
    }

    #[test]
    fn token_budget_always_includes_at_least_one_hit() {
        let hits = vec![hit(200)];
        let trimmed = apply_token_budget(hits, 120);
        assert_eq!(trimmed.len(), 1);
    }
}
