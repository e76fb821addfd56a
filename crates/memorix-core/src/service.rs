//! Memory Service Façade (§4.K). Grounded in the teacher's `MemoryServer`
//! (`crates/memory/src/server.rs`): a single value, constructed once at
//! startup, owning every component and exposing the operations an outer
//! transport dispatches into. Every write path acquires the project lock
//! (via the components it delegates to); every read path is lock-free.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;

use crate::atomic_io;
use crate::config::EngineConfig;
use crate::embeddings::{self, EmbeddingManager};
use crate::error::{MemorixError, MemorixResult};
use crate::graph::{GraphSnapshot, KnowledgeGraph};
use crate::model::{Entity, Observation, ObservationId, ObservationInput, ProjectIdentity, Relation};
use crate::observations::ObservationsManager;
use crate::persistence;
use crate::project::{self, AliasRegistry};
use crate::retention;
use crate::search::{SearchHit, SearchIndex, SearchQuery};
use crate::session::{SessionContext, SessionManager};

const SEARCH_INDEX_DIR: &str = "search_index";
const MODEL_DIR: &str = ".models";

/// Startup diagnostics surfaced once when the engine comes up (SPEC_FULL.md's
/// "Supplemented features": an `EngineStats` summary, grounded in
/// `ccmemory`'s `health_check`/`project_stats` tool names and the teacher's
/// `tracing::info!` startup summaries).
#[derive(Debug, Clone)]
pub struct EngineStats {
    pub project_id: String,
    pub observation_count: usize,
    pub embedding_provider: Option<&'static str>,
    pub vector_search_active: bool,
}

/// The single engine value an outer transport (an MCP server, a CLI) holds
/// for the lifetime of the process.
pub struct Engine {
    config: EngineConfig,
    project_id: String,
    aliases: RwLock<AliasRegistry>,
    observations: Arc<ObservationsManager>,
    graph: KnowledgeGraph,
    sessions: SessionManager,
    embeddings: EmbeddingManager,
    index: RwLock<SearchIndex>,
}

impl Engine {
    pub async fn new(config: EngineConfig) -> MemorixResult<Arc<Self>> {
        persistence::ensure_data_root(&config.data_root).await?;
        let flattened = persistence::flatten_subdirectories(&config.data_root).await?;
        if flattened > 0 {
            info!(subdirectories = flattened, "flattened legacy per-project subdirectories");
        }

        let identity = project::detect(&config.cwd);
        if identity.id == "__invalid__" {
            return Err(MemorixError::InvalidProject {
                path: config.cwd.clone(),
            });
        }

        let mut registry = AliasRegistry::from_file(persistence::load_aliases(&config.data_root).await?);
        registry.auto_merge_by_basename();
        let mut project_id = registry.register(&identity);

        let observations = Arc::new(ObservationsManager::load(config.data_root.clone()).await?);

        // Seed the registry with every projectId already on disk and re-merge
        // by basename, so a placeholder/local id from a prior run folds into
        // the same group as today's detected identity before migration runs.
        let historic_ids: HashSet<String> = observations
            .snapshot()
            .await
            .iter()
            .map(|o| o.project_id.clone())
            .collect();
        for id in &historic_ids {
            if registry.canonical_of(id).is_none() {
                registry.register(&ProjectIdentity {
                    id: id.clone(),
                    name: id.clone(),
                    root_path: format!("__historic__/{id}"),
                    git_remote: None,
                });
            }
        }
        registry.auto_merge_by_basename();
        project_id = registry.canonical_of(&project_id).unwrap_or(project_id);
        persistence::save_aliases(&config.data_root, &registry.to_file()).await?;

        let migration_aliases = registry.resolve_aliases(&project_id);
        let migrated = observations
            .migrate_project_ids(&migration_aliases, &project_id)
            .await?;
        if migrated > 0 {
            info!(migrated, project_id = %project_id, "migrated legacy projectIds to canonical");
        }

        let graph = KnowledgeGraph::load(config.data_root.clone()).await?;
        let sessions = SessionManager::load(config.data_root.clone()).await?;

        let provider = embeddings::select_provider(&config.data_root.join(MODEL_DIR)).await;
        let embedding_manager = EmbeddingManager::new(
            provider,
            config.data_root.join(persistence::EMBEDDING_CACHE_FILE),
            config.embedding_cache.in_memory_capacity,
            config.embedding_cache.provider_batch_size,
        );
        embedding_manager.load_cache().await;

        let index = RwLock::new(SearchIndex::open(&config.data_root.join(SEARCH_INDEX_DIR))?);
        observations.reindex(&index, &embedding_manager).await?;
        info!(
            project_id = %project_id,
            observations = observations.snapshot().await.len(),
            provider = embedding_manager.provider_name().unwrap_or("none"),
            "memorix engine ready"
        );

        Ok(Arc::new(Self {
            config,
            project_id,
            aliases: RwLock::new(registry),
            observations,
            graph,
            sessions,
            embeddings: embedding_manager,
            index,
        }))
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub async fn stats(&self) -> EngineStats {
        EngineStats {
            project_id: self.project_id.clone(),
            observation_count: self.observations.snapshot().await.len(),
            embedding_provider: self.embeddings.provider_name(),
            vector_search_active: self.embeddings.is_active(),
        }
    }

    /// Resolve a caller-supplied (or default-current) project id to its full
    /// alias set, expanding once per call (§4.F.1, §4.C).
    async fn resolve_project_ids(&self, requested: Option<&str>) -> Vec<String> {
        let id = requested.unwrap_or(&self.project_id);
        self.aliases.read().await.resolve_aliases(id)
    }

    pub async fn store(&self, mut input: ObservationInput) -> MemorixResult<Observation> {
        if let Some(canonical) = self.aliases.read().await.canonical_of(&input.project_id) {
            input.project_id = canonical;
        }
        self.observations.store(input, &self.index, &self.embeddings).await
    }

    pub async fn get_observation(&self, id: ObservationId) -> Option<Observation> {
        self.observations.get(id).await
    }

    /// Layer 1 search (§4.F). `query.project_ids`, if empty, defaults to the
    /// current project's full alias set.
    pub async fn search(&self, mut query: SearchQuery) -> MemorixResult<Vec<SearchHit>> {
        if query.project_ids.is_empty() {
            query.project_ids = self.resolve_project_ids(None).await;
        } else {
            let mut expanded = Vec::new();
            for id in &query.project_ids {
                expanded.extend(self.resolve_project_ids(Some(id)).await);
            }
            query.project_ids = expanded;
        }

        let query_embedding = if !query.query.trim().is_empty() && self.embeddings.is_active() {
            self.embeddings.embed(&query.query).await?
        } else {
            None
        };

        let hits = self.index.read().await.search(&query, query_embedding.as_deref())?;
        let ids: Vec<ObservationId> = hits.iter().map(|h| h.id).collect();
        if !ids.is_empty() {
            self.observations.record_access(ids);
        }
        Ok(hits)
    }

    /// Layer 2 ("timeline"): recent observations for a project, no query
    /// scoring, just recency.
    pub async fn timeline(&self, project_id: Option<&str>, limit: usize) -> Vec<Observation> {
        let project_ids = self.resolve_project_ids(project_id).await;
        let mut observations: Vec<Observation> = self
            .observations
            .snapshot()
            .await
            .into_iter()
            .filter(|o| project_ids.iter().any(|p| p == &o.project_id))
            .collect();
        observations.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        observations.truncate(limit.max(1));
        observations
    }

    /// Layer 3 ("detail"): the full observation record.
    pub async fn detail(&self, id: ObservationId) -> Option<Observation> {
        self.observations.get(id).await
    }

    pub async fn create_entities(&self, entities: Vec<Entity>) -> MemorixResult<Vec<Entity>> {
        self.graph.create_entities(entities).await
    }

    pub async fn create_relations(&self, relations: Vec<Relation>) -> MemorixResult<Vec<Relation>> {
        self.graph.create_relations(relations).await
    }

    pub async fn add_observations_to_entity(&self, entity_name: &str, lines: Vec<String>) -> MemorixResult<Vec<String>> {
        self.graph.add_observations(entity_name, lines).await
    }

    pub async fn search_nodes(&self, query: &str) -> GraphSnapshot {
        self.graph.search_nodes(query).await
    }

    pub async fn open_nodes(&self, names: &[String]) -> GraphSnapshot {
        self.graph.open_nodes(names).await
    }

    pub async fn read_graph(&self) -> GraphSnapshot {
        self.graph.read_graph().await
    }

    pub async fn session_start(&self, agent: &str) -> MemorixResult<SessionContext> {
        self.sessions
            .session_start(agent, &self.project_id, &self.observations, &self.config.retention)
            .await
    }

    pub async fn session_end(&self, id: &str, summary: String) -> MemorixResult<crate::model::Session> {
        self.sessions.session_end(id, summary).await
    }

    pub async fn session_context(&self, id: &str) -> MemorixResult<crate::model::Session> {
        self.sessions.session_context(id).await
    }

    pub async fn reindex(&self) -> MemorixResult<()> {
        self.observations.reindex(&self.index, &self.embeddings).await
    }

    /// `archive(threshold)` (§4.I): non-immune observations scoring below
    /// `threshold` move from the live set into `observations.archived.json`
    /// and drop out of the search index. Never reversed automatically.
    pub async fn archive(&self, threshold: f64) -> MemorixResult<usize> {
        let data_root = self.config.data_root.clone();
        let now = chrono::Utc::now();
        let retention_config = self.config.retention;
        let mut archived_ids = Vec::new();

        atomic_io::with_lock(&data_root, || async {
            let observations = persistence::load_observations(&data_root).await?;
            let mut archive = persistence::load_archive(&data_root).await?;
            let (kept, archived) = retention::partition_for_archival(observations, &retention_config, threshold, now);
            archived_ids = archived.iter().map(|o| o.id).collect();
            archive.extend(archived);
            persistence::save_observations(&data_root, &kept).await?;
            persistence::save_archive(&data_root, &archive).await?;
            Ok(())
        })
        .await?;

        self.observations.reload().await?;
        if !archived_ids.is_empty() {
            let mut index = self.index.write().await;
            for id in &archived_ids {
                index.remove(*id)?;
            }
        }
        Ok(archived_ids.len())
    }

    pub fn data_root(&self) -> &PathBuf {
        &self.config.data_root
    }
}
