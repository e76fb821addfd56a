//! Thin stdio MCP binary wiring `memorix-core`'s `Engine` to tool calls.
//! Intentionally carries no business logic: every handler marshals params,
//! delegates to the engine, and shapes the response as JSON text. Modeled on
//! the teacher's `MemoryServer` (`#[tool_router]`/`#[tool_handler]`, a single
//! state value cloned into the router, `tracing_subscriber` writing to
//! stderr so stdout stays clean for the protocol framing).

use std::sync::Arc;

use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::*,
    tool, tool_handler, tool_router,
    transport::stdio,
    ServiceExt,
};
use schemars::JsonSchema;
use serde::Deserialize;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use memorix_core::model::{Entity, ObservationInput, ObservationType, Relation};
use memorix_core::search::SearchQuery;
use memorix_core::{Engine, EngineConfig};

fn parse_observation_type(raw: &str) -> Result<ObservationType, ErrorData> {
    serde_json::from_value(serde_json::Value::String(raw.to_string()))
        .map_err(|_| ErrorData::invalid_params(format!("unknown observation type '{raw}'"), None))
}

fn engine_error(e: memorix_core::MemorixError) -> ErrorData {
    ErrorData::internal_error(e.to_string(), None)
}

fn json_result<T: serde::Serialize>(value: &T) -> Result<CallToolResult, ErrorData> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| ErrorData::internal_error(format!("failed to serialize response: {e}"), None))?;
    Ok(CallToolResult::success(vec![Content::text(text)]))
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StoreObservationParams {
    pub entity_name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub narrative: String,
    #[serde(default)]
    pub facts: Vec<String>,
    #[serde(default)]
    pub files_modified: Vec<String>,
    #[serde(default)]
    pub concepts: Vec<String>,
    /// Project id override; defaults to the detected current project.
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub topic_key: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    pub query: String,
    #[serde(default)]
    pub project_ids: Vec<String>,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub since: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub until: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default = "default_search_limit")]
    pub limit: usize,
    #[serde(default)]
    pub max_tokens: Option<u64>,
}

fn default_search_limit() -> usize {
    10
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TimelineParams {
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default = "default_timeline_limit")]
    pub limit: usize,
}

fn default_timeline_limit() -> usize {
    20
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DetailParams {
    pub id: u64,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateEntitiesParams {
    pub entities: Vec<EntityParam>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EntityParam {
    pub name: String,
    pub entity_type: String,
    #[serde(default)]
    pub observations: Vec<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateRelationsParams {
    pub relations: Vec<RelationParam>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RelationParam {
    pub from: String,
    pub to: String,
    pub relation_type: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddObservationsParams {
    pub entity_name: String,
    pub observations: Vec<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchNodesParams {
    pub query: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OpenNodesParams {
    pub names: Vec<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionStartParams {
    pub agent: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionEndParams {
    pub session_id: String,
    pub summary: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionContextParams {
    pub session_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveParams {
    pub threshold: f64,
}

#[derive(Clone)]
pub struct MemorixServer {
    engine: Arc<Engine>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl MemorixServer {
    pub async fn new(config: EngineConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let engine = Engine::new(config).await?;
        Ok(Self {
            engine,
            tool_router: Self::tool_router(),
        })
    }

    #[tool(description = "Store a new memory observation about this project, or update the existing one sharing the same topicKey. Extracts file paths and code identifiers from the text automatically.")]
    async fn store_observation(&self, params: Parameters<StoreObservationParams>) -> Result<CallToolResult, ErrorData> {
        let p = params.0;
        let kind = parse_observation_type(&p.kind)?;
        let input = ObservationInput {
            entity_name: p.entity_name,
            kind,
            title: p.title,
            narrative: p.narrative,
            facts: p.facts,
            files_modified: p.files_modified,
            concepts: p.concepts,
            project_id: p.project_id.unwrap_or_else(|| self.engine.project_id().to_string()),
            topic_key: p.topic_key,
            session_id: p.session_id,
        };
        let observation = self.engine.store(input).await.map_err(engine_error)?;
        json_result(&observation)
    }

    #[tool(description = "Hybrid (lexical + semantic) search over stored observations for this project. Returns compact hits; use GetObservationDetail for the full record.")]
    async fn search(&self, params: Parameters<SearchParams>) -> Result<CallToolResult, ErrorData> {
        let p = params.0;
        let kind = match &p.kind {
            Some(raw) => Some(parse_observation_type(raw)?),
            None => None,
        };
        let query = SearchQuery {
            query: p.query,
            project_ids: p.project_ids,
            kind,
            since: p.since,
            until: p.until,
            limit: p.limit,
            max_tokens: p.max_tokens,
        };
        let hits = self.engine.search(query).await.map_err(engine_error)?;
        json_result(&hits)
    }

    #[tool(description = "List recent observations for a project in chronological order, without a search query.")]
    async fn timeline(&self, params: Parameters<TimelineParams>) -> Result<CallToolResult, ErrorData> {
        let p = params.0;
        let observations = self.engine.timeline(p.project_id.as_deref(), p.limit).await;
        json_result(&observations)
    }

    #[tool(description = "Fetch the full record for a single observation by id.")]
    async fn get_observation_detail(&self, params: Parameters<DetailParams>) -> Result<CallToolResult, ErrorData> {
        match self.engine.detail(params.0.id).await {
            Some(observation) => json_result(&observation),
            None => Err(ErrorData::invalid_params(format!("observation {} not found", params.0.id), None)),
        }
    }

    #[tool(description = "Create knowledge-graph entities. Entities that already exist by name are left untouched.")]
    async fn create_entities(&self, params: Parameters<CreateEntitiesParams>) -> Result<CallToolResult, ErrorData> {
        let entities = params
            .0
            .entities
            .into_iter()
            .map(|e| Entity {
                name: e.name,
                entity_type: e.entity_type,
                observations: e.observations,
            })
            .collect();
        let created = self.engine.create_entities(entities).await.map_err(engine_error)?;
        json_result(&created)
    }

    #[tool(description = "Create knowledge-graph relations. Relations matching an existing (from, to, relationType) tuple are skipped.")]
    async fn create_relations(&self, params: Parameters<CreateRelationsParams>) -> Result<CallToolResult, ErrorData> {
        let relations = params
            .0
            .relations
            .into_iter()
            .map(|r| Relation {
                from: r.from,
                to: r.to,
                relation_type: r.relation_type,
            })
            .collect();
        let created = self.engine.create_relations(relations).await.map_err(engine_error)?;
        json_result(&created)
    }

    #[tool(description = "Append observation lines to an existing knowledge-graph entity. Exact-duplicate lines are skipped.")]
    async fn add_observations(&self, params: Parameters<AddObservationsParams>) -> Result<CallToolResult, ErrorData> {
        let p = params.0;
        let added = self
            .engine
            .add_observations_to_entity(&p.entity_name, p.observations)
            .await
            .map_err(engine_error)?;
        json_result(&added)
    }

    #[tool(description = "Search knowledge-graph entities by name or observation text (case-insensitive).")]
    async fn search_nodes(&self, params: Parameters<SearchNodesParams>) -> Result<CallToolResult, ErrorData> {
        let snapshot = self.engine.search_nodes(&params.0.query).await;
        json_result(&snapshot)
    }

    #[tool(description = "Fetch knowledge-graph entities by exact name, plus any relation touching them.")]
    async fn open_nodes(&self, params: Parameters<OpenNodesParams>) -> Result<CallToolResult, ErrorData> {
        let snapshot = self.engine.open_nodes(&params.0.names).await;
        json_result(&snapshot)
    }

    #[tool(description = "Read the entire knowledge graph: all entities and relations.")]
    async fn read_graph(&self) -> Result<CallToolResult, ErrorData> {
        let snapshot = self.engine.read_graph().await;
        json_result(&snapshot)
    }

    #[tool(description = "Start a new work session. Returns the previous session's summary (if any) and the project's highest-relevance decisions, gotchas, and trade-offs so the agent doesn't relearn them.")]
    async fn session_start(&self, params: Parameters<SessionStartParams>) -> Result<CallToolResult, ErrorData> {
        let context = self.engine.session_start(&params.0.agent).await.map_err(engine_error)?;
        json_result(&context)
    }

    #[tool(description = "End a work session with a summary. Fails if the session is already completed.")]
    async fn session_end(&self, params: Parameters<SessionEndParams>) -> Result<CallToolResult, ErrorData> {
        let p = params.0;
        let session = self.engine.session_end(&p.session_id, p.summary).await.map_err(engine_error)?;
        json_result(&session)
    }

    #[tool(description = "Fetch a recorded session by id.")]
    async fn session_context(&self, params: Parameters<SessionContextParams>) -> Result<CallToolResult, ErrorData> {
        let session = self.engine.session_context(&params.0.session_id).await.map_err(engine_error)?;
        json_result(&session)
    }

    #[tool(description = "Rebuild the search index from observations.json. Use after bulk external edits to the data directory.")]
    async fn reindex(&self) -> Result<CallToolResult, ErrorData> {
        self.engine.reindex().await.map_err(engine_error)?;
        Ok(CallToolResult::success(vec![Content::text("reindex complete")]))
    }

    #[tool(description = "Archive non-immune observations whose retention score falls below threshold. Decisions, gotchas, trade-offs, and causal-language observations are never archived by this call.")]
    async fn archive(&self, params: Parameters<ArchiveParams>) -> Result<CallToolResult, ErrorData> {
        let archived = self.engine.archive(params.0.threshold).await.map_err(engine_error)?;
        json_result(&serde_json::json!({ "archived": archived }))
    }

    #[tool(description = "Report engine startup diagnostics: current project id, observation count, active embedding provider, and whether vector search is active.")]
    async fn engine_stats(&self) -> Result<CallToolResult, ErrorData> {
        let stats = self.engine.stats().await;
        json_result(&serde_json::json!({
            "projectId": stats.project_id,
            "observationCount": stats.observation_count,
            "embeddingProvider": stats.embedding_provider,
            "vectorSearchActive": stats.vector_search_active,
        }))
    }
}

#[tool_handler]
impl rmcp::ServerHandler for MemorixServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "memorix".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            instructions: Some(
                "Persistent, project-scoped memory for AI coding assistants. Store observations as you work, search them later, and keep a lightweight knowledge graph of entities and relations.".into(),
            ),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let config = EngineConfig::from_env()?;
    tracing::info!(data_root = %config.data_root.display(), "starting memorix");

    let server = MemorixServer::new(config).await?;

    let service = server.serve(stdio()).await.inspect_err(|e| {
        tracing::error!("error starting server: {}", e);
    })?;

    tracing::info!("memorix MCP server started");
    service.waiting().await?;

    Ok(())
}
