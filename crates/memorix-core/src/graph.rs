//! Knowledge Graph (§4.H). No teacher module keeps an entity/relation graph;
//! grounded in `examples/tombelieber-claude-view`'s line-additive JSONL
//! persistence idiom (load-mutate-save under lock) and in the record shape
//! already fixed by `model::GraphRecord` for interop with other writers of
//! `graph.jsonl` (§6).

use std::path::PathBuf;

use tokio::sync::RwLock;

use crate::atomic_io;
use crate::error::MemorixResult;
use crate::model::{Entity, GraphRecord, Relation};
use crate::persistence;

/// A materialized view of `graph.jsonl`: entities keyed by name, each
/// carrying its observation lines, plus the relation set.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct GraphSnapshot {
    pub entities: Vec<Entity>,
    pub relations: Vec<Relation>,
}

fn snapshot_from_records(records: &[GraphRecord]) -> GraphSnapshot {
    let mut snapshot = GraphSnapshot::default();
    for record in records {
        match record {
            GraphRecord::Entity {
                name,
                entity_type,
                observations,
            } => {
                if let Some(entity) = snapshot.entities.iter_mut().find(|e| &e.name == name) {
                    for line in observations {
                        if !entity.observations.contains(line) {
                            entity.observations.push(line.clone());
                        }
                    }
                } else {
                    snapshot.entities.push(Entity {
                        name: name.clone(),
                        entity_type: entity_type.clone(),
                        observations: observations.clone(),
                    });
                }
            }
            GraphRecord::Relation {
                from,
                to,
                relation_type,
            } => {
                let relation = Relation {
                    from: from.clone(),
                    to: to.clone(),
                    relation_type: relation_type.clone(),
                };
                if !snapshot.relations.contains(&relation) {
                    snapshot.relations.push(relation);
                }
            }
        }
    }
    snapshot
}

fn records_from_snapshot(snapshot: &GraphSnapshot) -> Vec<GraphRecord> {
    let mut records: Vec<GraphRecord> = snapshot
        .entities
        .iter()
        .map(|e| GraphRecord::Entity {
            name: e.name.clone(),
            entity_type: e.entity_type.clone(),
            observations: e.observations.clone(),
        })
        .collect();
    records.extend(snapshot.relations.iter().map(|r| GraphRecord::Relation {
        from: r.from.clone(),
        to: r.to.clone(),
        relation_type: r.relation_type.clone(),
    }));
    records
}

pub struct KnowledgeGraph {
    data_root: PathBuf,
    snapshot: RwLock<GraphSnapshot>,
}

impl KnowledgeGraph {
    pub async fn load(data_root: PathBuf) -> MemorixResult<Self> {
        let records = persistence::load_graph(&data_root).await?;
        Ok(Self {
            data_root,
            snapshot: RwLock::new(snapshot_from_records(&records)),
        })
    }

    /// `read_graph()` (§4.H): the full entity/relation set.
    pub async fn read_graph(&self) -> GraphSnapshot {
        self.snapshot.read().await.clone()
    }

    /// `create_entities` (§4.H): entities already present by name are left
    /// untouched, not merged or overwritten.
    pub async fn create_entities(&self, entities: Vec<Entity>) -> MemorixResult<Vec<Entity>> {
        let mut created = Vec::new();
        self.mutate(|snapshot| {
            for entity in entities {
                if snapshot.entities.iter().any(|e| e.name == entity.name) {
                    continue;
                }
                snapshot.entities.push(entity.clone());
                created.push(entity);
            }
        })
        .await?;
        Ok(created)
    }

    /// `create_relations` (§4.H): relations already present as the exact
    /// (from, to, relationType) tuple are skipped.
    pub async fn create_relations(&self, relations: Vec<Relation>) -> MemorixResult<Vec<Relation>> {
        let mut created = Vec::new();
        self.mutate(|snapshot| {
            for relation in relations {
                if snapshot.relations.contains(&relation) {
                    continue;
                }
                snapshot.relations.push(relation.clone());
                created.push(relation);
            }
        })
        .await?;
        Ok(created)
    }

    /// `add_observations(entityName, lines)` (§4.H): dedupe by exact string
    /// equality against the entity's existing observation lines.
    pub async fn add_observations(&self, entity_name: &str, lines: Vec<String>) -> MemorixResult<Vec<String>> {
        let mut added = Vec::new();
        self.mutate(|snapshot| {
            let Some(entity) = snapshot.entities.iter_mut().find(|e| e.name == entity_name) else {
                return;
            };
            for line in lines {
                if entity.observations.contains(&line) {
                    continue;
                }
                entity.observations.push(line.clone());
                added.push(line);
            }
        })
        .await?;
        Ok(added)
    }

    /// `search_nodes(query)` (§4.H): case-insensitive match against entity
    /// names and their observation lines.
    pub async fn search_nodes(&self, query: &str) -> GraphSnapshot {
        let needle = query.to_lowercase();
        let snapshot = self.snapshot.read().await;
        let matching_entities: Vec<Entity> = snapshot
            .entities
            .iter()
            .filter(|e| {
                e.name.to_lowercase().contains(&needle)
                    || e.observations.iter().any(|o| o.to_lowercase().contains(&needle))
            })
            .cloned()
            .collect();
        let names: Vec<&str> = matching_entities.iter().map(|e| e.name.as_str()).collect();
        let relations = snapshot
            .relations
            .iter()
            .filter(|r| names.contains(&r.from.as_str()) || names.contains(&r.to.as_str()))
            .cloned()
            .collect();
        GraphSnapshot {
            entities: matching_entities,
            relations,
        }
    }

    /// `open_nodes(names)` (§4.H): entities by exact name plus any relation
    /// touching them.
    pub async fn open_nodes(&self, names: &[String]) -> GraphSnapshot {
        let snapshot = self.snapshot.read().await;
        let entities: Vec<Entity> = snapshot
            .entities
            .iter()
            .filter(|e| names.contains(&e.name))
            .cloned()
            .collect();
        let relations = snapshot
            .relations
            .iter()
            .filter(|r| names.contains(&r.from) || names.contains(&r.to))
            .cloned()
            .collect();
        GraphSnapshot { entities, relations }
    }

    async fn mutate<F>(&self, f: F) -> MemorixResult<()>
    where
        F: FnOnce(&mut GraphSnapshot),
    {
        let data_root = self.data_root.clone();
        atomic_io::with_lock(&data_root, || async {
            let records = persistence::load_graph(&data_root).await?;
            let mut snapshot = snapshot_from_records(&records);
            f(&mut snapshot);
            let records = records_from_snapshot(&snapshot);
            persistence::save_graph(&data_root, &records).await?;
            *self.snapshot.write().await = snapshot;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entity(name: &str) -> Entity {
        Entity {
            name: name.into(),
            entity_type: "module".into(),
            observations: vec![],
        }
    }

    #[tokio::test]
    async fn create_entities_skips_existing_names() {
        let dir = TempDir::new().unwrap();
        let graph = KnowledgeGraph::load(dir.path().to_path_buf()).await.unwrap();
        graph.create_entities(vec![entity("auth")]).await.unwrap();
        let created = graph
            .create_entities(vec![entity("auth"), entity("session")])
            .await
            .unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].name, "session");
    }

    #[tokio::test]
    async fn create_relations_skips_duplicate_tuples() {
        let dir = TempDir::new().unwrap();
        let graph = KnowledgeGraph::load(dir.path().to_path_buf()).await.unwrap();
        let relation = Relation {
            from: "auth".into(),
            to: "session".into(),
            relation_type: "depends-on".into(),
        };
        graph.create_relations(vec![relation.clone()]).await.unwrap();
        let created = graph.create_relations(vec![relation]).await.unwrap();
        assert!(created.is_empty());
    }

    #[tokio::test]
    async fn add_observations_dedupes_exact_lines() {
        let dir = TempDir::new().unwrap();
        let graph = KnowledgeGraph::load(dir.path().to_path_buf()).await.unwrap();
        graph.create_entities(vec![entity("auth")]).await.unwrap();
        graph
            .add_observations("auth", vec!["uses JWT".into()])
            .await
            .unwrap();
        let added = graph
            .add_observations("auth", vec!["uses JWT".into(), "rotates keys".into()])
            .await
            .unwrap();
        assert_eq!(added, vec!["rotates keys".to_string()]);
    }

    #[tokio::test]
    async fn search_nodes_is_case_insensitive() {
        let dir = TempDir::new().unwrap();
        let graph = KnowledgeGraph::load(dir.path().to_path_buf()).await.unwrap();
        graph.create_entities(vec![entity("Auth")]).await.unwrap();
        let found = graph.search_nodes("auth").await;
        assert_eq!(found.entities.len(), 1);
    }

    #[tokio::test]
    async fn graph_persists_across_reload() {
        let dir = TempDir::new().unwrap();
        {
            let graph = KnowledgeGraph::load(dir.path().to_path_buf()).await.unwrap();
            graph.create_entities(vec![entity("auth")]).await.unwrap();
        }
        let reloaded = KnowledgeGraph::load(dir.path().to_path_buf()).await.unwrap();
        let snapshot = reloaded.read_graph().await;
        assert_eq!(snapshot.entities.len(), 1);
    }
}
