//! One-shot subdirectory-flattening migration (§4.B). Runs once at startup:
//! any subdirectory of the data root that itself carries an
//! `observations.json` is treated as a pre-flat layout and folded into the
//! base directory, then renamed into `.migrated-subdirs/`.

use std::collections::HashMap;
use std::path::Path;

use tracing::info;

use super::{
    load_json, save_archive, save_counter, save_graph, save_observations, save_sessions, Counter,
};
use crate::error::{MemorixError, MemorixResult};
use crate::model::{GraphRecord, Observation, Session};

/// Run the migration against `data_root`, returning the number of
/// subdirectories that were folded in (zero means nothing to do — the
/// re-run case, per S9's idempotence property).
pub async fn flatten_subdirectories(data_root: &Path) -> MemorixResult<usize> {
    super::ensure_data_root(data_root).await?;

    let mut subdirs = Vec::new();
    let mut entries = tokio::fs::read_dir(data_root)
        .await
        .map_err(|e| MemorixError::io("read data root", data_root, e))?;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| MemorixError::io("read data root entry", data_root, e))?
    {
        let path = entry.path();
        if !path.is_dir() || path.file_name().map(|n| n == super::MIGRATED_SUBDIRS_DIR).unwrap_or(false) {
            continue;
        }
        if path.join(super::OBSERVATIONS_FILE).is_file() {
            subdirs.push(path);
        }
    }

    if subdirs.is_empty() {
        return Ok(0);
    }

    info!(count = subdirs.len(), "flattening legacy subdirectories");

    let mut observations: Vec<Observation> = super::load_observations(data_root).await?;
    let mut graph: Vec<GraphRecord> = super::load_graph(data_root).await?;
    let mut sessions: Vec<Session> = super::load_sessions(data_root).await?;

    for subdir in &subdirs {
        observations.extend(load_json::<Vec<Observation>>(&subdir.join(super::OBSERVATIONS_FILE), Vec::new()).await?);
        graph.extend(load_json::<Vec<GraphRecord>>(&subdir.join(super::GRAPH_FILE), Vec::new()).await.unwrap_or_default());
        sessions.extend(load_json::<Vec<Session>>(&subdir.join(super::SESSIONS_FILE), Vec::new()).await.unwrap_or_default());
    }

    // Deduplicate by (title, createdAt), sort by createdAt, reassign ids.
    let mut seen = std::collections::HashSet::new();
    observations.retain(|o| seen.insert((o.title.clone(), o.created_at)));
    observations.sort_by_key(|o| o.created_at);
    for (idx, obs) in observations.iter_mut().enumerate() {
        obs.id = (idx + 1) as u64;
    }

    let graph = merge_graph(graph);

    let next_id = observations.len() as u64 + 1;

    save_observations(data_root, &observations).await?;
    save_graph(data_root, &graph).await?;
    save_sessions(data_root, &sessions).await?;
    save_counter(data_root, Counter { next_id }).await?;
    // Archive file is untouched by the migration itself but must exist so
    // later readers don't need to special-case "never migrated" vs "empty".
    if !data_root.join(super::ARCHIVE_FILE).exists() {
        save_archive(data_root, &[]).await?;
    }

    let migrated_dir = super::migrated_subdirs_dir(data_root);
    tokio::fs::create_dir_all(&migrated_dir)
        .await
        .map_err(|e| MemorixError::io("create .migrated-subdirs", &migrated_dir, e))?;
    for subdir in &subdirs {
        let name = subdir.file_name().expect("subdir has a name");
        let dest = migrated_dir.join(name);
        tokio::fs::rename(subdir, &dest)
            .await
            .map_err(|e| MemorixError::io("rename migrated subdir", subdir, e))?;
    }

    Ok(subdirs.len())
}

/// Union entities by name (unioning their observation lines) and union
/// relations by (from, to, relationType).
fn merge_graph(records: Vec<GraphRecord>) -> Vec<GraphRecord> {
    let mut entities: HashMap<String, (String, Vec<String>)> = HashMap::new();
    let mut relations: HashMap<(String, String, String), ()> = HashMap::new();
    let mut relation_order = Vec::new();
    let mut entity_order = Vec::new();

    for record in records {
        match record {
            GraphRecord::Entity {
                name,
                entity_type,
                observations,
            } => {
                let entry = entities
                    .entry(name.clone())
                    .or_insert_with(|| {
                        entity_order.push(name.clone());
                        (entity_type.clone(), Vec::new())
                    });
                for line in observations {
                    if !entry.1.contains(&line) {
                        entry.1.push(line);
                    }
                }
            }
            GraphRecord::Relation {
                from,
                to,
                relation_type,
            } => {
                let key = (from.clone(), to.clone(), relation_type.clone());
                if relations.insert(key.clone(), ()).is_none() {
                    relation_order.push(key);
                }
            }
        }
    }

    let mut out = Vec::new();
    for name in entity_order {
        let (entity_type, observations) = entities.remove(&name).expect("entity recorded");
        out.push(GraphRecord::Entity {
            name,
            entity_type,
            observations,
        });
    }
    for (from, to, relation_type) in relation_order {
        out.push(GraphRecord::Relation {
            from,
            to,
            relation_type,
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ObservationType;
    use tempfile::TempDir;

    fn obs(id: u64, title: &str, created_at: chrono::DateTime<chrono::Utc>) -> Observation {
        Observation {
            id,
            entity_name: "e".into(),
            kind: ObservationType::Discovery,
            title: title.into(),
            narrative: String::new(),
            facts: vec![],
            files_modified: vec![],
            concepts: vec![],
            tokens: 0,
            created_at,
            updated_at: created_at,
            project_id: "acme/app".into(),
            has_causal_language: false,
            topic_key: None,
            revision_count: 1,
            session_id: None,
            access_count: 0,
            last_accessed_at: None,
        }
    }

    #[tokio::test]
    async fn no_subdirectories_is_a_noop() {
        let dir = TempDir::new().unwrap();
        let migrated = flatten_subdirectories(dir.path()).await.unwrap();
        assert_eq!(migrated, 0);
    }

    #[tokio::test]
    async fn flattens_one_subdirectory_and_reassigns_ids() {
        let dir = TempDir::new().unwrap();
        let sub = dir.path().join("old-project");
        tokio::fs::create_dir_all(&sub).await.unwrap();
        let t0 = chrono::Utc::now();
        let t1 = t0 + chrono::Duration::seconds(5);
        super::super::save_observations(&sub, &[obs(1, "first", t1)])
            .await
            .unwrap();
        super::super::save_observations(dir.path(), &[obs(1, "second", t0)])
            .await
            .unwrap();

        let migrated = flatten_subdirectories(dir.path()).await.unwrap();
        assert_eq!(migrated, 1);

        let merged = super::super::load_observations(dir.path()).await.unwrap();
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].title, "second");
        assert_eq!(merged[0].id, 1);
        assert_eq!(merged[1].title, "first");
        assert_eq!(merged[1].id, 2);

        let counter = super::super::load_counter(dir.path()).await.unwrap();
        assert_eq!(counter.next_id, 3);

        assert!(!sub.exists());
        assert!(dir.path().join(".migrated-subdirs/old-project").exists());
    }

    #[tokio::test]
    async fn rerunning_after_success_is_a_noop() {
        let dir = TempDir::new().unwrap();
        let sub = dir.path().join("old-project");
        tokio::fs::create_dir_all(&sub).await.unwrap();
        super::super::save_observations(&sub, &[obs(1, "first", chrono::Utc::now())])
            .await
            .unwrap();

        flatten_subdirectories(dir.path()).await.unwrap();
        let second_run = flatten_subdirectories(dir.path()).await.unwrap();
        assert_eq!(second_run, 0);
    }

    #[test]
    fn merge_graph_unions_entity_observations_and_dedupes_relations() {
        let records = vec![
            GraphRecord::Entity {
                name: "auth".into(),
                entity_type: "module".into(),
                observations: vec!["uses JWT".into()],
            },
            GraphRecord::Entity {
                name: "auth".into(),
                entity_type: "module".into(),
                observations: vec!["uses JWT".into(), "has refresh tokens".into()],
            },
            GraphRecord::Relation {
                from: "auth".into(),
                to: "session".into(),
                relation_type: "depends-on".into(),
            },
            GraphRecord::Relation {
                from: "auth".into(),
                to: "session".into(),
                relation_type: "depends-on".into(),
            },
        ];
        let merged = merge_graph(records);
        assert_eq!(merged.len(), 2);
        if let GraphRecord::Entity { observations, .. } = &merged[0] {
            assert_eq!(observations.len(), 2);
        } else {
            panic!("expected entity first");
        }
    }
}
