//! Session Lifecycle (§4.J). No teacher module models a working session;
//! grounded in the teacher's persistence idiom (load-mutate-save under lock,
//! `Vec<T>` mirror refreshed from disk) applied to the `Session` record,
//! with the context bundle built from [`crate::retention`]'s scoring.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

use crate::atomic_io;
use crate::config::RetentionConfig;
use crate::error::{MemorixError, MemorixResult};
use crate::model::{Observation, ObservationType, Session, SessionStatus};
use crate::observations::ObservationsManager;
use crate::persistence;
use crate::retention;

static SESSION_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Types considered worth resurfacing in a fresh session's context bundle
/// (§4.J): the record types that tend to carry decisions worth not
/// relearning.
const CONTEXT_TYPES: &[ObservationType] = &[
    ObservationType::Decision,
    ObservationType::Gotcha,
    ObservationType::ProblemSolution,
    ObservationType::TradeOff,
];

const CONTEXT_BUNDLE_SIZE: usize = 10;

fn generate_session_id(agent: &str) -> String {
    let seq = SESSION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let mut hasher = Sha256::new();
    hasher.update(agent.as_bytes());
    hasher.update(std::process::id().to_le_bytes());
    hasher.update(seq.to_le_bytes());
    hasher.update(chrono::Utc::now().to_rfc3339().as_bytes());
    hex::encode(hasher.finalize())[..16].to_string()
}

/// Returned by `session_start` (§4.J): the last session's summary, if any,
/// plus the highest-scoring observations of [`CONTEXT_TYPES`] for the
/// project, so a fresh agent doesn't relearn what the last one just decided.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionContext {
    pub session: Session,
    pub previous_summary: Option<String>,
    pub highlights: Vec<Observation>,
}

pub struct SessionManager {
    data_root: PathBuf,
    sessions: RwLock<Vec<Session>>,
}

impl SessionManager {
    pub async fn load(data_root: PathBuf) -> MemorixResult<Self> {
        let sessions = persistence::load_sessions(&data_root).await?;
        Ok(Self {
            data_root,
            sessions: RwLock::new(sessions),
        })
    }

    pub async fn get(&self, id: &str) -> Option<Session> {
        self.sessions.read().await.iter().find(|s| s.id == id).cloned()
    }

    /// `session_start(agent)` (§4.J): allocate a new active session and
    /// build its context bundle from the project's observations.
    pub async fn session_start(
        &self,
        agent: &str,
        project_id: &str,
        observations: &ObservationsManager,
        config: &RetentionConfig,
    ) -> MemorixResult<SessionContext> {
        let previous_summary = self
            .sessions
            .read()
            .await
            .iter()
            .filter(|s| s.status == SessionStatus::Completed)
            .max_by_key(|s| s.ended_at)
            .and_then(|s| s.summary.clone());

        let session = Session {
            id: generate_session_id(agent),
            agent: agent.to_string(),
            started_at: chrono::Utc::now(),
            ended_at: None,
            status: SessionStatus::Active,
            summary: None,
        };

        let data_root = self.data_root.clone();
        let new_session = session.clone();
        atomic_io::with_lock(&data_root, || async {
            let mut sessions = persistence::load_sessions(&data_root).await?;
            sessions.push(new_session.clone());
            persistence::save_sessions(&data_root, &sessions).await?;
            *self.sessions.write().await = sessions;
            Ok(())
        })
        .await?;

        let now = chrono::Utc::now();
        let mut candidates: Vec<Observation> = observations
            .snapshot()
            .await
            .into_iter()
            .filter(|o| o.project_id == project_id && CONTEXT_TYPES.contains(&o.kind))
            .collect();
        candidates.sort_by(|a, b| {
            retention::score(b, config, now)
                .partial_cmp(&retention::score(a, config, now))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(CONTEXT_BUNDLE_SIZE);

        Ok(SessionContext {
            session,
            previous_summary,
            highlights: candidates,
        })
    }

    /// `session_end(id, summary)` (§4.J): active -> completed. Ending an
    /// already-completed session is a `Conflict`, not idempotent.
    pub async fn session_end(&self, id: &str, summary: String) -> MemorixResult<Session> {
        let data_root = self.data_root.clone();
        let mut result = None;
        atomic_io::with_lock(&data_root, || async {
            let mut sessions = persistence::load_sessions(&data_root).await?;
            let Some(session) = sessions.iter_mut().find(|s| s.id == id) else {
                return Ok(());
            };
            if session.status == SessionStatus::Completed {
                return Err(MemorixError::Conflict(format!("session {id} is already completed")));
            }
            session.status = SessionStatus::Completed;
            session.ended_at = Some(chrono::Utc::now());
            session.summary = Some(summary);
            result = Some(session.clone());
            persistence::save_sessions(&data_root, &sessions).await?;
            *self.sessions.write().await = sessions;
            Ok(())
        })
        .await?;

        result.ok_or_else(|| MemorixError::NotFound {
            kind: "session",
            id: id.to_string(),
        })
    }

    /// `session_context(id)` (§4.J): a read-only view of a recorded session.
    pub async fn session_context(&self, id: &str) -> MemorixResult<Session> {
        self.get(id).await.ok_or_else(|| MemorixError::NotFound {
            kind: "session",
            id: id.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn observations_manager(dir: &TempDir) -> ObservationsManager {
        ObservationsManager::load(dir.path().to_path_buf()).await.unwrap()
    }

    #[tokio::test]
    async fn session_start_then_end_transitions_status() {
        let dir = TempDir::new().unwrap();
        let sessions = SessionManager::load(dir.path().to_path_buf()).await.unwrap();
        let observations = observations_manager(&dir).await;
        let config = RetentionConfig::default();
        let ctx = sessions
            .session_start("agent-1", "acme/app", &observations, &config)
            .await
            .unwrap();
        assert_eq!(ctx.session.status, SessionStatus::Active);
        assert!(ctx.previous_summary.is_none());

        let ended = sessions.session_end(&ctx.session.id, "did things".into()).await.unwrap();
        assert_eq!(ended.status, SessionStatus::Completed);
        assert_eq!(ended.summary.as_deref(), Some("did things"));
    }

    #[tokio::test]
    async fn ending_an_already_completed_session_is_a_conflict() {
        let dir = TempDir::new().unwrap();
        let sessions = SessionManager::load(dir.path().to_path_buf()).await.unwrap();
        let observations = observations_manager(&dir).await;
        let config = RetentionConfig::default();
        let ctx = sessions
            .session_start("agent-1", "acme/app", &observations, &config)
            .await
            .unwrap();
        sessions.session_end(&ctx.session.id, "first".into()).await.unwrap();
        let result = sessions.session_end(&ctx.session.id, "second".into()).await;
        assert!(matches!(result, Err(MemorixError::Conflict(_))));
    }

    #[tokio::test]
    async fn ending_an_unknown_session_is_not_found() {
        let dir = TempDir::new().unwrap();
        let sessions = SessionManager::load(dir.path().to_path_buf()).await.unwrap();
        let result = sessions.session_end("nonexistent", "x".into()).await;
        assert!(matches!(result, Err(MemorixError::NotFound { .. })));
    }

    #[tokio::test]
    async fn second_session_sees_previous_summary() {
        let dir = TempDir::new().unwrap();
        let sessions = SessionManager::load(dir.path().to_path_buf()).await.unwrap();
        let observations = observations_manager(&dir).await;
        let config = RetentionConfig::default();
        let first = sessions
            .session_start("agent-1", "acme/app", &observations, &config)
            .await
            .unwrap();
        sessions.session_end(&first.session.id, "finished step one".into()).await.unwrap();

        let second = sessions
            .session_start("agent-1", "acme/app", &observations, &config)
            .await
            .unwrap();
        assert_eq!(second.previous_summary.as_deref(), Some("finished step one"));
    }
}
