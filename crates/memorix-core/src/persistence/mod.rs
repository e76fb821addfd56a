//! Durable formats for the flat data directory (§4.B). Each file gets its own
//! typed load/save pair, following the teacher's `PeerStorage`/`PersistedPeers`
//! split between an in-memory collection and a thin disk-I/O wrapper
//! (`crates/sync-daemon/src/persistence.rs`).

mod migration;

pub use migration::flatten_subdirectories;

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::atomic_io;
use crate::error::{MemorixError, MemorixResult};
use crate::model::{AliasRegistryFile, GraphRecord, Observation, Session};

pub const OBSERVATIONS_FILE: &str = "observations.json";
pub const COUNTER_FILE: &str = "counter.json";
pub const GRAPH_FILE: &str = "graph.jsonl";
pub const SESSIONS_FILE: &str = "sessions.json";
pub const ARCHIVE_FILE: &str = "observations.archived.json";
pub const ALIASES_FILE: &str = ".project-aliases.json";
pub const EMBEDDING_CACHE_FILE: &str = ".embedding-cache.json";
pub const MIGRATED_SUBDIRS_DIR: &str = ".migrated-subdirs";

#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct Counter {
    pub next_id: u64,
}

/// Load a JSON file that, when absent, is treated as the caller-supplied
/// `default`. A present-but-unparseable file is `IntegrityError` — the core
/// never auto-repairs it.
pub async fn load_json<T: DeserializeOwned>(path: &Path, default: T) -> MemorixResult<T> {
    match tokio::fs::read(path).await {
        Ok(bytes) => {
            serde_json::from_slice(&bytes).map_err(|e| MemorixError::integrity(path, e))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(default),
        Err(e) => Err(MemorixError::io("read", path, e)),
    }
}

pub async fn save_json<T: Serialize>(path: &Path, value: &T) -> MemorixResult<()> {
    let bytes = serde_json::to_vec_pretty(value).expect("value is always serializable");
    atomic_io::atomic_write(path, &bytes).await
}

pub async fn load_observations(data_root: &Path) -> MemorixResult<Vec<Observation>> {
    load_json(&data_root.join(OBSERVATIONS_FILE), Vec::new()).await
}

pub async fn save_observations(data_root: &Path, observations: &[Observation]) -> MemorixResult<()> {
    save_json(&data_root.join(OBSERVATIONS_FILE), &observations).await
}

pub async fn load_counter(data_root: &Path) -> MemorixResult<Counter> {
    load_json(&data_root.join(COUNTER_FILE), Counter { next_id: 1 }).await
}

pub async fn save_counter(data_root: &Path, counter: Counter) -> MemorixResult<()> {
    save_json(&data_root.join(COUNTER_FILE), &counter).await
}

pub async fn load_sessions(data_root: &Path) -> MemorixResult<Vec<Session>> {
    load_json(&data_root.join(SESSIONS_FILE), Vec::new()).await
}

pub async fn save_sessions(data_root: &Path, sessions: &[Session]) -> MemorixResult<()> {
    save_json(&data_root.join(SESSIONS_FILE), &sessions).await
}

pub async fn load_archive(data_root: &Path) -> MemorixResult<Vec<Observation>> {
    load_json(&data_root.join(ARCHIVE_FILE), Vec::new()).await
}

pub async fn save_archive(data_root: &Path, archive: &[Observation]) -> MemorixResult<()> {
    save_json(&data_root.join(ARCHIVE_FILE), &archive).await
}

pub async fn load_aliases(data_root: &Path) -> MemorixResult<AliasRegistryFile> {
    let path = data_root.join(ALIASES_FILE);
    let file: AliasRegistryFile = load_json(&path, AliasRegistryFile::default()).await?;
    if file.version != 1 {
        use serde::de::Error as _;
        return Err(MemorixError::integrity(
            &path,
            serde_json::Error::custom(format!("unknown alias registry version {}", file.version)),
        ));
    }
    Ok(file)
}

pub async fn save_aliases(data_root: &Path, registry: &AliasRegistryFile) -> MemorixResult<()> {
    save_json(&data_root.join(ALIASES_FILE), registry).await
}

/// `graph.jsonl` is line-additive (§4.B, §6): one JSON object per line,
/// tolerant of being read or appended to by other tools. A malformed line is
/// skipped rather than failing the whole load, since the format explicitly
/// promises interoperability with foreign writers.
pub async fn load_graph(data_root: &Path) -> MemorixResult<Vec<GraphRecord>> {
    let path = data_root.join(GRAPH_FILE);
    let contents = match tokio::fs::read_to_string(&path).await {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(MemorixError::io("read", &path, e)),
    };
    let mut records = Vec::new();
    for (lineno, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<GraphRecord>(line) {
            Ok(record) => records.push(record),
            Err(e) => debug!(lineno, error = %e, "skipping malformed graph.jsonl line"),
        }
    }
    Ok(records)
}

pub async fn save_graph(data_root: &Path, records: &[GraphRecord]) -> MemorixResult<()> {
    let mut buf = String::new();
    for record in records {
        buf.push_str(&serde_json::to_string(record).expect("graph record is serializable"));
        buf.push('\n');
    }
    atomic_io::atomic_write(&data_root.join(GRAPH_FILE), buf.as_bytes()).await
}

pub fn migrated_subdirs_dir(data_root: &Path) -> PathBuf {
    data_root.join(MIGRATED_SUBDIRS_DIR)
}

pub async fn ensure_data_root(data_root: &Path) -> MemorixResult<()> {
    tokio::fs::create_dir_all(data_root)
        .await
        .map_err(|e| MemorixError::io("create data root", data_root, e))
}
