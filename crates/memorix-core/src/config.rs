//! Process-wide configuration. Grounded in the teacher's `Config::from_env`
//! (env-var override, tilde-expansion via `dirs::home_dir`), generalized from
//! a single vault path to a data root plus the handful of tunables
//! SPEC_FULL.md calls out as named constants rather than inline literals.

use std::path::{Path, PathBuf};

use thiserror::Error;

const DATA_ROOT_ENV: &str = "MEMORIX_DATA_ROOT";
const CWD_OVERRIDE_ENV: &str = "MEMORIX_CWD";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine a home directory to default the data root to")]
    NoHomeDir,
}

/// Engine-wide configuration resolved once at startup.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Root of the flat on-disk layout (§4.B). Defaults to `~/.memorix/data`.
    pub data_root: PathBuf,
    /// Working directory used for project detection. Defaults to the
    /// process's actual cwd; overridable so tests and editor adapters that
    /// can't chdir can still select a project.
    pub cwd: PathBuf,
    pub retention: RetentionConfig,
    pub embedding_cache: EmbeddingCacheConfig,
}

impl EngineConfig {
    /// Resolve configuration from the environment, following the teacher's
    /// `Config::from_env` pattern: an explicit override env var wins, else a
    /// tilde-expanded default under the home directory.
    pub fn from_env() -> Result<Self, ConfigError> {
        let data_root = match std::env::var(DATA_ROOT_ENV) {
            Ok(raw) => expand_tilde(&raw).ok_or(ConfigError::NoHomeDir)?,
            Err(_) => dirs::home_dir()
                .ok_or(ConfigError::NoHomeDir)?
                .join(".memorix")
                .join("data"),
        };
        let cwd = match std::env::var(CWD_OVERRIDE_ENV) {
            Ok(raw) => PathBuf::from(raw),
            Err(_) => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        };
        Ok(Self {
            data_root,
            cwd,
            retention: RetentionConfig::default(),
            embedding_cache: EmbeddingCacheConfig::default(),
        })
    }

    /// Construct a config pointed at an explicit, test-owned directory
    /// (SPEC_FULL.md's "Data root override").
    pub fn for_data_root(data_root: impl Into<PathBuf>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
            cwd: cwd.into(),
            retention: RetentionConfig::default(),
            embedding_cache: EmbeddingCacheConfig::default(),
        }
    }
}

fn expand_tilde(raw: &str) -> Option<PathBuf> {
    if let Some(rest) = raw.strip_prefix("~/") {
        return Some(dirs::home_dir()?.join(rest));
    }
    if raw == "~" {
        return dirs::home_dir();
    }
    Some(PathBuf::from(raw))
}

/// Named retention constants (SPEC_FULL.md resolves the Open Question by
/// exposing these instead of inline literals, grounded in `ccmemory`'s
/// `DecayConfig`).
#[derive(Debug, Clone, Copy)]
pub struct RetentionConfig {
    pub active_threshold: f64,
    pub stale_threshold: f64,
    pub immunity_access_count: u32,
    pub default_halflife_hours: f64,
    pub causal_halflife_multiplier: f64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            active_threshold: 5.0,
            stale_threshold: 1.0,
            immunity_access_count: 5,
            default_halflife_hours: 24.0 * 14.0,
            causal_halflife_multiplier: 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EmbeddingCacheConfig {
    pub in_memory_capacity: usize,
    pub provider_batch_size: usize,
}

impl Default for EmbeddingCacheConfig {
    fn default() -> Self {
        Self {
            in_memory_capacity: 5_000,
            provider_batch_size: 64,
        }
    }
}

pub fn lock_path(data_root: &Path) -> PathBuf {
    data_root.join(".memorix.lock")
}
