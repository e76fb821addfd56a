//! The durable data model (§3). Every type here round-trips through
//! `serde_json` unchanged, matching the on-disk formats `persistence`
//! reads and writes.

use serde::{Deserialize, Serialize};

pub type ObservationId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ObservationType {
    SessionRequest,
    Gotcha,
    ProblemSolution,
    HowItWorks,
    WhatChanged,
    Discovery,
    WhyItExists,
    Decision,
    TradeOff,
}

impl ObservationType {
    /// Stable icon glyph for compact search hits (§4.F Layer 1).
    pub fn icon(self) -> &'static str {
        match self {
            ObservationType::SessionRequest => "\u{1F4AC}",
            ObservationType::Gotcha => "\u{26A0}",
            ObservationType::ProblemSolution => "\u{1F527}",
            ObservationType::HowItWorks => "\u{2699}",
            ObservationType::WhatChanged => "\u{270E}",
            ObservationType::Discovery => "\u{1F4A1}",
            ObservationType::WhyItExists => "\u{2753}",
            ObservationType::Decision => "\u{2705}",
            ObservationType::TradeOff => "\u{2696}",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    pub id: ObservationId,
    pub entity_name: String,
    #[serde(rename = "type")]
    pub kind: ObservationType,
    pub title: String,
    pub narrative: String,
    pub facts: Vec<String>,
    pub files_modified: Vec<String>,
    pub concepts: Vec<String>,
    pub tokens: u64,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub project_id: String,
    pub has_causal_language: bool,
    pub topic_key: Option<String>,
    pub revision_count: u32,
    pub session_id: Option<String>,
    pub access_count: u64,
    pub last_accessed_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Everything a caller supplies when storing a new observation; enrichment
/// (extractor, tokens) happens inside `ObservationsManager::store`.
#[derive(Debug, Clone)]
pub struct ObservationInput {
    pub entity_name: String,
    pub kind: ObservationType,
    pub title: String,
    pub narrative: String,
    pub facts: Vec<String>,
    pub files_modified: Vec<String>,
    pub concepts: Vec<String>,
    pub project_id: String,
    pub topic_key: Option<String>,
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub name: String,
    pub entity_type: String,
    pub observations: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct Relation {
    pub from: String,
    pub to: String,
    pub relation_type: String,
}

/// One line of `graph.jsonl`. Tagged so the format stays interchangeable
/// with the line-additive layout described in §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum GraphRecord {
    Entity {
        name: String,
        #[serde(rename = "entityType")]
        entity_type: String,
        observations: Vec<String>,
    },
    Relation {
        from: String,
        to: String,
        #[serde(rename = "relationType")]
        relation_type: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub agent: String,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub ended_at: Option<chrono::DateTime<chrono::Utc>>,
    pub status: SessionStatus,
    pub summary: Option<String>,
}

/// An alias group (§3): every project identifier known to refer to the same
/// physical project, plus the rootPaths/gitRemote evidence used to detect it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AliasGroup {
    pub canonical: String,
    pub aliases: Vec<String>,
    pub root_paths: Vec<String>,
    pub git_remote: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AliasRegistryFile {
    pub version: u32,
    pub groups: Vec<AliasGroup>,
}

impl Default for AliasRegistryFile {
    fn default() -> Self {
        Self {
            version: 1,
            groups: Vec::new(),
        }
    }
}

/// A detected project identity (§4.C), returned by `project::detect`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectIdentity {
    pub id: String,
    pub name: String,
    pub root_path: String,
    pub git_remote: Option<String>,
}
