//! Retention Engine (§4.I). No teacher module scores record relevance;
//! grounded in `other_examples/`'s `ccmemory` `DecayConfig`/decay-scoring
//! shape (exponential half-life decay, access-count boost, type-keyed base
//! weights, immunity rules), reworked onto this crate's `Observation` model.

use crate::config::RetentionConfig;
use crate::model::{Observation, ObservationType};

/// Per-type base weight before decay (SPEC_FULL.md resolves the "should be a
/// caller-supplied parameter, not hardcoded" Open Question by keeping these
/// as named constants the caller can see and the façade can one day expose,
/// rather than burying them inside the score formula).
pub const BASE_WEIGHTS: &[(ObservationType, f64)] = &[
    (ObservationType::Decision, 10.0),
    (ObservationType::Gotcha, 10.0),
    (ObservationType::TradeOff, 9.0),
    (ObservationType::ProblemSolution, 8.0),
    (ObservationType::WhyItExists, 7.0),
    (ObservationType::Discovery, 6.0),
    (ObservationType::HowItWorks, 6.0),
    (ObservationType::WhatChanged, 5.0),
    (ObservationType::SessionRequest, 2.0),
];

fn base_weight(kind: ObservationType) -> f64 {
    BASE_WEIGHTS
        .iter()
        .find(|(k, _)| *k == kind)
        .map(|(_, w)| *w)
        .unwrap_or(1.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionClass {
    Active,
    Stale,
    Archive,
}

/// The immune set (§4.I) never archives regardless of score: causal-language
/// observations, decision/gotcha/trade-off types, and anything accessed at
/// least `immunity_access_count` times.
pub fn is_immune(observation: &Observation, config: &RetentionConfig) -> bool {
    observation.has_causal_language
        || matches!(
            observation.kind,
            ObservationType::Decision | ObservationType::Gotcha | ObservationType::TradeOff
        )
        || observation.access_count >= config.immunity_access_count as u64
}

/// `score` (§4.I): `base(type) * exp(-ageHours / halflifeHours) * (1 + ln(1 +
/// accessCount))`. Causal-language observations get a longer half-life.
pub fn score(observation: &Observation, config: &RetentionConfig, now: chrono::DateTime<chrono::Utc>) -> f64 {
    let age_hours = (now - observation.created_at).num_seconds().max(0) as f64 / 3600.0;
    let halflife = if observation.has_causal_language {
        config.default_halflife_hours * config.causal_halflife_multiplier
    } else {
        config.default_halflife_hours
    };
    let decay = (-age_hours / halflife).exp();
    let access_boost = 1.0 + ((1.0 + observation.access_count as f64).ln());
    base_weight(observation.kind) * decay * access_boost
}

pub fn classify(observation: &Observation, config: &RetentionConfig, now: chrono::DateTime<chrono::Utc>) -> RetentionClass {
    let s = score(observation, config, now);
    if s > config.active_threshold {
        RetentionClass::Active
    } else if s >= config.stale_threshold {
        RetentionClass::Stale
    } else {
        RetentionClass::Archive
    }
}

/// Partition observations into (kept, archived) for an `archive(threshold)`
/// pass (§4.I): immune observations are always kept regardless of score;
/// everything else below `threshold` moves to the archived set. The caller
/// persists both sets and reloads the in-memory mirrors — this module never
/// touches disk directly (no teacher precedent ties scoring to I/O).
pub fn partition_for_archival(
    observations: Vec<Observation>,
    config: &RetentionConfig,
    threshold: f64,
    now: chrono::DateTime<chrono::Utc>,
) -> (Vec<Observation>, Vec<Observation>) {
    let mut kept = Vec::new();
    let mut archived = Vec::new();
    for observation in observations {
        if is_immune(&observation, config) || score(&observation, config, now) >= threshold {
            kept.push(observation);
        } else {
            archived.push(observation);
        }
    }
    (kept, archived)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observation(kind: ObservationType, age_hours: i64, access_count: u64, causal: bool) -> Observation {
        let now = chrono::Utc::now();
        Observation {
            id: 1,
            entity_name: "auth".into(),
            kind,
            title: "t".into(),
            narrative: "n".into(),
            facts: vec![],
            files_modified: vec![],
            concepts: vec![],
            tokens: 10,
            created_at: now - chrono::Duration::hours(age_hours),
            updated_at: now,
            project_id: "acme/app".into(),
            has_causal_language: causal,
            topic_key: None,
            revision_count: 1,
            session_id: None,
            access_count,
            last_accessed_at: None,
        }
    }

    #[test]
    fn fresh_decision_scores_active() {
        let config = RetentionConfig::default();
        let obs = observation(ObservationType::Decision, 1, 0, false);
        let now = chrono::Utc::now();
        assert_eq!(classify(&obs, &config, now), RetentionClass::Active);
    }

    #[test]
    fn very_old_session_request_scores_archive() {
        let config = RetentionConfig::default();
        let obs = observation(ObservationType::SessionRequest, 24 * 365, 0, false);
        let now = chrono::Utc::now();
        assert_eq!(classify(&obs, &config, now), RetentionClass::Archive);
    }

    #[test]
    fn causal_language_extends_halflife() {
        let config = RetentionConfig::default();
        let age = 24 * 60;
        let causal = observation(ObservationType::Discovery, age, 0, true);
        let plain = observation(ObservationType::Discovery, age, 0, false);
        let now = chrono::Utc::now();
        assert!(score(&causal, &config, now) > score(&plain, &config, now));
    }

    #[test]
    fn high_access_count_is_immune_even_when_score_is_low() {
        let config = RetentionConfig::default();
        let obs = observation(ObservationType::SessionRequest, 24 * 365, 10, false);
        assert!(is_immune(&obs, &config));
    }

    #[test]
    fn partition_keeps_immune_observations_regardless_of_score() {
        let config = RetentionConfig::default();
        let old_gotcha = observation(ObservationType::Gotcha, 24 * 365, 0, false);
        let old_session = observation(ObservationType::SessionRequest, 24 * 365, 0, false);
        let now = chrono::Utc::now();
        let (kept, archived) = partition_for_archival(vec![old_gotcha, old_session], &config, 1.0, now);
        assert_eq!(kept.len(), 1);
        assert_eq!(archived.len(), 1);
        assert_eq!(kept[0].kind, ObservationType::Gotcha);
    }
}
