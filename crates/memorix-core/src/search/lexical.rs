//! Tantivy-backed lexical index. Schema/writer/reader setup and the
//! schema-version rebuild-on-mismatch are adapted from
//! `examples/tombelieber-claude-view/crates/search/src/lib.rs`; the
//! per-token `FuzzyTermQuery` + `BooleanQuery` composition from that
//! project's `query.rs`, generalized from a flat full-text search to six
//! independently boosted fields (§4.F.2).

use std::path::Path;
use std::sync::Mutex;

use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, BoostQuery, FuzzyTermQuery, Occur};
use tantivy::schema::{Field, Schema, Value, FAST, INDEXED, STORED, STRING, TEXT};
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};

use crate::error::{MemorixError, MemorixResult};
use crate::model::{Observation, ObservationId};

/// Bumped whenever the schema's field set changes; a mismatch against the
/// on-disk `schema_version` file triggers a full rebuild rather than
/// attempting an in-place migration (teacher's `SEARCH_SCHEMA_VERSION`).
pub const SCHEMA_VERSION: u32 = 1;
const SCHEMA_VERSION_FILE: &str = "schema_version";

const SEARCHABLE_FIELDS: &[&str] = &[
    "title",
    "entity_name",
    "concepts",
    "narrative",
    "facts",
    "files_modified",
];

struct Fields {
    id: Field,
    project_id: Field,
    title: Field,
    entity_name: Field,
    concepts: Field,
    narrative: Field,
    facts: Field,
    files_modified: Field,
}

pub struct LexicalIndex {
    #[allow(dead_code)]
    index: Index,
    reader: IndexReader,
    writer: Mutex<IndexWriter>,
    fields: Fields,
}

fn build_schema() -> (Schema, Fields) {
    let mut builder = Schema::builder();
    let id = builder.add_u64_field("id", INDEXED | STORED | FAST);
    let project_id = builder.add_text_field("project_id", STRING | STORED);
    let title = builder.add_text_field("title", TEXT | STORED);
    let entity_name = builder.add_text_field("entity_name", TEXT | STORED);
    let concepts = builder.add_text_field("concepts", TEXT | STORED);
    let narrative = builder.add_text_field("narrative", TEXT | STORED);
    let facts = builder.add_text_field("facts", TEXT | STORED);
    let files_modified = builder.add_text_field("files_modified", TEXT | STORED);
    let schema = builder.build();
    (
        schema,
        Fields {
            id,
            project_id,
            title,
            entity_name,
            concepts,
            narrative,
            facts,
            files_modified,
        },
    )
}

impl LexicalIndex {
    pub fn open(path: &Path) -> MemorixResult<Self> {
        std::fs::create_dir_all(path).map_err(|e| MemorixError::io("create search dir", path, e))?;
        let version_file = path.join(SCHEMA_VERSION_FILE);
        let on_disk_version: Option<u32> = std::fs::read_to_string(&version_file)
            .ok()
            .and_then(|s| s.trim().parse().ok());
        if on_disk_version != Some(SCHEMA_VERSION) {
            for entry in std::fs::read_dir(path)
                .map_err(|e| MemorixError::io("read search dir", path, e))?
            {
                let entry = entry.map_err(|e| MemorixError::io("read search dir entry", path, e))?;
                let _ = std::fs::remove_file(entry.path());
            }
            std::fs::write(&version_file, SCHEMA_VERSION.to_string())
                .map_err(|e| MemorixError::io("write schema version", &version_file, e))?;
        }

        let (schema, fields) = build_schema();
        let index = if Index::exists(&tantivy::directory::MmapDirectory::open(path)?)? {
            Index::open_in_dir(path)?
        } else {
            Index::create_in_dir(path, schema)?
        };
        Self::from_index(index, fields)
    }

    pub fn open_in_ram() -> MemorixResult<Self> {
        let (schema, fields) = build_schema();
        let index = Index::create_in_ram(schema);
        Self::from_index(index, fields)
    }

    fn from_index(index: Index, fields: Fields) -> MemorixResult<Self> {
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommitWithDelay)
            .try_into()?;
        let writer: IndexWriter = index.writer(50_000_000)?;
        Ok(Self {
            index,
            reader,
            writer: Mutex::new(writer),
            fields,
        })
    }

    pub fn insert(&self, observation: &Observation) -> MemorixResult<()> {
        self.remove(observation.id)?;
        let writer = self.writer.lock().expect("writer mutex poisoned");
        let mut document = TantivyDocument::default();
        document.add_u64(self.fields.id, observation.id);
        document.add_text(self.fields.project_id, &observation.project_id);
        document.add_text(self.fields.title, &observation.title);
        document.add_text(self.fields.entity_name, &observation.entity_name);
        for concept in &observation.concepts {
            document.add_text(self.fields.concepts, concept);
        }
        document.add_text(self.fields.narrative, &observation.narrative);
        for fact in &observation.facts {
            document.add_text(self.fields.facts, fact);
        }
        for file in &observation.files_modified {
            document.add_text(self.fields.files_modified, file);
        }
        writer.add_document(document)?;
        Ok(())
    }

    pub fn remove(&self, id: ObservationId) -> MemorixResult<()> {
        let writer = self.writer.lock().expect("writer mutex poisoned");
        writer.delete_term(Term::from_field_u64(self.fields.id, id));
        Ok(())
    }

    pub fn commit(&self) -> MemorixResult<()> {
        let mut writer = self.writer.lock().expect("writer mutex poisoned");
        writer.commit()?;
        Ok(())
    }

    /// Returns `(id, bm25 score, matched field names)` for up to `limit`
    /// hits. Fuzzy distance is 1 for queries of ≤6 characters, 2 otherwise
    /// (§4.F.3).
    pub fn search(
        &self,
        query: &str,
        limit: usize,
    ) -> MemorixResult<Vec<(ObservationId, f32, Vec<&'static str>)>> {
        let tokens: Vec<String> = query
            .split_whitespace()
            .map(|t| t.to_lowercase())
            .collect();
        if tokens.is_empty() {
            return Ok(Vec::new());
        }
        let distance: u8 = if query.len() <= 6 { 1 } else { 2 };

        let field_handles: &[(Field, &str)] = &[
            (self.fields.title, "title"),
            (self.fields.entity_name, "entity_name"),
            (self.fields.concepts, "concepts"),
            (self.fields.narrative, "narrative"),
            (self.fields.facts, "facts"),
            (self.fields.files_modified, "files_modified"),
        ];

        let mut field_queries: Vec<(Occur, Box<dyn tantivy::query::Query>)> = Vec::new();
        for &(field, name) in field_handles {
            let per_token: Vec<(Occur, Box<dyn tantivy::query::Query>)> = tokens
                .iter()
                .map(|token| {
                    let term = Term::from_field_text(field, token);
                    let q: Box<dyn tantivy::query::Query> =
                        Box::new(FuzzyTermQuery::new(term, distance, true));
                    (Occur::Should, q)
                })
                .collect();
            let field_query: Box<dyn tantivy::query::Query> = Box::new(BooleanQuery::new(per_token));
            let weight = super::field_weight(name);
            field_queries.push((Occur::Should, Box::new(BoostQuery::new(field_query, weight))));
        }

        let searcher = self.reader.searcher();
        let combined = BooleanQuery::new(field_queries);
        let top_docs = searcher.search(&combined, &TopDocs::with_limit(limit))?;

        let mut out = Vec::new();
        for (score, address) in top_docs {
            let document: TantivyDocument = searcher.doc(address)?;
            let Some(id) = document
                .get_first(self.fields.id)
                .and_then(|v| v.as_u64())
            else {
                continue;
            };
            let matched = matched_fields(&document, &self.fields, &tokens);
            out.push((id, score, matched));
        }
        Ok(out)
    }
}

fn matched_fields(document: &TantivyDocument, fields: &Fields, tokens: &[String]) -> Vec<&'static str> {
    let checks: &[(Field, &'static str)] = &[
        (fields.title, "title"),
        (fields.entity_name, "entity_name"),
        (fields.concepts, "concepts"),
        (fields.narrative, "narrative"),
        (fields.facts, "facts"),
        (fields.files_modified, "files_modified"),
    ];
    let mut matched = Vec::new();
    for &(field, name) in checks {
        let content: String = document
            .get_all(field)
            .filter_map(|v| v.as_str())
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        if tokens
            .iter()
            .any(|t| t.len() > 1 && content.contains(t.as_str()))
        {
            matched.push(name);
        }
    }
    matched
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ObservationType;

    fn obs(id: u64, title: &str, narrative: &str) -> Observation {
        Observation {
            id,
            entity_name: "auth".into(),
            kind: ObservationType::Discovery,
            title: title.into(),
            narrative: narrative.into(),
            facts: vec![],
            files_modified: vec![],
            concepts: vec![],
            tokens: 10,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
            project_id: "acme/app".into(),
            has_causal_language: false,
            topic_key: None,
            revision_count: 1,
            session_id: None,
            access_count: 0,
            last_accessed_at: None,
        }
    }

    #[test]
    fn insert_then_search_finds_title_match() {
        let index = LexicalIndex::open_in_ram().unwrap();
        index.insert(&obs(1, "JWT refresh", "rotates tokens")).unwrap();
        index.commit().unwrap();
        let hits = index.search("JWT", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, 1);
        assert!(hits[0].2.contains(&"title"));
    }

    #[test]
    fn fuzzy_tolerance_matches_near_misses() {
        let index = LexicalIndex::open_in_ram().unwrap();
        index.insert(&obs(1, "authentication flow", "")).unwrap();
        index.commit().unwrap();
        let hits = index.search("authentification", 10).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn remove_drops_document_from_results() {
        let index = LexicalIndex::open_in_ram().unwrap();
        index.insert(&obs(1, "JWT refresh", "")).unwrap();
        index.commit().unwrap();
        index.remove(1).unwrap();
        index.commit().unwrap();
        let hits = index.search("JWT", 10).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn empty_query_returns_no_hits() {
        let index = LexicalIndex::open_in_ram().unwrap();
        index.insert(&obs(1, "JWT refresh", "")).unwrap();
        index.commit().unwrap();
        assert!(index.search("", 10).unwrap().is_empty());
    }
}
