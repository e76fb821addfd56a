//! Heuristic entity extraction from free text (§4.D). No teacher file
//! extracts entities from prose directly — the closest analogue is
//! `wiki_links::extract_linked_notes`, which pulls `[[wiki links]]` out of
//! note bodies via regex — generalized here to path-like and
//! identifier-like token regexes in the same pure-function, unit-tested
//! style.

use once_cell::sync::Lazy;
use regex::Regex;

const SOURCE_EXTENSIONS: &[&str] = &[
    "rs", "ts", "tsx", "js", "jsx", "py", "go", "rb", "java", "kt", "c", "h", "cpp", "hpp", "cs",
    "swift", "toml", "yaml", "yml", "json", "md",
];

static FILE_PATH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[A-Za-z0-9_./-]*/[A-Za-z0-9_.-]+\.[A-Za-z0-9]+").expect("valid regex")
});

static IDENTIFIER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[a-z][a-zA-Z0-9]*[A-Z][a-zA-Z0-9]*\b|\b[a-z0-9]+(?:_[a-z0-9]+)+\b")
        .expect("valid regex")
});

const STOP_WORDS: &[&str] = &["the_", "and_", "for_"];

const CAUSAL_MARKERS: &[&str] = &[
    "because",
    "so that",
    "therefore",
    "due to",
    "as a result",
    "\u{56e0}\u{4e3a}",  // "因为"
    "\u{6240}\u{4ee5}",  // "所以"
];

/// Result of running the extractor over a piece of free text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extracted {
    pub files: Vec<String>,
    pub identifiers: Vec<String>,
    pub has_causal_language: bool,
}

/// Pure function from free text to `{files, identifiers, hasCausalLanguage}`.
pub fn extract(text: &str) -> Extracted {
    let mut files = Vec::new();
    for m in FILE_PATH_RE.find_iter(text) {
        let candidate = m.as_str();
        if has_recognized_extension(candidate) && !files.iter().any(|f| f == candidate) {
            files.push(candidate.to_string());
        }
    }

    let mut identifiers = Vec::new();
    for m in IDENTIFIER_RE.find_iter(text) {
        let candidate = m.as_str();
        if candidate.len() >= 3
            && !STOP_WORDS.contains(&candidate)
            && !identifiers.iter().any(|i| i == candidate)
        {
            identifiers.push(candidate.to_string());
        }
    }

    let lowered = text.to_lowercase();
    let has_causal_language = CAUSAL_MARKERS.iter().any(|marker| lowered.contains(marker));

    Extracted {
        files,
        identifiers,
        has_causal_language,
    }
}

fn has_recognized_extension(candidate: &str) -> bool {
    candidate
        .rsplit_once('.')
        .map(|(_, ext)| SOURCE_EXTENSIONS.contains(&ext))
        .unwrap_or(false)
}

/// Deduplicated concatenation of user-supplied concepts and extracted
/// identifiers.
pub fn enrich_concepts(user_concepts: &[String], extracted: &Extracted) -> Vec<String> {
    let mut out = user_concepts.to_vec();
    for identifier in &extracted.identifiers {
        if !out.iter().any(|c| c == identifier) {
            out.push(identifier.clone());
        }
    }
    out
}

/// Appends extracted files not already present under case-insensitive
/// comparison.
pub fn enrich_files(user_files: &[String], extracted_files: &[String]) -> Vec<String> {
    let mut out = user_files.to_vec();
    for file in extracted_files {
        if !out.iter().any(|f| f.eq_ignore_ascii_case(file)) {
            out.push(file.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_file_paths_with_recognized_extensions() {
        let extracted = extract("fixed the bug in src/auth/login.rs today");
        assert_eq!(extracted.files, vec!["src/auth/login.rs"]);
    }

    #[test]
    fn ignores_paths_with_unrecognized_extensions() {
        let extracted = extract("see docs/notes.xyz for details");
        assert!(extracted.files.is_empty());
    }

    #[test]
    fn extracts_camel_case_and_snake_case_identifiers() {
        let extracted = extract("renamed getUserToken to get_user_token");
        assert!(extracted.identifiers.contains(&"getUserToken".to_string()));
        assert!(extracted.identifiers.contains(&"get_user_token".to_string()));
    }

    #[test]
    fn detects_causal_language() {
        assert!(extract("it failed because the token expired").has_causal_language);
        assert!(!extract("the token expired yesterday").has_causal_language);
    }

    #[test]
    fn enrich_concepts_deduplicates() {
        let extracted = Extracted {
            identifiers: vec!["getUserToken".to_string()],
            ..Default::default()
        };
        let enriched = enrich_concepts(&["auth".to_string(), "getUserToken".to_string()], &extracted);
        assert_eq!(enriched, vec!["auth", "getUserToken"]);
    }

    #[test]
    fn enrich_files_is_case_insensitive() {
        let enriched = enrich_files(
            &["src/Auth.rs".to_string()],
            &["src/auth.rs".to_string(), "src/other.rs".to_string()],
        );
        assert_eq!(enriched, vec!["src/Auth.rs", "src/other.rs"]);
    }
}
