//! Filename search: fuzzy scorer and the query router
//!
//! Fuzzy search scores entry names in the current snapshot; semantic
//! search goes through the external collaborator over the vector store
//! and falls back to fuzzy when unavailable.

use crate::entry::DirectorySnapshot;
use std::path::{Path, PathBuf};

/// Maximum results returned by a single query
pub const MAX_RESULTS: usize = 1024;
/// Maximum recorded match positions per result (for highlighting)
pub const MAX_POSITIONS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    Fuzzy,
    Semantic,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    /// Index of the entry in the snapshot that produced it
    pub original_index: usize,
    pub score: i32,
    pub match_positions: Vec<u16>,
    pub match_count: usize,
}

/// Options forwarded to the semantic collaborator
#[derive(Debug, Clone)]
pub struct SemanticOptions {
    pub max_results: usize,
    pub min_score: f32,
    pub directory: PathBuf,
}

/// A path returned by semantic retrieval with its cosine similarity
#[derive(Debug, Clone)]
pub struct SemanticHit {
    pub path: PathBuf,
    pub similarity: f32,
}

/// Similarity retrieval over embeddings held in the vector store.
pub trait SemanticSearch {
    fn search(&self, query: &str, options: &SemanticOptions) -> crate::Result<Vec<SemanticHit>>;
}

/// Scoring bonuses (see `fuzzy_match`)
const MATCH_BONUS: i32 = 10;
const CONSECUTIVE_BONUS: i32 = 5;
const WORD_BOUNDARY_BONUS: i32 = 15;
const CAMEL_BONUS: i32 = 10;

/// Score `query` against `text`, consuming query characters in order.
///
/// Returns 0 when any query character is unmatched (or the query is
/// empty). Each match awards +10; consecutive matches +5 per streak
/// step; word boundaries (start of text, or after space/underscore/
/// dash/dot) +15; camelCase transitions +10. A density bonus of
/// `100 * matches / text_len` is added to complete matches.
pub fn fuzzy_match(query: &str, text: &str, case_sensitive: bool) -> (i32, Vec<u16>) {
    if query.is_empty() || text.is_empty() {
        return (0, Vec::new());
    }

    let text_chars: Vec<char> = text.chars().collect();
    let query_chars: Vec<char> = query.chars().collect();

    let mut score = 0i32;
    let mut positions = Vec::new();
    let mut qi = 0usize;
    // Number of consecutive continuations in the current run, from 1
    let mut streak = 0i32;
    let mut prev_matched_at: Option<usize> = None;

    for (ti, &tc) in text_chars.iter().enumerate() {
        if qi >= query_chars.len() {
            break;
        }
        let qc = query_chars[qi];
        let matched = if case_sensitive {
            tc == qc
        } else {
            tc.to_lowercase().eq(qc.to_lowercase())
        };
        if !matched {
            continue;
        }

        score += MATCH_BONUS;

        if prev_matched_at == Some(ti.wrapping_sub(1)) {
            streak += 1;
            score += CONSECUTIVE_BONUS * streak;
        } else {
            streak = 0;
        }

        if ti == 0 || matches!(text_chars[ti - 1], ' ' | '_' | '-' | '.') {
            score += WORD_BOUNDARY_BONUS;
        } else if tc.is_uppercase() && text_chars[ti - 1].is_lowercase() {
            score += CAMEL_BONUS;
        }

        if positions.len() < MAX_POSITIONS {
            positions.push(ti as u16);
        }
        prev_matched_at = Some(ti);
        qi += 1;
    }

    if qi < query_chars.len() {
        return (0, Vec::new());
    }

    score += (100 * query_chars.len() as i32) / text_chars.len() as i32;
    (score, positions)
}

/// Dispatches a query to the fuzzy scorer or the semantic collaborator.
pub struct SearchRouter {
    pub mode: SearchMode,
    pub case_sensitive: bool,
    pub max_results: usize,
    pub min_semantic_score: f32,
}

impl Default for SearchRouter {
    fn default() -> Self {
        Self {
            mode: SearchMode::Fuzzy,
            case_sensitive: false,
            max_results: MAX_RESULTS,
            min_semantic_score: 0.0,
        }
    }
}

impl SearchRouter {
    /// Run `query` over `snapshot`. Semantic mode requires a collaborator;
    /// without one it falls through to fuzzy.
    pub fn perform(
        &self,
        query: &str,
        snapshot: &DirectorySnapshot,
        semantic: Option<&dyn SemanticSearch>,
    ) -> Vec<SearchResult> {
        match (self.mode, semantic) {
            (SearchMode::Semantic, Some(collaborator)) => {
                self.perform_semantic(query, snapshot, collaborator)
            }
            _ => self.perform_fuzzy(query, snapshot),
        }
    }

    fn perform_fuzzy(&self, query: &str, snapshot: &DirectorySnapshot) -> Vec<SearchResult> {
        let mut results: Vec<SearchResult> = snapshot
            .entries
            .iter()
            .enumerate()
            .filter_map(|(idx, entry)| {
                let (score, positions) = fuzzy_match(query, &entry.name, self.case_sensitive);
                if score > 0 {
                    Some(SearchResult {
                        original_index: idx,
                        score,
                        match_count: positions.len(),
                        match_positions: positions,
                    })
                } else {
                    None
                }
            })
            .collect();

        results.sort_by(|a, b| b.score.cmp(&a.score));
        results.truncate(self.max_results);
        results
    }

    fn perform_semantic(
        &self,
        query: &str,
        snapshot: &DirectorySnapshot,
        collaborator: &dyn SemanticSearch,
    ) -> Vec<SearchResult> {
        let options = SemanticOptions {
            max_results: self.max_results,
            min_score: self.min_semantic_score,
            directory: snapshot.path.clone(),
        };

        let hits = match collaborator.search(query, &options) {
            Ok(hits) => hits,
            Err(e) => {
                tracing::warn!("semantic search failed, falling back to fuzzy: {e}");
                return self.perform_fuzzy(query, snapshot);
            }
        };

        hits.iter()
            .filter_map(|hit| {
                let idx = resolve_index(snapshot, &hit.path)?;
                Some(SearchResult {
                    original_index: idx,
                    score: (hit.similarity * 1000.0).round() as i32,
                    match_positions: Vec::new(),
                    match_count: 0,
                })
            })
            .take(self.max_results)
            .collect()
    }
}

fn resolve_index(snapshot: &DirectorySnapshot, path: &Path) -> Option<usize> {
    snapshot.entries.iter().position(|e| e.path == path)
}
