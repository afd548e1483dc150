//! BM25 ranking over the persisted snapshot: corpus-wide search, file-scoped
//! search, similar-file lookup, and index statistics.

use crate::error::IndexError;
use crate::store::{FileRecord, IndexStore, Snapshot, TermStats};
use crate::tokenizer::{tokenize_document, tokenize_query};
use chrono::{DateTime, Utc};
use regex::RegexBuilder;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;

pub const BM25_K1: f64 = 1.2;
pub const BM25_B: f64 = 0.75;

/// Maximum display length of a highlighted snippet.
const HIGHLIGHT_MAX_LEN: usize = 500;
/// Leading context kept before the first match when truncating.
const HIGHLIGHT_LEAD: usize = 100;

/// Number of top-frequency terms taken from the reference file for
/// similar-file queries.
const SIMILAR_TOP_TERMS: usize = 10;

#[derive(Debug, Clone, Serialize)]
pub struct ScoredResult {
    pub path: String,
    pub score: f64,
    /// Highlighted snippet for search results; empty for similarity results
    pub content: String,
    pub extension: String,
    pub size: u64,
    pub mtime: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexStatsReport {
    pub total_files: usize,
    pub total_terms: usize,
    /// Size of the serialized snapshot on disk
    pub index_size_bytes: u64,
    pub last_updated: Option<DateTime<Utc>>,
}

pub struct Searcher {
    store: IndexStore,
}

impl Searcher {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            store: IndexStore::new(root.as_ref()),
        }
    }

    /// Search the whole corpus. Results are descending by score, only scores
    /// greater than zero, at most `limit` entries. A query whose every term
    /// is absent from the corpus yields an empty list, not an error.
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<ScoredResult>, IndexError> {
        let snapshot = self.load_snapshot()?;
        if snapshot.files.is_empty() {
            tracing::debug!("Index is empty, nothing to search");
            return Ok(Vec::new());
        }

        let query_terms = tokenize_query(query);
        if query_terms.is_empty() {
            tracing::debug!(query, "Query has no usable terms");
            return Ok(Vec::new());
        }
        tracing::debug!(terms = ?query_terms, "Searching");

        // Recomputed per call, not cached
        let Some(avg_doc_len) = snapshot.average_document_length() else {
            return Ok(Vec::new());
        };

        let mut results: Vec<ScoredResult> = snapshot
            .files
            .values()
            .filter_map(|record| {
                let score = bm25_score(&query_terms, record, &snapshot.terms, avg_doc_len);
                (score > 0.0).then(|| ScoredResult {
                    path: record.path.clone(),
                    score,
                    content: highlight_matches(&record.content, &query_terms, HIGHLIGHT_MAX_LEN),
                    extension: record.extension.clone(),
                    size: record.size,
                    mtime: record.mtime,
                })
            })
            .collect();

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(limit);
        Ok(results)
    }

    /// Score a single indexed file against the query. `None` when the score
    /// is zero; an error when the file is not in the index.
    pub fn search_in_file(
        &self,
        file_path: &str,
        query: &str,
    ) -> Result<Option<ScoredResult>, IndexError> {
        let snapshot = self.load_snapshot()?;
        let record = snapshot
            .files
            .get(file_path)
            .ok_or_else(|| IndexError::FileNotIndexed(file_path.to_string()))?;

        let query_terms = tokenize_query(query);
        let Some(avg_doc_len) = snapshot.average_document_length() else {
            return Ok(None);
        };

        let score = bm25_score(&query_terms, record, &snapshot.terms, avg_doc_len);
        if score <= 0.0 {
            return Ok(None);
        }
        Ok(Some(ScoredResult {
            path: record.path.clone(),
            score,
            content: highlight_matches(&record.content, &query_terms, HIGHLIGHT_MAX_LEN),
            extension: record.extension.clone(),
            size: record.size,
            mtime: record.mtime,
        }))
    }

    /// Rank other files by similarity to the reference file, using its top
    /// highest-frequency tokens as an unweighted pseudo-query.
    pub fn find_similar_files(
        &self,
        file_path: &str,
        limit: usize,
    ) -> Result<Vec<ScoredResult>, IndexError> {
        let snapshot = self.load_snapshot()?;
        let target = snapshot
            .files
            .get(file_path)
            .ok_or_else(|| IndexError::FileNotIndexed(file_path.to_string()))?;

        let top_terms = top_frequency_terms(target, SIMILAR_TOP_TERMS);
        let Some(avg_doc_len) = snapshot.average_document_length() else {
            return Ok(Vec::new());
        };

        let mut results: Vec<ScoredResult> = snapshot
            .files
            .values()
            .filter(|record| record.path != file_path)
            .filter_map(|record| {
                let score = bm25_score(&top_terms, record, &snapshot.terms, avg_doc_len);
                (score > 0.0).then(|| ScoredResult {
                    path: record.path.clone(),
                    score,
                    content: String::new(),
                    extension: record.extension.clone(),
                    size: record.size,
                    mtime: record.mtime,
                })
            })
            .collect();

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(limit);
        Ok(results)
    }

    pub fn index_stats(&self) -> Result<IndexStatsReport, IndexError> {
        let snapshot = self.load_snapshot()?;
        let index_size_bytes = std::fs::metadata(self.store.index_path())
            .map(|m| m.len())
            .unwrap_or(0);

        Ok(IndexStatsReport {
            total_files: snapshot.files.len(),
            total_terms: snapshot.terms.len(),
            index_size_bytes,
            last_updated: snapshot.stats.last_updated,
        })
    }

    /// A missing snapshot is an actionable error (index first); a corrupt one
    /// loads as empty and searches simply return nothing.
    fn load_snapshot(&self) -> Result<Snapshot, IndexError> {
        if !self.store.exists() {
            return Err(IndexError::NotFound(self.store.index_path().to_path_buf()));
        }
        Ok(self.store.load())
    }
}

/// BM25 with the `(k1 + 1)` numerator factor omitted. Terms absent from the
/// global statistics contribute nothing.
fn bm25_score(
    query_terms: &[String],
    record: &FileRecord,
    terms: &HashMap<String, TermStats>,
    avg_doc_len: f64,
) -> f64 {
    let doc_len = record.term_count as f64;
    let mut score = 0.0;

    for term in query_terms {
        let tf = record.term_freq.get(term).copied().unwrap_or(0) as f64;
        if tf <= 0.0 {
            continue;
        }
        let Some(stats) = terms.get(term) else {
            continue;
        };
        let norm = tf + BM25_K1 * (1.0 - BM25_B + BM25_B * (doc_len / avg_doc_len));
        score += stats.idf * (tf / norm);
    }
    score
}

/// The reference file's top terms by in-file frequency. Ties keep
/// first-encountered document order, recovered by re-tokenizing the stored
/// content (the sort below is stable).
fn top_frequency_terms(record: &FileRecord, limit: usize) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut ordered: Vec<(String, u64)> = tokenize_document(&record.content)
        .into_iter()
        .filter(|t| seen.insert(t.clone()))
        .map(|t| {
            let count = record.term_freq.get(&t).copied().unwrap_or(0);
            (t, count)
        })
        .collect();

    ordered.sort_by(|a, b| b.1.cmp(&a.1));
    ordered.into_iter().take(limit).map(|(t, _)| t).collect()
}

/// Wrap each case-insensitive occurrence of each query token in `**` markers,
/// then truncate to `max_len` centered on the first match with ellipses at
/// cut boundaries.
fn highlight_matches(content: &str, query_terms: &[String], max_len: usize) -> String {
    let mut highlighted = content.to_string();

    for term in query_terms {
        let Ok(re) = RegexBuilder::new(&regex::escape(term))
            .case_insensitive(true)
            .build()
        else {
            continue;
        };
        highlighted = re.replace_all(&highlighted, "**$0**").into_owned();
    }

    if highlighted.len() <= max_len {
        return highlighted;
    }

    match highlighted.find("**") {
        Some(first) => {
            let start = floor_char_boundary(&highlighted, first.saturating_sub(HIGHLIGHT_LEAD));
            let end = floor_char_boundary(&highlighted, (start + max_len).min(highlighted.len()));
            format!("...{}...", &highlighted[start..end])
        }
        None => {
            let end = floor_char_boundary(&highlighted, max_len);
            format!("{}...", &highlighted[..end])
        }
    }
}

fn floor_char_boundary(s: &str, mut idx: usize) -> usize {
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}
