//! The persisted index snapshot and its on-disk store.
//!
//! The snapshot is the sole persisted artifact: per-file term frequencies,
//! global per-term document frequency/IDF, and corpus statistics. It is
//! replaced atomically on every save (write to a temp file in the same
//! directory, then rename), so a concurrent reader observes either the old
//! or the new snapshot, never a torn one.

use crate::error::IndexError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// File name of the snapshot, placed at the indexed directory root.
pub const INDEX_FILE_NAME: &str = ".localfind-index.json";

/// Per-file entry holding extracted text, token counts, and the
/// change-detection timestamp.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    /// Absolute path of the source file
    pub path: String,
    /// Extracted text, retained verbatim for result-snippet highlighting.
    /// This makes the snapshot size proportional to corpus size, an accepted
    /// tradeoff.
    pub content: String,
    /// Lowercased extension including the leading dot (e.g. ".md")
    pub extension: String,
    /// Size of the source file in bytes
    pub size: u64,
    /// Modification timestamp, the sole change-detection signal
    pub mtime: DateTime<Utc>,
    /// Token -> occurrence count within this file
    pub term_freq: HashMap<String, u64>,
    /// Total token occurrences in this file
    pub term_count: u64,
}

/// Global statistics for one term, derived entirely from `files`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TermStats {
    /// Number of files containing the token at least once
    pub document_frequency: u64,
    /// ln((N - df + 0.5) / (df + 0.5)); negative when the term appears in
    /// more than half the corpus, which is preserved rather than clamped
    pub idf: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorpusStats {
    pub total_documents: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

/// The full persisted index state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub files: HashMap<String, FileRecord>,
    pub terms: HashMap<String, TermStats>,
    pub stats: CorpusStats,
}

impl Snapshot {
    /// Rebuild `terms` and `stats.totalDocuments` from scratch over the full
    /// `files` map. Never patched incrementally; a single indexing run is the
    /// unit of consistency.
    pub fn recompute_statistics(&mut self) {
        let total_documents = self.files.len() as u64;
        self.stats.total_documents = total_documents;

        // Document frequency: count a token once per file regardless of its
        // in-file frequency.
        let mut doc_freq: HashMap<&str, u64> = HashMap::new();
        for record in self.files.values() {
            for term in record.term_freq.keys() {
                *doc_freq.entry(term.as_str()).or_insert(0) += 1;
            }
        }

        let n = total_documents as f64;
        self.terms = doc_freq
            .into_iter()
            .map(|(term, df)| {
                let idf = ((n - df as f64 + 0.5) / (df as f64 + 0.5)).ln();
                (
                    term.to_string(),
                    TermStats {
                        document_frequency: df,
                        idf,
                    },
                )
            })
            .collect();

        tracing::debug!(
            documents = total_documents,
            terms = self.terms.len(),
            "Recomputed global statistics"
        );
    }

    /// Mean of `term_count` across all files. `None` for an empty corpus.
    pub fn average_document_length(&self) -> Option<f64> {
        if self.files.is_empty() {
            return None;
        }
        let total: u64 = self.files.values().map(|f| f.term_count).sum();
        Some(total as f64 / self.files.len() as f64)
    }
}

/// On-disk store for the snapshot of one indexed directory root.
#[derive(Debug, Clone)]
pub struct IndexStore {
    index_path: PathBuf,
}

impl IndexStore {
    pub fn new(target_root: &Path) -> Self {
        Self {
            index_path: target_root.join(INDEX_FILE_NAME),
        }
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    pub fn exists(&self) -> bool {
        self.index_path.exists()
    }

    /// Load the snapshot. A missing or corrupt snapshot surfaces as "no
    /// existing index" so the caller can rebuild from scratch; it is never
    /// fatal.
    pub fn load(&self) -> Snapshot {
        if !self.index_path.exists() {
            tracing::debug!(path = %self.index_path.display(), "No index snapshot found, starting empty");
            return Snapshot::default();
        }

        let content = match fs::read_to_string(&self.index_path) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(path = %self.index_path.display(), error = %e, "Failed to read index snapshot, starting empty");
                return Snapshot::default();
            }
        };

        match serde_json::from_str(&content) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(path = %self.index_path.display(), error = %e, "Corrupt index snapshot, starting empty");
                Snapshot::default()
            }
        }
    }

    /// Save the snapshot, fully overwriting any previous one. The write goes
    /// to a temp file in the same directory followed by an atomic rename.
    /// Failure here is fatal to the indexing run: nothing durable happened.
    pub fn save(&self, snapshot: &Snapshot) -> Result<(), IndexError> {
        let content = serde_json::to_string_pretty(snapshot)?;

        let tmp_path = self.index_path.with_extension("json.tmp");
        fs::write(&tmp_path, content).map_err(|source| IndexError::SaveFailed {
            path: self.index_path.clone(),
            source,
        })?;
        fs::rename(&tmp_path, &self.index_path).map_err(|source| IndexError::SaveFailed {
            path: self.index_path.clone(),
            source,
        })?;

        tracing::debug!(path = %self.index_path.display(), "Saved index snapshot");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(path: &str, terms: &[(&str, u64)]) -> FileRecord {
        let term_freq: HashMap<String, u64> =
            terms.iter().map(|(t, c)| (t.to_string(), *c)).collect();
        let term_count = term_freq.values().sum();
        FileRecord {
            path: path.to_string(),
            content: String::new(),
            extension: ".txt".to_string(),
            size: 0,
            mtime: Utc::now(),
            term_freq,
            term_count,
        }
    }

    #[test]
    fn test_load_missing_snapshot_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = IndexStore::new(dir.path());
        let snapshot = store.load();
        assert!(snapshot.files.is_empty());
        assert_eq!(snapshot.stats.total_documents, 0);
    }

    #[test]
    fn test_load_corrupt_snapshot_is_empty() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(INDEX_FILE_NAME), "{not json!").unwrap();
        let store = IndexStore::new(dir.path());
        assert!(store.load().files.is_empty());
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = IndexStore::new(dir.path());

        let mut snapshot = Snapshot::default();
        let rec = record("/corpus/a.txt", &[("appl", 2), ("banana", 1)]);
        snapshot.files.insert(rec.path.clone(), rec);
        snapshot.recompute_statistics();
        store.save(&snapshot).unwrap();

        let loaded = store.load();
        assert_eq!(loaded.files.len(), 1);
        assert_eq!(loaded.stats.total_documents, 1);
        assert_eq!(
            loaded.files["/corpus/a.txt"].term_freq["appl"],
            snapshot.files["/corpus/a.txt"].term_freq["appl"]
        );
    }

    #[test]
    fn test_save_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let store = IndexStore::new(dir.path());
        store.save(&Snapshot::default()).unwrap();

        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec![INDEX_FILE_NAME.to_string()]);
    }

    #[test]
    fn test_recompute_document_frequency_counts_once_per_file() {
        let mut snapshot = Snapshot::default();
        for (path, terms) in [
            ("/a.txt", vec![("appl", 5u64), ("banana", 1)]),
            ("/b.txt", vec![("appl", 1), ("cherri", 1)]),
        ] {
            let rec = record(path, &terms);
            snapshot.files.insert(rec.path.clone(), rec);
        }
        snapshot.recompute_statistics();

        assert_eq!(snapshot.stats.total_documents, 2);
        assert_eq!(snapshot.terms["appl"].document_frequency, 2);
        assert_eq!(snapshot.terms["banana"].document_frequency, 1);
    }

    #[test]
    fn test_idf_formula_and_negative_idf_preserved() {
        let mut snapshot = Snapshot::default();
        for (path, terms) in [
            ("/a.txt", vec![("common", 1u64), ("rare", 1)]),
            ("/b.txt", vec![("common", 1)]),
            ("/c.txt", vec![("common", 1)]),
        ] {
            let rec = record(path, &terms);
            snapshot.files.insert(rec.path.clone(), rec);
        }
        snapshot.recompute_statistics();

        // rare: ln((3 - 1 + 0.5) / (1 + 0.5)) = ln(5/3)
        let rare = snapshot.terms["rare"].idf;
        assert!((rare - (2.5f64 / 1.5).ln()).abs() < 1e-12);

        // common appears in all 3 of 3 documents: ln(0.5 / 3.5) < 0
        let common = snapshot.terms["common"].idf;
        assert!(common < 0.0, "idf of a near-ubiquitous term must stay negative");
    }

    #[test]
    fn test_terms_rebuilt_from_scratch() {
        let mut snapshot = Snapshot::default();
        let rec = record("/a.txt", &[("appl", 1)]);
        snapshot.files.insert(rec.path.clone(), rec);
        snapshot.recompute_statistics();
        assert!(snapshot.terms.contains_key("appl"));

        snapshot.files.clear();
        let rec = record("/b.txt", &[("banana", 1)]);
        snapshot.files.insert(rec.path.clone(), rec);
        snapshot.recompute_statistics();

        // Stale terms from the previous run must not survive
        assert!(!snapshot.terms.contains_key("appl"));
        assert!(snapshot.terms.contains_key("banana"));
    }

    #[test]
    fn test_average_document_length() {
        let mut snapshot = Snapshot::default();
        assert!(snapshot.average_document_length().is_none());

        for (path, terms) in [("/a.txt", vec![("x", 4u64)]), ("/b.txt", vec![("y", 2)])] {
            let rec = record(path, &terms);
            snapshot.files.insert(rec.path.clone(), rec);
        }
        assert_eq!(snapshot.average_document_length(), Some(3.0));
    }
}
