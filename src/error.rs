/// Centralized error types for localfind using thiserror
///
/// Per-file extraction failures are non-fatal and absorbed by the indexer;
/// index-structural failures (save, missing snapshot) propagate to the
/// immediate caller.
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while converting a single file to text
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Failed to read file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to extract PDF text from '{path}': {reason}")]
    Pdf { path: PathBuf, reason: String },

    #[error("Failed to open document archive '{path}': {reason}")]
    Archive { path: PathBuf, reason: String },

    #[error("Failed to parse document XML in '{path}': {reason}")]
    Xml { path: PathBuf, reason: String },

    #[error("Failed to read spreadsheet '{path}': {reason}")]
    Spreadsheet { path: PathBuf, reason: String },
}

/// Errors raised by the index store and the search side of the engine
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("No index snapshot found at '{0}'. Run indexing first.")]
    NotFound(PathBuf),

    #[error("File is not in the index: {0}")]
    FileNotIndexed(String),

    #[error("Failed to save index snapshot to '{path}': {source}")]
    SaveFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize index snapshot: {0}")]
    SerializeFailed(#[from] serde_json::Error),
}
