//! Local document search engine with an MCP stdio front-end.
//!
//! Indexes a directory tree of text and office documents into a single JSON
//! snapshot, ranks BM25 searches against it, and serves the whole thing as a
//! set of tools over newline-delimited JSON-RPC on stdio.

pub mod error;
pub mod extract;
pub mod indexer;
pub mod mcp;
pub mod messages;
pub mod searcher;
pub mod store;
pub mod tokenizer;
