//! MCP protocol server: newline-delimited JSON-RPC 2.0 over stdio.
//!
//! Requests are handled serialized: each incoming line is decoded,
//! dispatched, and answered before the next line is read, so responses go
//! out in arrival order and debugging stays deterministic. Stdout carries
//! only JSON-RPC frames; all diagnostics go through tracing.
//!
//! State machine: `Uninitialized -> Initialized -> ClientAcked`. Only
//! `initialize` is accepted before the handshake; the
//! `notifications/initialized` ack triggers one lazy indexing run if no
//! snapshot exists yet.

use crate::indexer::Indexer;
use crate::searcher::Searcher;
use anyhow::{Context, Result};
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = "localfind";

// JSON-RPC error codes
const INVALID_REQUEST: i64 = -32600;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;
const INTERNAL_ERROR: i64 = -32000;
/// Request received before the initialize handshake
const NOT_INITIALIZED: i64 = -32002;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProtocolState {
    Uninitialized,
    Initialized,
    ClientAcked,
}

/// A structured JSON-RPC error to be attached to a response.
struct RpcError {
    code: i64,
    message: String,
}

impl RpcError {
    fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

pub struct McpServer {
    root: PathBuf,
    state: ProtocolState,
}

impl McpServer {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            state: ProtocolState::Uninitialized,
        }
    }

    /// Serve until stdin closes. One response line per request id, nothing
    /// else on stdout.
    pub async fn run(&mut self) -> Result<()> {
        tracing::info!(root = %self.root.display(), "MCP server started, waiting for initialize");

        let stdin = BufReader::new(tokio::io::stdin());
        let mut stdout = tokio::io::stdout();
        let mut lines = stdin.lines();

        while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
            if line.trim().is_empty() {
                continue;
            }
            if let Some(response) = self.handle_line(&line).await {
                let frame = serde_json::to_string(&response)
                    .context("Failed to serialize response")?;
                stdout
                    .write_all(frame.as_bytes())
                    .await
                    .context("Failed to write response")?;
                stdout.write_all(b"\n").await?;
                stdout.flush().await?;
            }
        }

        tracing::info!("Stdin closed, MCP server shutting down");
        Ok(())
    }

    /// Decode one line. A malformed line carries no usable request id, so it
    /// is logged and dropped; only id-correlated frames go to stdout.
    async fn handle_line(&mut self, line: &str) -> Option<Value> {
        match serde_json::from_str::<Value>(line) {
            Ok(message) => self.handle_message(message).await,
            Err(e) => {
                tracing::warn!(error = %e, "Dropping malformed JSON-RPC line");
                None
            }
        }
    }

    /// Process one decoded message. Returns the response for requests,
    /// `None` for notifications.
    pub async fn handle_message(&mut self, message: Value) -> Option<Value> {
        if !message.is_object() {
            tracing::warn!("Ignoring non-object JSON-RPC message");
            return None;
        }

        let id = message.get("id").cloned().filter(|v| !v.is_null());
        let method = message.get("method").and_then(|m| m.as_str());
        let params = message.get("params").cloned().unwrap_or(json!({}));

        // A message without an id is a notification; it never receives a
        // response.
        let Some(id) = id else {
            if let Some(method) = method {
                self.handle_notification(method, &params).await;
            } else {
                tracing::warn!("Ignoring notification without a method");
            }
            return None;
        };

        let Some(method) = method else {
            return Some(error_response(
                id,
                &RpcError::new(INVALID_REQUEST, "Invalid request: missing method"),
            ));
        };

        tracing::debug!(method, "Handling request");

        if method != "initialize" && self.state == ProtocolState::Uninitialized {
            tracing::warn!(method, "Rejecting request before initialize");
            return Some(error_response(
                id,
                &RpcError::new(
                    NOT_INITIALIZED,
                    "Server not initialized. Call initialize first.",
                ),
            ));
        }

        let result = match method {
            "initialize" => Ok(self.handle_initialize()),
            "tools/list" => Ok(tool_catalog()),
            "tools/call" => self.handle_call_tool(&params).await,
            "resources/list" => Ok(json!({ "resources": [] })),
            "prompts/list" => Ok(json!({ "prompts": [] })),
            other => Err(RpcError::new(
                METHOD_NOT_FOUND,
                format!("Method not supported: {other}"),
            )),
        };

        Some(match result {
            Ok(value) => json!({ "jsonrpc": "2.0", "id": id, "result": value }),
            Err(e) => error_response(id, &e),
        })
    }

    async fn handle_notification(&mut self, method: &str, params: &Value) {
        match method {
            "notifications/initialized" => {
                tracing::debug!("Client acknowledged initialization");
                self.state = ProtocolState::ClientAcked;
                self.ensure_index().await;
            }
            "notifications/cancelled" => {
                tracing::debug!(?params, "Request cancellation notification");
            }
            other => {
                tracing::debug!(method = other, "Ignoring unknown notification");
            }
        }
    }

    fn handle_initialize(&mut self) -> Value {
        self.state = ProtocolState::Initialized;
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {
                "tools": { "listChanged": true }
            },
            "serverInfo": {
                "name": SERVER_NAME,
                "version": env!("CARGO_PKG_VERSION")
            }
        })
    }

    /// Lazily build the index once after the handshake completes, only when
    /// no snapshot exists yet. Failures are logged, never fatal to the
    /// session.
    async fn ensure_index(&self) {
        let root = self.root.clone();
        if Indexer::new(&root).store().exists() {
            return;
        }
        tracing::info!("No index snapshot present, running initial indexing");
        let result = tokio::task::spawn_blocking(move || Indexer::new(&root).index(false)).await;
        match result {
            Ok(Ok(summary)) => {
                tracing::info!(files = summary.total_files, "Initial indexing finished")
            }
            Ok(Err(e)) => tracing::error!(error = %e, "Initial indexing failed"),
            Err(e) => tracing::error!(error = %e, "Initial indexing task panicked"),
        }
    }

    async fn handle_call_tool(&self, params: &Value) -> Result<Value, RpcError> {
        let name = params
            .get("name")
            .and_then(|n| n.as_str())
            .ok_or_else(|| RpcError::new(INVALID_PARAMS, "Missing tool name"))?;
        let args = params.get("arguments").cloned().unwrap_or(json!({}));

        tracing::debug!(tool = name, "Calling tool");

        let text = match name {
            "search-local" => self.tool_search_local(&args).await?,
            "search-in-file" => self.tool_search_in_file(&args).await?,
            "get-index-stats" => self.tool_index_stats().await?,
            "find-similar-files" => self.tool_find_similar(&args).await?,
            "reindex" => self.tool_reindex(&args).await?,
            other => {
                return Err(RpcError::new(
                    INTERNAL_ERROR,
                    format!("Unknown tool: {other}"),
                ));
            }
        };

        Ok(json!({
            "content": [{ "type": "text", "text": text }]
        }))
    }

    async fn tool_search_local(&self, args: &Value) -> Result<String, RpcError> {
        let query = require_str(args, "query")?.to_string();
        let limit = args
            .get("limit")
            .and_then(|l| l.as_u64())
            .unwrap_or(10) as usize;

        let root = self.root.clone();
        let results = run_blocking(move || Searcher::new(&root).search(&query, limit)).await?;

        let mut text = format!("Search results ({}):\n\n", results.len());
        for (i, result) in results.iter().enumerate() {
            text.push_str(&format!(
                "{}. **{}** (score: {:.4})\n   extension: {}, size: {} bytes\n   modified: {}\n   content: {}\n\n",
                i + 1,
                result.path,
                result.score,
                result.extension,
                result.size,
                result.mtime.to_rfc3339(),
                result.content,
            ));
        }
        Ok(text)
    }

    async fn tool_search_in_file(&self, args: &Value) -> Result<String, RpcError> {
        let file_path = require_str(args, "filePath")?.to_string();
        let query = require_str(args, "query")?.to_string();

        let root = self.root.clone();
        let display_path = file_path.clone();
        let result =
            run_blocking(move || Searcher::new(&root).search_in_file(&file_path, &query)).await?;

        Ok(match result {
            Some(hit) => format!(
                "Match in \"{}\":\n\nscore: {:.4}\nextension: {}, size: {} bytes\nmodified: {}\n\ncontent:\n{}",
                hit.path,
                hit.score,
                hit.extension,
                hit.size,
                hit.mtime.to_rfc3339(),
                hit.content,
            ),
            None => format!("No match found in \"{display_path}\"."),
        })
    }

    async fn tool_index_stats(&self) -> Result<String, RpcError> {
        let root = self.root.clone();
        let stats = run_blocking(move || Searcher::new(&root).index_stats()).await?;

        let last_updated = stats
            .last_updated
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "unknown".to_string());
        Ok(format!(
            "Index statistics:\n\ntotal files: {}\ntotal terms: {}\nindex size: {:.2}KB\nlast updated: {}",
            stats.total_files,
            stats.total_terms,
            stats.index_size_bytes as f64 / 1024.0,
            last_updated,
        ))
    }

    async fn tool_find_similar(&self, args: &Value) -> Result<String, RpcError> {
        let file_path = require_str(args, "filePath")?.to_string();
        let limit = args
            .get("limit")
            .and_then(|l| l.as_u64())
            .unwrap_or(5) as usize;

        let root = self.root.clone();
        let display_path = file_path.clone();
        let results =
            run_blocking(move || Searcher::new(&root).find_similar_files(&file_path, limit))
                .await?;

        let mut text = format!(
            "Files similar to \"{}\" ({}):\n\n",
            display_path,
            results.len()
        );
        for (i, result) in results.iter().enumerate() {
            text.push_str(&format!(
                "{}. **{}** (similarity: {:.4})\n   extension: {}, size: {} bytes\n\n",
                i + 1,
                result.path,
                result.score,
                result.extension,
                result.size,
            ));
        }
        Ok(text)
    }

    async fn tool_reindex(&self, args: &Value) -> Result<String, RpcError> {
        let force = args
            .get("force")
            .and_then(|f| f.as_bool())
            .unwrap_or(false);

        let root = self.root.clone();
        let summary = run_blocking(move || Indexer::new(&root).index(force)).await?;

        Ok(format!(
            "Indexing complete:\n\ntotal files: {}\nindexed files: {}\nremoved files: {}\ntotal terms: {}",
            summary.total_files, summary.indexed_files, summary.removed_files, summary.total_terms,
        ))
    }
}

/// Run a blocking engine operation off the async loop, mapping both domain
/// errors and join failures to a structured JSON-RPC error.
async fn run_blocking<T, E, F>(f: F) -> Result<T, RpcError>
where
    T: Send + 'static,
    E: std::fmt::Display + Send + 'static,
    F: FnOnce() -> Result<T, E> + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(RpcError::new(INTERNAL_ERROR, e.to_string())),
        Err(e) => {
            tracing::error!(error = %e, "Tool task panicked");
            Err(RpcError::new(INTERNAL_ERROR, "Internal error"))
        }
    }
}

fn require_str<'a>(args: &'a Value, field: &str) -> Result<&'a str, RpcError> {
    args.get(field)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| RpcError::new(INVALID_PARAMS, format!("'{field}' is required")))
}

fn error_response(id: Value, error: &RpcError) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": error.code, "message": error.message }
    })
}

/// The fixed tool catalog advertised by `tools/list`.
fn tool_catalog() -> Value {
    json!({
        "tools": [
            {
                "name": "search-local",
                "description": "Search indexed local files for text.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "query": { "type": "string", "description": "Text to search for" },
                        "limit": { "type": "integer", "description": "Maximum number of results (default: 10)", "default": 10 }
                    },
                    "required": ["query"]
                }
            },
            {
                "name": "search-in-file",
                "description": "Search for text within one specific indexed file.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "filePath": { "type": "string", "description": "Path of the file to search" },
                        "query": { "type": "string", "description": "Text to search for" }
                    },
                    "required": ["filePath", "query"]
                }
            },
            {
                "name": "get-index-stats",
                "description": "Report statistics about the current index.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "random_string": { "type": "string", "description": "Dummy parameter for no-parameter tools" }
                    },
                    "required": ["random_string"]
                }
            },
            {
                "name": "find-similar-files",
                "description": "Find files similar to a given file.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "filePath": { "type": "string", "description": "Reference file path" },
                        "limit": { "type": "integer", "description": "Maximum number of results (default: 5)", "default": 5 }
                    },
                    "required": ["filePath"]
                }
            },
            {
                "name": "reindex",
                "description": "Rebuild the file index.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "force": { "type": "boolean", "description": "Reindex even unchanged files (default: false)", "default": false }
                    }
                }
            }
        ]
    })
}
