//! Multi-format text extraction.
//!
//! The indexing core consumes this module through two entry points only:
//! [`supports_extension`] and [`extract`]. Format-specific parsing stays
//! behind that boundary so the engine never depends on the individual
//! document crates.

use crate::error::ExtractError;
use calamine::{Data, Reader as SheetReader, open_workbook_auto};
use quick_xml::Reader;
use quick_xml::events::Event;
use std::fs;
use std::io::Read;
use std::path::Path;

/// Extensions the extractor declares support for, with leading dot.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    ".txt", ".md", ".json", ".js", ".ts", ".html", ".css", ".xml", ".csv", ".doc", ".docx",
    ".pdf", ".xls", ".xlsx", ".pptx",
];

/// Lowercased extension of a path including the leading dot, or an empty
/// string when the file has none.
pub fn file_extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_lowercase()))
        .unwrap_or_default()
}

pub fn supports_extension(ext: &str) -> bool {
    SUPPORTED_EXTENSIONS.contains(&ext)
}

/// Extract raw text from a file. Fails with [`ExtractError`] on malformed or
/// unreadable content; the caller decides whether that is fatal.
pub fn extract(path: &Path) -> Result<String, ExtractError> {
    match file_extension(path).as_str() {
        ".txt" | ".md" | ".json" | ".js" | ".ts" | ".html" | ".css" | ".xml" | ".csv" => {
            read_plain_text(path)
        }
        ".doc" | ".docx" => extract_word(path),
        ".pdf" => extract_pdf(path),
        ".xls" | ".xlsx" => extract_spreadsheet(path),
        ".pptx" => extract_slides(path),
        // Unknown extensions fall back to a plain-text attempt; the error
        // propagates and the file is skipped if that fails too.
        _ => read_plain_text(path),
    }
}

fn read_plain_text(path: &Path) -> Result<String, ExtractError> {
    fs::read_to_string(path).map_err(|source| ExtractError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn extract_pdf(path: &Path) -> Result<String, ExtractError> {
    pdf_extract::extract_text(path).map_err(|e| ExtractError::Pdf {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Word documents are OOXML archives; the text lives in `<w:t>` runs of
/// `word/document.xml`.
fn extract_word(path: &Path) -> Result<String, ExtractError> {
    let mut archive = open_archive(path)?;
    let xml = read_archive_entry(&mut archive, path, "word/document.xml")?;
    let runs = collect_text_runs(&xml, b"w:t").map_err(|reason| ExtractError::Xml {
        path: path.to_path_buf(),
        reason,
    })?;
    Ok(runs.join(" "))
}

/// Spreadsheets are flattened to one row per line, each sheet prefixed by
/// `Sheet: <name>`.
fn extract_spreadsheet(path: &Path) -> Result<String, ExtractError> {
    let mut workbook = open_workbook_auto(path).map_err(|e| ExtractError::Spreadsheet {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let mut out = String::new();
    for name in workbook.sheet_names().to_owned() {
        let range: calamine::Range<Data> =
            workbook
                .worksheet_range(&name)
                .map_err(|e| ExtractError::Spreadsheet {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })?;

        out.push_str(&format!("Sheet: {name}\n"));
        for row in range.rows() {
            let cells: Vec<String> = row.iter().map(|c| c.to_string()).collect();
            out.push_str(&cells.join(","));
            out.push('\n');
        }
        out.push('\n');
    }
    Ok(out)
}

/// Presentation decks keep one XML part per slide; all `<a:t>` runs of a
/// slide are concatenated, slides separated by a blank line.
fn extract_slides(path: &Path) -> Result<String, ExtractError> {
    let mut archive = open_archive(path)?;

    let mut slide_names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with("ppt/slides/slide") && n.ends_with(".xml"))
        .map(String::from)
        .collect();
    slide_names.sort();

    let mut out = String::new();
    for name in slide_names {
        let xml = read_archive_entry(&mut archive, path, &name)?;
        match collect_text_runs(&xml, b"a:t") {
            Ok(runs) if !runs.is_empty() => {
                out.push_str(&runs.join(" "));
                out.push_str("\n\n");
            }
            Ok(_) => {}
            Err(reason) => {
                // A single broken slide does not fail the whole deck
                tracing::warn!(slide = %name, %reason, "Failed to parse slide XML");
            }
        }
    }
    Ok(out)
}

fn open_archive(path: &Path) -> Result<zip::ZipArchive<fs::File>, ExtractError> {
    let file = fs::File::open(path).map_err(|source| ExtractError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    zip::ZipArchive::new(file).map_err(|e| ExtractError::Archive {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn read_archive_entry(
    archive: &mut zip::ZipArchive<fs::File>,
    path: &Path,
    name: &str,
) -> Result<String, ExtractError> {
    let mut entry = archive.by_name(name).map_err(|e| ExtractError::Archive {
        path: path.to_path_buf(),
        reason: format!("missing entry '{name}': {e}"),
    })?;
    let mut xml = String::new();
    entry
        .read_to_string(&mut xml)
        .map_err(|source| ExtractError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(xml)
}

/// Collect the character content of every element with the given qualified
/// name (e.g. `w:t`, `a:t`).
fn collect_text_runs(xml: &str, tag: &[u8]) -> Result<Vec<String>, String> {
    let mut reader = Reader::from_str(xml);
    let mut runs = Vec::new();
    let mut in_run = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.name().as_ref() == tag => in_run = true,
            Ok(Event::End(e)) if e.name().as_ref() == tag => in_run = false,
            Ok(Event::Text(t)) if in_run => {
                let text = t.unescape().map_err(|e| e.to_string())?;
                if !text.is_empty() {
                    runs.push(text.into_owned());
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(e.to_string()),
        }
    }
    Ok(runs)
}
