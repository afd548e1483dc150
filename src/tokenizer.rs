//! Text tokenization shared by indexing and query processing.
//!
//! Both call sites must use identical normalization and stemming so that the
//! index vocabulary and the query vocabulary match exactly. Document
//! tokenization keeps duplicate tokens (frequency matters); query
//! tokenization deduplicates while preserving first-seen order.

use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use std::collections::HashSet;
use std::sync::LazyLock;

/// Latin-script word tokens: runs of word characters.
static WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9_]+").expect("valid regex"));

/// Maximal runs of 2+ Hangul syllables. Word-boundary tokenization does not
/// segment Hangul usefully, so these are extracted as a separate stream.
static HANGUL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[가-힣]{2,}").expect("valid regex"));

/// Characters stripped from every token before length filtering.
static STRIP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_가-힣]").expect("valid regex"));

/// Tokens that are purely ASCII-alphabetic get stemmed; everything else
/// (Hangul, digits, underscores) is left as-is.
static ALPHA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z]+$").expect("valid regex"));

static STEMMER: LazyLock<Stemmer> = LazyLock::new(|| Stemmer::create(Algorithm::English));

/// Tokenize text for document indexing. Duplicates are kept.
pub fn tokenize_document(text: &str) -> Vec<String> {
    let normalized = text.to_lowercase();
    let normalized = normalized.trim();

    let mut tokens: Vec<String> = Vec::new();
    for m in WORD_RE.find_iter(normalized) {
        tokens.push(m.as_str().to_string());
    }
    for m in HANGUL_RE.find_iter(normalized) {
        tokens.push(m.as_str().to_string());
    }

    tokens
        .into_iter()
        .map(|t| STRIP_RE.replace_all(&t, "").into_owned())
        .filter(|t| t.chars().count() > 1)
        .map(|t| {
            if ALPHA_RE.is_match(&t) {
                STEMMER.stem(&t).into_owned()
            } else {
                t
            }
        })
        .collect()
}

/// Tokenize a search query. Same normalization as documents, but each term
/// appears at most once (a term only needs to be scored once per query).
pub fn tokenize_query(query: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    tokenize_document(query)
        .into_iter()
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_is_deterministic() {
        let text = "The quick brown fox jumps over the lazy dog, 한국어 문서 포함";
        assert_eq!(tokenize_document(text), tokenize_document(text));
        assert_eq!(tokenize_query(text), tokenize_query(text));
    }

    #[test]
    fn test_latin_tokens_are_stemmed() {
        let tokens = tokenize_document("Hello World");
        assert_eq!(tokens.len(), 2);
        // Stemming is applied to purely alphabetic tokens
        assert_eq!(tokenize_document("running runs"), vec!["run", "run"]);
    }

    #[test]
    fn test_hangul_runs_extracted_unstemmed() {
        let tokens = tokenize_document("한국어테스트");
        assert_eq!(tokens, vec!["한국어테스트"]);
    }

    #[test]
    fn test_mixed_scripts() {
        let tokens = tokenize_document("검색 engine 테스트");
        assert!(tokens.contains(&"engin".to_string()));
        assert!(tokens.contains(&"검색".to_string()));
        assert!(tokens.contains(&"테스트".to_string()));
    }

    #[test]
    fn test_short_tokens_dropped() {
        // Single characters are dropped after stripping
        let tokens = tokenize_document("a I x yz");
        assert_eq!(tokens, vec!["yz"]);
    }

    #[test]
    fn test_single_hangul_syllable_not_tokenized() {
        assert!(tokenize_document("한").is_empty());
    }

    #[test]
    fn test_special_characters_stripped() {
        let tokens = tokenize_document("hello, world! (testing)");
        assert_eq!(tokens, vec!["hello", "world", "test"]);
    }

    #[test]
    fn test_query_deduplicates_preserving_order() {
        let tokens = tokenize_query("banana apple banana apple cherry");
        assert_eq!(tokens, vec!["banana", "appl", "cherri"]);
    }

    #[test]
    fn test_document_keeps_duplicates() {
        let tokens = tokenize_document("apple banana apple");
        assert_eq!(tokens, vec!["appl", "banana", "appl"]);
    }

    #[test]
    fn test_index_and_query_vocabularies_match() {
        let doc_tokens = tokenize_document("Searching searched searches");
        let query_tokens = tokenize_query("searching");
        assert!(doc_tokens.contains(&query_tokens[0]));
    }
}
