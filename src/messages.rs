//! Locale-aware message catalog for user-facing CLI strings.
//!
//! Pure presentation: lookup is keyed, unknown keys fall back to the key
//! itself, and `{placeholder}` segments are substituted literally.

/// Locales with a catalog; everything else falls back to English.
const SUPPORTED_LOCALES: &[&str] = &["ko", "en", "ja", "zh"];

#[derive(Debug, Clone)]
pub struct Messages {
    locale: String,
}

impl Messages {
    /// Detect the locale from the environment: `MCP_LANG` first, then the
    /// usual POSIX variables, defaulting to English.
    pub fn from_env() -> Self {
        let locale = ["MCP_LANG", "LANGUAGE", "LC_ALL", "LC_MESSAGES", "LANG"]
            .iter()
            .find_map(|var| std::env::var(var).ok().filter(|v| !v.is_empty()))
            .map(|v| normalize_locale(&v))
            .unwrap_or_else(|| "en".to_string());
        Self { locale }
    }

    pub fn with_locale(locale: &str) -> Self {
        Self {
            locale: normalize_locale(locale),
        }
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    /// Look up a message. Unknown keys return the key itself.
    pub fn get(&self, key: &str) -> String {
        lookup(&self.locale, key)
            .or_else(|| lookup("en", key))
            .unwrap_or(key)
            .to_string()
    }

    /// Look up a message and substitute `{name}` placeholders.
    pub fn format(&self, key: &str, args: &[(&str, &str)]) -> String {
        let mut message = self.get(key);
        for (name, value) in args {
            message = message.replace(&format!("{{{name}}}"), value);
        }
        message
    }
}

/// Normalize `ko_KR.UTF-8` to `ko`, `en-US` to `en`; unsupported languages
/// default to English.
fn normalize_locale(locale: &str) -> String {
    let base = locale
        .to_lowercase()
        .split(['_', '-', '.'])
        .next()
        .unwrap_or("en")
        .to_string();
    if SUPPORTED_LOCALES.contains(&base.as_str()) {
        base
    } else {
        "en".to_string()
    }
}

fn lookup(locale: &str, key: &str) -> Option<&'static str> {
    match locale {
        "ko" => match key {
            "indexing.start" => Some("인덱스가 없어 자동 인덱싱을 시작합니다..."),
            "indexing.complete" => Some("인덱싱이 완료되었습니다."),
            "search.no_results" => Some("검색 결과가 없습니다."),
            "search.results" => Some("검색 결과 ({count}개):"),
            "search.score" => Some("점수: {score}"),
            "search.content" => Some("내용: {content}"),
            "error.index_not_found" => Some("인덱스 파일을 찾을 수 없습니다."),
            "error.indexing" => Some("인덱싱 중 오류: {error}"),
            "error.search" => Some("검색 중 오류: {error}"),
            _ => None,
        },
        _ => match key {
            "indexing.start" => Some("No index found, starting automatic indexing..."),
            "indexing.complete" => Some("Indexing complete."),
            "search.no_results" => Some("No results found."),
            "search.results" => Some("Search results ({count}):"),
            "search.score" => Some("score: {score}"),
            "search.content" => Some("content: {content}"),
            "error.index_not_found" => Some("Index file not found."),
            "error.indexing" => Some("Indexing error: {error}"),
            "error.search" => Some("Search error: {error}"),
            _ => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_key_returns_key_itself() {
        let messages = Messages::with_locale("en");
        assert_eq!(messages.get("no.such.key"), "no.such.key");
    }

    #[test]
    fn test_locale_normalization() {
        assert_eq!(normalize_locale("ko_KR.UTF-8"), "ko");
        assert_eq!(normalize_locale("en-US"), "en");
        assert_eq!(normalize_locale("fr_FR"), "en");
    }

    #[test]
    fn test_placeholder_substitution() {
        let messages = Messages::with_locale("en");
        assert_eq!(
            messages.format("search.results", &[("count", "3")]),
            "Search results (3):"
        );
    }

    #[test]
    fn test_unsupported_locale_falls_back_to_english() {
        let messages = Messages::with_locale("ja");
        // Japanese is accepted but has no catalog yet, so English is used
        assert_eq!(messages.get("indexing.complete"), "Indexing complete.");
    }

    #[test]
    fn test_korean_catalog() {
        let messages = Messages::with_locale("ko");
        assert_eq!(messages.get("indexing.complete"), "인덱싱이 완료되었습니다.");
    }
}
