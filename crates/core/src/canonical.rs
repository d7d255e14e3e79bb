//! URL canonicalization for cache keys and policy lookup.
//!
//! Two spellings of the same page must land on the same cache entry, so every
//! URL entering the engine passes through [`canonicalize`] first.

/// Error type for URL canonicalization failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("URL has no host: {0}")]
    MissingHost(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Canonicalize a URL string.
///
/// 1. Trim surrounding whitespace
/// 2. Default the scheme to `https://`
/// 3. Lowercase the host
/// 4. Drop the fragment
///
/// The query string is kept as-is.
pub fn canonicalize(input: &str) -> Result<url::Url, UrlError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let url_str = if trimmed.contains("://") { trimmed.to_string() } else { format!("https://{trimmed}") };
    let mut parsed = url::Url::parse(&url_str).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_string())),
    }

    let host = parsed
        .host_str()
        .filter(|h| !h.is_empty())
        .map(str::to_lowercase)
        .ok_or_else(|| UrlError::MissingHost(trimmed.to_string()))?;
    parsed
        .set_host(Some(&host))
        .map_err(|e| UrlError::InvalidUrl(e.to_string()))?;

    parsed.set_fragment(None);

    Ok(parsed)
}

/// Host of an already stored URL string, lowercased.
///
/// Returns `None` for strings that do not parse; stores use this when
/// filtering entries by domain pattern.
pub fn host_of(url: &str) -> Option<String> {
    url::Url::parse(url).ok()?.host_str().map(str::to_lowercase)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonicalize_default_scheme() {
        let url = canonicalize("example.com").unwrap();
        assert_eq!(url.as_str(), "https://example.com/");
    }

    #[test]
    fn test_canonicalize_same_key_for_variants() {
        let a = canonicalize("  https://EXAMPLE.com#top ").unwrap();
        let b = canonicalize("example.com").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_canonicalize_preserve_query_and_port() {
        let url = canonicalize("http://example.com:8080/a?b=2&a=1").unwrap();
        assert_eq!(url.port(), Some(8080));
        assert_eq!(url.query(), Some("b=2&a=1"));
    }

    #[test]
    fn test_canonicalize_unsupported_scheme() {
        let result = canonicalize("file:///etc/passwd");
        assert!(matches!(result, Err(UrlError::UnsupportedScheme(_))));
    }

    #[test]
    fn test_canonicalize_empty() {
        assert!(matches!(canonicalize("   "), Err(UrlError::Empty)));
    }

    #[test]
    fn test_host_of() {
        assert_eq!(host_of("https://news.example.com/a"), Some("news.example.com".to_string()));
        assert_eq!(host_of("not a url"), None);
    }
}
