//! Request URL normalization.
//!
//! Every intercepted request is normalized before rule matching and before it
//! is used as a store key, so `HTTPS://Example.com/a#top` and
//! `https://example.com/a` share one entry.

/// Error type for URL normalization failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

impl From<UrlError> for intercache_core::Error {
    fn from(err: UrlError) -> Self {
        intercache_core::Error::InvalidUrl(err.to_string())
    }
}

/// Normalize a request URL into its absolute, cache-key form.
///
/// Normalization steps:
/// 1. Trim leading/trailing whitespace
/// 2. Default scheme to https:// if missing
/// 3. Lowercase the host (default ports are dropped by the parser)
/// 4. Remove fragment (#...) and an empty trailing `?`
/// 5. Keep query string intact (do not reorder)
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

    if let Some(host) = parsed.host_str().map(str::to_lowercase) {
        parsed
            .set_host(Some(&host))
            .map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
    }

    parsed.set_fragment(None);
    if parsed.query() == Some("") {
        parsed.set_query(None);
    }

    Ok(parsed)
}

/// Normalized URL as a store key string.
pub fn request_key(input: &str) -> Result<String, UrlError> {
    canonicalize(input).map(String::from)
}
