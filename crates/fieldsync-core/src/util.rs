//! Small helpers shared by the store, write path, and remote client.

/// Longest response body excerpt kept in a queue entry's `last_error`.
const ERROR_EXCERPT_CHARS: usize = 180;

/// Trim optional user text, treating blank input as absent.
pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

/// Trim an API base URL and strip trailing slashes.
///
/// Returns `None` unless the result is a non-empty `http://` or `https://` URL.
pub fn normalize_base_url(raw: &str) -> Option<String> {
    let base = raw.trim().trim_end_matches('/');
    let has_scheme = base.starts_with("http://") || base.starts_with("https://");
    (has_scheme && !base.contains(char::is_whitespace)).then(|| base.to_string())
}

/// Bounded excerpt of a remote response body for error messages.
pub fn error_excerpt(body: &str) -> String {
    body.trim().chars().take(ERROR_EXCERPT_CHARS).collect()
}

/// Current client clock time in Unix milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
