//! Filename sanitization utilities

/// Characters that are not allowed in filenames on at least one major platform
const INVALID_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Maximum length of a sanitized filename, in characters
const MAX_FILENAME_CHARS: usize = 200;

/// Sanitize a filename for safe filesystem usage
///
/// Replaces each of `<>:"/\|?*` with `_`, strips leading and trailing spaces
/// and dots, and truncates the result to 200 characters. An input that ends
/// up empty becomes `"Unknown"`.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(sanitize_filename("AC/DC - T.N.T."), "AC_DC - T.N.T");
/// assert_eq!(sanitize_filename(" ... "), "Unknown");
/// ```
pub fn sanitize_filename(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| if INVALID_CHARS.contains(&c) { '_' } else { c })
        .collect();

    let trimmed: String = replaced
        .trim_matches(|c| c == ' ' || c == '.')
        .chars()
        .take(MAX_FILENAME_CHARS)
        .collect();

    if trimmed.is_empty() {
        "Unknown".to_string()
    } else {
        trimmed
    }
}
