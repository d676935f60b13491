/// Truncate a string to `max` characters, ending in "..." if truncated.
/// Handles multi-byte (CJK) correctly via char boundary. The result,
/// marker included, never exceeds `max` chars.
pub fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let keep = max.saturating_sub(3);
    let truncated: String = s.chars().take(keep).collect();
    format!("{}...", truncated.trim_end())
}

/// Single-line preview: trimmed, newlines collapsed to spaces, truncated.
pub fn preview(s: &str, max: usize) -> String {
    let flat = s.trim().replace("\r\n", " ").replace('\n', " ");
    truncate_chars(&flat, max)
}

/// First `max` chars, no marker.
pub fn take_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

pub fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
