//! Shared utility functions

/// Truncate a string to at most `max_len` bytes, appending "..." if truncated.
/// Cuts on a char boundary so multi-byte text never splits.
pub fn truncate_str(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let suffix = "...";
    let end = floor_char_boundary(s, max_len.saturating_sub(suffix.len()));
    format!("{}{}", &s[..end], suffix)
}

/// Borrow the first `max_chars` characters of `s`.
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

fn floor_char_boundary(s: &str, mut idx: usize) -> usize {
    if idx >= s.len() {
        return s.len();
    }
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}
