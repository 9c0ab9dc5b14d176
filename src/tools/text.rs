/// Cut `text` to at most `max_chars` characters, appending `…` when anything
/// was dropped. Counts chars, not bytes, so multi-byte text never splits.
pub fn truncate_with_ellipsis(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}…", &text[..byte_idx]),
        None => text.to_string(),
    }
}

/// Short one-off preview for log lines.
pub fn log_preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}... (truncated)", &text[..byte_idx]),
        None => text.to_string(),
    }
}
