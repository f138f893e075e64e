/// Returns a prefix of at most `max_chars` characters, respecting UTF-8 boundaries.
pub fn prefix_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Short single-line preview of user text for logs.
pub fn log_preview(s: &str, max_chars: usize) -> String {
    let flat = s.replace(['\n', '\r'], " ");
    let prefix = prefix_chars(&flat, max_chars);
    if prefix.len() < flat.len() {
        format!("{}…", prefix)
    } else {
        flat
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_chars_multibyte() {
        assert_eq!(prefix_chars("héllo", 2), "hé");
        assert_eq!(prefix_chars("ab", 10), "ab");
    }

    #[test]
    fn test_log_preview_flattens_and_truncates() {
        assert_eq!(log_preview("a\nb", 10), "a b");
        assert_eq!(log_preview("abcdef", 3), "abc…");
    }
}
