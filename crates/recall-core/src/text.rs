//! Token estimation and UTF-8–safe truncation.
//!
//! Budgets are checked with [`estimate_tokens`] everywhere; using one
//! estimator keeps the episodic block, importer counts, and message
//! token counts comparable.

/// Cheap token estimate: bytes / 4.
#[inline]
pub fn estimate_tokens(s: &str) -> usize {
    s.len() / 4
}

/// Truncate to at most `max_bytes` bytes without splitting a character.
pub fn truncate_str(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Truncate to at most `max_chars` characters, appending `…` when cut.
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        None => s.to_owned(),
        Some((idx, _)) => format!("{}…", &s[..idx]),
    }
}

/// Replace every run of newlines (and surrounding whitespace) with a single space.
pub fn collapse_newlines(s: &str) -> String {
    s.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// First sentence of `s`: up to and including the first `.`, `!` or `?`
/// followed by whitespace (or end of text). Falls back to the first line.
pub fn first_sentence(s: &str) -> &str {
    let s = s.trim();
    let mut chars = s.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            match chars.peek() {
                None => return s,
                Some((_, next)) if next.is_whitespace() => return &s[..i + c.len_utf8()],
                _ => {}
            }
        }
        if c == '\n' {
            return s[..i].trim_end();
        }
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_is_len_over_four() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens(&"x".repeat(4001)), 1000);
    }

    #[test]
    fn truncate_str_snaps_to_boundary() {
        let s = "ab—cd";
        assert_eq!(truncate_str(s, 3), "ab");
        assert_eq!(truncate_str(s, 5), "ab—");
        assert_eq!(truncate_str(s, 50), s);
    }

    #[test]
    fn truncate_chars_counts_runes() {
        assert_eq!(truncate_chars("héllo", 10), "héllo");
        assert_eq!(truncate_chars("héllo", 2), "hé…");
        assert_eq!(truncate_chars("🦀🦀🦀", 1), "🦀…");
    }

    #[test]
    fn collapse_newlines_joins_lines() {
        assert_eq!(collapse_newlines("a\n\n  b  \nc"), "a b c");
        assert_eq!(collapse_newlines("single"), "single");
    }

    #[test]
    fn first_sentence_variants() {
        assert_eq!(first_sentence("Fixed the bug. Then lunch."), "Fixed the bug.");
        assert_eq!(first_sentence("Version 1.2 shipped! Yay"), "Version 1.2 shipped!");
        assert_eq!(first_sentence("no terminator"), "no terminator");
        assert_eq!(first_sentence("line one\nline two"), "line one");
    }
}
