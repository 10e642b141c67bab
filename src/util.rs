//! Text helpers shared by the pipeline and its clients.

/// Whitespace-delimited word count.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// The last `n` words of `text`, joined with single spaces.
pub fn tail_words(text: &str, n: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    let start = words.len().saturating_sub(n);
    words[start..].join(" ")
}

/// Prefix of at most `max_chars` characters, never splitting a code point.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Character count (not bytes).
pub fn char_count(text: &str) -> usize {
    text.chars().count()
}

/// The first third of `text`'s words.
pub fn leading_third_words(text: &str) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    words[..words.len() / 3].join(" ")
}

/// The last third of `text`'s words.
pub fn trailing_third_words(text: &str) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    words[words.len() - words.len() / 3..].join(" ")
}

/// Lowercase ASCII alphanumerics of `theme`, other characters become `_`,
/// capped at `max_chars`.
pub fn sanitize_for_path(theme: &str, max_chars: usize) -> String {
    let cleaned: String = theme
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .take(max_chars)
        .collect();
    let trimmed = cleaned.trim_matches('_');
    if trimmed.is_empty() {
        "untitled".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_count_ignores_extra_whitespace() {
        assert_eq!(word_count("  one two\n\nthree\t"), 3);
        assert_eq!(word_count(""), 0);
    }

    #[test]
    fn test_tail_words() {
        assert_eq!(tail_words("a b c d e", 2), "d e");
        assert_eq!(tail_words("a b", 10), "a b");
        assert_eq!(tail_words("", 3), "");
    }

    #[test]
    fn test_truncate_chars_respects_char_boundaries() {
        assert_eq!(truncate_chars("Grüße", 3), "Grü");
        assert_eq!(truncate_chars("short", 100), "short");
        assert_eq!(truncate_chars("👍👍", 1), "👍");
    }

    #[test]
    fn test_word_thirds() {
        let text = "one two three four five six seven";
        assert_eq!(leading_third_words(text), "one two");
        assert_eq!(trailing_third_words(text), "six seven");
        assert_eq!(leading_third_words("a b"), "");
        assert_eq!(trailing_third_words(""), "");
    }

    #[test]
    fn test_sanitize_for_path() {
        assert_eq!(sanitize_for_path("Love in Paris!", 30), "love_in_paris");
        assert_eq!(sanitize_for_path("???", 30), "untitled");
        assert_eq!(sanitize_for_path("abcdefghij", 4), "abcd");
    }
}
