//! Message chunking for length-limited chat channels.

use crate::util::{char_count, truncate_chars};

/// Room kept free in each chunk for the `*Part i/n*` header.
const PART_HEADER_RESERVE: usize = 24;

/// Split `text` into chunks of at most `max_chars` characters.
///
/// Paragraphs (`\n\n`) are packed greedily; a paragraph that alone exceeds
/// the budget is cut at character boundaries. With more than one chunk each
/// is prefixed with `*Part i/n*`.
pub fn chunk_message(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    if char_count(text) <= max_chars {
        return vec![text.to_string()];
    }

    let budget = max_chars.saturating_sub(PART_HEADER_RESERVE).max(1);
    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();

    for paragraph in text.split("\n\n").filter(|p| !p.trim().is_empty()) {
        for piece in hard_split(paragraph, budget) {
            let joined = if current.is_empty() {
                char_count(piece)
            } else {
                char_count(&current) + 2 + char_count(piece)
            };
            if joined <= budget {
                if !current.is_empty() {
                    current.push_str("\n\n");
                }
                current.push_str(piece);
            } else {
                if !current.is_empty() {
                    chunks.push(std::mem::take(&mut current));
                }
                current.push_str(piece);
            }
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }

    let total = chunks.len();
    if total <= 1 {
        return chunks;
    }
    chunks
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| format!("*Part {}/{}*\n\n{}", i + 1, total, chunk))
        .collect()
}

fn hard_split(paragraph: &str, budget: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut rest = paragraph;
    while char_count(rest) > budget {
        let head = truncate_chars(rest, budget);
        pieces.push(head);
        rest = &rest[head.len()..];
    }
    pieces.push(rest);
    pieces
}
