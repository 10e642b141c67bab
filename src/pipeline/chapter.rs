//! Chapter records and best-effort extraction from generated text.
//!
//! Nothing here ever fails: every extractor has a typed default.

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

use crate::util::{truncate_chars, word_count};

pub const DEFAULT_TITLE: &str = "Untitled";
pub const MANUSCRIPT_SEPARATOR: &str = "\n\n---\n\n";
const SCENE_BREAK: &str = "***";
const CHARACTER_SECTION_CHARS: usize = 2500;
const CHARACTER_FALLBACK_CHARS: usize = 4000;

static CHAPTER_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^[ \t#*>|_\-]*(?:chapter|kapitel)[ \t]+(\d+)\b[ \t]*(?:[:.)\-–—|][ \t]*)?(.*)$")
        .expect("valid chapter heading regex")
});

static TARGET_WORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:target\s+words|word\s*count|wortzahl)\s*[:=]?\s*[*_]*\s*\[?\s*~?\s*(\d{1,3}(?:[.,]\d{3})+|\d+)",
    )
    .expect("valid target words regex")
});

static TITLE_INLINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^[\s#*_]*(?:working\s+title|title|arbeitstitel|titel)[*_]*\s*:\s*(.+)$")
        .expect("valid inline title regex")
});

static TITLE_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^#{1,6}\s*(?:\d+\.?\s*)?(?:working\s+title|title|arbeitstitel|titel)\s*:?\s*$")
        .expect("valid title heading regex")
});

static MARKDOWN_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(#{1,6})\s+(.*)$").expect("valid markdown heading regex"));

static CHARACTER_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:characters|protagonists|cast|charaktere|hauptcharaktere|nebencharaktere|figuren|hauptfiguren|nebenfiguren)\b",
    )
    .expect("valid character heading regex")
});

/// A chapter heading found in act text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterHeading {
    pub number: u32,
    pub title: String,
}

/// One chapter of the run.
#[derive(Debug, Clone, Serialize)]
pub struct ChapterRecord {
    /// Gapless 1..N across the whole novel
    pub number: u32,
    pub title: String,
    pub act: u32,
    pub target_words: usize,
    #[serde(skip)]
    pub outline: String,
    #[serde(skip)]
    pub text: String,
    pub words: usize,
}

impl ChapterRecord {
    pub fn new(number: u32, title: impl Into<String>, act: u32, target_words: usize) -> Self {
        Self {
            number,
            title: title.into(),
            act,
            target_words,
            outline: String::new(),
            text: String::new(),
            words: 0,
        }
    }

    /// Attach the chapter outline and re-derive the target length from it.
    pub fn set_outline(&mut self, outline: String, default_target: usize) {
        self.target_words = extract_target_words(&outline, default_target);
        self.outline = outline;
    }

    /// Replace the current text, normalized for manuscript assembly.
    pub fn set_text(&mut self, text: &str) {
        self.text = normalize_chapter(text);
        self.words = word_count(&self.text);
    }
}

/// Number chapters across all acts, 1..N without gaps.
///
/// Headings are taken from each act's text, deduplicated by their source
/// number; an act without headings gets `fallback_per_act` placeholders.
pub fn plan_chapters(
    acts: &[String],
    fallback_per_act: u32,
    default_target: usize,
) -> Vec<ChapterRecord> {
    let mut chapters = Vec::new();
    let mut next_number = 1u32;

    for (idx, act_text) in acts.iter().enumerate() {
        let act = idx as u32 + 1;
        let headings = extract_chapter_headings(act_text);
        let titles: Vec<Option<String>> = if headings.is_empty() {
            (0..fallback_per_act).map(|_| None).collect()
        } else {
            headings.into_iter().map(|h| Some(h.title)).collect()
        };

        for title in titles {
            let title = title.unwrap_or_else(|| format!("Chapter {}", next_number));
            chapters.push(ChapterRecord::new(next_number, title, act, default_target));
            next_number += 1;
        }
    }
    chapters
}

/// Chapter headings (`Chapter N: Title`, `Kapitel N - Title`) in order of
/// first appearance, one per source number.
pub fn extract_chapter_headings(text: &str) -> Vec<ChapterHeading> {
    let mut seen = std::collections::HashSet::new();
    CHAPTER_HEADING
        .captures_iter(text)
        .filter_map(|caps| {
            let number: u32 = caps.get(1)?.as_str().parse().ok()?;
            if !seen.insert(number) {
                return None;
            }
            let title = clean_title(caps.get(2).map_or("", |m| m.as_str()));
            Some(ChapterHeading {
                number,
                title: if title.is_empty() {
                    format!("Chapter {}", number)
                } else {
                    title
                },
            })
        })
        .collect()
}

/// Target word count from an outline, or `default` when none is stated.
pub fn extract_target_words(outline: &str, default: usize) -> usize {
    TARGET_WORDS
        .captures(outline)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().replace(['.', ','], "").parse::<usize>().ok())
        .filter(|n| *n > 0)
        .unwrap_or(default)
}

/// Working title from the outline, or `"Untitled"`.
pub fn extract_title(outline: &str) -> String {
    if let Some(caps) = TITLE_INLINE.captures(outline) {
        let title = clean_title(caps.get(1).map_or("", |m| m.as_str()));
        if !title.is_empty() {
            return title;
        }
    }

    let mut lines = outline.lines();
    while let Some(line) = lines.next() {
        if TITLE_HEADING.is_match(line.trim())
            && let Some(next) = lines.by_ref().find(|l| !l.trim().is_empty())
        {
            let title = clean_title(next);
            if !title.is_empty() {
                return title;
            }
        }
    }

    DEFAULT_TITLE.to_string()
}

/// Character sections of the outline (main, supporting, ...), each capped.
/// Falls back to a prefix of the outline when no such section exists.
pub fn extract_character_sections(outline: &str) -> String {
    let lines: Vec<&str> = outline.lines().collect();
    let headings: Vec<(usize, usize)> = lines
        .iter()
        .enumerate()
        .filter_map(|(i, line)| {
            MARKDOWN_HEADING
                .captures(line.trim_start())
                .map(|caps| (i, caps[1].len()))
        })
        .collect();

    let mut sections = Vec::new();
    let mut covered_until = 0;
    for (pos, &(start, level)) in headings.iter().enumerate() {
        if start < covered_until || !CHARACTER_HEADING.is_match(lines[start]) {
            continue;
        }
        let end = headings[pos + 1..]
            .iter()
            .find(|(_, l)| *l <= level)
            .map_or(lines.len(), |(i, _)| *i);
        let section = lines[start..end].join("\n");
        sections.push(truncate_chars(section.trim(), CHARACTER_SECTION_CHARS).to_string());
        covered_until = end;
    }

    if sections.is_empty() {
        truncate_chars(outline, CHARACTER_FALLBACK_CHARS).to_string()
    } else {
        sections.join("\n\n")
    }
}

/// Up to `limit` chapter headings of `text`, one per line.
pub fn heading_list(text: &str, limit: usize) -> String {
    extract_chapter_headings(text)
        .into_iter()
        .take(limit)
        .map(|h| format!("  {}: {}", h.number, truncate_chars(&h.title, 40)))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Trim the chapter and turn any bare `---` line into a scene break so the
/// text can never contain the manuscript separator.
pub fn normalize_chapter(text: &str) -> String {
    text.trim()
        .lines()
        .map(|line| if line.trim() == "---" { SCENE_BREAK } else { line })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn join_manuscript<S: AsRef<str>>(chapters: &[S]) -> String {
    chapters
        .iter()
        .map(|c| c.as_ref())
        .collect::<Vec<_>>()
        .join(MANUSCRIPT_SEPARATOR)
}

pub fn split_manuscript(manuscript: &str) -> Vec<String> {
    if manuscript.is_empty() {
        return Vec::new();
    }
    manuscript
        .split(MANUSCRIPT_SEPARATOR)
        .map(str::to_string)
        .collect()
}

fn clean_title(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c: char| {
            c.is_whitespace() || matches!(c, '*' | '_' | '#' | '"' | '\'' | '|' | '“' | '”' | '„')
        })
        .to_string()
}
