//! Prompt construction.
//!
//! The genre rules, style guide and critique instruction are opaque text.
//! Built-in defaults can be replaced per project by `prompts/rules.md`,
//! `prompts/style.md` and `prompts/critique.md`.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::chapter::ChapterRecord;
use crate::util::truncate_chars;

pub const PROMPTS_DIR: &str = "prompts";

const OUTLINE_CONTEXT_CHARS: usize = 4000;
const ACT_CONTEXT_CHARS: usize = 2500;
const DRAFT_ACT_CHARS: usize = 2000;
const ENRICH_CHARACTER_CHARS: usize = 1500;
const POLISH_CRITIQUE_INPUT_CHARS: usize = 12000;

const DEFAULT_RULES: &str = "\
GENRE RULES
- Romance with a suspense thread: the love story and the external threat escalate together.
- Single point of view: the heroine, third person past tense.
- The leads start at odds; every step closer must be earned on the page.
- The external threat is concrete and escalates in three visible stages.
- The ending is happy and earned, never handed out.
- Proportions: setup 15%, forced proximity 20%, intimacy 20%, complications 20%, \
separation 10%, crisis and finale 10%, resolution 5%.";

const DEFAULT_STYLE: &str = "\
STYLE
- Show, don't tell. Concrete sensory detail in every scene.
- Dialogue is quick, witty and carries subtext.
- The heroine's thoughts appear in first person, in italics (*like this*).
- Vary sentence length; no run of fragments, no purple prose.
- Modern, natural language without stock phrases.
- Every chapter ends on a hook or an emotional beat.";

const DEFAULT_CRITIQUE: &str = "\
CRITICAL SELF-REVIEW
Do not write what I want to hear. Write what makes sense.
Review the work without mercy:
1. Is this really good, or merely fine?
2. Where are the weak spots?
3. What would an experienced editor object to?
4. Does it follow the required structure exactly?
5. Is the escalation of the suspense thread visible?
6. Would you want to read this?
Be honest. Be critical. Then improve it.";

/// Opaque template text shared by every prompt of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptTemplates {
    pub rules: String,
    pub style: String,
    pub critique: String,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            rules: DEFAULT_RULES.to_string(),
            style: DEFAULT_STYLE.to_string(),
            critique: DEFAULT_CRITIQUE.to_string(),
        }
    }
}

impl PromptTemplates {
    /// Built-in templates with any non-empty override found under
    /// `<project_dir>/prompts/`.
    pub fn load_or_default(project_dir: &Path) -> Self {
        let dir = project_dir.join(PROMPTS_DIR);
        let mut templates = Self::default();
        for (file, slot) in [
            ("rules.md", &mut templates.rules),
            ("style.md", &mut templates.style),
            ("critique.md", &mut templates.critique),
        ] {
            if let Ok(content) = fs::read_to_string(dir.join(file))
                && !content.trim().is_empty()
            {
                debug!(file, "Using prompt override");
                *slot = content.trim().to_string();
            }
        }
        templates
    }

    /// Write these templates under `<project_dir>/prompts/` for editing.
    /// Existing files are left alone; returns the files created.
    pub fn export(&self, project_dir: &Path) -> Result<Vec<PathBuf>> {
        let dir = project_dir.join(PROMPTS_DIR);
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;

        let mut created = Vec::new();
        for (file, content) in [
            ("rules.md", &self.rules),
            ("style.md", &self.style),
            ("critique.md", &self.critique),
        ] {
            let path = dir.join(file);
            if path.exists() {
                continue;
            }
            fs::write(&path, format!("{}\n", content))
                .with_context(|| format!("Failed to write {}", path.display()))?;
            created.push(path);
        }
        Ok(created)
    }

    pub fn outline(&self, theme: &str, feedback: &[String]) -> String {
        format!(
            "{rules}\n\n{style}\n\nSetting: {theme}\n\n\
TASK: Write a DETAILED outline for this novel.\n\n\
The outline MUST contain:\n\n\
## 1. Title\n\
- A working title (gripping, true to the genre)\n\n\
## 2. Main Characters\n\
### Heroine\n\
- Name, age, occupation; outer goal; inner conflict; weakness; strengths; habits and quirks\n\
### Hero\n\
- Name, age, occupation; his secret; why he seems the enemy at first; his vulnerability\n\
### Antagonist\n\
- Name, role, motive; personal connection to the leads; why they are dangerous\n\n\
## 3. Supporting Characters\n\
5-6 people, each with name, age, role, relationship to the leads, archetype, motivation, \
manner of speaking, function in the story and arc.\n\n\
## 4. Structure\n\
For every part of the story: which chapters (numbers!), key scenes, suspense level (1/2/3), \
which supporting characters appear, the emotional beat at the end.\n\n\
## 5. External Conflict\n\
- The concrete threat and its stages of escalation\n\n\
CHECK BEFORE ANSWERING:\n\
- Do the proportions match?\n\
- Does the suspense escalate in parallel to the romance?\n\
- Does every part have a clear climax?{feedback}",
            rules = self.rules,
            style = self.style,
            theme = theme,
            feedback = feedback_block(feedback),
        )
    }

    pub fn act(
        &self,
        outline: &str,
        act: u32,
        description: &str,
        feedback: &[String],
    ) -> String {
        format!(
            "{rules}\n\n{outline_section}\n\n\
TASK: Detailed outline for ACT {act} ({description}).\n\n\
For EVERY chapter in this act:\n\
1. Chapter number and title, as a line `Chapter N: Title`\n\
2. Which part(s) of the structure it covers\n\
3. Suspense level (1/2/3)\n\
4. Key scenes (2-4 per chapter, concrete!)\n\
5. Emotional beat at the end\n\
6. Word count target (about 80,000 words in 18-22 chapters overall){feedback}",
            rules = self.rules,
            outline_section = section("NOVEL OUTLINE", outline, ""),
            act = act,
            description = description,
            feedback = feedback_block(feedback),
        )
    }

    pub fn chapter_outline(
        &self,
        outline: &str,
        characters: &str,
        act_text: &str,
        chapter: &ChapterRecord,
        default_target: usize,
        feedback: &[String],
    ) -> String {
        let n = chapter.number;
        format!(
            "{style}\n\n{context}\n\n{characters}\n\n{act}\n\n\
TASK: DETAILED scene outline for CHAPTER {n}: {title}\n\n\
## Metadata\n\
- Number: {n}\n\
- Title: {title}\n\
- Word count: {target}\n\
- Part of the structure\n\
- Suspense level: [1/2/3]\n\
- Emotional arc: [start] -> [end]\n\n\
## Characters in this chapter\n\
Everyone who appears: name, role in the scene, typical behaviour, how they interact with the leads.\n\n\
## Scenes (3-5)\n\
For each: place (concrete), who is present and what they do, what MUST happen, \
beats (opening, development, turn or hook), dynamics between the characters, key moments, atmosphere.\n\n\
## Connections\n\
- Link to chapter {prev}\n\
- Setup for chapter {next}\n\n\
## Constraints\n\
- What must NOT happen?\n\
- Which behaviour would be out of character?{feedback}",
            style = self.style,
            context = section(
                "NOVEL CONTEXT",
                truncate_chars(outline, OUTLINE_CONTEXT_CHARS),
                ""
            ),
            characters = section("CHARACTERS (keep them consistent)", characters, ""),
            act = section(
                &format!("ACT {} OUTLINE", chapter.act),
                truncate_chars(act_text, ACT_CONTEXT_CHARS),
                ""
            ),
            n = n,
            title = chapter.title,
            target = default_target,
            prev = n.saturating_sub(1),
            next = n + 1,
            feedback = feedback_block(feedback),
        )
    }

    /// Self-critique of a planning artifact; the answer is the full revision.
    pub fn critique(&self, label: &str, text: &str) -> String {
        format!(
            "{critique}\n\nThe current {label}:\n\n{text}\n\n\
TASK:\n\
1. Criticise this {label} without mercy\n\
2. List the concrete weaknesses\n\
3. Then output the COMPLETE revised {label}\n\n\
The revision must be complete, not just the changes.",
            critique = self.critique,
            label = label,
            text = text,
        )
    }

    pub fn draft(
        &self,
        chapter: &ChapterRecord,
        characters: &str,
        act_text: &str,
        previous_tail: &str,
        memory_context: &str,
    ) -> String {
        format!(
            "{style}\n\n{characters}\n\n{act}\n\n{outline}\n\n{previous}\n\n{memory}\n\n\
TASK: Write CHAPTER {n}: {title}\n\n\
RULES:\n\
- About {target} words (plus or minus 10%)\n\
- Follow the scenes and beats of the chapter outline exactly\n\
- Characters behave as their descriptions say\n\
- End on a hook or an emotional beat\n\
- No meta commentary, start directly with the text\n\n\
BEGIN NOW:",
            style = self.style,
            characters = section(
                "CHARACTERS (mind their behaviour)",
                characters,
                "[No character data available]"
            ),
            act = section(
                "ACT OUTLINE (overview)",
                truncate_chars(act_text, DRAFT_ACT_CHARS),
                "[No act outline]"
            ),
            outline = section(
                "CHAPTER OUTLINE (follow exactly)",
                &chapter.outline,
                "[No chapter outline]"
            ),
            previous = section(
                "PREVIOUS CHAPTER (closing passage, for continuity)",
                previous_tail,
                "[First chapter]"
            ),
            memory = section(
                "ADDITIONAL CONTEXT",
                memory_context,
                "[No additional context]"
            ),
            n = chapter.number,
            title = chapter.title,
            target = chapter.target_words,
        )
    }

    pub fn enrich(&self, characters: &str, text: &str, words: usize, target: usize) -> String {
        format!(
            "{style}\n\nCHARACTERS:\n{characters}\n\n\
The text has {words} words, the target is {target}.\n\n\
Do NOT pad it. Deepen it instead with:\n\
- More tension between the characters, true to their personalities\n\
- Another verbal sparring match\n\
- Deeper emotional beats\n\
- A complication\n\n\
CURRENT TEXT:\n{text}\n\n\
Output the COMPLETE enriched text:",
            style = self.style,
            characters = truncate_chars(characters, ENRICH_CHARACTER_CHARS),
            words = words,
            target = target,
            text = text,
        )
    }

    pub fn polish_critique(&self, text: &str) -> String {
        format!(
            "{critique}\n\nCheck this novel text for:\n\
1. Repeated words\n\
2. Sentence fragments or choppy paragraphs\n\
3. Unnatural dialogue\n\
4. Pacing problems\n\
5. Missing sensory detail\n\
6. Out-of-character moments\n\n\
TEXT:\n{text}\n\n\
CONCRETE improvements (as a list):",
            critique = self.critique,
            text = truncate_chars(text, POLISH_CRITIQUE_INPUT_CHARS),
        )
    }

    pub fn polish_rewrite(&self, critique: &str, text: &str) -> String {
        format!(
            "You receive a chapter of a novel and feedback on it.\n\n\
STYLE RULES:\n{style}\n\n\
FEEDBACK:\n{critique}\n\n\
ORIGINAL TEXT:\n{text}\n\n\
TASK: Apply the feedback. Output the COMPLETE revised text.\n\
Start directly with the first sentence of the chapter:",
            style = self.style,
            critique = critique,
            text = text,
        )
    }

    pub fn flow_check(
        &self,
        earlier: u32,
        earlier_end: &str,
        later_start: &str,
        memory_context: &str,
    ) -> String {
        format!(
            "Check the transition between two chapters.\n\n{context}\n\n{end}\n\n{start}\n\n\
Check:\n\
1. Knowledge state (does a character suddenly know something?)\n\
2. Emotional continuity (does the mood fit?)\n\
3. Timeline (how much time has passed?)\n\
4. Facts (names, places, descriptions)\n\
5. Character consistency\n\n\
Answer:\n\
- \"OK\" if everything fits\n\
- Otherwise list the CONCRETE problems",
            context = section(
                "CONTEXT (characters, outline)",
                memory_context,
                "[No context available]"
            ),
            end = section(&format!("END OF CHAPTER {}", earlier), earlier_end, ""),
            start = section(
                &format!("START OF CHAPTER {}", earlier + 1),
                later_start,
                ""
            ),
        )
    }

    pub fn flow_fix(&self, problems: &str, earlier: u32, earlier_end: &str, later: &str) -> String {
        let n = earlier + 1;
        format!(
            "The transition between two chapters has problems.\n\n\
PROBLEMS:\n{problems}\n\n\
END OF CHAPTER {earlier}:\n{earlier_end}\n\n\
CHAPTER {n} (complete):\n{later}\n\n\
TASK: Revise chapter {n} so that it follows on seamlessly.\n\
Fix the problems, keep everything else.\n\n\
{style}\n\n\
COMPLETE CORRECTED CHAPTER:",
            problems = problems,
            earlier = earlier,
            earlier_end = earlier_end,
            n = n,
            later = later,
            style = self.style,
        )
    }

    pub fn manuscript_check(&self, excerpt: &str) -> String {
        format!(
            "Review this novel for:\n\n\
1. CHARACTER CONSISTENCY\n   - Names correct? Traits consistent? What characters know, logical?\n\n\
2. PLOT HOLES\n   - Unanswered questions? Logic errors? Forgotten threads?\n\n\
3. ROMANCE ARC\n   - Believable development? Tension built up? Ending earned?\n\n\
4. SUSPENSE ARC\n   - Visible escalation? Antagonist present? Satisfying finale?\n\n\
5. PACING\n   - Slow stretches? Rushed passages?\n\n\
NOVEL (excerpt):\n{excerpt}\n\n\
DETAILED REPORT with concrete references:",
            excerpt = excerpt,
        )
    }
}

/// Position of `act` within `acts` as a share of the story.
pub fn act_description(act: u32, acts: u32) -> String {
    let acts = acts.max(1);
    let start = (act - 1) * 100 / acts;
    let end = act * 100 / acts;
    let focus = if act == 1 {
        "setup and first collisions"
    } else if act == acts {
        "crisis, finale and resolution"
    } else {
        "rising intimacy and complications"
    };
    format!("{}-{}%: {}", start, end, focus)
}

fn section(title: &str, body: &str, placeholder: &str) -> String {
    const RULE: &str = "===============================================================";
    let body = if body.trim().is_empty() {
        placeholder
    } else {
        body
    };
    format!("{RULE}\n{title}\n{RULE}\n{body}")
}

fn feedback_block(feedback: &[String]) -> String {
    let items: Vec<String> = feedback
        .iter()
        .map(|f| f.trim())
        .filter(|f| !f.is_empty())
        .map(|f| format!("- {}", f))
        .collect();
    if items.is_empty() {
        String::new()
    } else {
        format!(
            "\n\nREVISION REQUESTS FROM THE EDITOR (address all of them):\n{}",
            items.join("\n")
        )
    }
}
