/// The fixed stage sequence of a run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Outline,
    Acts,
    ChapterOutlines,
    Drafting,
    FlowCheck,
    ManuscriptCheck,
    Finalize,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Stage::Outline,
        Stage::Acts,
        Stage::ChapterOutlines,
        Stage::Drafting,
        Stage::FlowCheck,
        Stage::ManuscriptCheck,
        Stage::Finalize,
    ];

    /// Identifier used in the state log.
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Outline => "outline",
            Stage::Acts => "acts",
            Stage::ChapterOutlines => "chapter_outlines",
            Stage::Drafting => "drafting",
            Stage::FlowCheck => "flow_check",
            Stage::ManuscriptCheck => "manuscript_check",
            Stage::Finalize => "finalize",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Stage::Outline => "Outline",
            Stage::Acts => "Act breakdown",
            Stage::ChapterOutlines => "Chapter outlines",
            Stage::Drafting => "Drafting and polish",
            Stage::FlowCheck => "Cross-chapter flow check",
            Stage::ManuscriptCheck => "Whole-manuscript check",
            Stage::Finalize => "Finalize",
        }
    }

    /// 1-based position in the sequence.
    pub fn ordinal(&self) -> usize {
        Stage::ALL
            .iter()
            .position(|s| s == self)
            .map_or(0, |i| i + 1)
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for Stage {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .into_iter()
            .find(|stage| stage.name() == s)
            .ok_or_else(|| anyhow::anyhow!("Unknown stage '{}'", s))
    }
}

// Artifact names inside the run directory.
pub const OUTLINE_ARTIFACT: &str = "01_outline";
pub const CHAPTER_OVERVIEW_ARTIFACT: &str = "03_chapter_overview";
pub const REPORT_ARTIFACT: &str = "06_manuscript_report";
pub const MANUSCRIPT_ARTIFACT: &str = "MANUSCRIPT";

pub fn act_artifact(act: u32) -> String {
    format!("02_act_{}", act)
}

pub fn chapter_outline_artifact(chapter: u32) -> String {
    format!("03_chapter_{:02}_outline", chapter)
}

pub fn chapter_artifact(chapter: u32) -> String {
    format!("chapter_{:02}", chapter)
}
