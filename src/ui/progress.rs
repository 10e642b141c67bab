use crate::pipeline::Stage;
use crate::ui::icons::{BOOK, CHECK, CLOCK, CROSS, FOLDER, PEN, SPARKLE, WARN};
use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::path::Path;
use std::time::Duration;

/// Terminal UI for a pipeline run, rendered via `indicatif` progress bars.
///
/// Three bars are stacked vertically:
/// - Stage bar: how many of the fixed stages have completed
/// - Step spinner: what the current stage is doing right now
/// - Chapter bar: drafted chapters, shown once drafting starts
///
/// All output goes through the `MultiProgress` so log lines never tear the
/// bars.
pub struct PipelineUI {
    multi: MultiProgress,
    stage_bar: ProgressBar,
    step_bar: ProgressBar,
    chapter_bar: ProgressBar,
    verbose: bool,
}

impl PipelineUI {
    /// Create the UI and add all three bars to the multiplex renderer.
    pub fn new(total_stages: u64, verbose: bool) -> Self {
        Self::with_target(MultiProgress::new(), total_stages, verbose)
    }

    /// A UI that draws nothing; used by tests and non-interactive runs.
    pub fn hidden() -> Self {
        Self::with_target(
            MultiProgress::with_draw_target(ProgressDrawTarget::hidden()),
            Stage::ALL.len() as u64,
            false,
        )
    }

    fn with_target(multi: MultiProgress, total_stages: u64, verbose: bool) -> Self {
        let stage_style = ProgressStyle::default_bar()
            .template("{prefix:.bold.dim} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .expect("progress bar template is a valid static string")
            .progress_chars("█▓▒░");

        let stage_bar = multi.add(ProgressBar::new(total_stages));
        stage_bar.set_style(stage_style);
        stage_bar.set_prefix("  Stages");

        let step_style = ProgressStyle::default_spinner()
            .template("{prefix:.bold.dim} {spinner} {msg}")
            .expect("progress bar template is a valid static string");

        let step_bar = multi.add(ProgressBar::new_spinner());
        step_bar.set_style(step_style);
        step_bar.set_prefix("    Step");

        let chapter_style = ProgressStyle::default_bar()
            .template("{msg}")
            .expect("progress bar template is a valid static string");
        let chapter_bar = multi.add(ProgressBar::new(0));
        chapter_bar.set_style(chapter_style);

        Self {
            multi,
            stage_bar,
            step_bar,
            chapter_bar,
            verbose,
        }
    }

    /// Print a line via `MultiProgress`, falling back to `eprintln!` if the
    /// rich UI fails.
    fn print_line(&self, msg: impl AsRef<str>) {
        if self.multi.println(msg.as_ref()).is_err() {
            eprintln!("{}", msg.as_ref());
        }
    }

    fn print_separator(&self) {
        self.print_line(format!("{}", style("═".repeat(70)).cyan()));
    }

    /// Print the header block for a stage and point the stage bar at it.
    pub fn start_stage(&self, stage: Stage) {
        self.print_line("");
        self.print_separator();
        self.print_line(format!(
            "{} Stage {}/{}: {}",
            style("▶").green().bold(),
            style(stage.ordinal()).yellow().bold(),
            Stage::ALL.len(),
            stage.title()
        ));
        self.print_separator();
        self.stage_bar
            .set_message(format!("{}", style(stage.title()).yellow()));
        self.step_bar.enable_steady_tick(Duration::from_millis(100));
    }

    /// Update the step spinner. In verbose mode the step is also printed.
    pub fn log_step(&self, msg: &str) {
        self.step_bar.set_message(msg.to_string());
        if self.verbose {
            self.print_line(format!("    {} {}", style("→").dim(), style(msg).dim()));
        }
    }

    /// A recoverable problem worth showing even outside verbose mode.
    pub fn show_warning(&self, msg: &str) {
        self.print_line(format!("    {} {}", WARN, style(msg).yellow()));
    }

    /// Show that an approval request is pending.
    pub fn show_waiting(&self, what: &str, timeout: Duration) {
        self.step_bar.set_message(format!(
            "{} waiting for approval of {} {}",
            CLOCK,
            what,
            style(format!("(up to {}m)", timeout.as_secs() / 60)).dim()
        ));
    }

    /// Advance the stage bar and print a completion line.
    pub fn stage_complete(&self, stage: Stage) {
        self.stage_bar.inc(1);
        self.step_bar.set_message("");
        self.print_line(format!(
            "{} {} complete",
            CHECK,
            style(stage.title()).green().bold()
        ));
    }

    /// Print a stage-failure banner without advancing the stage bar.
    pub fn stage_failed(&self, stage: Stage, reason: &str) {
        self.step_bar.finish_and_clear();
        self.print_line(format!(
            "\n{} {} failed: {}\n",
            CROSS,
            style(stage.title()).red().bold(),
            reason
        ));
    }

    /// Switch the chapter line to a sized progress bar.
    pub fn start_chapters(&self, total: u64) {
        let chapter_style = ProgressStyle::default_bar()
            .template("{prefix:.bold.dim} [{bar:40.green/white}] {pos}/{len} {msg}")
            .expect("progress bar template is a valid static string")
            .progress_chars("█▓▒░");
        self.chapter_bar.set_style(chapter_style);
        self.chapter_bar.set_prefix("Chapters");
        self.chapter_bar.set_length(total);
        self.chapter_bar.set_position(0);
    }

    /// Show the step a chapter is in (drafting, enriching, polishing).
    pub fn chapter_step(&self, number: u32, title: &str, step: &str) {
        self.chapter_bar.set_message(format!(
            "{} {} {}",
            PEN,
            style(format!("Chapter {}: {}", number, title)).cyan(),
            style(format!("({})", step)).dim()
        ));
        self.log_step(&format!("chapter {}: {}", number, step));
    }

    pub fn chapter_done(&self, number: u32, words: usize, target: usize) {
        self.chapter_bar.inc(1);
        self.print_line(format!(
            "    {} Chapter {} {}",
            CHECK,
            style(number).green(),
            style(format!("{}/{} words", words, target)).dim()
        ));
    }

    pub fn chapter_failed(&self, number: u32, reason: &str) {
        self.chapter_bar.inc(1);
        self.print_line(format!(
            "    {} Chapter {}: {}",
            CROSS,
            style(number).red(),
            reason
        ));
    }

    pub fn finish_chapters(&self) {
        self.chapter_bar.finish_with_message("done");
    }

    /// Final banner after the manuscript is written.
    pub fn print_summary(&self, title: &str, chapters: usize, words: usize, run_dir: &Path) {
        self.stage_bar.finish_with_message("done");
        self.step_bar.finish_and_clear();
        self.print_line("");
        self.print_line(format!(
            "{} {} {}",
            SPARKLE,
            style("Novel complete:").green().bold(),
            style(title).bold()
        ));
        self.print_line(format!(
            "  {} {} chapters, {} words",
            BOOK,
            style(chapters).cyan(),
            style(words).cyan()
        ));
        self.print_line(format!("  {} {}", FOLDER, run_dir.display()));
    }
}
