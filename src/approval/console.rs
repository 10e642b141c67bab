//! Terminal fallback when no chat channel is configured.

use anyhow::Result;
use dialoguer::{Input, Select, theme::ColorfulTheme};

use super::ApprovalOutcome;
use crate::util::truncate_chars;

const PREVIEW_CHARS: usize = 1500;

/// Show a preview of the request and ask accept / reject-with-feedback.
/// Blocks on stdin; run it on a blocking thread.
pub fn prompt_decision(message: &str) -> Result<ApprovalOutcome> {
    println!();
    println!("{}", console::style("Approval requested").bold().cyan());
    println!("{}", truncate_chars(message, PREVIEW_CHARS));
    if message.chars().count() > PREVIEW_CHARS {
        println!("{}", console::style("[... preview truncated ...]").dim());
    }

    let options = &["Accept", "Reject with feedback"];
    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Proceed?")
        .items(options)
        .default(0)
        .interact()?;

    match selection {
        0 => Ok(ApprovalOutcome::Accepted),
        _ => {
            let feedback: String = Input::with_theme(&ColorfulTheme::default())
                .with_prompt("Feedback")
                .allow_empty(true)
                .interact_text()?;
            Ok(ApprovalOutcome::Rejected { feedback })
        }
    }
}

/// Ask for the novel's theme, offering `seed` as the default.
pub fn prompt_theme(seed: Option<&str>) -> Result<String> {
    let theme = ColorfulTheme::default();
    let mut input = Input::<String>::with_theme(&theme).with_prompt("Theme");
    if let Some(seed) = seed {
        input = input.default(seed.to_string());
    }
    Ok(input.interact_text()?.trim().to_string())
}
