use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::PathBuf;

/// Lifecycle of a stage as recorded in the state log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Started,
    Completed,
    Failed,
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageStatus::Started => write!(f, "started"),
            StageStatus::Completed => write!(f, "completed"),
            StageStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for StageStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "started" => Ok(StageStatus::Started),
            "completed" => Ok(StageStatus::Completed),
            "failed" => Ok(StageStatus::Failed),
            _ => anyhow::bail!("Unknown stage status '{}'", s),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateEntry {
    pub stage: String,
    pub status: StageStatus,
    pub timestamp: DateTime<Utc>,
}

/// Append-only `stage|status|timestamp` log of stage transitions.
pub struct StateLog {
    state_file: PathBuf,
}

impl StateLog {
    pub fn new(state_file: PathBuf) -> Self {
        Self { state_file }
    }

    pub fn record(&self, stage: &str, status: StageStatus) -> Result<()> {
        let entry = format!("{}|{}|{}\n", stage, status, Utc::now().to_rfc3339());

        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.state_file)
            .context("Failed to open state file")?
            .write_all(entry.as_bytes())
            .context("Failed to write state entry")?;

        Ok(())
    }

    /// All parseable entries in file order. Malformed lines are skipped.
    pub fn entries(&self) -> Result<Vec<StateEntry>> {
        if !self.state_file.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&self.state_file).context("Failed to read state file")?;

        Ok(content
            .lines()
            .filter_map(|line| {
                let parts: Vec<&str> = line.split('|').collect();
                if parts.len() != 3 {
                    return None;
                }
                Some(StateEntry {
                    stage: parts[0].to_string(),
                    status: parts[1].parse().ok()?,
                    timestamp: DateTime::parse_from_rfc3339(parts[2])
                        .ok()?
                        .with_timezone(&Utc),
                })
            })
            .collect())
    }

    /// Stage of the most recent entry.
    pub fn current_stage(&self) -> Option<String> {
        self.entries().ok()?.pop().map(|e| e.stage)
    }

    pub fn last_completed(&self) -> Option<String> {
        self.entries()
            .ok()?
            .into_iter()
            .rfind(|e| e.status == StageStatus::Completed)
            .map(|e| e.stage)
    }

    pub fn has_failure(&self) -> bool {
        self.entries()
            .map(|entries| entries.iter().any(|e| e.status == StageStatus::Failed))
            .unwrap_or(false)
    }
}
