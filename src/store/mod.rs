//! Versioned artifact store.
//!
//! Every artifact lives under the run directory as a "current" file
//! (`<name>.md`) plus immutable numbered revisions (`<name>_v03.md`).
//! Saving a revision always repoints the current file; revisions are never
//! overwritten or deleted.

pub mod state;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::errors::PipelineError;
use crate::util::{char_count, word_count};

pub use state::{StageStatus, StateEntry, StateLog};

const EXTENSION: &str = "md";

/// Metadata for one saved artifact.
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactRecord {
    pub name: String,
    pub revision: Option<u32>,
    /// The revision file when a revision was given, else the current file
    pub path: PathBuf,
    pub current_path: PathBuf,
    pub words: usize,
    pub chars: usize,
    pub created_at: DateTime<Utc>,
}

pub struct ArtifactStore {
    run_dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(run_dir: impl Into<PathBuf>) -> Self {
        Self {
            run_dir: run_dir.into(),
        }
    }

    pub fn current_path(&self, name: &str) -> PathBuf {
        self.run_dir.join(format!("{}.{}", name, EXTENSION))
    }

    pub fn revision_path(&self, name: &str, revision: u32) -> PathBuf {
        self.run_dir
            .join(format!("{}_v{:02}.{}", name, revision, EXTENSION))
    }

    /// Persist `content` for `name`.
    ///
    /// With a revision number, an immutable revision file is created first;
    /// an existing revision is never replaced. The current file is then
    /// rewritten unconditionally. Any I/O failure is fatal to the caller.
    pub fn save(
        &self,
        name: &str,
        revision: Option<u32>,
        content: &str,
    ) -> Result<ArtifactRecord, PipelineError> {
        fs::create_dir_all(&self.run_dir).map_err(|source| PipelineError::ArtifactWrite {
            path: self.run_dir.clone(),
            source,
        })?;

        let current_path = self.current_path(name);
        let path = match revision {
            Some(rev) => {
                let rev_path = self.revision_path(name, rev);
                write_new(&rev_path, content)?;
                rev_path
            }
            None => current_path.clone(),
        };
        replace(&current_path, content)?;

        tracing::debug!(artifact = name, ?revision, path = %path.display(), "Saved artifact");

        Ok(ArtifactRecord {
            name: name.to_string(),
            revision,
            path,
            current_path,
            words: word_count(content),
            chars: char_count(content),
            created_at: Utc::now(),
        })
    }

    /// Save as the next free revision of `name`.
    pub fn save_next(&self, name: &str, content: &str) -> Result<ArtifactRecord, PipelineError> {
        let next = self.revisions(name).last().map_or(1, |last| last + 1);
        self.save(name, Some(next), content)
    }

    pub fn read_current(&self, name: &str) -> std::io::Result<String> {
        fs::read_to_string(self.current_path(name))
    }

    pub fn read_revision(&self, name: &str, revision: u32) -> std::io::Result<String> {
        fs::read_to_string(self.revision_path(name, revision))
    }

    /// Revision numbers saved for `name`, ascending.
    pub fn revisions(&self, name: &str) -> Vec<u32> {
        let prefix = format!("{}_v", name);
        let suffix = format!(".{}", EXTENSION);
        let Ok(entries) = fs::read_dir(&self.run_dir) else {
            return Vec::new();
        };

        let mut revisions: Vec<u32> = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let file_name = e.file_name().to_string_lossy().to_string();
                file_name
                    .strip_prefix(&prefix)?
                    .strip_suffix(&suffix)?
                    .parse()
                    .ok()
            })
            .collect();
        revisions.sort_unstable();
        revisions
    }

    /// Number of artifact files (current and revisions) in the run directory.
    pub fn artifact_count(&self) -> usize {
        fs::read_dir(&self.run_dir)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .filter(|e| e.path().extension().is_some_and(|ext| ext == EXTENSION))
                    .count()
            })
            .unwrap_or(0)
    }
}

fn write_new(path: &Path, content: &str) -> Result<(), PipelineError> {
    let to_err = |source| PipelineError::ArtifactWrite {
        path: path.to_path_buf(),
        source,
    };
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(to_err)?;
    file.write_all(content.as_bytes()).map_err(to_err)?;
    file.sync_all().map_err(to_err)
}

/// Write through a sibling temp file and rename so readers never observe a
/// half-written current file.
fn replace(path: &Path, content: &str) -> Result<(), PipelineError> {
    let tmp = path.with_extension(format!("{}.tmp", EXTENSION));
    fs::write(&tmp, content).map_err(|source| PipelineError::ArtifactWrite {
        path: tmp.clone(),
        source,
    })?;
    fs::rename(&tmp, path).map_err(|source| PipelineError::ArtifactWrite {
        path: path.to_path_buf(),
        source,
    })
}
