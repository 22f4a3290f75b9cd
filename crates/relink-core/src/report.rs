//! Per-artifact outcome collection.

use std::fmt;
use std::path::PathBuf;

use crate::binary::Edit;

/// Step of the relocation pass that produced an outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    /// Dependency reference rewriting over the staging directory.
    References,
    /// Search-path provisioning with the given token.
    SearchPath(String),
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::References => f.write_str("references"),
            Phase::SearchPath(token) => write!(f, "rpath {}", token),
        }
    }
}

/// Result of processing one artifact in one phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Edits were applied.
    Changed(Vec<Edit>),
    /// Nothing to do.
    Unchanged,
    /// Inspection or mutation failed; carries the error message.
    Failed(String),
}

/// One report line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactReport {
    /// Binary that was processed (or the directory, for listing failures).
    pub path: PathBuf,
    /// Phase that produced this entry.
    pub phase: Phase,
    /// What happened.
    pub outcome: Outcome,
}

/// Aggregated outcomes of a relocation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelinkReport {
    /// Entries in processing order.
    pub entries: Vec<ArtifactReport>,
}

impl RelinkReport {
    /// Creates an empty report.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry.
    pub fn push(&mut self, path: impl Into<PathBuf>, phase: Phase, outcome: Outcome) {
        self.entries.push(ArtifactReport {
            path: path.into(),
            phase,
            outcome,
        });
    }

    /// Appends all entries of `other`.
    pub fn merge(&mut self, other: RelinkReport) {
        self.entries.extend(other.entries);
    }

    /// Number of entries that applied edits.
    pub fn changed(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Changed(_)))
    }

    /// Number of entries that needed nothing.
    pub fn unchanged(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Unchanged))
    }

    /// Number of failed entries.
    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Failed(_)))
    }

    /// True if any artifact may remain unfixed.
    pub fn has_failures(&self) -> bool {
        self.failed() > 0
    }

    /// Total number of edits applied.
    pub fn edit_count(&self) -> usize {
        self.entries
            .iter()
            .map(|e| match &e.outcome {
                Outcome::Changed(edits) => edits.len(),
                _ => 0,
            })
            .sum()
    }

    /// Failed entries only.
    pub fn failures(&self) -> impl Iterator<Item = &ArtifactReport> {
        self.entries
            .iter()
            .filter(|e| matches!(e.outcome, Outcome::Failed(_)))
    }

    fn count(&self, pred: impl Fn(&Outcome) -> bool) -> usize {
        self.entries.iter().filter(|e| pred(&e.outcome)).count()
    }
}
