//! Descriptive diffs produced by step planning
//!
//! A Diff records what a step would change. It is never executed.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Kind of change a step would make
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffKind {
    Add,
    Modify,
    Remove,
    NoOp,
}

impl fmt::Display for DiffKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Self::Add => "+",
            Self::Modify => "~",
            Self::Remove => "-",
            Self::NoOp => "=",
        };
        f.write_str(symbol)
    }
}

/// What a step would change, without changing it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diff {
    pub kind: DiffKind,
    /// Layer the change belongs to (e.g. "packages", "files", "shell")
    pub layer: String,
    /// Resource being changed (package name, path, ...)
    pub resource: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new: Option<String>,
}

impl Diff {
    pub fn add(layer: impl Into<String>, resource: impl Into<String>, new: impl Into<String>) -> Self {
        Self {
            kind: DiffKind::Add,
            layer: layer.into(),
            resource: resource.into(),
            old: None,
            new: Some(new.into()),
        }
    }

    pub fn modify(
        layer: impl Into<String>,
        resource: impl Into<String>,
        old: impl Into<String>,
        new: impl Into<String>,
    ) -> Self {
        Self {
            kind: DiffKind::Modify,
            layer: layer.into(),
            resource: resource.into(),
            old: Some(old.into()),
            new: Some(new.into()),
        }
    }

    pub fn remove(layer: impl Into<String>, resource: impl Into<String>, old: impl Into<String>) -> Self {
        Self {
            kind: DiffKind::Remove,
            layer: layer.into(),
            resource: resource.into(),
            old: Some(old.into()),
            new: None,
        }
    }

    pub fn noop(layer: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            kind: DiffKind::NoOp,
            layer: layer.into(),
            resource: resource.into(),
            old: None,
            new: None,
        }
    }

    /// Check if this diff describes an actual change
    pub fn has_changes(&self) -> bool {
        !matches!(self.kind, DiffKind::NoOp)
    }
}

impl fmt::Display for Diff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/{}", self.kind, self.layer, self.resource)
    }
}

/// Diff summary statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSummary {
    pub additions: usize,
    pub modifications: usize,
    pub removals: usize,
    pub unchanged: usize,
}

impl DiffSummary {
    /// Create a summary from a list of diffs
    pub fn from_diffs<'a>(diffs: impl IntoIterator<Item = &'a Diff>) -> Self {
        let mut summary = Self::default();
        for diff in diffs {
            match diff.kind {
                DiffKind::Add => summary.additions += 1,
                DiffKind::Modify => summary.modifications += 1,
                DiffKind::Remove => summary.removals += 1,
                DiffKind::NoOp => summary.unchanged += 1,
            }
        }
        summary
    }

    /// Total number of changes
    pub fn total(&self) -> usize {
        self.additions + self.modifications + self.removals
    }

    /// Check if there are any changes
    pub fn has_changes(&self) -> bool {
        self.total() > 0
    }
}

/// Group diffs by layer, in layer name order
pub fn group_by_layer<'a>(diffs: impl IntoIterator<Item = &'a Diff>) -> BTreeMap<&'a str, Vec<&'a Diff>> {
    let mut groups: BTreeMap<&str, Vec<&Diff>> = BTreeMap::new();
    for diff in diffs {
        groups.entry(diff.layer.as_str()).or_default().push(diff);
    }
    groups
}
