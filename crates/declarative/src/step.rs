//! Step trait for declarative state convergence
//!
//! A Step is one unit of desired-state work: it can report whether the
//! machine already satisfies it, describe what it would change, and
//! change it.

use crate::context::{ExplainContext, RunContext};
use crate::diff::Diff;
use crate::error::GraphError;
use crate::types::StepStatus;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Namespaced step identifier: `provider:action:resource`
///
/// The resource segment may itself contain `:` (e.g. `git:config:user:name`
/// has resource `user:name`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StepId(String);

impl StepId {
    /// Parse and validate an identifier
    pub fn parse(raw: &str) -> Result<Self, GraphError> {
        let invalid = |reason| GraphError::InvalidStepId {
            id: raw.to_string(),
            reason,
        };

        if raw.is_empty() {
            return Err(invalid("identifier is empty"));
        }
        if raw.chars().any(char::is_whitespace) {
            return Err(invalid("identifier contains whitespace"));
        }

        let mut parts = raw.splitn(3, ':');
        let provider = parts.next().unwrap_or_default();
        let action = parts.next().ok_or_else(|| invalid("missing action segment"))?;
        let resource = parts
            .next()
            .ok_or_else(|| invalid("missing resource segment"))?;

        if provider.is_empty() || action.is_empty() || resource.is_empty() {
            return Err(invalid("segments must not be empty"));
        }

        Ok(Self(raw.to_string()))
    }

    /// Build an identifier from its three segments
    pub fn new(provider: &str, action: &str, resource: &str) -> Result<Self, GraphError> {
        Self::parse(&format!("{provider}:{action}:{resource}"))
    }

    /// Provider segment (e.g. "brew", "file", "shell")
    pub fn provider(&self) -> &str {
        self.segments().0
    }

    /// Action segment (e.g. "install", "write")
    pub fn action(&self) -> &str {
        self.segments().1
    }

    /// Resource segment (everything after the second `:`)
    pub fn resource(&self) -> &str {
        self.segments().2
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn segments(&self) -> (&str, &str, &str) {
        let mut parts = self.0.splitn(3, ':');
        // Validated on construction: all three segments exist.
        (
            parts.next().unwrap_or_default(),
            parts.next().unwrap_or_default(),
            parts.next().unwrap_or_default(),
        )
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for StepId {
    type Error = GraphError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<StepId> for String {
    fn from(id: StepId) -> Self {
        id.0
    }
}

/// Read-only description of a step, for diagnostics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Explanation {
    /// One-line summary of what the step manages
    pub summary: String,
    /// Additional detail lines (commands run, files touched, ...)
    pub details: Vec<String>,
}

impl Explanation {
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            details: Vec::new(),
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.details.push(detail.into());
        self
    }
}

/// Core trait for declarative steps
///
/// Every provider (package manager, file writer, remote shell, ...)
/// implements this trait. The engine only ever talks to steps through it.
///
/// Steps are shared across hosts during a fleet run, so they hold no
/// per-host state: everything host-specific arrives through the context.
///
/// # Example
///
/// ```ignore
/// use declarative::{Diff, Explanation, ExplainContext, RunContext, Step, StepId, StepStatus};
///
/// #[derive(Debug)]
/// struct Motd { text: String }
///
/// impl Step for Motd {
///     fn id(&self) -> StepId {
///         StepId::parse("file:write:motd").unwrap()
///     }
///
///     fn check(&self, _ctx: &RunContext) -> anyhow::Result<StepStatus> {
///         let current = std::fs::read_to_string("/etc/motd").unwrap_or_default();
///         Ok(if current == self.text { StepStatus::Satisfied } else { StepStatus::NeedsApply })
///     }
///
///     fn plan(&self, _ctx: &RunContext) -> anyhow::Result<Diff> {
///         Ok(Diff::modify("file", "/etc/motd", "", self.text.clone()))
///     }
///
///     fn apply(&self, _ctx: &RunContext) -> anyhow::Result<()> {
///         std::fs::write("/etc/motd", &self.text)?;
///         Ok(())
///     }
///
///     fn explain(&self, _ctx: &ExplainContext) -> Explanation {
///         Explanation::new("Write /etc/motd")
///     }
/// }
/// ```
pub trait Step: Send + Sync + fmt::Debug {
    /// Unique identifier for this step
    fn id(&self) -> StepId;

    /// Steps that must converge before this one
    fn depends_on(&self) -> Vec<StepId> {
        Vec::new()
    }

    /// Human-readable description
    fn description(&self) -> String {
        self.id().to_string()
    }

    /// Detect whether the desired state already holds
    fn check(&self, ctx: &RunContext) -> Result<StepStatus>;

    /// Describe what apply would change
    ///
    /// Only called when check did not report `Satisfied`. Must not
    /// change anything.
    fn plan(&self, ctx: &RunContext) -> Result<Diff>;

    /// Converge toward the desired state
    fn apply(&self, ctx: &RunContext) -> Result<()>;

    /// Undo a previous apply, best effort
    ///
    /// Only used by [`crate::FailurePolicy::Rollback`].
    fn rollback(&self, _ctx: &RunContext) -> Result<()> {
        anyhow::bail!("rollback not supported by {}", self.id())
    }

    /// Read-only diagnostic description
    fn explain(&self, ctx: &ExplainContext) -> Explanation;
}

/// A step shared between hosts and plans
pub type SharedStep = Arc<dyn Step>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_segments() {
        let id = StepId::parse("brew:install:ripgrep").unwrap();
        assert_eq!(id.provider(), "brew");
        assert_eq!(id.action(), "install");
        assert_eq!(id.resource(), "ripgrep");
    }

    #[test]
    fn test_resource_may_contain_colons() {
        let id = StepId::parse("git:config:user:email").unwrap();
        assert_eq!(id.resource(), "user:email");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(StepId::parse("").is_err());
        assert!(StepId::parse("brew").is_err());
        assert!(StepId::parse("brew:install").is_err());
        assert!(StepId::parse("brew::ripgrep").is_err());
        assert!(StepId::parse("brew:install:rip grep").is_err());
    }

    #[test]
    fn test_new_matches_parse() {
        assert_eq!(
            StepId::new("file", "write", "/etc/motd").unwrap(),
            StepId::parse("file:write:/etc/motd").unwrap()
        );
    }

    #[test]
    fn test_serde_as_string() {
        let id = StepId::parse("vscode:install:rust-analyzer").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"vscode:install:rust-analyzer\"");

        let back: StepId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
        assert!(serde_json::from_str::<StepId>("\"nope\"").is_err());
    }
}
