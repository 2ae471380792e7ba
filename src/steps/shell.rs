//! Shell step - converge a host with plain shell commands
//!
//! Commands run on the target through the run context's command
//! dispatch, so the same step works locally and over SSH.

use anyhow::{Context, Result, bail};
use declarative::{Diff, Explanation, ExplainContext, RunContext, Step, StepId, StepStatus};

/// A step driven by shell commands
///
/// State is determined by `check` (exit 0 means satisfied) or, failing
/// that, by comparing the output of `state` with `desired`. With neither,
/// the step's state is unknown and apply always runs.
#[derive(Debug, Clone)]
pub struct ShellStep {
    pub id: StepId,
    pub description: Option<String>,
    pub depends_on: Vec<StepId>,
    pub layer: String,
    pub check: Option<String>,
    /// Prints the current state, shown as the old side of the diff
    pub state: Option<String>,
    /// Expected output of `state`
    pub desired: Option<String>,
    pub apply: String,
    pub rollback: Option<String>,
}

impl ShellStep {
    /// A step in its provider's layer
    pub fn new(id: StepId, apply: impl Into<String>) -> Self {
        Self {
            layer: id.provider().to_string(),
            id,
            description: None,
            depends_on: Vec::new(),
            check: None,
            state: None,
            desired: None,
            apply: apply.into(),
            rollback: None,
        }
    }

    pub fn with_check(mut self, check: impl Into<String>) -> Self {
        self.check = Some(check.into());
        self
    }

    pub fn with_state(mut self, state: impl Into<String>, desired: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self.desired = Some(desired.into());
        self
    }

    pub fn with_rollback(mut self, rollback: impl Into<String>) -> Self {
        self.rollback = Some(rollback.into());
        self
    }

    pub fn depending_on(mut self, dep: StepId) -> Self {
        self.depends_on.push(dep);
        self
    }

    /// Run a command, failing on a non-zero exit
    fn run(ctx: &RunContext, command: &str) -> Result<String> {
        let output = ctx.require_remote()?.run(command)?;
        if !output.success {
            let stderr = output.stderr_str();
            let reason = stderr.trim();
            let code = output
                .code
                .map_or_else(|| "signal".to_string(), |c| c.to_string());
            if reason.is_empty() {
                bail!("`{command}` exited with {code}");
            }
            bail!("`{command}` exited with {code}: {reason}");
        }
        Ok(output.stdout_str())
    }

    fn current_state(&self, ctx: &RunContext) -> Result<Option<String>> {
        let Some(state) = &self.state else {
            return Ok(None);
        };
        let current = Self::run(ctx, state).context("Failed to read current state")?;
        Ok(Some(current.trim_end().to_string()))
    }
}

impl Step for ShellStep {
    fn id(&self) -> StepId {
        self.id.clone()
    }

    fn depends_on(&self) -> Vec<StepId> {
        self.depends_on.clone()
    }

    fn description(&self) -> String {
        self.description
            .clone()
            .unwrap_or_else(|| self.id.to_string())
    }

    fn check(&self, ctx: &RunContext) -> Result<StepStatus> {
        if let Some(check) = &self.check {
            let satisfied = ctx.require_remote()?.run_status(check)?;
            log::debug!("{}: `{check}` -> {satisfied}", self.id);
            return Ok(if satisfied {
                StepStatus::Satisfied
            } else {
                StepStatus::NeedsApply
            });
        }

        match (self.current_state(ctx)?, &self.desired) {
            (Some(current), Some(desired)) if current == desired.trim_end() => {
                Ok(StepStatus::Satisfied)
            }
            (Some(_), Some(_)) => Ok(StepStatus::NeedsApply),
            _ => Ok(StepStatus::Unknown),
        }
    }

    fn plan(&self, ctx: &RunContext) -> Result<Diff> {
        let resource = self.id.resource();
        let new = self.desired.as_deref().unwrap_or(&self.apply);

        match self.current_state(ctx)? {
            Some(current) if !current.is_empty() => {
                Ok(Diff::modify(&self.layer, resource, current, new))
            }
            _ => Ok(Diff::add(&self.layer, resource, new)),
        }
    }

    fn apply(&self, ctx: &RunContext) -> Result<()> {
        Self::run(ctx, &self.apply).with_context(|| format!("Failed to apply {}", self.id))?;
        Ok(())
    }

    fn rollback(&self, ctx: &RunContext) -> Result<()> {
        let Some(rollback) = &self.rollback else {
            bail!("rollback not supported");
        };
        Self::run(ctx, rollback).with_context(|| format!("Failed to roll back {}", self.id))?;
        Ok(())
    }

    fn explain(&self, ctx: &ExplainContext) -> Explanation {
        let mut explanation = Explanation::new(self.description());

        if let Some(check) = &self.check {
            explanation = explanation.with_detail(format!("check: {check}"));
        }
        if let Some(state) = &self.state {
            explanation = explanation.with_detail(format!("state: {state}"));
        }
        if ctx.verbose
            && let Some(desired) = &self.desired
        {
            explanation = explanation.with_detail(format!("desired: {desired}"));
        }
        explanation = explanation.with_detail(format!("apply: {}", self.apply));
        if let Some(rollback) = &self.rollback {
            explanation = explanation.with_detail(format!("rollback: {rollback}"));
        }
        if !self.depends_on.is_empty() {
            let deps: Vec<&str> = self.depends_on.iter().map(StepId::as_str).collect();
            explanation = explanation.with_detail(format!("after: {}", deps.join(", ")));
        }
        explanation
    }
}
