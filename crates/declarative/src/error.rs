//! Structural errors raised while building or ordering a step graph.
//!
//! These are construction-time failures: they abort the operation that
//! raised them and never leave a partial graph or plan behind. Failures of
//! individual steps at apply time are data (see [`crate::StepResult`]).

use crate::step::StepId;
use thiserror::Error;

/// Errors that can occur while building or sorting a [`crate::StepGraph`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// A step identifier is not of the form `provider:action:resource`
    #[error("invalid step id '{id}': {reason}")]
    InvalidStepId {
        /// The rejected identifier
        id: String,
        /// Why it was rejected
        reason: &'static str,
    },

    /// Two steps were declared with the same identifier
    #[error("duplicate step: {id}")]
    DuplicateStep {
        /// The identifier declared twice
        id: StepId,
    },

    /// A step depends on an identifier that was never added
    #[error("step {step} depends on unknown step {dependency}")]
    UnknownDependency {
        /// The step declaring the dependency
        step: StepId,
        /// The missing dependency
        dependency: StepId,
    },

    /// The dependency edges contain a cycle
    #[error("dependency cycle detected: {}", format_cycle(.members))]
    Cycle {
        /// Steps on the cycle, in edge order
        members: Vec<StepId>,
    },
}

fn format_cycle(members: &[StepId]) -> String {
    let mut path: Vec<String> = members.iter().map(ToString::to_string).collect();
    if let Some(first) = members.first() {
        path.push(first.to_string());
    }
    path.join(" -> ")
}

/// Result type for graph operations.
pub type Result<T> = std::result::Result<T, GraphError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_message_closes_the_loop() {
        let err = GraphError::Cycle {
            members: vec![
                StepId::parse("pkg:install:a").unwrap(),
                StepId::parse("pkg:install:b").unwrap(),
            ],
        };
        assert_eq!(
            err.to_string(),
            "dependency cycle detected: pkg:install:a -> pkg:install:b -> pkg:install:a"
        );
    }

    #[test]
    fn test_unknown_dependency_names_both_steps() {
        let err = GraphError::UnknownDependency {
            step: StepId::parse("file:write:motd").unwrap(),
            dependency: StepId::parse("pkg:install:figlet").unwrap(),
        };
        let msg = err.to_string();
        assert!(msg.contains("file:write:motd"));
        assert!(msg.contains("pkg:install:figlet"));
    }
}
