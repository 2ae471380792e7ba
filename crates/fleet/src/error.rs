//! Error types for fleet operations.
//!
//! Everything here is structural: raised while loading an inventory,
//! compiling a selector, or validating a run, and fatal to that operation.
//! Per-host failures during a run are recorded on
//! [`crate::HostResult`] instead.

use thiserror::Error;

/// Errors raised while building an [`crate::Inventory`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InventoryError {
    /// Host identifier failed validation
    #[error("invalid host id '{id}': {reason}")]
    InvalidHostId {
        /// The rejected identifier
        id: String,
        /// Why it was rejected
        reason: &'static str,
    },

    /// Tag failed validation
    #[error("invalid tag '{tag}': {reason}")]
    InvalidTag {
        /// The rejected tag
        tag: String,
        /// Why it was rejected
        reason: &'static str,
    },

    /// Group name failed validation
    #[error("invalid group name '{name}': {reason}")]
    InvalidGroupName {
        /// The rejected name
        name: String,
        /// Why it was rejected
        reason: &'static str,
    },

    /// Two hosts share an identifier
    #[error("duplicate host: {id}")]
    DuplicateHost {
        /// The repeated identifier
        id: String,
    },

    /// Two groups share a name
    #[error("duplicate group: {name}")]
    DuplicateGroup {
        /// The repeated name
        name: String,
    },

    /// A group inherits from a group that does not exist
    #[error("group {group} inherits from unknown group {parent}")]
    UnknownParentGroup {
        /// The inheriting group
        group: String,
        /// The missing parent
        parent: String,
    },

    /// Group inheritance loops back on itself
    #[error("group inheritance cycle: {}", .members.join(" -> "))]
    InheritanceCycle {
        /// Groups on the cycle, closing back on the first
        members: Vec<String>,
    },

    /// A group host pattern is not a valid glob
    #[error("group {group} has invalid host pattern: {source}")]
    InvalidPattern {
        /// The group owning the pattern
        group: String,
        /// The glob error
        #[source]
        source: GlobError,
    },
}

/// A shell-style glob that could not be compiled.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid glob '{pattern}': {reason}")]
pub struct GlobError {
    /// The rejected pattern
    pub pattern: String,
    /// Why it was rejected
    pub reason: String,
}

/// Errors raised while compiling a target selector.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectorError {
    /// The whole expression is empty
    #[error("selector is empty")]
    Empty,

    /// A comma-separated token is empty after trimming
    #[error("selector token {position} is empty")]
    EmptyToken {
        /// 1-indexed token position
        position: usize,
    },

    /// A glob token does not compile
    #[error("selector token '{token}': {source}")]
    InvalidGlob {
        /// The offending token
        token: String,
        /// The glob error
        #[source]
        source: GlobError,
    },

    /// A group, tag, or host name in the token is not a valid identifier
    #[error("selector token '{token}': {source}")]
    InvalidIdentifier {
        /// The offending token
        token: String,
        /// The validation error
        #[source]
        source: InventoryError,
    },
}

/// Errors that abort a fleet run before any host is contacted.
#[derive(Debug, Error)]
pub enum FleetError {
    /// Steps do not form a valid graph
    #[error(transparent)]
    Graph(#[from] declarative::GraphError),

    /// Executor configuration is unusable
    #[error("invalid fleet configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for inventory operations.
pub type Result<T> = std::result::Result<T, InventoryError>;
