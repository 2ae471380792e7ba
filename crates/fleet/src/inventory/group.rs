//! Host groups

use super::host::{GroupName, HostId};
use crate::glob::Glob;
use serde::Serialize;

/// A named set of hosts
///
/// Membership comes from hosts declaring the group, from `patterns`
/// matching host ids, and from inheritance: a member of a group is also a
/// member of every group it inherits from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Group {
    pub name: GroupName,
    pub description: Option<String>,
    /// Host-id globs whose matches belong to this group
    #[serde(serialize_with = "serialize_globs")]
    pub patterns: Vec<Glob>,
    /// Policy names attached to members
    pub policies: Vec<String>,
    /// Parent groups
    pub inherit: Vec<GroupName>,
}

impl Group {
    pub fn new(name: GroupName) -> Self {
        Self {
            name,
            description: None,
            patterns: Vec::new(),
            policies: Vec::new(),
            inherit: Vec::new(),
        }
    }

    pub fn with_pattern(mut self, pattern: Glob) -> Self {
        self.patterns.push(pattern);
        self
    }

    pub fn with_policy(mut self, policy: impl Into<String>) -> Self {
        self.policies.push(policy.into());
        self
    }

    pub fn inheriting(mut self, parent: GroupName) -> Self {
        self.inherit.push(parent);
        self
    }

    /// Whether any pattern matches the host id
    pub fn matches_pattern(&self, host: &HostId) -> bool {
        self.patterns.iter().any(|p| p.is_match(host.as_str()))
    }
}

fn serialize_globs<S: serde::Serializer>(globs: &[Glob], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(globs.iter().map(Glob::as_str))
}
