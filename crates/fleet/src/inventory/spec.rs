//! Inventory input value objects
//!
//! These mirror the inventory file shape but carry no file format of
//! their own: callers deserialize them from whatever source they like
//! and hand them to [`super::Inventory::from_spec`].

use super::host::HostStatus;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Whole-inventory input
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventorySpec {
    #[serde(default)]
    pub defaults: InventoryDefaults,
    /// Hosts keyed by host id
    #[serde(default)]
    pub hosts: BTreeMap<String, HostSpec>,
    /// Groups keyed by group name
    #[serde(default)]
    pub groups: BTreeMap<String, GroupSpec>,
}

/// Connection defaults applied to hosts that don't override them
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryDefaults {
    pub user: Option<String>,
    pub port: Option<u16>,
    pub ssh_key: Option<String>,
    /// Connection timeout in seconds
    pub ssh_timeout: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostSpec {
    /// Network address; defaults to the host id
    pub hostname: Option<String>,
    pub user: Option<String>,
    pub port: Option<u16>,
    pub ssh_key: Option<String>,
    pub proxy_jump: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub status: HostStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSpec {
    pub description: Option<String>,
    /// Host-id globs
    #[serde(default, alias = "hosts")]
    pub patterns: Vec<String>,
    #[serde(default)]
    pub policies: Vec<String>,
    #[serde(default)]
    pub inherit: Vec<String>,
}
