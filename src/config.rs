use anyhow::{Context, Result};
use declarative::{SharedStep, StepId};
use fleet::{Inventory, InventorySpec};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::steps::ShellStep;

/// Get the config directory path
pub fn config_dir() -> Result<PathBuf> {
    let dir = dirs::config_dir().context("Could not determine config directory")?;
    Ok(dir.join("muster"))
}

/// Inventory file: the explicit path, or `inventory.toml` in the config dir
pub fn inventory_path(explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(expand(path)),
        None => Ok(config_dir()?.join("inventory.toml")),
    }
}

/// Step file: the explicit path, or `steps.toml` in the config dir
pub fn steps_path(explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(expand(path)),
        None => Ok(config_dir()?.join("steps.toml")),
    }
}

fn expand(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).as_ref())
}

/// Remote user when neither the host nor the defaults name one
fn default_user() -> String {
    std::env::var("USER").unwrap_or_else(|_| "root".to_string())
}

// ============================================================================
// Inventory
// ============================================================================

/// Load and validate the inventory file
pub fn load_inventory(path: &Path) -> Result<Inventory> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Could not read {}", path.display()))?;
    parse_inventory(&content).with_context(|| format!("Invalid inventory {}", path.display()))
}

/// Parse inventory TOML, filling connection defaults
pub fn parse_inventory(content: &str) -> Result<Inventory> {
    let mut spec: InventorySpec = toml::from_str(content)?;

    if spec.defaults.user.is_none() {
        spec.defaults.user = Some(default_user());
    }
    expand_key(&mut spec.defaults.ssh_key);
    for host in spec.hosts.values_mut() {
        expand_key(&mut host.ssh_key);
    }

    Ok(Inventory::from_spec(spec)?)
}

fn expand_key(key: &mut Option<String>) {
    if let Some(path) = key {
        *path = shellexpand::tilde(path).into_owned();
    }
}

// ============================================================================
// Steps
// ============================================================================

/// Step file layout: a list of `[[step]]` tables
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct StepFile {
    #[serde(default, rename = "step")]
    pub steps: Vec<StepSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepSpec {
    /// `provider:action:resource`
    pub id: String,
    pub description: Option<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Defaults to the id's provider
    pub layer: Option<String>,
    /// Exit 0 when already converged
    pub check: Option<String>,
    /// Prints the current state
    pub state: Option<String>,
    /// Expected output of `state`
    pub desired: Option<String>,
    pub apply: String,
    pub rollback: Option<String>,
}

impl StepSpec {
    fn into_step(self) -> Result<ShellStep> {
        let id = StepId::parse(&self.id)?;
        let depends_on = self
            .depends_on
            .iter()
            .map(|dep| StepId::parse(dep).with_context(|| format!("Invalid dependency of {id}")))
            .collect::<Result<Vec<_>>>()?;

        let mut step = ShellStep::new(id, self.apply);
        step.description = self.description;
        step.depends_on = depends_on;
        if let Some(layer) = self.layer {
            step.layer = layer;
        }
        step.check = self.check;
        step.state = self.state;
        step.desired = self.desired;
        step.rollback = self.rollback;
        Ok(step)
    }
}

/// Load the step file
pub fn load_steps(path: &Path) -> Result<Vec<SharedStep>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Could not read {}", path.display()))?;
    parse_steps(&content).with_context(|| format!("Invalid step file {}", path.display()))
}

/// Parse step TOML into steps, in declaration order
///
/// Only ids are validated here; duplicates, unknown dependencies and cycles
/// are reported when the steps are ordered.
pub fn parse_steps(content: &str) -> Result<Vec<SharedStep>> {
    let file: StepFile = toml::from_str(content)?;
    file.steps
        .into_iter()
        .map(|spec| Ok(Arc::new(spec.into_step()?) as SharedStep))
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::time::Duration;

    const INVENTORY: &str = r#"
[defaults]
port = 2222
ssh_key = "~/.ssh/fleet"
ssh_timeout = 5

[hosts.web-01]
hostname = "10.0.0.1"
user = "deploy"
tags = ["web", "prod"]

[hosts.web-02]
port = 22
tags = ["web", "staging"]

[hosts.db-01]
proxy_jump = "bastion"
groups = ["databases"]

[groups.web]
description = "Frontends"
patterns = ["web-*"]
policies = ["hardening"]
inherit = ["all-servers"]

[groups.all-servers]
policies = ["base"]
"#;

    #[test]
    fn test_parse_inventory() {
        let inventory = parse_inventory(INVENTORY).unwrap();
        assert_eq!(inventory.len(), 3);

        let web = inventory.host("web-01").unwrap();
        assert_eq!(web.ssh.hostname, "10.0.0.1");
        assert_eq!(web.ssh.user.as_deref(), Some("deploy"));
        assert_eq!(web.ssh.port, 2222);
        assert_eq!(web.ssh.timeout, Duration::from_secs(5));
        assert!(web.has_tag("prod"));

        let web2 = inventory.host("web-02").unwrap();
        assert_eq!(web2.ssh.hostname, "web-02");
        assert_eq!(web2.ssh.port, 22);
        assert_eq!(web2.ssh.user, Some(default_user()));

        let db = inventory.host("db-01").unwrap();
        assert_eq!(db.ssh.proxy_jump.as_deref(), Some("bastion"));

        let members: Vec<_> = inventory.hosts_in_group("all-servers").map(|h| h.as_str()).collect();
        assert_eq!(members, vec!["web-01", "web-02"]);
        assert_eq!(inventory.policies_for("web-01"), vec!["base", "hardening"]);
    }

    #[test]
    fn test_ssh_key_tilde_is_expanded() {
        let inventory = parse_inventory(INVENTORY).unwrap();
        let key = inventory.host("web-01").unwrap().ssh.ssh_key.clone().unwrap();
        assert!(!key.starts_with("~"));
        assert!(key.ends_with(".ssh/fleet"));
    }

    #[test]
    fn test_parse_inventory_rejects_bad_host_id() {
        let err = parse_inventory("[hosts.1web]\n").unwrap_err();
        assert!(format!("{err:#}").contains("1web"));
    }

    #[test]
    fn test_load_inventory_names_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inventory.toml");
        fs::write(&path, "[groups.a]\ninherit = [\"b\"]\n[groups.b]\ninherit = [\"a\"]\n").unwrap();

        let err = load_inventory(&path).unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("inventory.toml"));
        assert!(message.contains("cycle"));

        assert!(load_inventory(&dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn test_parse_steps() {
        let steps = parse_steps(
            r#"
[[step]]
id = "pkg:update:apt"
apply = "apt-get update"

[[step]]
id = "pkg:install:git"
description = "Install git"
depends_on = ["pkg:update:apt"]
check = "command -v git"
apply = "apt-get install -y git"
rollback = "apt-get remove -y git"

[[step]]
id = "file:write:/etc/motd"
layer = "files"
state = "cat /etc/motd"
desired = "welcome"
apply = "echo welcome > /etc/motd"
"#,
        )
        .unwrap();

        let ids: Vec<_> = steps.iter().map(|s| s.id().to_string()).collect();
        assert_eq!(ids, vec!["pkg:update:apt", "pkg:install:git", "file:write:/etc/motd"]);
        assert_eq!(steps[1].description(), "Install git");
        assert_eq!(steps[1].depends_on(), vec![StepId::parse("pkg:update:apt").unwrap()]);
        assert_eq!(steps[0].description(), "pkg:update:apt");
    }

    #[test]
    fn test_parse_steps_rejects_bad_ids() {
        assert!(parse_steps("[[step]]\nid = \"nocolons\"\napply = \"true\"\n").is_err());

        let err = parse_steps(
            "[[step]]\nid = \"pkg:install:git\"\napply = \"true\"\ndepends_on = [\"bad\"]\n",
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("Invalid dependency of pkg:install:git"));
    }

    #[test]
    fn test_empty_step_file() {
        assert!(parse_steps("").unwrap().is_empty());
    }

    #[test]
    fn test_load_steps_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("steps.toml");
        fs::write(&path, "[[step]]\nid = \"shell:run:hello\"\napply = \"echo hello\"\n").unwrap();
        assert_eq!(load_steps(&path).unwrap().len(), 1);
    }

    #[test]
    fn test_explicit_paths_win() {
        let path = inventory_path(Some(Path::new("/srv/fleet.toml"))).unwrap();
        assert_eq!(path, PathBuf::from("/srv/fleet.toml"));

        let path = steps_path(Some(Path::new("~/steps.toml"))).unwrap();
        assert!(!path.starts_with("~"));
    }
}
