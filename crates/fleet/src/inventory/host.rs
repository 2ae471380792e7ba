//! Validated identifiers and the Host value object

use crate::error::{InventoryError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Default SSH port
pub const DEFAULT_PORT: u16 = 22;

/// Default SSH connection timeout
pub const DEFAULT_SSH_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared rule for host ids and group names: ASCII alphanumerics and
/// hyphens, not starting with a digit.
fn check_name(raw: &str) -> std::result::Result<(), &'static str> {
    let Some(first) = raw.chars().next() else {
        return Err("must not be empty");
    };
    if first.is_ascii_digit() {
        return Err("must not start with a digit");
    }
    if !raw.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err("only letters, digits and '-' are allowed");
    }
    Ok(())
}

macro_rules! identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = InventoryError;

            fn try_from(value: String) -> Result<Self> {
                Self::new(&value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

identifier!(
    /// Host identifier: letters, digits and hyphens, not starting with a digit
    HostId
);

identifier!(
    /// Group name: letters, digits and hyphens, not starting with a digit
    GroupName
);

identifier!(
    /// Free-form host tag without whitespace
    Tag
);

impl HostId {
    pub fn new(raw: &str) -> Result<Self> {
        check_name(raw).map_err(|reason| InventoryError::InvalidHostId {
            id: raw.to_string(),
            reason,
        })?;
        Ok(Self(raw.to_string()))
    }
}

impl GroupName {
    pub fn new(raw: &str) -> Result<Self> {
        check_name(raw).map_err(|reason| InventoryError::InvalidGroupName {
            name: raw.to_string(),
            reason,
        })?;
        Ok(Self(raw.to_string()))
    }
}

impl Tag {
    pub fn new(raw: &str) -> Result<Self> {
        let invalid = |reason| InventoryError::InvalidTag {
            tag: raw.to_string(),
            reason,
        };
        if raw.is_empty() {
            return Err(invalid("must not be empty"));
        }
        if raw.chars().any(char::is_whitespace) {
            return Err(invalid("must not contain whitespace"));
        }
        // Commas separate selector tokens, so a tag containing one could
        // never be selected.
        if raw.contains(',') {
            return Err(invalid("must not contain ','"));
        }
        Ok(Self(raw.to_string()))
    }
}

/// How to reach a host over SSH
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshConfig {
    /// Network address (DNS name or IP)
    pub hostname: String,
    /// Remote user; `None` lets the SSH client decide
    pub user: Option<String>,
    pub port: u16,
    /// Identity file
    pub ssh_key: Option<PathBuf>,
    /// Jump host, in `ssh -J` syntax
    pub proxy_jump: Option<String>,
    /// Connection timeout
    #[serde(with = "crate::serde_ms")]
    pub timeout: Duration,
}

impl SshConfig {
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            user: None,
            port: DEFAULT_PORT,
            ssh_key: None,
            proxy_jump: None,
            timeout: DEFAULT_SSH_TIMEOUT,
        }
    }

    /// `user@hostname` or just `hostname`
    pub fn destination(&self) -> String {
        match &self.user {
            Some(user) => format!("{user}@{}", self.hostname),
            None => self.hostname.clone(),
        }
    }
}

/// Last known state of a host, as recorded in the inventory
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostStatus {
    #[default]
    Unknown,
    Online,
    Offline,
}

impl fmt::Display for HostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Online => write!(f, "online"),
            Self::Offline => write!(f, "offline"),
        }
    }
}

/// A managed machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    pub id: HostId,
    pub ssh: SshConfig,
    pub tags: BTreeSet<Tag>,
    /// Groups declared on the host itself
    pub groups: BTreeSet<GroupName>,
    pub status: HostStatus,
}

impl Host {
    /// A host reachable at its own id, with no tags or groups
    pub fn new(id: HostId) -> Self {
        let ssh = SshConfig::new(id.as_str());
        Self {
            id,
            ssh,
            tags: BTreeSet::new(),
            groups: BTreeSet::new(),
            status: HostStatus::Unknown,
        }
    }

    pub fn with_ssh(mut self, ssh: SshConfig) -> Self {
        self.ssh = ssh;
        self
    }

    pub fn with_tag(mut self, tag: Tag) -> Self {
        self.tags.insert(tag);
        self
    }

    pub fn with_group(mut self, group: GroupName) -> Self {
        self.groups.insert(group);
        self
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_id_rules() {
        assert!(HostId::new("web-01").is_ok());
        assert!(HostId::new("Web01").is_ok());
        assert!(HostId::new("").is_err());
        assert!(HostId::new("1web").is_err());
        assert!(HostId::new("web_01").is_err());
        assert!(HostId::new("web.example.com").is_err());
        assert!(HostId::new("web 01").is_err());
    }

    #[test]
    fn test_group_name_rules() {
        assert!(GroupName::new("prod-eu").is_ok());
        assert!(matches!(
            GroupName::new("9lives"),
            Err(InventoryError::InvalidGroupName { .. })
        ));
    }

    #[test]
    fn test_tag_rules() {
        assert!(Tag::new("web").is_ok());
        assert!(Tag::new("env=prod").is_ok());
        assert!(Tag::new("2024").is_ok());
        assert!(Tag::new("").is_err());
        assert!(Tag::new("has space").is_err());
        assert!(Tag::new("a,b").is_err());
    }

    #[test]
    fn test_identifier_deserialize_validates() {
        let id: HostId = serde_json::from_str("\"web-01\"").unwrap();
        assert_eq!(id.as_str(), "web-01");
        assert!(serde_json::from_str::<HostId>("\"1bad\"").is_err());
    }

    #[test]
    fn test_destination() {
        let mut ssh = SshConfig::new("10.0.0.5");
        assert_eq!(ssh.destination(), "10.0.0.5");
        ssh.user = Some("deploy".into());
        assert_eq!(ssh.destination(), "deploy@10.0.0.5");
    }

    #[test]
    fn test_has_tag() {
        let host = Host::new(HostId::new("a").unwrap()).with_tag(Tag::new("web").unwrap());
        assert!(host.has_tag("web"));
        assert!(!host.has_tag("db"));
    }
}
