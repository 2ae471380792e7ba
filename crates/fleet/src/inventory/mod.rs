//! Host inventory
//!
//! Owns every host and group for a run, with tag and group indices built
//! once at construction. An inventory is read-only after it is built.

mod group;
mod host;
mod spec;

pub use group::Group;
pub use host::{DEFAULT_PORT, DEFAULT_SSH_TIMEOUT, GroupName, Host, HostId, HostStatus, SshConfig, Tag};
pub use spec::{GroupSpec, HostSpec, InventoryDefaults, InventorySpec};

use crate::error::{InventoryError, Result};
use crate::glob::Glob;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::time::Duration;

/// All hosts and groups under management
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    hosts: BTreeMap<HostId, Host>,
    groups: BTreeMap<GroupName, Group>,
    /// Ancestors of each defined group, itself included
    lineage: BTreeMap<GroupName, BTreeSet<GroupName>>,
    /// Effective groups per host
    memberships: BTreeMap<HostId, BTreeSet<GroupName>>,
    tag_index: BTreeMap<Tag, BTreeSet<HostId>>,
    group_index: BTreeMap<GroupName, BTreeSet<HostId>>,
}

impl Inventory {
    /// Build an inventory, validating uniqueness and group inheritance
    ///
    /// Rejects duplicate hosts or groups, inheritance from undefined
    /// groups, and inheritance cycles. Hosts may declare groups that have
    /// no definition; such groups simply have no patterns or parents.
    pub fn new(hosts: Vec<Host>, groups: Vec<Group>) -> Result<Self> {
        let mut host_map = BTreeMap::new();
        for host in hosts {
            if host_map.contains_key(&host.id) {
                return Err(InventoryError::DuplicateHost {
                    id: host.id.to_string(),
                });
            }
            host_map.insert(host.id.clone(), host);
        }

        let mut group_map = BTreeMap::new();
        for group in groups {
            if group_map.contains_key(&group.name) {
                return Err(InventoryError::DuplicateGroup {
                    name: group.name.to_string(),
                });
            }
            group_map.insert(group.name.clone(), group);
        }

        let lineage = resolve_lineage(&group_map)?;

        let mut memberships = BTreeMap::new();
        let mut tag_index: BTreeMap<Tag, BTreeSet<HostId>> = BTreeMap::new();
        let mut group_index: BTreeMap<GroupName, BTreeSet<HostId>> = BTreeMap::new();

        for host in host_map.values() {
            let direct = host.groups.iter().cloned().chain(
                group_map
                    .values()
                    .filter(|g| g.matches_pattern(&host.id))
                    .map(|g| g.name.clone()),
            );

            let mut effective = BTreeSet::new();
            for group in direct {
                match lineage.get(&group) {
                    Some(ancestors) => effective.extend(ancestors.iter().cloned()),
                    None => {
                        effective.insert(group);
                    }
                }
            }

            for group in &effective {
                group_index
                    .entry(group.clone())
                    .or_default()
                    .insert(host.id.clone());
            }
            for tag in &host.tags {
                tag_index
                    .entry(tag.clone())
                    .or_default()
                    .insert(host.id.clone());
            }
            memberships.insert(host.id.clone(), effective);
        }

        log::debug!(
            "Loaded inventory: {} hosts, {} groups, {} tags",
            host_map.len(),
            group_map.len(),
            tag_index.len()
        );

        Ok(Self {
            hosts: host_map,
            groups: group_map,
            lineage,
            memberships,
            tag_index,
            group_index,
        })
    }

    /// Build an inventory from deserialized input
    pub fn from_spec(spec: InventorySpec) -> Result<Self> {
        let defaults = &spec.defaults;

        let mut hosts = Vec::with_capacity(spec.hosts.len());
        for (name, host) in &spec.hosts {
            let id = HostId::new(name)?;
            let ssh = SshConfig {
                hostname: host.hostname.clone().unwrap_or_else(|| name.clone()),
                user: host.user.clone().or_else(|| defaults.user.clone()),
                port: host.port.or(defaults.port).unwrap_or(DEFAULT_PORT),
                ssh_key: host
                    .ssh_key
                    .as_ref()
                    .or(defaults.ssh_key.as_ref())
                    .map(PathBuf::from),
                proxy_jump: host.proxy_jump.clone(),
                timeout: defaults
                    .ssh_timeout
                    .map_or(DEFAULT_SSH_TIMEOUT, Duration::from_secs),
            };
            hosts.push(Host {
                id,
                ssh,
                tags: host
                    .tags
                    .iter()
                    .map(|t| Tag::new(t))
                    .collect::<Result<_>>()?,
                groups: host
                    .groups
                    .iter()
                    .map(|g| GroupName::new(g))
                    .collect::<Result<_>>()?,
                status: host.status,
            });
        }

        let mut groups = Vec::with_capacity(spec.groups.len());
        for (name, group) in &spec.groups {
            let name = GroupName::new(name)?;
            let patterns = group
                .patterns
                .iter()
                .map(|p| Glob::new(p))
                .collect::<std::result::Result<_, _>>()
                .map_err(|source| InventoryError::InvalidPattern {
                    group: name.to_string(),
                    source,
                })?;
            groups.push(Group {
                patterns,
                description: group.description.clone(),
                policies: group.policies.clone(),
                inherit: group
                    .inherit
                    .iter()
                    .map(|g| GroupName::new(g))
                    .collect::<Result<_>>()?,
                name,
            });
        }

        Self::new(hosts, groups)
    }

    pub fn host(&self, id: &str) -> Option<&Host> {
        self.hosts.get(id)
    }

    pub fn group(&self, name: &str) -> Option<&Group> {
        self.groups.get(name)
    }

    /// Hosts in id order
    pub fn hosts(&self) -> impl Iterator<Item = &Host> {
        self.hosts.values()
    }

    /// Groups in name order
    pub fn groups(&self) -> impl Iterator<Item = &Group> {
        self.groups.values()
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Ids of hosts carrying a tag
    pub fn hosts_with_tag(&self, tag: &str) -> impl Iterator<Item = &HostId> {
        self.tag_index.get(tag).into_iter().flatten()
    }

    /// Ids of hosts in a group, including members of descendant groups
    pub fn hosts_in_group(&self, group: &str) -> impl Iterator<Item = &HostId> {
        self.group_index.get(group).into_iter().flatten()
    }

    /// Every group a host belongs to, after patterns and inheritance
    pub fn effective_groups(&self, host: &str) -> impl Iterator<Item = &GroupName> {
        self.memberships.get(host).into_iter().flatten()
    }

    /// Ancestors of a defined group, itself included
    pub fn lineage(&self, group: &str) -> impl Iterator<Item = &GroupName> {
        self.lineage.get(group).into_iter().flatten()
    }

    /// Policies attached to a host through its effective groups, sorted
    pub fn policies_for(&self, host: &str) -> Vec<&str> {
        let policies: BTreeSet<&str> = self
            .effective_groups(host)
            .filter_map(|g| self.groups.get(g))
            .flat_map(|g| g.policies.iter().map(String::as_str))
            .collect();
        policies.into_iter().collect()
    }
}

/// Resolve each group's ancestor closure, rejecting unknown parents and cycles
fn resolve_lineage(
    groups: &BTreeMap<GroupName, Group>,
) -> Result<BTreeMap<GroupName, BTreeSet<GroupName>>> {
    for group in groups.values() {
        for parent in &group.inherit {
            if !groups.contains_key(parent) {
                return Err(InventoryError::UnknownParentGroup {
                    group: group.name.to_string(),
                    parent: parent.to_string(),
                });
            }
        }
    }

    let mut resolved: BTreeMap<GroupName, BTreeSet<GroupName>> = BTreeMap::new();
    for name in groups.keys() {
        let mut trail = Vec::new();
        visit(name, groups, &mut resolved, &mut trail)?;
    }
    Ok(resolved)
}

fn visit(
    name: &GroupName,
    groups: &BTreeMap<GroupName, Group>,
    resolved: &mut BTreeMap<GroupName, BTreeSet<GroupName>>,
    trail: &mut Vec<GroupName>,
) -> Result<()> {
    if resolved.contains_key(name) {
        return Ok(());
    }
    if let Some(at) = trail.iter().position(|g| g == name) {
        let mut members: Vec<String> = trail[at..].iter().map(ToString::to_string).collect();
        members.push(name.to_string());
        return Err(InventoryError::InheritanceCycle { members });
    }

    trail.push(name.clone());
    let mut ancestors = BTreeSet::from([name.clone()]);
    if let Some(group) = groups.get(name) {
        for parent in &group.inherit {
            visit(parent, groups, resolved, trail)?;
            if let Some(parent_lineage) = resolved.get(parent) {
                ancestors.extend(parent_lineage.iter().cloned());
            }
        }
    }
    trail.pop();

    resolved.insert(name.clone(), ancestors);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(id: &str, tags: &[&str], groups: &[&str]) -> Host {
        let mut host = Host::new(HostId::new(id).unwrap());
        for tag in tags {
            host = host.with_tag(Tag::new(tag).unwrap());
        }
        for group in groups {
            host = host.with_group(GroupName::new(group).unwrap());
        }
        host
    }

    fn group(name: &str) -> Group {
        Group::new(GroupName::new(name).unwrap())
    }

    fn gname(name: &str) -> GroupName {
        GroupName::new(name).unwrap()
    }

    fn ids<'a>(iter: impl Iterator<Item = &'a HostId>) -> Vec<&'a str> {
        iter.map(HostId::as_str).collect()
    }

    #[test]
    fn test_tag_index() {
        let inv = Inventory::new(
            vec![
                host("a", &["web", "prod"], &[]),
                host("b", &["db", "prod"], &[]),
                host("c", &["web", "staging"], &[]),
            ],
            vec![],
        )
        .unwrap();

        assert_eq!(ids(inv.hosts_with_tag("prod")), vec!["a", "b"]);
        assert_eq!(ids(inv.hosts_with_tag("web")), vec!["a", "c"]);
        assert!(inv.hosts_with_tag("nope").next().is_none());
    }

    #[test]
    fn test_hosts_sorted_by_id() {
        let inv = Inventory::new(
            vec![host("c", &[], &[]), host("a", &[], &[]), host("b", &[], &[])],
            vec![],
        )
        .unwrap();
        let order: Vec<_> = inv.hosts().map(|h| h.id.as_str()).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_duplicates_rejected() {
        let err = Inventory::new(vec![host("a", &[], &[]), host("a", &[], &[])], vec![]).unwrap_err();
        assert_eq!(err, InventoryError::DuplicateHost { id: "a".into() });

        let err = Inventory::new(vec![], vec![group("web"), group("web")]).unwrap_err();
        assert_eq!(err, InventoryError::DuplicateGroup { name: "web".into() });
    }

    #[test]
    fn test_pattern_membership() {
        let inv = Inventory::new(
            vec![host("web-01", &[], &[]), host("db-01", &[], &[])],
            vec![group("web").with_pattern(Glob::new("web-*").unwrap())],
        )
        .unwrap();
        assert_eq!(ids(inv.hosts_in_group("web")), vec!["web-01"]);
    }

    #[test]
    fn test_inherited_membership() {
        // frontend inherits web; web inherits all-servers
        let inv = Inventory::new(
            vec![
                host("fe-1", &[], &["frontend"]),
                host("web-1", &[], &["web"]),
                host("lone", &[], &[]),
            ],
            vec![
                group("all-servers").with_policy("baseline"),
                group("web").inheriting(gname("all-servers")).with_policy("nginx"),
                group("frontend").inheriting(gname("web")).with_policy("cdn"),
            ],
        )
        .unwrap();

        assert_eq!(ids(inv.hosts_in_group("all-servers")), vec!["fe-1", "web-1"]);
        assert_eq!(ids(inv.hosts_in_group("web")), vec!["fe-1", "web-1"]);
        assert_eq!(ids(inv.hosts_in_group("frontend")), vec!["fe-1"]);
        assert_eq!(inv.policies_for("fe-1"), vec!["baseline", "cdn", "nginx"]);
        assert_eq!(inv.policies_for("lone"), Vec::<&str>::new());
    }

    #[test]
    fn test_undefined_declared_group_is_implicit() {
        let inv = Inventory::new(vec![host("a", &[], &["adhoc"])], vec![]).unwrap();
        assert_eq!(ids(inv.hosts_in_group("adhoc")), vec!["a"]);
    }

    #[test]
    fn test_unknown_parent_rejected() {
        let err = Inventory::new(vec![], vec![group("web").inheriting(gname("ghost"))]).unwrap_err();
        assert_eq!(
            err,
            InventoryError::UnknownParentGroup {
                group: "web".into(),
                parent: "ghost".into(),
            }
        );
    }

    #[test]
    fn test_inheritance_cycle_rejected() {
        let err = Inventory::new(
            vec![],
            vec![
                group("a").inheriting(gname("b")),
                group("b").inheriting(gname("c")),
                group("c").inheriting(gname("a")),
            ],
        )
        .unwrap_err();
        assert_eq!(
            err,
            InventoryError::InheritanceCycle {
                members: vec!["a".into(), "b".into(), "c".into(), "a".into()],
            }
        );
    }

    #[test]
    fn test_self_inheritance_rejected() {
        let err = Inventory::new(vec![], vec![group("a").inheriting(gname("a"))]).unwrap_err();
        assert!(matches!(err, InventoryError::InheritanceCycle { .. }));
    }

    #[test]
    fn test_diamond_inheritance_is_fine() {
        let inv = Inventory::new(
            vec![host("x", &[], &["leaf"])],
            vec![
                group("base"),
                group("left").inheriting(gname("base")),
                group("right").inheriting(gname("base")),
                group("leaf").inheriting(gname("left")).inheriting(gname("right")),
            ],
        )
        .unwrap();
        let lineage: Vec<_> = inv.lineage("leaf").map(GroupName::as_str).collect();
        assert_eq!(lineage, vec!["base", "leaf", "left", "right"]);
        assert_eq!(ids(inv.hosts_in_group("base")), vec!["x"]);
    }

    #[test]
    fn test_from_spec_applies_defaults() {
        let mut spec = InventorySpec {
            defaults: InventoryDefaults {
                user: Some("deploy".into()),
                port: Some(2222),
                ssh_key: Some("/keys/fleet".into()),
                ssh_timeout: Some(5),
            },
            ..Default::default()
        };
        spec.hosts.insert(
            "web-01".into(),
            HostSpec {
                hostname: Some("10.0.0.1".into()),
                tags: vec!["web".into()],
                groups: vec!["frontend".into()],
                ..Default::default()
            },
        );
        spec.hosts.insert(
            "db-01".into(),
            HostSpec {
                user: Some("postgres".into()),
                port: Some(22),
                proxy_jump: Some("bastion".into()),
                ..Default::default()
            },
        );
        spec.groups.insert(
            "frontend".into(),
            GroupSpec {
                patterns: vec!["edge-*".into()],
                ..Default::default()
            },
        );

        let inv = Inventory::from_spec(spec).unwrap();

        let web = inv.host("web-01").unwrap();
        assert_eq!(web.ssh.hostname, "10.0.0.1");
        assert_eq!(web.ssh.user.as_deref(), Some("deploy"));
        assert_eq!(web.ssh.port, 2222);
        assert_eq!(web.ssh.ssh_key, Some(PathBuf::from("/keys/fleet")));
        assert_eq!(web.ssh.timeout, Duration::from_secs(5));

        let db = inv.host("db-01").unwrap();
        assert_eq!(db.ssh.hostname, "db-01");
        assert_eq!(db.ssh.user.as_deref(), Some("postgres"));
        assert_eq!(db.ssh.port, 22);
        assert_eq!(db.ssh.proxy_jump.as_deref(), Some("bastion"));
    }

    #[test]
    fn test_from_spec_rejects_bad_identifiers() {
        let mut spec = InventorySpec::default();
        spec.hosts.insert("1bad".into(), HostSpec::default());
        assert!(matches!(
            Inventory::from_spec(spec),
            Err(InventoryError::InvalidHostId { .. })
        ));

        let mut spec = InventorySpec::default();
        spec.hosts.insert(
            "ok".into(),
            HostSpec {
                tags: vec!["has space".into()],
                ..Default::default()
            },
        );
        assert!(matches!(
            Inventory::from_spec(spec),
            Err(InventoryError::InvalidTag { .. })
        ));

        let mut spec = InventorySpec::default();
        spec.groups.insert(
            "web".into(),
            GroupSpec {
                patterns: vec!["web-[".into()],
                ..Default::default()
            },
        );
        assert!(matches!(
            Inventory::from_spec(spec),
            Err(InventoryError::InvalidPattern { .. })
        ));
    }
}
