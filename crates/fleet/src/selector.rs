//! Target selectors
//!
//! A selector is a comma-separated list of tokens:
//!
//! | Token       | Selects                                              |
//! |-------------|------------------------------------------------------|
//! | `@all`      | every host                                           |
//! | `@<group>`  | effective members of a group (inheritance included)  |
//! | `tag:<tag>` | hosts carrying the tag                               |
//! | `web-*`     | hosts whose id matches a shell-style glob            |
//! | `web-01`    | the host with exactly that id                        |
//!
//! A leading `!` turns a token into an exclusion. Exclusions are
//! subtracted after every inclusion has been evaluated, so `!x` wins no
//! matter where it appears.

use crate::error::SelectorError;
use crate::glob::Glob;
use crate::inventory::{GroupName, Host, HostId, Inventory, Tag};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// What a single token matches
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Matcher {
    All,
    Group(GroupName),
    Tag(Tag),
    Glob(Glob),
    Exact(HostId),
}

impl Matcher {
    /// Ids of every matching host, in id order
    fn resolve<'a>(&self, inventory: &'a Inventory) -> BTreeSet<&'a HostId> {
        match self {
            Self::All => inventory.hosts().map(|h| &h.id).collect(),
            Self::Group(group) => inventory.hosts_in_group(group.as_str()).collect(),
            Self::Tag(tag) => inventory.hosts_with_tag(tag.as_str()).collect(),
            Self::Glob(glob) => inventory
                .hosts()
                .filter(|h| glob.is_match(h.id.as_str()))
                .map(|h| &h.id)
                .collect(),
            Self::Exact(id) => inventory.host(id.as_str()).map(|h| &h.id).into_iter().collect(),
        }
    }

    fn matches(&self, inventory: &Inventory, host: &Host) -> bool {
        match self {
            Self::All => true,
            Self::Group(group) => inventory.effective_groups(host.id.as_str()).any(|g| g == group),
            Self::Tag(tag) => host.tags.contains(tag),
            Self::Glob(glob) => glob.is_match(host.id.as_str()),
            Self::Exact(id) => &host.id == id,
        }
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "@all"),
            Self::Group(group) => write!(f, "@{group}"),
            Self::Tag(tag) => write!(f, "tag:{tag}"),
            Self::Glob(glob) => write!(f, "{glob}"),
            Self::Exact(id) => write!(f, "{id}"),
        }
    }
}

/// One signed selector token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorToken {
    pub exclude: bool,
    pub matcher: Matcher,
}

impl SelectorToken {
    fn parse(raw: &str, position: usize) -> Result<Self, SelectorError> {
        let token = raw.trim();
        let (exclude, body) = match token.strip_prefix('!') {
            Some(rest) => (true, rest.trim_start()),
            None => (false, token),
        };
        if body.is_empty() {
            return Err(SelectorError::EmptyToken { position });
        }

        let invalid = |source| SelectorError::InvalidIdentifier {
            token: token.to_string(),
            source,
        };

        let matcher = if body == "@all" {
            Matcher::All
        } else if let Some(group) = body.strip_prefix('@') {
            Matcher::Group(GroupName::new(group).map_err(invalid)?)
        } else if let Some(tag) = body.strip_prefix("tag:") {
            Matcher::Tag(Tag::new(tag).map_err(invalid)?)
        } else if Glob::is_glob(body) {
            Matcher::Glob(Glob::new(body).map_err(|source| SelectorError::InvalidGlob {
                token: token.to_string(),
                source,
            })?)
        } else {
            Matcher::Exact(HostId::new(body).map_err(invalid)?)
        };

        Ok(Self { exclude, matcher })
    }
}

impl fmt::Display for SelectorToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.exclude {
            write!(f, "!")?;
        }
        write!(f, "{}", self.matcher)
    }
}

/// Outcome of evaluating a target, with diagnostics
#[derive(Debug, Clone)]
pub struct Selection<'a> {
    /// Selected hosts in id order
    pub hosts: Vec<&'a Host>,
    /// Inclusion tokens that matched no host at all
    pub empty_tokens: Vec<String>,
}

/// A compiled selector expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    tokens: Vec<SelectorToken>,
}

impl Target {
    /// Compile a selector expression
    pub fn parse(expression: &str) -> Result<Self, SelectorError> {
        if expression.trim().is_empty() {
            return Err(SelectorError::Empty);
        }
        let tokens = expression
            .split(',')
            .enumerate()
            .map(|(i, raw)| SelectorToken::parse(raw, i + 1))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { tokens })
    }

    /// Every host
    pub fn all() -> Self {
        Self {
            tokens: vec![SelectorToken {
                exclude: false,
                matcher: Matcher::All,
            }],
        }
    }

    pub fn tokens(&self) -> &[SelectorToken] {
        &self.tokens
    }

    /// Selected hosts in id order
    pub fn select<'a>(&self, inventory: &'a Inventory) -> Vec<&'a Host> {
        self.select_report(inventory).hosts
    }

    /// Selected hosts plus the inclusion tokens that matched nothing
    pub fn select_report<'a>(&self, inventory: &'a Inventory) -> Selection<'a> {
        let mut included = BTreeSet::new();
        let mut excluded = BTreeSet::new();
        let mut empty_tokens = Vec::new();

        for token in &self.tokens {
            let matched = token.matcher.resolve(inventory);
            if token.exclude {
                excluded.extend(matched);
            } else {
                if matched.is_empty() {
                    log::warn!("Selector token '{token}' matched 0 hosts");
                    empty_tokens.push(token.to_string());
                }
                included.extend(matched);
            }
        }

        let hosts: Vec<&Host> = included
            .difference(&excluded)
            .filter_map(|id| inventory.host(id.as_str()))
            .collect();

        log::debug!("Selector '{self}' matched {} hosts", hosts.len());

        Selection {
            hosts,
            empty_tokens,
        }
    }

    /// Whether a single host is selected
    pub fn matches(&self, inventory: &Inventory, host: &Host) -> bool {
        let (excludes, includes): (Vec<_>, Vec<_>) = self.tokens.iter().partition(|t| t.exclude);
        includes.iter().any(|t| t.matcher.matches(inventory, host))
            && !excludes.iter().any(|t| t.matcher.matches(inventory, host))
    }
}

impl FromStr for Target {
    type Err = SelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, token) in self.tokens.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{token}")?;
        }
        Ok(())
    }
}
