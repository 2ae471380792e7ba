//! `muster hosts` - list what a selector matches

use anyhow::Result;
use colored::Colorize;
use fleet::{GroupName, Host, Inventory};
use serde::Serialize;

use super::{load_inventory, plural, select};
use crate::Context;
use crate::cli::HostsArgs;
use crate::ui;

/// A host as listed, with its resolved memberships
#[derive(Serialize)]
struct HostEntry<'a> {
    #[serde(flatten)]
    host: &'a Host,
    effective_groups: Vec<&'a GroupName>,
    policies: Vec<&'a str>,
}

impl<'a> HostEntry<'a> {
    fn new(inventory: &'a Inventory, host: &'a Host) -> Self {
        Self {
            host,
            effective_groups: inventory.effective_groups(host.id.as_str()).collect(),
            policies: inventory.policies_for(host.id.as_str()),
        }
    }
}

pub fn run(ctx: &Context, args: HostsArgs) -> Result<()> {
    let inventory = load_inventory(ctx)?;
    let hosts = select(ctx, &inventory, &args.selector)?;
    let entries: Vec<HostEntry> = hosts.iter().map(|h| HostEntry::new(&inventory, h)).collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        ui::warn(&format!("No hosts matched '{}'", args.selector));
        return Ok(());
    }

    ui::header(&format!(
        "{} host{} of {}",
        entries.len(),
        plural(entries.len()),
        inventory.len()
    ));
    for entry in &entries {
        print_entry(ctx, entry);
    }
    Ok(())
}

fn print_entry(ctx: &Context, entry: &HostEntry) {
    let host = entry.host;
    let address = format!("{}:{}", host.ssh.destination(), host.ssh.port);
    let tags: Vec<&str> = host.tags.iter().map(|t| t.as_str()).collect();

    println!(
        "  {:<20} {:<32} {}",
        host.id.as_str().bold(),
        address,
        tags.join(",").dimmed()
    );

    if ctx.verbose > 0 {
        let groups: Vec<&str> = entry.effective_groups.iter().map(|g| g.as_str()).collect();
        if !groups.is_empty() {
            ui::kv("groups", &groups.join(", "));
        }
        if !entry.policies.is_empty() {
            ui::kv("policies", &entry.policies.join(", "));
        }
        if let Some(jump) = &host.ssh.proxy_jump {
            ui::kv("via", jump);
        }
        ui::kv("status", &host.status.to_string());
    }
}
