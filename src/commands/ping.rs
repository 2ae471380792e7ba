//! `muster ping` - connectivity check across the fleet
//!
//! A ping is a plan with no steps: every selected host is connected to
//! through the same bounded pool and timeouts as a real run.

use anyhow::{Result, bail};
use colored::Colorize;
use fleet::{FleetExecutor, FleetPlan};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::{block_on, executor_config, load_inventory, plural, select, transport};
use crate::Context;
use crate::cli::PingArgs;
use crate::progress::FleetBar;
use crate::ui;

#[derive(Serialize)]
struct PingEntry<'a> {
    host: &'a str,
    reachable: bool,
    duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

pub fn run(ctx: &Context, args: PingArgs) -> Result<()> {
    let inventory = load_inventory(ctx)?;
    let hosts: Vec<_> = select(ctx, &inventory, &args.selector)?
        .into_iter()
        .cloned()
        .collect();

    if hosts.is_empty() {
        ui::warn(&format!("No hosts matched '{}'", args.selector));
        return Ok(());
    }

    let bar = Arc::new(FleetBar::new(hosts.len(), "Connecting", ctx.quiet || args.json));
    let executor =
        FleetExecutor::new(executor_config(args.fan_out), transport(false))?.with_progress(bar.clone());

    let cancel = CancellationToken::new();
    let plan = block_on(&cancel, executor.plan(&hosts, &[], &cancel))??;
    bar.finish();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&entries(&plan))?);
    } else {
        print_report(&plan);
    }

    let unreachable = plan.failed_hosts().count();
    if unreachable > 0 {
        bail!(
            "{unreachable} of {} host{} unreachable",
            plan.hosts.len(),
            plural(plan.hosts.len())
        );
    }
    Ok(())
}

fn entries(plan: &FleetPlan) -> Vec<PingEntry<'_>> {
    plan.hosts
        .iter()
        .map(|host| PingEntry {
            host: host.host_id.as_str(),
            reachable: host.error.is_none(),
            duration_ms: u64::try_from(host.duration.as_millis()).unwrap_or(u64::MAX),
            error: host.error.as_ref().map(ToString::to_string),
        })
        .collect()
}

fn print_report(plan: &FleetPlan) {
    ui::header("Connectivity");
    for host in &plan.hosts {
        let elapsed = ui::format_duration(host.duration).dimmed();
        match &host.error {
            None => println!("  {} {:<24} {}", "✓".green(), host.host_id.as_str(), elapsed),
            Some(error) => println!(
                "  {} {:<24} {} {}",
                "✗".red(),
                host.host_id.as_str(),
                elapsed,
                error.to_string().red()
            ),
        }
    }

    let reachable = plan.hosts.len() - plan.failed_hosts().count();
    println!();
    if reachable == plan.hosts.len() {
        ui::success(&format!("All {} host{} reachable", reachable, plural(reachable)));
    } else {
        ui::warn(&format!("{reachable} of {} reachable", plan.hosts.len()));
    }
}
