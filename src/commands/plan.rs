//! `muster plan` - what apply would change, per host

use anyhow::{Result, bail};
use colored::Colorize;
use declarative::{PlannedStep, StepStatus};
use fleet::{FleetExecutor, FleetPlan, HostPlan};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::{block_on, executor_config, load_steps, plural, targets, transport};
use crate::Context;
use crate::cli::PlanArgs;
use crate::progress::FleetBar;
use crate::ui;

pub fn run(ctx: &Context, args: PlanArgs) -> Result<()> {
    let steps = load_steps(ctx)?;
    let hosts = targets(ctx, &args.selector, args.local)?;

    if hosts.is_empty() {
        ui::warn(&format!("No hosts matched '{}'", args.selector));
        return Ok(());
    }

    let bar = Arc::new(FleetBar::new(hosts.len(), "Planning", ctx.quiet || args.json));
    let executor = FleetExecutor::new(executor_config(args.fan_out), transport(args.local))?
        .with_progress(bar.clone());

    let cancel = CancellationToken::new();
    let plan = block_on(&cancel, executor.plan(&hosts, &steps, &cancel))??;
    bar.finish();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        print_plan(&plan, ctx.verbose > 0);
    }

    let failed = plan.failed_hosts().count();
    if failed > 0 {
        bail!("{failed} host{} could not be planned", plural(failed));
    }
    Ok(())
}

/// Print every host's plan, then a fleet-wide summary
///
/// Satisfied steps are only listed when `verbose`.
pub fn print_plan(plan: &FleetPlan, verbose: bool) {
    for host in &plan.hosts {
        print_host(host, verbose);
    }
    print_summary(plan);
}

fn print_host(host: &HostPlan, verbose: bool) {
    ui::section(host.host_id.as_str());

    if let Some(error) = &host.error {
        println!("  {} {}", "✗".red(), error.to_string().red());
    }
    if host.error.is_none() && host.pending().next().is_none() {
        ui::dim("converged");
    }

    for step in &host.steps {
        if step.status == StepStatus::Satisfied && !verbose {
            continue;
        }
        print_step(step);
    }
}

fn print_step(step: &PlannedStep) {
    let description = if step.description == step.step_id.as_str() {
        String::new()
    } else {
        step.description.clone()
    };
    println!(
        "  {} {:<40} {}",
        ui::status_symbol(step.status),
        step.step_id.as_str(),
        description.dimmed()
    );

    if let Some(diff) = step.diff.as_ref().filter(|d| d.has_changes()) {
        println!(
            "      {} {}/{}",
            ui::kind_symbol(diff.kind),
            diff.layer,
            diff.resource
        );
        ui::print_diff(diff, "        ");
    }
    if let Some(error) = &step.error {
        println!("      {}", error.yellow());
    }
}

fn print_summary(plan: &FleetPlan) {
    let diffs = plan.diff_summary();
    let pending = plan.pending_hosts().count();
    let failed = plan.failed_hosts().count();

    println!();
    if plan.is_converged() {
        ui::success(&format!(
            "{} host{} converged",
            plan.hosts.len(),
            plural(plan.hosts.len())
        ));
        return;
    }

    ui::info(&format!(
        "{} change{} on {pending} of {} host{} (+{} ~{} -{})",
        diffs.total(),
        plural(diffs.total()),
        plan.hosts.len(),
        plural(plan.hosts.len()),
        diffs.additions,
        diffs.modifications,
        diffs.removals
    ));
    if failed > 0 {
        ui::warn(&format!("{failed} host{} could not be planned", plural(failed)));
    }
    ui::dim(&format!("planned in {}", ui::format_duration(plan.duration)));
}
