//! `muster apply` - converge selected hosts
//!
//! Interactive runs plan first, show the changes and ask before
//! applying. `--yes`, `--dry-run` and `--json` go straight to the run.

use anyhow::{Result, bail};
use colored::Colorize;
use declarative::{ResultStatus, SharedStep};
use fleet::{FleetExecutor, FleetExecutorConfig, FleetResult, Host, HostError, HostResult};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::plan::print_plan;
use super::{block_on, executor_config, load_steps, plural, targets, transport};
use crate::Context;
use crate::cli::ApplyArgs;
use crate::progress::FleetBar;
use crate::ui;

pub fn run(ctx: &Context, args: ApplyArgs) -> Result<()> {
    let steps = load_steps(ctx)?;
    let hosts = targets(ctx, &args.selector, args.local)?;

    if hosts.is_empty() {
        ui::warn(&format!("No hosts matched '{}'", args.selector));
        return Ok(());
    }

    let config = FleetExecutorConfig {
        strategy: args.strategy.into(),
        dry_run: args.dry_run,
        stop_on_error: args.stop_on_error,
        failure_policy: args.on_failure.into(),
        canary_fraction: args.canary_fraction,
        ..executor_config(args.fan_out)
    };
    config.validate()?;

    let interactive = !args.yes && !args.dry_run && !args.json;
    if interactive && !review(ctx, &config, &hosts, &steps, args.local)? {
        return Ok(());
    }

    let hidden = ctx.quiet || args.json;
    if !hidden {
        ui::header(&format!(
            "{} {} host{} ({}, max {} in flight)",
            if args.dry_run { "Dry run on" } else { "Applying to" },
            hosts.len(),
            plural(hosts.len()),
            config.strategy,
            config.max_parallel
        ));
    }

    let bar = Arc::new(FleetBar::new(hosts.len(), "Applying", hidden));
    let executor = FleetExecutor::new(config, transport(args.local))?.with_progress(bar.clone());

    let cancel = CancellationToken::new();
    let result = block_on(&cancel, executor.execute(&hosts, &steps, &cancel))??;
    bar.finish();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result, ctx.verbose > 0);
    }

    if !result.all_successful() {
        let summary = result.summary();
        bail!(
            "{} of {} host{} did not converge",
            summary.failed_hosts + summary.skipped_hosts,
            summary.total_hosts,
            plural(summary.total_hosts)
        );
    }
    Ok(())
}

/// Plan, show the changes, and ask whether to go ahead
fn review(
    ctx: &Context,
    config: &FleetExecutorConfig,
    hosts: &[Host],
    steps: &[SharedStep],
    local: bool,
) -> Result<bool> {
    let bar = Arc::new(FleetBar::new(hosts.len(), "Planning", ctx.quiet));
    let planner = FleetExecutor::new(config.clone(), transport(local))?.with_progress(bar.clone());

    let cancel = CancellationToken::new();
    let plan = block_on(&cancel, planner.plan(hosts, steps, &cancel))??;
    bar.finish();

    if cancel.is_cancelled() {
        bail!("Interrupted while planning");
    }
    print_plan(&plan, ctx.verbose > 0);
    if plan.is_converged() {
        return Ok(false);
    }

    println!();
    if !confirm_proceed()? {
        println!();
        println!("  {} Aborted", "✗".red());
        return Ok(false);
    }
    Ok(true)
}

/// Confirm with user
fn confirm_proceed() -> Result<bool> {
    use dialoguer::Confirm;

    let confirmed = Confirm::new()
        .with_prompt("Continue?")
        .default(true)
        .interact()?;

    Ok(confirmed)
}

fn print_result(result: &FleetResult, verbose: bool) {
    for host in result.failed_hosts() {
        print_failed_host(host, verbose);
    }

    let summary = result.summary();
    println!();
    if result.all_successful() {
        ui::success(&format!(
            "{} host{} converged",
            summary.total_hosts,
            plural(summary.total_hosts)
        ));
    } else {
        println!("  {} Converged with errors", "⚠".yellow().bold());
    }

    if summary.successful_hosts > 0 && !result.all_successful() {
        println!("    • {} hosts succeeded", summary.successful_hosts);
    }
    if summary.failed_hosts > 0 {
        println!("    • {} {} failed", summary.failed_hosts, "hosts".red());
    }
    for (reason, count) in skip_reasons(result) {
        println!("    • {count} hosts skipped ({reason})");
    }
    if summary.steps.applied > 0 {
        println!("    • {} steps applied", summary.steps.applied);
    }
    if summary.steps.would_apply > 0 {
        println!("    • {} steps would apply", summary.steps.would_apply);
    }
    if summary.steps.rolled_back > 0 {
        println!("    • {} steps rolled back", summary.steps.rolled_back);
    }
    if summary.steps.failed > 0 {
        println!("    • {} {} failed", summary.steps.failed, "steps".red());
    }

    if result.dry_run {
        println!();
        println!("  {} Dry run - no changes made", "ℹ".blue());
    }
    ui::dim(&format!(
        "started {}, took {}",
        result.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
        ui::format_duration(result.duration)
    ));
}

/// Skipped host counts per reason
fn skip_reasons(result: &FleetResult) -> BTreeMap<String, usize> {
    let mut reasons = BTreeMap::new();
    for host in result.skipped_hosts() {
        let reason = match &host.error {
            Some(HostError::NotStarted { reason }) => reason.clone(),
            Some(other) => other.to_string(),
            None => "not started".to_string(),
        };
        *reasons.entry(reason).or_insert(0) += 1;
    }
    reasons
}

fn print_failed_host(host: &HostResult, verbose: bool) {
    ui::section(host.host_id.as_str());
    if let Some(error) = &host.error {
        ui::error(&error.to_string());
    }
    for step in &host.step_results {
        let interesting = matches!(
            step.status,
            ResultStatus::Failed | ResultStatus::RolledBack
        ) || step.error.is_some();
        if !interesting && !verbose {
            continue;
        }
        println!(
            "  {} {:<40} {}",
            ui::result_symbol(step.status),
            step.step_id.as_str(),
            step.error.as_deref().unwrap_or_default().dimmed()
        );
    }
}
