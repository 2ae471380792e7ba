pub mod apply;
pub mod explain;
pub mod hosts;
pub mod ping;
pub mod plan;

use anyhow::{Context as AnyhowContext, Result};
use declarative::SharedStep;
use fleet::{FleetExecutorConfig, Host, HostId, Inventory, LocalTransport, SshTransport, Target, Transport};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::Context;
use crate::cli::FanOut;
use crate::{config, ui};

/// How long to wait for abandoned host workers when the runtime shuts down
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Load the inventory named by the global flags
pub fn load_inventory(ctx: &Context) -> Result<Inventory> {
    let path = config::inventory_path(ctx.inventory.as_deref())?;
    log::debug!("Loading inventory from {}", path.display());
    config::load_inventory(&path)
}

/// Load the steps named by the global flags
pub fn load_steps(ctx: &Context) -> Result<Vec<SharedStep>> {
    let path = config::steps_path(ctx.steps.as_deref())?;
    log::debug!("Loading steps from {}", path.display());
    config::load_steps(&path)
}

/// Hosts matched by a selector, in id order
///
/// Tokens that match nothing are reported but don't fail the selection.
pub fn select<'a>(ctx: &Context, inventory: &'a Inventory, selector: &str) -> Result<Vec<&'a Host>> {
    let target = Target::parse(selector).with_context(|| format!("Invalid selector '{selector}'"))?;
    let selection = target.select_report(inventory);

    if !ctx.quiet {
        for token in &selection.empty_tokens {
            ui::warn(&format!("'{token}' matched 0 hosts"));
        }
    }
    Ok(selection.hosts)
}

/// Hosts to run on: this machine, or the selected part of the inventory
pub fn targets(ctx: &Context, selector: &str, local: bool) -> Result<Vec<Host>> {
    if local {
        return Ok(vec![local_host()?]);
    }
    let inventory = load_inventory(ctx)?;
    Ok(select(ctx, &inventory, selector)?
        .into_iter()
        .cloned()
        .collect())
}

fn local_host() -> Result<Host> {
    Ok(Host::new(HostId::new("localhost")?))
}

pub fn transport(local: bool) -> Arc<dyn Transport> {
    if local {
        Arc::new(LocalTransport::new())
    } else {
        Arc::new(SshTransport::new())
    }
}

pub fn executor_config(fan_out: FanOut) -> FleetExecutorConfig {
    FleetExecutorConfig {
        max_parallel: fan_out.max_parallel,
        timeout: Duration::from_secs(fan_out.timeout),
        ..Default::default()
    }
}

/// Drive a fleet operation to completion
///
/// The first Ctrl-C cancels `cancel`, letting in-flight hosts stop and
/// report; a second one exits immediately.
pub fn block_on<F: Future>(cancel: &CancellationToken, future: F) -> Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let watcher = cancel.clone();
    runtime.spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted, cancelling in-flight hosts (Ctrl-C again to exit)");
            watcher.cancel();
            if tokio::signal::ctrl_c().await.is_ok() {
                std::process::exit(130);
            }
        }
    });

    let output = runtime.block_on(future);
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    Ok(output)
}

/// Plural suffix
pub fn plural(count: usize) -> &'static str {
    if count == 1 { "" } else { "s" }
}
