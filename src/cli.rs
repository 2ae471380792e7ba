use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use declarative::FailurePolicy;
use fleet::Strategy;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "muster")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Converge machines to a declared state", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Inventory file (hosts and groups)
    #[arg(long, env = "MUSTER_INVENTORY", global = true)]
    pub inventory: Option<PathBuf>,

    /// Step file (desired state)
    #[arg(long, env = "MUSTER_STEPS", global = true)]
    pub steps: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// List hosts matched by a selector
    Hosts(HostsArgs),

    /// Check connectivity to selected hosts
    Ping(PingArgs),

    /// Show what apply would change on each host
    Plan(PlanArgs),

    /// Converge selected hosts
    Apply(ApplyArgs),

    /// Describe every step in dependency order
    Explain,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Selection
// ============================================================================

#[derive(Args)]
pub struct HostsArgs {
    /// Selector, e.g. "@web,tag:prod,!web-03"
    #[arg(default_value = "@all")]
    pub selector: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Fan-out limits shared by every fleet command
#[derive(Args, Clone, Copy)]
pub struct FanOut {
    /// Hosts in flight at once (also the rolling batch size)
    #[arg(short = 'j', long, default_value = "5")]
    pub max_parallel: usize,

    /// Per-host timeout in seconds
    #[arg(long, default_value = "300")]
    pub timeout: u64,
}

#[derive(Args)]
pub struct PingArgs {
    /// Selector, e.g. "@web,tag:prod,!web-03"
    #[arg(default_value = "@all")]
    pub selector: String,

    #[command(flatten)]
    pub fan_out: FanOut,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// ============================================================================
// Convergence
// ============================================================================

#[derive(Args)]
pub struct PlanArgs {
    /// Selector, e.g. "@web,tag:prod,!web-03"
    #[arg(default_value = "@all", conflicts_with = "local")]
    pub selector: String,

    /// Plan on this machine instead of the inventory
    #[arg(long)]
    pub local: bool,

    #[command(flatten)]
    pub fan_out: FanOut,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct ApplyArgs {
    /// Selector, e.g. "@web,tag:prod,!web-03"
    #[arg(default_value = "@all", conflicts_with = "local")]
    pub selector: String,

    /// Apply on this machine instead of the inventory
    #[arg(long)]
    pub local: bool,

    /// Rollout strategy
    #[arg(long, value_enum, default_value = "parallel")]
    pub strategy: StrategyArg,

    #[command(flatten)]
    pub fan_out: FanOut,

    /// Stop scheduling hosts after the first failure
    #[arg(long)]
    pub stop_on_error: bool,

    /// Check and plan only, report what would be applied
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// What a host does with its remaining steps after one fails
    #[arg(long, value_enum, default_value = "continue")]
    pub on_failure: FailureArg,

    /// Share of hosts in the canary phase, in (0, 1]; one host if unset
    #[arg(long)]
    pub canary_fraction: Option<f64>,

    /// Skip the confirmation prompt
    #[arg(short = 'y', long)]
    pub yes: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum StrategyArg {
    /// Every host at once, up to --max-parallel
    Parallel,
    /// Batches of --max-parallel, one after another
    Rolling,
    /// Canary hosts first, then the rest in parallel
    Canary,
}

impl From<StrategyArg> for Strategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Parallel => Self::Parallel,
            StrategyArg::Rolling => Self::Rolling,
            StrategyArg::Canary => Self::Canary,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum FailureArg {
    /// Skip dependents of the failed step, keep going
    Continue,
    /// Skip every remaining step
    Stop,
    /// Skip the rest, then undo applied steps
    Rollback,
}

impl From<FailureArg> for FailurePolicy {
    fn from(arg: FailureArg) -> Self {
        match arg {
            FailureArg::Continue => Self::Continue,
            FailureArg::Stop => Self::Stop,
            FailureArg::Rollback => Self::Rollback,
        }
    }
}
