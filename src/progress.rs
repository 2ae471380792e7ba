//! Progress indicators for fleet runs
//!
//! Renders [`FleetProgress`] callbacks as an indicatif bar, printing one
//! line per finished host above it.

use colored::Colorize;
use fleet::{FleetProgress, HostId, HostPlan, HostResult};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::ui;

/// Bar over every host of a run
pub struct FleetBar {
    bar: ProgressBar,
    /// Draw nothing (quiet or machine-readable output)
    hidden: bool,
}

impl FleetBar {
    pub fn new(hosts: usize, label: &str, hidden: bool) -> Self {
        let bar = ProgressBar::new(hosts as u64);
        if hidden {
            bar.set_draw_target(ProgressDrawTarget::hidden());
        }
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        bar.set_message(label.to_string());
        Self { bar, hidden }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl FleetProgress for FleetBar {
    fn on_batch_start(&self, index: usize, total: usize, hosts: &[HostId]) {
        if self.hidden {
            return;
        }
        let names: Vec<&str> = hosts.iter().map(HostId::as_str).collect();
        self.bar
            .suspend(|| ui::step(index + 1, total, &names.join(", ")));
    }

    fn on_host_start(&self, host: &HostId) {
        self.bar.set_message(host.to_string());
    }

    fn on_host_complete(&self, result: &HostResult) {
        self.bar.inc(1);
        if self.hidden {
            return;
        }
        let symbol = ui::outcome_symbol(result.status);
        let detail = match &result.error {
            Some(error) => error.to_string().dimmed().to_string(),
            None => {
                let summary = result.step_summary();
                format!("{} changed, {} unchanged", summary.total_changes(), summary.unchanged)
                    .dimmed()
                    .to_string()
            }
        };
        self.bar.suspend(|| {
            println!(
                "  {} {:<24} {} {}",
                symbol,
                result.host_id.as_str(),
                ui::format_duration(result.duration).dimmed(),
                detail
            );
        });
    }

    fn on_host_planned(&self, plan: &HostPlan) {
        self.bar.inc(1);
        if !self.hidden
            && let Some(error) = &plan.error
        {
            self.bar.suspend(|| {
                println!("  {} {:<24} {}", "✗".red(), plan.host_id.as_str(), error);
            });
        }
    }
}
