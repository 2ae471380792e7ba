//! `muster explain` - describe the step set without touching any host

use anyhow::Result;
use colored::Colorize;
use declarative::{ExplainContext, FailurePolicy, Reconciler};

use super::{load_steps, plural};
use crate::Context;
use crate::ui;

pub fn run(ctx: &Context) -> Result<()> {
    let steps = load_steps(ctx)?;
    let explain_ctx = ExplainContext::new(ctx.verbose > 0);
    let explanations = Reconciler::new(FailurePolicy::default()).explain(&explain_ctx, &steps)?;

    ui::header(&format!(
        "{} step{} in dependency order",
        explanations.len(),
        plural(explanations.len())
    ));
    for (index, (id, explanation)) in explanations.iter().enumerate() {
        println!();
        ui::step(index + 1, explanations.len(), &id.to_string().bold().to_string());
        if explanation.summary != id.as_str() {
            println!("  {}", explanation.summary);
        }
        for detail in &explanation.details {
            ui::dim(detail);
        }
    }
    Ok(())
}
