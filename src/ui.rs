use colored::Colorize;
use declarative::{Diff, DiffKind, ResultStatus, StepStatus};
use fleet::HostOutcome;
use std::time::Duration;

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a section header
pub fn section(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// Print a step indicator
pub fn step(num: usize, total: usize, msg: &str) {
    println!("{} {}", format!("[{num}/{total}]").blue().bold(), msg);
}

// ============================================================================
// Status Symbols
// ============================================================================

pub fn outcome_symbol(outcome: HostOutcome) -> String {
    match outcome {
        HostOutcome::Succeeded => "✓".green().to_string(),
        HostOutcome::Failed => "✗".red().to_string(),
        HostOutcome::Skipped => "⊘".dimmed().to_string(),
    }
}

pub fn result_symbol(status: ResultStatus) -> String {
    match status {
        ResultStatus::Unchanged => "○".dimmed().to_string(),
        ResultStatus::Applied => "✓".green().to_string(),
        ResultStatus::WouldApply => "~".yellow().to_string(),
        ResultStatus::Failed => "✗".red().to_string(),
        ResultStatus::Skipped => "⊘".dimmed().to_string(),
        ResultStatus::RolledBack => "↺".yellow().to_string(),
    }
}

pub fn status_symbol(status: StepStatus) -> String {
    match status {
        StepStatus::Satisfied => "○".dimmed().to_string(),
        StepStatus::NeedsApply => "→".cyan().to_string(),
        StepStatus::Unknown => "?".yellow().to_string(),
    }
}

pub fn kind_symbol(kind: DiffKind) -> String {
    let symbol = kind.to_string();
    match kind {
        DiffKind::Add => symbol.green().to_string(),
        DiffKind::Modify => symbol.yellow().to_string(),
        DiffKind::Remove => symbol.red().to_string(),
        DiffKind::NoOp => symbol.dimmed().to_string(),
    }
}

// ============================================================================
// Diff Rendering
// ============================================================================

/// Print the old and new sides of a diff, indented under its step
pub fn print_diff(diff: &Diff, indent: &str) {
    let old = diff.old.as_deref().unwrap_or("");
    let new = diff.new.as_deref().unwrap_or("");
    for line in diff_lines(old, new) {
        println!("{indent}{line}");
    }
}

/// Changed lines between two texts, `- ` for removed and `+ ` for added
fn diff_lines(old: &str, new: &str) -> Vec<String> {
    let diff = similar::TextDiff::from_lines(old, new);
    let mut lines = Vec::new();

    for change in diff.iter_all_changes() {
        let text = change.value().trim_end_matches('\n');
        match change.tag() {
            similar::ChangeTag::Delete => lines.push(format!("- {text}").red().to_string()),
            similar::ChangeTag::Insert => lines.push(format!("+ {text}").green().to_string()),
            similar::ChangeTag::Equal => {}
        }
    }
    lines
}

// ============================================================================
// Duration Formatting
// ============================================================================

/// Format a duration for humans: `850ms`, `12.3s`, `4m05s`
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis < 1000 {
        format!("{millis}ms")
    } else if millis < 60_000 {
        format!("{:.1}s", duration.as_secs_f64())
    } else {
        let secs = duration.as_secs();
        format!("{}m{:02}s", secs / 60, secs % 60)
    }
}

// ============================================================================
// Tests
// ============================================================================
