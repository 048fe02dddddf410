//! Plan and result display

use colored::{ColoredString, Colorize};
use declarative::{
    ChangeResult, ChangeStatus, DiffSummary, ExecuteSummary, ExecutionPlan, Operation, StateChange,
};

fn symbol(operation: Operation) -> ColoredString {
    match operation {
        Operation::Add => "+".green(),
        Operation::Delete => "-".red(),
        Operation::Update => "~".yellow(),
        Operation::None => "=".dimmed(),
    }
}

/// One field of an UPDATE, e.g. `partitions: 3 → 6`
pub fn field_line(change: &StateChange) -> String {
    let show = |v: &Option<serde_json::Value>| {
        v.as_ref()
            .map_or_else(|| "(unset)".to_string(), ToString::to_string)
    };
    format!("{}: {} → {}", change.name, show(&change.before), show(&change.after))
}

pub fn summary_line(summary: &DiffSummary) -> String {
    format!(
        "{} to add, {} to change, {} to delete, {} unchanged",
        summary.additions, summary.updates, summary.deletions, summary.unchanged
    )
}

/// Display a plan grouped by resource type
pub fn display_plan(plan: &ExecutionPlan, verbose: bool) {
    let summary = plan.summary();
    if !summary.has_changes() {
        println!();
        println!("  {} No changes needed", "✓".green());
        if summary.unchanged > 0 {
            println!("  {}", format!("{} resource(s) up to date", summary.unchanged).dimmed());
        }
        return;
    }

    println!();
    println!(
        "┌─ {} ─────────────────────────────────────────┐",
        "Reconciliation Plan".bold()
    );
    println!("│");

    for group in &plan.groups {
        let visible: Vec<_> = group
            .changes
            .iter()
            .filter(|c| verbose || c.operation.is_mutation())
            .collect();
        if visible.is_empty() {
            continue;
        }
        println!(
            "│ {} {}",
            group.resource_type.kind.bold(),
            format!("({})", group.controller_name).dimmed()
        );

        for change in visible {
            let state_desc = match change.operation {
                Operation::Add => "(create)".to_string(),
                Operation::Delete => "(will delete)".to_string(),
                Operation::Update => format!("({} field(s))", change.effective_changes().count()),
                Operation::None => "(unchanged)".to_string(),
            };
            println!(
                "│   {} {:<30} {}",
                symbol(change.operation),
                change.name(),
                state_desc.dimmed()
            );
            if change.operation == Operation::Update {
                for field in change.effective_changes() {
                    println!("│       {}", field_line(field).dimmed());
                }
            }
        }
        println!("│");
    }

    println!("├─────────────────────────────────────────────────────┤");
    println!(
        "│ Summary: {} changes ({})",
        summary.total().to_string().bold(),
        summary_line(&summary)
    );
    println!("└─────────────────────────────────────────────────────┘");
}

/// Display one line per executed change
pub fn display_results(results: &[ChangeResult]) {
    println!();
    for result in results {
        let status = match result.status {
            ChangeStatus::Changed => "✓".green(),
            ChangeStatus::Ok => "=".dimmed(),
            ChangeStatus::Failed => "✗".red(),
        };
        let dry_run = if result.dry_run {
            " [dry-run]".blue().to_string()
        } else {
            String::new()
        };
        println!("  {status} {}{dry_run}", result.description);
        for error in &result.errors {
            println!("      {}", error.red());
        }
    }
}

/// Print final summary
pub fn print_summary(summary: &ExecuteSummary) {
    println!();
    if summary.is_success() {
        println!("  {} Changes applied successfully!", "✓".green().bold());
    } else {
        println!("  {} Changes applied with errors", "⚠".yellow().bold());
    }

    if summary.created > 0 {
        println!("    • {} resources created", summary.created);
    }
    if summary.updated > 0 {
        println!("    • {} resources updated", summary.updated);
    }
    if summary.deleted > 0 {
        println!("    • {} resources deleted", summary.deleted);
    }
    if summary.ok > 0 {
        println!("    • {} resources unchanged", summary.ok);
    }
    if summary.failed > 0 {
        println!("    • {} {} failed", summary.failed, "resources".red());
    }
}
