//! `diff`, `apply` and `validate`

use anyhow::{Result, bail};
use colored::Colorize;
use declarative::{
    AutoConfirm, ConfirmCallback, ExecuteOptions, ExecuteSummary, ExecutionPlan, Operation,
    ReconcileContext, Reconciler, Resource, parse_expressions,
};
use std::sync::Arc;
use std::time::Duration;

use super::{build_registry, load_config};
use crate::Context;
use crate::cli::{ApplyArgs, ResourceArgs};
use crate::differ;
use crate::loader;
use crate::progress::BarProgress;
use crate::ui;

struct Session {
    reconciler: Reconciler,
    context: ReconcileContext,
    resources: Vec<Resource>,
}

fn open(ctx: &Context, args: &ResourceArgs) -> Result<Session> {
    let configuration = load_config(ctx)?;
    let selector = parse_expressions(&args.selectors, args.selector_match.into())?;
    let context = ReconcileContext::new(configuration)?.with_selector(selector);
    let resources = loader::load_resources(&args.files)?;
    log::info!("Loaded {} resource(s)", resources.len());

    Ok(Session {
        reconciler: Reconciler::new(Arc::new(build_registry()?)),
        context,
        resources,
    })
}

fn plan(session: Session, target: Option<&str>) -> Result<(Reconciler, ReconcileContext, ExecutionPlan)> {
    let Session {
        reconciler,
        context,
        resources,
    } = session;
    let plan = reconciler
        .build_plan(resources, &context)?
        .filter_by_target(target);
    Ok((reconciler, context, plan))
}

/// Show what apply would change
pub fn diff(ctx: &Context, args: &ResourceArgs) -> Result<()> {
    let session = open(ctx, args)?;
    let (_, _, plan) = plan(session, args.target.as_deref())?;
    differ::display_plan(&plan, ctx.verbose > 0);
    Ok(())
}

/// Run the preparation chains and report what survives
pub fn validate(ctx: &Context, args: &ResourceArgs) -> Result<()> {
    let session = open(ctx, args)?;
    let total = session.resources.len();
    let prepared = session
        .reconciler
        .prepare(session.resources, &session.context)?;

    if !ctx.quiet {
        ui::success(&format!(
            "{} of {total} resource(s) valid and selected",
            prepared.len()
        ));
        if ctx.verbose > 0 {
            for resource in &prepared {
                ui::dim(&resource.key());
            }
        }
    }
    Ok(())
}

/// Make the backend match the resource files
pub fn apply(ctx: &Context, args: &ApplyArgs) -> Result<()> {
    let mut session = open(ctx, &args.resources)?;
    if args.delete_orphans {
        session.context = session.context.with_delete_orphans(true);
    }
    if session.context.delete_orphans && !ctx.quiet {
        ui::warn("Orphan deletion enabled: backend resources missing from the files will be deleted");
    }
    let (reconciler, context, plan) = plan(session, args.resources.target.as_deref())?;

    differ::display_plan(&plan, ctx.verbose > 0);
    if !plan.summary().has_changes() {
        return Ok(());
    }

    let mut confirm: Box<dyn ConfirmCallback> = if args.yes || args.dry_run {
        Box::new(AutoConfirm)
    } else {
        Box::new(ui::TerminalConfirm)
    };
    if !confirm.confirm("Continue?")? {
        println!();
        println!("  {} Aborted", "✗".red());
        return Ok(());
    }

    let options = ExecuteOptions {
        dry_run: args.dry_run,
        jobs: args.jobs,
        timeout: args.timeout_secs.map(Duration::from_secs),
    };
    let context = context
        .with_options(options)
        .with_progress(Arc::new(BarProgress::new(ctx.quiet)));

    let results = reconciler.execute(plan, &context);
    let shown: Vec<_> = results
        .iter()
        .filter(|r| ctx.verbose > 0 || r.change.operation != Operation::None)
        .cloned()
        .collect();
    differ::display_results(&shown);

    let summary = ExecuteSummary::from_results(&results);
    if args.dry_run {
        println!();
        println!("  {} Dry run - no changes made", "ℹ".blue());
    } else {
        differ::print_summary(&summary);
    }

    if !summary.is_success() {
        bail!("{} change(s) failed", summary.failed);
    }
    Ok(())
}
