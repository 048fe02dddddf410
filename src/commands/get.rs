use anyhow::Result;
use declarative::{ReconcileContext, Reconciler, ResourceType, parse_expressions};
use std::sync::Arc;

use super::action::render;
use super::{build_registry, load_config};
use crate::Context;
use crate::cli::GetArgs;
use crate::ui;

/// Print the resources of one kind as its collector reports them
pub fn run(ctx: &Context, args: &GetArgs) -> Result<()> {
    let configuration = load_config(ctx)?;
    let selector = parse_expressions(&args.selectors, args.selector_match.into())?;
    let context = ReconcileContext::new(configuration)?.with_selector(selector);

    let resource_type = ResourceType::from_api_version(&args.api_version, args.kind.as_str());
    let reconciler = Reconciler::new(Arc::new(build_registry()?));
    let resources = reconciler.collect(&resource_type, &context)?;

    if !ctx.quiet {
        ui::info(&format!("{} {resource_type} resource(s)", resources.len()));
    }
    if !resources.is_empty() {
        print!("{}", render(&resources, args.output)?);
    }
    Ok(())
}
