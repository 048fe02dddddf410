pub mod action;
pub mod extensions;
pub mod get;
pub mod health;
pub mod reconcile;

use anyhow::Result;
use declarative::{Configuration, ExtensionRegistry};

use crate::Context;
use crate::config;
use crate::provider;

/// Registry with the built-in and local provider extensions
pub fn build_registry() -> Result<ExtensionRegistry> {
    let mut registry = ExtensionRegistry::new();
    declarative::builtin::register(&mut registry)?;
    provider::register(&mut registry)?;
    log::debug!("Registered {} extension(s)", registry.len());
    Ok(registry)
}

pub fn load_config(ctx: &Context) -> Result<Configuration> {
    config::load(ctx.config.as_deref(), &ctx.overrides)
}
