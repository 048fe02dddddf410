use anyhow::Result;
use colored::Colorize;
use declarative::{ExtensionCategory, ExtensionDescriptor};

use super::build_registry;
use crate::Context;
use crate::cli::ExtensionsArgs;
use crate::ui;

pub fn run(ctx: &Context, args: &ExtensionsArgs) -> Result<()> {
    let registry = build_registry()?;
    let categories: Vec<ExtensionCategory> = match args.category {
        Some(category) => vec![category],
        None => ExtensionCategory::ALL.to_vec(),
    };

    for category in categories {
        let descriptors = registry.all(category);
        if descriptors.is_empty() {
            continue;
        }
        ui::section(&format!("{category} ({})", descriptors.len()));
        for descriptor in descriptors {
            print_descriptor(descriptor, ctx.verbose > 0);
        }
    }
    Ok(())
}

fn print_descriptor(descriptor: &ExtensionDescriptor, verbose: bool) {
    println!(
        "  {} {}",
        descriptor.name.bold(),
        descriptor.description.dimmed()
    );
    if verbose {
        ui::kv("  aliases", &descriptor.aliases().join(", "));
        ui::kv("  accepts", &descriptor.accepts.to_string());
        ui::kv("  priority", &descriptor.priority.to_string());
        if let Some(provider) = &descriptor.provider {
            ui::kv("  provider", provider);
        }
    }
}
