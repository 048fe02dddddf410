use anyhow::{Context as AnyhowContext, Result, bail};
use declarative::{ExtensionCategory, Resource};

use super::{build_registry, load_config};
use crate::Context;
use crate::cli::{ActionArgs, OutputFormat};
use crate::ui;

/// Run an action by name or alias and print what it returns
pub fn run(ctx: &Context, args: &ActionArgs) -> Result<()> {
    let registry = build_registry()?;
    let configuration = load_config(ctx)?;

    let descriptor = registry.get(&args.name)?;
    if descriptor.category != ExtensionCategory::Action {
        bail!("'{}' is a {}, not an action", args.name, descriptor.category);
    }
    let Some(action) = registry
        .instantiate(descriptor, &configuration)?
        .into_action()
    else {
        bail!("'{}' is not an action", args.name);
    };

    let outcome = action
        .execute(&configuration)
        .with_context(|| format!("Action '{}' failed", descriptor.name))?;
    if !ctx.quiet {
        ui::info(&outcome.message);
    }
    if !outcome.resources.is_empty() {
        print!("{}", render(&outcome.resources, args.output)?);
    }
    Ok(())
}

/// Render resources so they can be fed back to `apply`
pub fn render(resources: &[Resource], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(format!("{}\n", serde_json::to_string_pretty(resources)?)),
        OutputFormat::Yaml => {
            let mut out = String::new();
            for resource in resources {
                out.push_str("---\n");
                out.push_str(&serde_yaml::to_string(resource)?);
            }
            Ok(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader;
    use serde_json::json;

    #[test]
    fn test_rendered_yaml_loads_back() {
        let resources = vec![
            Resource::new("kafka.streamform.io/v1", "KafkaTopic", "a", json!({"partitions": 1})),
            Resource::new("kafka.streamform.io/v1", "KafkaTopic", "b", json!({"partitions": 2})),
        ];
        let yaml = render(&resources, OutputFormat::Yaml).unwrap();
        assert_eq!(loader::parse_yaml(&yaml).unwrap(), resources);

        let json = render(&resources, OutputFormat::Json).unwrap();
        assert_eq!(loader::parse_json(&json).unwrap(), resources);
    }
}
