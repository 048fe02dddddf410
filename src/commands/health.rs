use anyhow::{Result, bail};
use colored::Colorize;
use declarative::{ExtensionCategory, HealthStatus};
use std::time::Duration;

use super::{build_registry, load_config};
use crate::Context;
use crate::cli::HealthArgs;
use crate::ui;

/// Query every health indicator; fails if any reports DOWN
pub fn run(ctx: &Context, args: &HealthArgs) -> Result<()> {
    let registry = build_registry()?;
    let configuration = load_config(ctx)?;
    let timeout = Duration::from_secs(args.timeout_secs);

    ui::header("Backend Health");
    let mut down = 0;
    for descriptor in registry.all(ExtensionCategory::HealthIndicator) {
        let Some(indicator) = registry
            .instantiate(descriptor, &configuration)?
            .into_health_indicator()
        else {
            continue;
        };
        let health = indicator.get_health(timeout);
        let status = match health.status {
            HealthStatus::Up => "UP".green(),
            HealthStatus::Down => {
                down += 1;
                "DOWN".red()
            }
            HealthStatus::Unknown => "UNKNOWN".yellow(),
        };
        println!("  {} {} {}", status.bold(), health.name, format!("({})", descriptor.name).dimmed());
        for (key, value) in &health.details {
            let value = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            ui::kv(&format!("  {key}"), &value);
        }
    }

    if down > 0 {
        bail!("{down} health indicator(s) report DOWN");
    }
    Ok(())
}
