use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use declarative::{ExtensionCategory, SelectorMatchingStrategy};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "streamform")]
#[command(version)]
#[command(about = "Declarative reconciliation of streaming platform resources", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file (default: ~/.config/streamform/config.toml)
    #[arg(long, global = true, env = "STREAMFORM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override a configuration key (repeatable)
    #[arg(long = "set", value_name = "KEY=VALUE", global = true)]
    pub overrides: Vec<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show the changes apply would make
    Diff(ResourceArgs),

    /// Make the backend match the resource files
    Apply(ApplyArgs),

    /// Run converters, transformations and validations only
    Validate(ResourceArgs),

    /// List resources of one kind as the backend has them
    Get(GetArgs),

    /// List registered extensions
    Extensions(ExtensionsArgs),

    /// Report backend health
    Health(HealthArgs),

    /// Run a named action
    Action(ActionArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Resource Arguments
// ============================================================================

#[derive(Args, Clone)]
pub struct ResourceArgs {
    /// Resource file or directory, JSON or YAML (repeatable)
    #[arg(short = 'f', long = "file", required = true)]
    pub files: Vec<PathBuf>,

    /// Selector expression, e.g. "metadata.labels.env == prod" (repeatable)
    #[arg(short = 's', long = "selector")]
    pub selectors: Vec<String>,

    /// How multiple selectors combine
    #[arg(long, value_enum, default_value = "all")]
    pub selector_match: SelectorMatch,

    /// Only act on one kind or resource (e.g. "KafkaTopic" or "KafkaTopic.orders")
    #[arg(short, long)]
    pub target: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum SelectorMatch {
    All,
    Any,
    None,
}

impl From<SelectorMatch> for SelectorMatchingStrategy {
    fn from(value: SelectorMatch) -> Self {
        match value {
            SelectorMatch::All => Self::All,
            SelectorMatch::Any => Self::Any,
            SelectorMatch::None => Self::None,
        }
    }
}

#[derive(Args)]
pub struct GetArgs {
    /// Resource kind, e.g. KafkaTopic
    pub kind: String,

    /// API version of the kind
    #[arg(long, default_value = "kafka.streamform.io/v1")]
    pub api_version: String,

    /// Selector expression (repeatable)
    #[arg(short = 's', long = "selector")]
    pub selectors: Vec<String>,

    /// How multiple selectors combine
    #[arg(long, value_enum, default_value = "all")]
    pub selector_match: SelectorMatch,

    #[arg(short, long, value_enum, default_value = "yaml")]
    pub output: OutputFormat,
}

#[derive(Args)]
pub struct ApplyArgs {
    #[command(flatten)]
    pub resources: ResourceArgs,

    /// Dry run - show what would be done
    #[arg(short, long)]
    pub dry_run: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Number of parallel jobs
    #[arg(short, long, default_value = "4")]
    pub jobs: usize,

    /// Stop waiting for outstanding changes after this many seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Delete backend resources missing from the files
    #[arg(long)]
    pub delete_orphans: bool,
}

// ============================================================================
// Other Commands
// ============================================================================

#[derive(Args)]
pub struct ExtensionsArgs {
    /// Only list one category (controller, collector, transformation, ...)
    #[arg(short, long, value_parser = parse_category)]
    pub category: Option<ExtensionCategory>,
}

fn parse_category(s: &str) -> Result<ExtensionCategory, String> {
    s.parse()
}

#[derive(Args)]
pub struct HealthArgs {
    /// Time budget per indicator in seconds
    #[arg(long, default_value = "5")]
    pub timeout_secs: u64,
}

#[derive(Args)]
pub struct ActionArgs {
    /// Action name or alias
    pub name: String,

    /// Format for resources returned by the action
    #[arg(short, long, value_enum, default_value = "yaml")]
    pub output: OutputFormat,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Yaml,
    Json,
}
