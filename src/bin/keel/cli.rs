//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use keel::core::BLUEPRINT_NAME;

/// Keel - resolve entity blueprints and validate generated backends
#[derive(Parser)]
#[command(name = "keel")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve the relations declared in a blueprint
    Relations(RelationsArgs),

    /// Install, build, start and probe a generated backend
    Validate(ValidateArgs),

    /// Type-check a generated backend without running it
    Check(CheckArgs),

    /// Type-check every generated backend under a directory
    CheckBatch(CheckBatchArgs),

    /// Kill whatever is listening on a port
    KillPort(KillPortArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args)]
pub struct RelationsArgs {
    /// Blueprint file
    #[arg(default_value = BLUEPRINT_NAME)]
    pub blueprint: PathBuf,

    /// Write the blueprint with inverse fields filled in
    #[arg(long, short)]
    pub write: Option<PathBuf>,

    /// Output format: human, json
    #[arg(long, default_value = "human")]
    pub output_format: String,

    /// Fail if any relation was dropped or replaced
    #[arg(long)]
    pub strict: bool,
}

#[derive(Args)]
pub struct ValidateArgs {
    /// Project directory
    #[arg(default_value = ".")]
    pub project: PathBuf,

    /// Endpoint to probe, e.g. "GET /owners" (repeatable)
    #[arg(long = "endpoint", short = 'e')]
    pub endpoints: Vec<String>,

    /// Base URL of the running server (defaults to the configured port)
    #[arg(long)]
    pub base_url: Option<String>,

    /// Run the static check first and report both
    #[arg(long)]
    pub syntactic: bool,

    /// Output format: human, json, github
    #[arg(long, default_value = "human")]
    pub output_format: String,

    /// Save the JSON report to a file
    #[arg(long)]
    pub save: Option<PathBuf>,
}

#[derive(Args)]
pub struct CheckArgs {
    /// Project directory
    #[arg(default_value = ".")]
    pub project: PathBuf,

    /// Only check the project structure
    #[arg(long)]
    pub skip_compilation: bool,

    /// Output format: human, json, github
    #[arg(long, default_value = "human")]
    pub output_format: String,
}

#[derive(Args)]
pub struct CheckBatchArgs {
    /// Directory containing the projects
    #[arg(default_value = ".")]
    pub base: PathBuf,

    /// Glob for project directory names (defaults to the configured pattern)
    #[arg(long)]
    pub pattern: Option<String>,

    /// Number of parallel jobs
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Only check the project structure
    #[arg(long)]
    pub skip_compilation: bool,

    /// Output format: human, json
    #[arg(long, default_value = "human")]
    pub output_format: String,

    /// Save the JSON report to a file
    #[arg(long)]
    pub save: Option<PathBuf>,
}

#[derive(Args)]
pub struct KillPortArgs {
    /// Port to free (defaults to the configured port)
    #[arg(long, short)]
    pub port: Option<u16>,
}

#[derive(Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}
