use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "sonda")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Query typed resources on a target system", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Evaluate a compiled query and report its checks
    Run(RunArgs),

    /// Read fields of a single resource
    Get(GetArgs),

    /// List resource types and their fields
    Resources {
        /// Show only this resource type
        name: Option<String>,

        /// Print the schema as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage the sonda configuration
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Query Commands
// ============================================================================

/// Where resources are resolved
#[derive(Args, Clone, Default)]
pub struct TargetArgs {
    /// Resolve against a mock fixture instead of the configured provider
    #[arg(long, value_name = "FIXTURE", env = "SONDA_MOCK")]
    pub mock: Option<PathBuf>,

    /// Print JSON instead of text
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct RunArgs {
    /// Compiled query file (JSON)
    pub query: PathBuf,

    /// Query property, repeatable (values are parsed as JSON when possible)
    #[arg(short, long = "prop", value_name = "KEY=VALUE")]
    pub props: Vec<String>,

    /// Evaluation passes before pending fields are reported as not ready
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u16).range(1..))]
    pub max_passes: Option<u16>,

    #[command(flatten)]
    pub target: TargetArgs,
}

#[derive(Args)]
pub struct GetArgs {
    /// Resource type (e.g. file, user, os)
    pub resource: String,

    /// Fields to read
    #[arg(required = true)]
    pub fields: Vec<String>,

    /// Constructor argument, repeatable (e.g. --arg path=/etc/passwd)
    #[arg(short, long = "arg", value_name = "KEY=VALUE")]
    pub args: Vec<String>,

    #[command(flatten)]
    pub target: TargetArgs,
}

// ============================================================================
// Config Commands
// ============================================================================

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show the effective configuration
    Show,

    /// Print the config file path
    Path,

    /// Write a default config file
    Init {
        /// Overwrite an existing config file
        #[arg(short, long)]
        force: bool,
    },
}
