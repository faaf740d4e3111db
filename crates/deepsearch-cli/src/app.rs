//! CLI argument definitions

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "deepsearch")]
#[command(
    author,
    version,
    about = "Ask questions answered from live web search with LLM synthesis"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format
    #[arg(long, global = true, value_enum, default_value = "cli")]
    pub format: OutputFormat,

    /// Verbose output, includes the run's reasoning trace
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Ask a question
    Ask(AskArgs),

    /// Inspect or clear the answer cache
    Cache(CacheArgs),

    /// Show provider health and quota counters
    Providers(ProvidersArgs),

    /// Show or initialize configuration
    Config(ConfigArgs),
}

#[derive(Args)]
pub struct AskArgs {
    /// Question text
    pub query: Vec<String>,

    /// User the run and its cache entry belong to
    #[arg(long, default_value = "local")]
    pub user: String,

    /// Preferred model, matched against configured LLM providers
    #[arg(long)]
    pub model: Option<String>,

    /// Search results to request per provider
    #[arg(short = 'n', long)]
    pub max_results: Option<usize>,

    /// Conversation history file, a JSON array of {role, content}
    #[arg(long, value_name = "FILE")]
    pub history: Option<std::path::PathBuf>,

    /// Suppress the progress line on stderr
    #[arg(long)]
    pub no_progress: bool,
}

#[derive(Args)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub action: CacheAction,
}

#[derive(Subcommand)]
pub enum CacheAction {
    /// Show entry counts and disk usage
    Stats {
        /// Restrict to one user
        #[arg(long)]
        user: Option<String>,
    },
    /// Delete cached answers
    #[command(alias = "rm")]
    Clear {
        /// Restrict to one user
        #[arg(long)]
        user: Option<String>,
    },
}

#[derive(Args)]
pub struct ProvidersArgs {
    #[command(subcommand)]
    pub action: ProvidersAction,
}

#[derive(Subcommand)]
pub enum ProvidersAction {
    /// List providers with today's usage
    List,
    /// Reset health flags and usage counters
    Reset,
}

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Print the config file path
    Path,
    /// Write the default configuration to the config path
    Init,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Cli,
    Json,
    Md,
}
