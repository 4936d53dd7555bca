//! Adaptive Optimizer CLI
//!
//! A command-line tool for inspecting the optimizer, triggering
//! optimization runs and managing scaling policies.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{optimization, scaling};
use std::path::PathBuf;

/// Adaptive Optimizer CLI
#[derive(Parser)]
#[command(name = "optctl")]
#[command(author, version, about = "CLI for the Adaptive Optimizer", long_about = None)]
pub struct Cli {
    /// API endpoint URL (can also be set via OPTCTL_API_URL env var)
    #[arg(long, env = "OPTCTL_API_URL")]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short)]
    pub format: Option<output::OutputFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show optimizer state, tunables and prediction accuracy
    Status,

    /// Show the performance baseline
    Baseline,

    /// Show recent optimization and scaling history
    History {
        /// Number of entries to show
        #[arg(long, short, default_value = "20")]
        limit: usize,
    },

    /// Run an optimization cycle now
    Optimize {
        /// Restrict the plan to one component (coordinator, qa, load_balancer,
        /// infrastructure, cache, predictor)
        #[arg(long, short)]
        component: Option<String>,
    },

    /// Manage scaling policies
    #[command(subcommand)]
    Policies(PolicyCommands),

    /// Show the scaling decision a policy would take now, without acting
    Decision {
        /// Policy ID
        policy: String,
    },
}

#[derive(Subcommand)]
pub enum PolicyCommands {
    /// List policies
    List,

    /// Show a policy
    Get {
        /// Policy ID
        id: String,
    },

    /// Create or update a policy from a JSON file
    Apply {
        /// Policy file
        #[arg(long, short = 'f')]
        file: PathBuf,
    },

    /// Delete a policy
    Delete {
        /// Policy ID
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::Config::load()?;

    let format = config.resolve_format(cli.format);
    let client = client::ApiClient::new(&config.resolve_api_url(cli.api_url))?;

    match cli.command {
        Commands::Status => optimization::show_status(&client, format).await?,
        Commands::Baseline => optimization::show_baseline(&client, format).await?,
        Commands::History { limit } => optimization::show_history(&client, limit, format).await?,
        Commands::Optimize { component } => {
            optimization::run_optimization(&client, component, format).await?
        }
        Commands::Policies(policy_cmd) => match policy_cmd {
            PolicyCommands::List => scaling::list_policies(&client, format).await?,
            PolicyCommands::Get { id } => scaling::get_policy(&client, &id, format).await?,
            PolicyCommands::Apply { file } => scaling::apply_policy(&client, &file, format).await?,
            PolicyCommands::Delete { id } => scaling::delete_policy(&client, &id, format).await?,
        },
        Commands::Decision { policy } => scaling::show_decision(&client, &policy, format).await?,
    }

    Ok(())
}
