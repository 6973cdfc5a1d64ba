//! Parley CLI: the main entry point.
//!
//! Commands:
//! - `serve`      Start the HTTP gateway
//! - `ask`        Send one message to a running gateway and stream the reply
//! - `reindex`    Recompute knowledge embeddings
//! - `pool`       Manage the provider pool
//! - `words`      Manage the sensitive-word lexicon
//! - `ban`        Ban or unban a user
//! - `knowledge`  Add knowledge entries
//! - `config`     Show or locate the configuration

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "parley",
    about = "Parley: moderated, knowledge-grounded chat bot backend",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Send one message to a running gateway
    Ask {
        message: String,

        /// Gateway base URL
        #[arg(long, env = "PARLEY_URL", default_value = "http://127.0.0.1:8765")]
        url: String,

        #[arg(long, default_value = "cli")]
        user: String,

        #[arg(long, default_value = "cli")]
        channel: String,
    },

    /// Recompute embeddings for every active knowledge entry
    Reindex,

    /// Manage the provider pool
    Pool {
        #[command(subcommand)]
        action: commands::pool::PoolAction,
    },

    /// Manage the sensitive-word lexicon
    Words {
        #[command(subcommand)]
        action: commands::words::WordsAction,
    },

    /// Ban or unban a user
    Ban {
        #[command(subcommand)]
        action: commands::ban::BanAction,
    },

    /// Manage knowledge entries
    Knowledge {
        #[command(subcommand)]
        action: commands::knowledge::KnowledgeAction,
    },

    /// Show configuration
    Config {
        #[command(subcommand)]
        action: commands::config_cmd::ConfigAction,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Serve { port } => commands::serve::run(port).await?,
        Commands::Ask {
            message,
            url,
            user,
            channel,
        } => commands::ask::run(&url, &user, &channel, &message).await?,
        Commands::Reindex => commands::reindex::run().await?,
        Commands::Pool { action } => commands::pool::run(action).await?,
        Commands::Words { action } => commands::words::run(action).await?,
        Commands::Ban { action } => commands::ban::run(action).await?,
        Commands::Knowledge { action } => commands::knowledge::run(action).await?,
        Commands::Config { action } => commands::config_cmd::run(action).await?,
    }

    Ok(())
}
