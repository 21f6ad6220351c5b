//! ApexClaw CLI — the main entry point.
//!
//! Commands:
//! - `chat`   — Interactive or single-message chat in the terminal
//! - `daemon` — Run the heartbeat scheduler until interrupted
//! - `tasks`  — List or cancel scheduled tasks

use clap::{Parser, Subcommand};

mod commands;
mod console;

#[derive(Parser)]
#[command(
    name = "apexclaw",
    about = "ApexClaw — a personal assistant with tools and a heartbeat scheduler",
    version,
    author
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
    /// Chat with the assistant
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Sender id to chat as (defaults to the configured owner)
        #[arg(long, env = "APEXCLAW_SENDER")]
        sender: Option<String>,
    },

    /// Run the heartbeat scheduler until Ctrl+C
    Daemon,

    /// Inspect scheduled tasks
    Tasks {
        #[command(subcommand)]
        action: TasksAction,
    },
}

#[derive(Subcommand)]
enum TasksAction {
    /// List scheduled tasks
    List,

    /// Cancel a task by label or id
    Cancel { label: String },
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
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Chat { message, sender } => commands::chat::run(message, sender).await?,
        Commands::Daemon => commands::daemon::run().await?,
        Commands::Tasks { action } => match action {
            TasksAction::List => commands::tasks::list()?,
            TasksAction::Cancel { label } => commands::tasks::cancel(&label)?,
        },
    }

    Ok(())
}
