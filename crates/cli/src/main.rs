//! Union Bakery CLI - session store migrations and maintenance.
//!
//! # Usage
//!
//! ```bash
//! # Create the session table
//! ub-cli migrate storefront
//!
//! # Delete expired sessions
//! ub-cli sessions purge
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "ub-cli")]
#[command(author, version, about = "Union Bakery CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate {
        #[command(subcommand)]
        target: MigrateTarget,
    },
    /// Maintain the session store
    Sessions {
        #[command(subcommand)]
        action: SessionAction,
    },
}

#[derive(Subcommand)]
enum MigrateTarget {
    /// Create the storefront session table
    Storefront,
}

#[derive(Subcommand)]
enum SessionAction {
    /// Delete sessions whose expiry has passed
    Purge,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), commands::CommandError> {
    match cli.command {
        Commands::Migrate { target } => match target {
            MigrateTarget::Storefront => commands::migrate::storefront().await,
        },
        Commands::Sessions { action } => match action {
            SessionAction::Purge => commands::sessions::purge_expired().await,
        },
    }
}
