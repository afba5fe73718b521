mod app;
mod commands;
mod render;

use std::io::IsTerminal;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "flashdeck-cli", about = "Flashdeck lists, study and sync from the terminal", version)]
struct Cli {
    /// Config file (default: platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Work from the local cache only; changes stay queued
    #[arg(long, global = true)]
    offline: bool,

    /// Output format
    #[arg(long, global = true, default_value = "plain")]
    format: OutputFormat,

    /// Disable ANSI colors
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Plain,
    Json,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum ListKind {
    /// Lists you are subscribed to
    Mine,
    /// Every public list
    All,
    /// Your own decks you are not subscribed to
    Available,
}

#[derive(Subcommand)]
enum Command {
    /// Show deck lists
    Lists {
        #[arg(long, value_enum, default_value = "mine")]
        kind: ListKind,
    },

    /// Subscribe to a deck
    Add {
        deck: String,
        /// Icon shown next to the list
        #[arg(long)]
        icon: Option<String>,
    },

    /// Unsubscribe from a deck
    Remove { deck: String },

    /// Reorder your lists (named decks first, in the given order)
    Reorder {
        #[arg(required = true)]
        decks: Vec<String>,
    },

    /// Delete a deck you own
    Delete { deck: String },

    /// Study the due cards of a deck
    Review {
        deck: String,
        /// Grade a single card instead of running a session
        #[arg(long, requires = "result")]
        card: Option<String>,
        /// Result for --card
        #[arg(long, value_enum)]
        result: Option<Grade>,
        /// Stop after this many cards
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// List cards due now
    Due { deck: String },

    /// Chapter and deck coverage
    Progress { deck: String },

    /// Queue and sync state
    Status,

    /// Replay queued changes and push reviews now
    Sync,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum Grade {
    Ok,
    Fail,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let use_color = !cli.no_color && std::io::stdout().is_terminal();
    let app = app::App::new(cli.config.as_deref(), cli.offline).await?;

    match cli.command {
        Command::Lists { kind } => {
            commands::lists::run_show(&app, kind, &cli.format, use_color).await?;
        }
        Command::Add { deck, icon } => {
            commands::lists::run_add(&app, &deck, icon.as_deref(), &cli.format).await?;
        }
        Command::Remove { deck } => {
            commands::lists::run_remove(&app, &deck, &cli.format).await?;
        }
        Command::Reorder { decks } => {
            commands::lists::run_reorder(&app, &decks, &cli.format).await?;
        }
        Command::Delete { deck } => {
            commands::lists::run_delete(&app, &deck, &cli.format).await?;
        }
        Command::Review { deck, card, result, limit } => match (card, result) {
            (Some(card), Some(grade)) => {
                commands::study::run_grade(&app, &deck, &card, grade, &cli.format).await?;
            }
            _ => commands::study::run_session(&app, &deck, limit, use_color).await?,
        },
        Command::Due { deck } => {
            commands::study::run_due(&app, &deck, &cli.format, use_color).await?;
        }
        Command::Progress { deck } => {
            commands::study::run_progress(&app, &deck, &cli.format, use_color).await?;
        }
        Command::Status => {
            commands::sync::run_status(&app, &cli.format, use_color).await?;
        }
        Command::Sync => {
            commands::sync::run_sync(&app, &cli.format, use_color).await?;
        }
    }

    app.finish().await;
    Ok(())
}
