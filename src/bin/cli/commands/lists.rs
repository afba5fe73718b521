use anyhow::Result;

use flashdeck_lib::cache::DeckSummary;
use flashdeck_lib::sync::QueuedOperation;

use crate::app::App;
use crate::render::{bold, dim};
use crate::{ListKind, OutputFormat};

pub async fn run_show(app: &App, kind: ListKind, format: &OutputFormat, use_color: bool) -> Result<()> {
    let cache = &app.core.cache;
    let decks = match kind {
        ListKind::Mine => cache.fetch_my_lists().await?,
        ListKind::All => cache.fetch_all_lists().await?,
        ListKind::Available => cache.fetch_available_personal().await?,
    };

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&decks)?);
        }
        OutputFormat::Plain => {
            if decks.is_empty() {
                println!("{}", dim("(no decks)", use_color));
            }
            for deck in &decks {
                print_deck(deck, use_color);
            }
        }
    }

    Ok(())
}

fn print_deck(deck: &DeckSummary, use_color: bool) {
    let icon = deck.icon.as_deref().map(|i| format!("{} ", i)).unwrap_or_default();
    let owned = if deck.owned { " [mine]" } else { "" };
    println!(
        "{}{} {}{}",
        icon,
        bold(&deck.title, use_color),
        dim(&format!("({} cards, {})", deck.card_count, deck.id), use_color),
        owned
    );
}

fn print_queued(operation: &QueuedOperation, summary: &str, format: &OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let output = serde_json::json!({
                "id": operation.id.to_string(),
                "type": operation.op_type,
                "createdAt": operation.created_at.to_rfc3339(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Plain => {
            println!("{}", summary);
            println!("  Queued: {}", operation.id);
        }
    }
    Ok(())
}

pub async fn run_add(app: &App, deck_id: &str, icon: Option<&str>, format: &OutputFormat) -> Result<()> {
    let operation = app.core.cache.add_list(deck_id, icon).await?;
    print_queued(&operation, &format!("Subscribed to {}", deck_id), format)
}

pub async fn run_remove(app: &App, deck_id: &str, format: &OutputFormat) -> Result<()> {
    let operation = app.core.cache.remove_list(deck_id).await?;
    print_queued(&operation, &format!("Unsubscribed from {}", deck_id), format)
}

pub async fn run_reorder(app: &App, deck_ids: &[String], format: &OutputFormat) -> Result<()> {
    let operation = app.core.cache.reorder_lists(deck_ids).await?;
    print_queued(&operation, &format!("Reordered {} list(s)", deck_ids.len()), format)
}

pub async fn run_delete(app: &App, deck_id: &str, format: &OutputFormat) -> Result<()> {
    let operation = app.core.cache.delete_deck(deck_id).await?;
    print_queued(&operation, &format!("Deleted {}", deck_id), format)
}
