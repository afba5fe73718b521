use anyhow::Result;

use flashdeck_lib::sync::SyncStatus;

use crate::app::App;
use crate::render::{dim, sync_label};
use crate::OutputFormat;

pub async fn run_status(app: &App, format: &OutputFormat, use_color: bool) -> Result<()> {
    let operations = app.core.sync.operations().get_all().await?;
    let pending_reviews = app.core.sync.reviews().get_pending_count().await?;
    let last_sync = app.core.sync.reviews().get_last_sync_time().await?;

    match format {
        OutputFormat::Json => {
            let output = serde_json::json!({
                "server": app.config.api_base_url,
                "online": app.is_online(),
                "operations": operations,
                "pendingReviews": pending_reviews,
                "lastSync": last_sync.map(|t| t.to_rfc3339()),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Plain => {
            let connection = if app.is_online() { "online" } else { "offline" };
            println!("Server: {} ({})", app.config.api_base_url, connection);
            println!(
                "Last sync: {}",
                last_sync
                    .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
                    .unwrap_or_else(|| "never".to_string())
            );
            println!("Pending reviews: {}", pending_reviews);
            println!("Queued changes: {}", operations.len());
            for op in &operations {
                let error = op
                    .last_error
                    .as_deref()
                    .map(|e| format!(" - {}", e))
                    .unwrap_or_default();
                println!(
                    "  {:?} {} {}{}",
                    op.op_type,
                    op.payload.deck_id.as_deref().unwrap_or("-"),
                    dim(&format!("{:?}, {} retries", op.status, op.retry_count), use_color),
                    error
                );
            }
        }
    }

    Ok(())
}

pub async fn run_sync(app: &App, format: &OutputFormat, use_color: bool) -> Result<()> {
    if !app.is_online() {
        anyhow::bail!("Server unreachable at {}; changes stay queued", app.config.api_base_url);
    }

    let status = app.core.sync.force_sync().await;
    app.core.sync.cancel_retry();
    print_status(&status, format, use_color)
}

fn print_status(status: &SyncStatus, format: &OutputFormat, use_color: bool) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(status)?);
        }
        OutputFormat::Plain => {
            println!("Sync: {}", sync_label(status.state, use_color));
            println!("  Pending: {}", status.pending_count);
            if let Some(error) = &status.last_error {
                println!("  Last error: {}", error);
            }
        }
    }
    Ok(())
}
