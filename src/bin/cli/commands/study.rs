use std::collections::HashMap;
use std::io::{self, BufRead, Write};

use anyhow::{bail, Result};
use chrono::Utc;

use flashdeck_lib::flashcards::algorithm::format_interval;
use flashdeck_lib::flashcards::{deck_progress, due_cards, Card, StudyState};

use crate::app::App;
use crate::render::{bar, bold, dim, paint, progress_label, Color};
use crate::{Grade, OutputFormat};

/// Cards of a deck and their study state, with schedules for new cards
async fn load_deck(app: &App, deck_id: &str) -> Result<(Vec<Card>, StudyState)> {
    let cards = app.core.cache.fetch_cards(deck_id).await?;
    let card_ids: Vec<String> = cards.iter().map(|c| c.id.clone()).collect();
    let state = app
        .core
        .study
        .load_study_state(deck_id, &card_ids, Utc::now())
        .await?;
    Ok((cards, state))
}

pub async fn run_grade(app: &App, deck_id: &str, card_id: &str, grade: Grade, format: &OutputFormat) -> Result<()> {
    let ok = matches!(grade, Grade::Ok);
    let state = app
        .core
        .study
        .answer_card(deck_id, card_id, ok, "", Utc::now())
        .await?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&state)?);
        }
        OutputFormat::Plain => {
            println!(
                "{} {}: next review in {}",
                card_id,
                if ok { "passed" } else { "failed" },
                format_interval(state.interval_days)
            );
        }
    }
    Ok(())
}

fn prompt(question: &str) -> Result<Option<String>> {
    print!("{}", question);
    io::stdout().flush()?;
    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

pub async fn run_session(app: &App, deck_id: &str, limit: usize, use_color: bool) -> Result<()> {
    let (cards, state) = load_deck(app, deck_id).await?;
    let by_id: HashMap<&str, &Card> = cards.iter().map(|c| (c.id.as_str(), c)).collect();
    let due: Vec<String> = due_cards(&state, Utc::now())
        .into_iter()
        .filter(|id| by_id.contains_key(id.as_str()))
        .take(limit)
        .collect();

    if due.is_empty() {
        println!("Nothing due in {}. {} reviewed today.", deck_id, state.done_today);
        return Ok(());
    }

    println!("{} card(s) due. Empty answer to reveal, Ctrl-D to stop.\n", due.len());
    let mut passed = 0;
    let mut reviewed = 0;

    for card_id in &due {
        let card = by_id[card_id.as_str()];
        println!("{}", bold(&card.front, use_color));
        let Some(answer) = prompt("> ")? else { break };
        println!("{}", paint(&card.back, Color::CYAN, use_color));

        let ok = loop {
            match prompt("Correct? [y/n] ")?.as_deref() {
                Some("y") | Some("Y") => break Some(true),
                Some("n") | Some("N") => break Some(false),
                None => break None,
                _ => continue,
            }
        };
        let Some(ok) = ok else { break };

        let graded = app
            .core
            .study
            .answer_card(deck_id, card_id, ok, &answer, Utc::now())
            .await?;
        reviewed += 1;
        if ok {
            passed += 1;
        }
        println!("{}\n", dim(&format!("next in {}", format_interval(graded.interval_days)), use_color));
    }

    println!("Reviewed {} card(s), {} correct.", reviewed, passed);
    Ok(())
}

pub async fn run_due(app: &App, deck_id: &str, format: &OutputFormat, use_color: bool) -> Result<()> {
    let (cards, state) = load_deck(app, deck_id).await?;
    let due = due_cards(&state, Utc::now());
    let fronts: HashMap<&str, &str> = cards.iter().map(|c| (c.id.as_str(), c.front.as_str())).collect();

    match format {
        OutputFormat::Json => {
            let output = serde_json::json!({
                "deckId": deck_id,
                "due": due,
                "doneToday": state.done_today,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Plain => {
            println!("{} due, {} reviewed today", due.len(), state.done_today);
            for id in &due {
                let front = fronts.get(id.as_str()).copied().unwrap_or("");
                println!("  {} {}", dim(id, use_color), front);
            }
        }
    }
    Ok(())
}

pub async fn run_progress(app: &App, deck_id: &str, format: &OutputFormat, use_color: bool) -> Result<()> {
    let (cards, state) = load_deck(app, deck_id).await?;
    if cards.is_empty() {
        bail!("Deck {} has no cards", deck_id);
    }
    let progress = deck_progress(&cards, &state.cards);

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&progress)?);
        }
        OutputFormat::Plain => {
            println!(
                "{} {} {}/{} {}",
                bold(deck_id, use_color),
                bar(progress.attempted, progress.total, 20),
                progress.attempted,
                progress.total,
                progress_label(progress.status, use_color)
            );
            for chapter in &progress.chapters {
                println!(
                    "  {:<24} {}/{} {}",
                    chapter.chapter_id.as_deref().unwrap_or("(no chapter)"),
                    chapter.attempted,
                    chapter.card_ids.len(),
                    progress_label(chapter.status, use_color)
                );
            }
        }
    }
    Ok(())
}
