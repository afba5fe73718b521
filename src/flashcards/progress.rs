//! Chapter and deck coverage derived from cached cards and local review state.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::models::{Card, CardState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProgressStatus {
    /// No card has been attempted
    NotStarted,
    /// Some, but not all, cards have been attempted
    InProgress,
    /// Every card has at least one attempt
    Studied,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterProgress {
    /// `None` groups the cards that belong to no chapter
    pub chapter_id: Option<String>,
    pub card_ids: Vec<String>,
    pub attempted: usize,
    pub status: ProgressStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeckProgress {
    pub total: usize,
    pub attempted: usize,
    pub status: ProgressStatus,
    pub chapters: Vec<ChapterProgress>,
}

fn classify(attempted: usize, total: usize) -> ProgressStatus {
    if attempted == 0 {
        ProgressStatus::NotStarted
    } else if attempted == total {
        ProgressStatus::Studied
    } else {
        ProgressStatus::InProgress
    }
}

fn was_attempted(card_id: &str, states: &HashMap<String, CardState>) -> bool {
    states.get(card_id).is_some_and(CardState::attempted)
}

/// Group cards by chapter (in order of first appearance) and classify each group.
pub fn chapter_progress(cards: &[Card], states: &HashMap<String, CardState>) -> Vec<ChapterProgress> {
    let mut chapters: Vec<ChapterProgress> = Vec::new();
    let mut index: HashMap<Option<&str>, usize> = HashMap::new();

    for card in cards {
        let key = card.chapter_id.as_deref();
        let slot = *index.entry(key).or_insert_with(|| {
            chapters.push(ChapterProgress {
                chapter_id: card.chapter_id.clone(),
                card_ids: Vec::new(),
                attempted: 0,
                status: ProgressStatus::NotStarted,
            });
            chapters.len() - 1
        });

        let chapter = &mut chapters[slot];
        chapter.card_ids.push(card.id.clone());
        if was_attempted(&card.id, states) {
            chapter.attempted += 1;
        }
    }

    for chapter in &mut chapters {
        chapter.status = classify(chapter.attempted, chapter.card_ids.len());
    }
    chapters
}

/// Whole-deck summary plus the per-chapter breakdown.
pub fn deck_progress(cards: &[Card], states: &HashMap<String, CardState>) -> DeckProgress {
    let chapters = chapter_progress(cards, states);
    let attempted = chapters.iter().map(|c| c.attempted).sum();
    DeckProgress {
        total: cards.len(),
        attempted,
        status: classify(attempted, cards.len()),
        chapters,
    }
}
