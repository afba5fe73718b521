//! Spaced repetition for flashcard decks
//!
//! This module provides:
//! - Pass/fail scheduling of individual cards
//! - Per-deck study state (card schedules, daily counter)
//! - Chapter and deck progress derived from review state

pub mod algorithm;
pub mod models;
pub mod progress;
pub mod storage;

pub use models::*;
pub use progress::{chapter_progress, deck_progress, ChapterProgress, DeckProgress, ProgressStatus};
pub use storage::{due_cards, StudyError, StudyStore};
