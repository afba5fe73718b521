use flashdeck_lib::flashcards::ProgressStatus;
use flashdeck_lib::sync::SyncState;

/// ANSI color codes
pub struct Color;

impl Color {
    pub const RESET: &str = "\x1b[0m";
    pub const BOLD: &str = "\x1b[1m";
    pub const DIM: &str = "\x1b[2m";
    pub const RED: &str = "\x1b[31m";
    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const CYAN: &str = "\x1b[36m";
}

pub fn paint(text: &str, color: &str, use_color: bool) -> String {
    if use_color {
        format!("{}{}{}", color, text, Color::RESET)
    } else {
        text.to_string()
    }
}

pub fn bold(text: &str, use_color: bool) -> String {
    paint(text, Color::BOLD, use_color)
}

pub fn dim(text: &str, use_color: bool) -> String {
    paint(text, Color::DIM, use_color)
}

pub fn progress_label(status: ProgressStatus, use_color: bool) -> String {
    match status {
        ProgressStatus::NotStarted => dim("not started", use_color),
        ProgressStatus::InProgress => paint("in progress", Color::YELLOW, use_color),
        ProgressStatus::Studied => paint("studied", Color::GREEN, use_color),
    }
}

pub fn sync_label(state: SyncState, use_color: bool) -> String {
    match state {
        SyncState::Idle => paint("idle", Color::GREEN, use_color),
        SyncState::Syncing => paint("syncing", Color::CYAN, use_color),
        SyncState::Offline => paint("offline", Color::YELLOW, use_color),
        SyncState::Error => paint("error", Color::RED, use_color),
    }
}

/// Text bar like `[#####-----]`
pub fn bar(done: usize, total: usize, width: usize) -> String {
    let filled = if total == 0 { 0 } else { (done * width / total).min(width) };
    format!("[{}{}]", "#".repeat(filled), "-".repeat(width - filled))
}
