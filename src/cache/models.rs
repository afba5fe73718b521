use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Deck as shown in list collections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeckSummary {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default)]
    pub card_count: usize,
    /// Authored by the current user (returns to "available personal" when unsubscribed)
    #[serde(default)]
    pub owned: bool,
}

/// A cached collection and the time it was written
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedEntry<T> {
    pub data: T,
    pub timestamp: DateTime<Utc>,
}

impl<T> CachedEntry<T> {
    pub fn new(data: T, now: DateTime<Utc>) -> Self {
        Self { data, timestamp: now }
    }

    pub fn is_fresh(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        now - self.timestamp < ttl
    }
}
