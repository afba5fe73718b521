use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::DeckSummary;
use crate::flashcards::Card;

use super::reviews::Review;

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Authentication failed")]
    Unauthorized,
    #[error("Server error: {status} - {message}")]
    Status { status: u16, message: String },
    #[error("Request rejected by server")]
    Rejected,
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("{0}")]
    Other(String),
}

/// Response of `POST /sync/push`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushResponse {
    pub ok: bool,
    #[serde(default)]
    pub created: usize,
    /// Milliseconds since the Unix epoch
    pub server_time: i64,
}

/// Response of `GET /sync/pull`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullResponse {
    pub server_time: i64,
}

pub fn server_time_to_utc(millis: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
}

/// The remote operations the sync core depends on.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Subscribe to a list. Subscribing twice is not an error.
    async fn subscribe(&self, deck_id: &str, icon: Option<&str>) -> Result<(), RemoteError>;

    async fn unsubscribe(&self, deck_id: &str) -> Result<(), RemoteError>;

    /// Persist the order of the user's lists; array order is significant.
    async fn reorder(&self, deck_ids: &[String]) -> Result<(), RemoteError>;

    async fn delete_deck(&self, deck_id: &str) -> Result<(), RemoteError>;

    async fn push_reviews(&self, reviews: &[Review]) -> Result<PushResponse, RemoteError>;

    async fn pull(&self) -> Result<PullResponse, RemoteError>;

    async fn fetch_my_lists(&self) -> Result<Vec<DeckSummary>, RemoteError>;

    async fn fetch_all_lists(&self) -> Result<Vec<DeckSummary>, RemoteError>;

    async fn fetch_available_personal(&self) -> Result<Vec<DeckSummary>, RemoteError>;

    async fn fetch_cards(&self, deck_id: &str) -> Result<Vec<Card>, RemoteError>;
}

#[derive(Deserialize)]
struct OkResponse {
    ok: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SubscribeBody<'a> {
    deck_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    icon: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReorderBody<'a> {
    deck_ids: &'a [String],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PushBody<'a> {
    reviews: Vec<PushedReview<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PushedReview<'a> {
    card_id: &'a str,
    ok: bool,
    #[serde(skip_serializing_if = "is_blank")]
    user_answer: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reviewed_at: Option<i64>,
}

fn is_blank(s: &&str) -> bool {
    s.is_empty()
}

/// JSON-over-HTTP client for the flashcard backend
pub struct HttpRemote {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpRemote {
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> Result<Self, RemoteError> {
        // Normalize URL - ensure no trailing slash
        let base_url = base_url.trim_end_matches('/').to_string();

        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(RemoteError::InvalidUrl(
                "URL must start with http:// or https://".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// URL for `prefix/{id}{suffix}` with `id` percent-encoded as one path segment
    fn resource_url(&self, prefix: &str, id: &str, suffix: &str) -> String {
        self.url(&format!("{}/{}{}", prefix, urlencoding::encode(id), suffix))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn check(response: Response) -> Result<Response, RemoteError> {
        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(RemoteError::Unauthorized),
            status if !status.is_success() => Err(RemoteError::Status {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            }),
            _ => Ok(response),
        }
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, RemoteError> {
        let response = self.authorize(request).send().await?;
        let response = Self::check(response).await?;
        Ok(response.json::<T>().await?)
    }

    async fn send_ok(&self, request: RequestBuilder) -> Result<(), RemoteError> {
        let body: OkResponse = self.send_json(request).await?;
        if body.ok {
            Ok(())
        } else {
            Err(RemoteError::Rejected)
        }
    }
}

#[async_trait]
impl RemoteApi for HttpRemote {
    async fn subscribe(&self, deck_id: &str, icon: Option<&str>) -> Result<(), RemoteError> {
        let request = self
            .client
            .post(self.url("my-lists"))
            .json(&SubscribeBody { deck_id, icon });
        self.send_ok(request).await
    }

    async fn unsubscribe(&self, deck_id: &str) -> Result<(), RemoteError> {
        let request = self.client.delete(self.resource_url("my-lists", deck_id, ""));
        self.send_ok(request).await
    }

    async fn reorder(&self, deck_ids: &[String]) -> Result<(), RemoteError> {
        let request = self
            .client
            .put(self.url("my-lists/reorder"))
            .json(&ReorderBody { deck_ids });
        self.send_ok(request).await
    }

    async fn delete_deck(&self, deck_id: &str) -> Result<(), RemoteError> {
        let request = self.client.delete(self.resource_url("my-decks", deck_id, ""));
        self.send_ok(request).await
    }

    async fn push_reviews(&self, reviews: &[Review]) -> Result<PushResponse, RemoteError> {
        let body = PushBody {
            reviews: reviews
                .iter()
                .map(|r| PushedReview {
                    card_id: &r.card_id,
                    ok: r.ok,
                    user_answer: &r.user_answer,
                    reviewed_at: r.reviewed_at.map(|t| t.timestamp_millis()),
                })
                .collect(),
        };
        let response: PushResponse = self
            .send_json(self.client.post(self.url("sync/push")).json(&body))
            .await?;
        if !response.ok {
            return Err(RemoteError::Rejected);
        }
        Ok(response)
    }

    async fn pull(&self) -> Result<PullResponse, RemoteError> {
        self.send_json(self.client.get(self.url("sync/pull"))).await
    }

    async fn fetch_my_lists(&self) -> Result<Vec<DeckSummary>, RemoteError> {
        self.send_json(self.client.get(self.url("my-lists"))).await
    }

    async fn fetch_all_lists(&self) -> Result<Vec<DeckSummary>, RemoteError> {
        self.send_json(self.client.get(self.url("lists"))).await
    }

    async fn fetch_available_personal(&self) -> Result<Vec<DeckSummary>, RemoteError> {
        self.send_json(self.client.get(self.url("my-decks/available"))).await
    }

    async fn fetch_cards(&self, deck_id: &str) -> Result<Vec<Card>, RemoteError> {
        self.send_json(self.client.get(self.resource_url("decks", deck_id, "/cards")))
            .await
    }
}
