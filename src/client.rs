//! HTTP client for the Tavern Keeper JSON API.
//!
//! [`TavernClient::fetch`] is the single read primitive: it throttles, follows
//! pagination and merges every page into one [`Document`]. Failures never
//! escape as errors; they are logged and reported as `None`.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, COOKIE};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use thiserror::Error;

use crate::config::{Config, SESSION_COOKIE};
use crate::document::Document;

const API_PREFIX: &str = "/api_v0";
const CSRF_HEADER: &str = "X-CSRF-Token";
const CSRF_PLACEHOLDER: &str = "something";

/// Query parameters for a request.
pub type Query<'a> = &'a [(&'a str, &'a str)];

/// HTTP client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unauthorized: session cookie missing or expired ({0})")]
    Unauthorized(StatusCode),

    #[error("{status} from {url}")]
    Status { status: StatusCode, url: String },

    #[error("response from {0} is not a JSON object")]
    NotAnObject(String),

    #[error("invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),
}

/// Authenticated, throttled client for one API host.
#[derive(Debug, Clone)]
pub struct TavernClient {
    host: String,
    user_id: String,
    delay: Duration,
    /// Session headers; only ever sent to `host`.
    session: HeaderMap,
    client: Client,
}

impl TavernClient {
    pub fn new(config: &Config) -> Result<Self, ClientError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let mut session = HeaderMap::new();
        session.insert(CSRF_HEADER, HeaderValue::from_static(CSRF_PLACEHOLDER));
        let mut cookie = HeaderValue::from_str(&format!("{}={}", SESSION_COOKIE, config.cookie))?;
        cookie.set_sensitive(true);
        session.insert(COOKIE, cookie);

        let client = Client::builder().default_headers(headers).build()?;
        Ok(Self {
            host: config.host.trim_end_matches('/').to_string(),
            user_id: config.user_id.clone(),
            delay: config.delay,
            session,
            client,
        })
    }

    fn is_own_host(&self, url: &str) -> bool {
        url.strip_prefix(self.host.as_str())
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/') || rest.starts_with('?'))
    }

    /// Fetch a resource and all of its pages as one merged document.
    ///
    /// Returns `None` when the first page cannot be retrieved. Later pages that
    /// fail are skipped and the partial result is still returned.
    pub async fn fetch(&self, endpoint: &str, query: Query<'_>) -> Option<Document> {
        let mut document = match self.get_page(endpoint, query, None).await {
            Ok(document) => document,
            Err(e) => {
                tracing::warn!(%endpoint, "Request failed: {}", e);
                return None;
            }
        };

        let pages = document.page_count();
        for page in 2..=pages {
            match self.get_page(endpoint, query, Some(page)).await {
                Ok(fragment) => document.merge(fragment),
                Err(e) => tracing::warn!(%endpoint, page, "Skipping page: {}", e),
            }
        }

        Some(document)
    }

    /// One throttled GET, decoded as a document.
    async fn get_page(
        &self,
        endpoint: &str,
        query: Query<'_>,
        page: Option<u64>,
    ) -> Result<Document, ClientError> {
        tokio::time::sleep(self.delay).await;

        let url = format!("{}{}", self.host, endpoint);
        let mut req = self
            .client
            .get(&url)
            .headers(self.session.clone())
            .query(query);
        if let Some(page) = page {
            req = req.query(&[("page", page)]);
        }
        tracing::info!(page = page.unwrap_or(1), "GET: {}", url);

        let response = req.send().await?;
        let status = response.status();
        match status {
            s if s.is_success() => {}
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(ClientError::Unauthorized(status))
            }
            _ => return Err(ClientError::Status { status, url }),
        }

        let body: Value = response.json().await?;
        Document::from_value(body).map_err(|_| ClientError::NotAnObject(url))
    }

    /// Download raw bytes, e.g. a character portrait.
    ///
    /// Relative URLs are resolved against the API host. Session headers are
    /// sent only when the URL points at the API host.
    pub async fn download(&self, url: &str) -> Option<Vec<u8>> {
        match self.try_download(url).await {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                tracing::warn!(%url, "Download failed: {}", e);
                None
            }
        }
    }

    async fn try_download(&self, url: &str) -> Result<Vec<u8>, ClientError> {
        tokio::time::sleep(self.delay).await;

        let url = if url.starts_with('/') {
            format!("{}{}", self.host, url)
        } else {
            url.to_string()
        };
        tracing::info!("GET: {}", url);

        let mut req = self.client.get(&url).header(ACCEPT, "*/*");
        if self.is_own_host(&url) {
            req = req.headers(self.session.clone());
        }
        let response = req.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status { status, url });
        }
        Ok(response.bytes().await?.to_vec())
    }

    // ============================================================
    // User
    // ============================================================

    pub async fn get_current_user(&self) -> Option<Document> {
        self.fetch(&format!("{}/users/{}", API_PREFIX, self.user_id), &[])
            .await
    }

    // ============================================================
    // Direct messages
    // ============================================================

    pub async fn get_messages(&self) -> Option<Document> {
        self.fetch(&format!("{}/messages", API_PREFIX), &[("filter", "all")])
            .await
    }

    pub async fn get_message(&self, message_id: &str) -> Option<Document> {
        self.fetch(&format!("{}/messages/{}", API_PREFIX, message_id), &[])
            .await
    }

    pub async fn get_message_comments(&self, message_id: &str) -> Option<Document> {
        self.fetch(
            &format!("{}/messages/{}/comments", API_PREFIX, message_id),
            &[],
        )
        .await
    }

    // ============================================================
    // Characters
    // ============================================================

    pub async fn get_characters(&self, archived: bool) -> Option<Document> {
        let endpoint = format!("{}/users/{}/characters", API_PREFIX, self.user_id);
        if archived {
            self.fetch(&endpoint, &[("archived", "true")]).await
        } else {
            self.fetch(&endpoint, &[]).await
        }
    }

    pub async fn get_character(&self, character_id: &str) -> Option<Document> {
        self.fetch(&format!("{}/characters/{}", API_PREFIX, character_id), &[])
            .await
    }

    // ============================================================
    // Campaigns
    // ============================================================

    pub async fn get_campaigns(&self) -> Option<Document> {
        self.fetch(
            &format!("{}/users/{}/campaigns", API_PREFIX, self.user_id),
            &[],
        )
        .await
    }

    pub async fn get_campaign_characters(&self, campaign_id: &str) -> Option<Document> {
        self.fetch(
            &format!("{}/campaigns/{}/characters", API_PREFIX, campaign_id),
            &[],
        )
        .await
    }

    pub async fn get_campaign_roleplays(&self, campaign_id: &str) -> Option<Document> {
        self.fetch(
            &format!("{}/campaigns/{}/roleplays", API_PREFIX, campaign_id),
            &[],
        )
        .await
    }

    pub async fn get_roleplay(&self, roleplay_id: &str) -> Option<Document> {
        self.fetch(&format!("{}/roleplays/{}", API_PREFIX, roleplay_id), &[])
            .await
    }

    pub async fn get_roleplay_messages(&self, roleplay_id: &str) -> Option<Document> {
        self.fetch(
            &format!("{}/roleplays/{}/messages", API_PREFIX, roleplay_id),
            &[],
        )
        .await
    }

    pub async fn get_roleplay_message_comments(
        &self,
        roleplay_id: &str,
        message_id: &str,
    ) -> Option<Document> {
        self.fetch(
            &format!(
                "{}/roleplays/{}/messages/{}/comments",
                API_PREFIX, roleplay_id, message_id
            ),
            &[],
        )
        .await
    }

    pub async fn get_campaign_discussions(&self, campaign_id: &str) -> Option<Document> {
        self.fetch(
            &format!("{}/campaigns/{}/discussions", API_PREFIX, campaign_id),
            &[],
        )
        .await
    }

    pub async fn get_discussion(
        &self,
        campaign_id: &str,
        discussion_id: &str,
    ) -> Option<Document> {
        self.fetch(
            &format!(
                "{}/campaigns/{}/discussions/{}",
                API_PREFIX, campaign_id, discussion_id
            ),
            &[],
        )
        .await
    }

    pub async fn get_discussion_comments(
        &self,
        campaign_id: &str,
        discussion_id: &str,
    ) -> Option<Document> {
        self.fetch(
            &format!(
                "{}/campaigns/{}/discussions/{}/comments",
                API_PREFIX, campaign_id, discussion_id
            ),
            &[],
        )
        .await
    }
}
