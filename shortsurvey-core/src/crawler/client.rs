//! HTTP client for the YouTube Data API `commentThreads.list` endpoint
//!
//! Each page holds top-level comments with the replies the API embeds. Pages
//! are walked with `nextPageToken` until it is absent.

use std::future::Future;
use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;

use crate::config::CrawlerConfig;
use crate::error::{Error, Result};
use crate::types::Comment;

/// One page of comment threads, already flattened into store rows.
#[derive(Debug, Clone, Default)]
pub struct ThreadPage {
    /// Top-level comments followed by their replies
    pub comments: Vec<Comment>,
    pub next_page_token: Option<String>,
}

/// Anything that can list comment thread pages for a platform video.
pub trait CommentSource: Send + Sync {
    /// Fetch one page. `video_url` is stored on every returned comment;
    /// `platform_id` is what the platform is queried with.
    fn fetch_page(
        &self,
        video_url: &str,
        platform_id: &str,
        page_token: Option<&str>,
    ) -> impl Future<Output = Result<ThreadPage>> + Send;
}

// Wire format of commentThreads.list (only the fields we keep)

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThreadListResponse {
    #[serde(default)]
    items: Vec<ThreadItem>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThreadItem {
    id: String,
    snippet: ThreadSnippet,
    replies: Option<ThreadReplies>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThreadSnippet {
    top_level_comment: CommentResource,
}

#[derive(Debug, Deserialize)]
struct ThreadReplies {
    #[serde(default)]
    comments: Vec<CommentResource>,
}

#[derive(Debug, Deserialize)]
struct CommentResource {
    id: String,
    snippet: CommentSnippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentSnippet {
    #[serde(default)]
    author_display_name: String,
    #[serde(default)]
    text_display: String,
    #[serde(default)]
    published_at: String,
    #[serde(default)]
    like_count: i64,
    author_profile_image_url: Option<String>,
}

impl CommentResource {
    fn into_comment(self, video_url: &str, parent_id: Option<&str>) -> Comment {
        Comment {
            seq: 0,
            comment_id: self.id,
            video_id: video_url.to_string(),
            parent_id: parent_id.map(str::to_string),
            author: self.snippet.author_display_name,
            text: self.snippet.text_display,
            published_at: self.snippet.published_at,
            like_count: self.snippet.like_count,
            avatar_url: self.snippet.author_profile_image_url,
        }
    }
}

impl ThreadListResponse {
    fn into_page(self, video_url: &str) -> ThreadPage {
        let mut comments = Vec::new();
        for item in self.items {
            let thread_id = item.id;
            comments.push(item.snippet.top_level_comment.into_comment(video_url, None));
            if let Some(replies) = item.replies {
                for reply in replies.comments {
                    comments.push(reply.into_comment(video_url, Some(&thread_id)));
                }
            }
        }
        ThreadPage {
            comments,
            next_page_token: self.next_page_token,
        }
    }
}

/// Failure of a single API call, before retry classification
#[derive(Debug)]
enum CallError {
    /// Network error or timeout
    Transport(String),
    /// Non-success HTTP status
    Status(StatusCode, String),
    /// Unreadable body
    Decode(String),
}

impl CallError {
    fn is_retryable(&self) -> bool {
        match self {
            CallError::Transport(_) => true,
            CallError::Status(status, _) => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            CallError::Decode(_) => false,
        }
    }
}

impl From<CallError> for Error {
    fn from(e: CallError) -> Self {
        match e {
            CallError::Transport(msg) => Error::Crawl(format!("HTTP request failed: {}", msg)),
            CallError::Status(status, body) => {
                Error::Crawl(format!("API error ({}): {}", status, body))
            }
            CallError::Decode(msg) => Error::Crawl(format!("failed to parse response: {}", msg)),
        }
    }
}

/// HTTP client for the platform comment API
pub struct YouTubeClient {
    config: CrawlerConfig,
    api_key: String,
    http_client: reqwest::Client,
    base_url: String,
}

impl YouTubeClient {
    /// Create a client from configuration
    ///
    /// Returns an error if no API key is configured.
    pub fn new(config: CrawlerConfig) -> Result<Self> {
        config.validate()?;

        let api_key = config
            .resolved_api_key()
            .ok_or_else(|| Error::Config("crawler.api_key is required".to_string()))?;
        let base_url = config.api_base_url.trim_end_matches('/').to_string();

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config,
            api_key,
            http_client,
            base_url,
        })
    }

    fn page_url(&self, platform_id: &str, page_token: Option<&str>) -> String {
        let mut url = format!(
            "{}/commentThreads?part=snippet,replies&videoId={}&maxResults={}&key={}",
            self.base_url,
            urlencoding::encode(platform_id),
            self.config.page_size,
            urlencoding::encode(&self.api_key),
        );
        if let Some(token) = page_token {
            url.push_str("&pageToken=");
            url.push_str(&urlencoding::encode(token));
        }
        url
    }

    async fn fetch_once(
        &self,
        video_url: &str,
        platform_id: &str,
        page_token: Option<&str>,
    ) -> std::result::Result<ThreadPage, CallError> {
        let response = self
            .http_client
            .get(self.page_url(platform_id, page_token))
            .send()
            .await
            .map_err(|e| CallError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown".to_string());
            return Err(CallError::Status(status, error_text));
        }

        let body: ThreadListResponse = response
            .json()
            .await
            .map_err(|e| CallError::Decode(e.to_string()))?;
        Ok(body.into_page(video_url))
    }

    /// Fetch a page, retrying transient failures (5xx, 429, timeouts) with
    /// exponential backoff.
    pub async fn fetch_page_with_retry(
        &self,
        video_url: &str,
        platform_id: &str,
        page_token: Option<&str>,
    ) -> Result<ThreadPage> {
        let mut delay = Duration::from_millis(500);

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                tracing::debug!(
                    "Retrying commentThreads.list (attempt {}/{}), waiting {:?}",
                    attempt + 1,
                    self.config.max_retries + 1,
                    delay
                );
                tokio::time::sleep(delay).await;
                delay = std::cmp::min(delay * 2, Duration::from_secs(30));
            }

            match self.fetch_once(video_url, platform_id, page_token).await {
                Ok(page) => return Ok(page),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    tracing::warn!(platform_id, "Transient error listing comments: {:?}", e);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(Error::Crawl("max retries exceeded".to_string()))
    }
}

impl CommentSource for YouTubeClient {
    fn fetch_page(
        &self,
        video_url: &str,
        platform_id: &str,
        page_token: Option<&str>,
    ) -> impl Future<Output = Result<ThreadPage>> + Send {
        self.fetch_page_with_retry(video_url, platform_id, page_token)
    }
}
