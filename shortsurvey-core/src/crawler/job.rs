//! Background comment crawl
//!
//! At most one crawl runs at a time. [`CrawlStatus`] holds the running flag
//! and a human-readable progress line under a single mutex; a start request
//! while a crawl is running is rejected, not queued.
//!
//! The crawl walks active videos one at a time. For each video it removes the
//! stored platform comments, then inserts the API pages as they arrive, one
//! transaction per page. An error stops the run: videos already finished keep
//! their comments, the failing page is never committed, and the error text
//! becomes the progress line. The running flag is cleared however the task
//! ends.

use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::task::JoinHandle;

use crate::config::CrawlerConfig;
use crate::db::Database;
use crate::error::Result;

use super::client::{CommentSource, YouTubeClient};

/// Point-in-time view of the crawl state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrawlSnapshot {
    pub is_running: bool,
    pub progress: String,
}

/// Shared crawl state: running flag plus progress line.
#[derive(Debug)]
pub struct CrawlStatus {
    inner: Mutex<CrawlSnapshot>,
}

impl Default for CrawlStatus {
    fn default() -> Self {
        Self {
            inner: Mutex::new(CrawlSnapshot {
                is_running: false,
                progress: "idle".to_string(),
            }),
        }
    }
}

impl CrawlStatus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CrawlSnapshot> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Current flag and progress
    pub fn snapshot(&self) -> CrawlSnapshot {
        self.lock().clone()
    }

    pub fn is_running(&self) -> bool {
        self.lock().is_running
    }

    /// Set the flag if it was clear. Returns false when a crawl already runs.
    fn try_begin(&self) -> bool {
        let mut state = self.lock();
        if state.is_running {
            return false;
        }
        state.is_running = true;
        state.progress = "starting crawl...".to_string();
        true
    }

    fn set_progress(&self, progress: String) {
        self.lock().progress = progress;
    }

    fn finish(&self, progress: Option<String>) {
        let mut state = self.lock();
        state.is_running = false;
        if let Some(progress) = progress {
            state.progress = progress;
        }
    }
}

/// Clears the running flag when the crawl task ends, panics included.
struct RunningGuard(Arc<CrawlStatus>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        if self.0.is_running() {
            self.0.finish(None);
        }
    }
}

/// Result of a start request.
#[derive(Debug)]
pub enum StartOutcome {
    /// The crawl was spawned; the handle resolves when it ends
    Started(JoinHandle<()>),
    /// Another crawl is still running
    AlreadyRunning,
}

impl StartOutcome {
    pub fn is_started(&self) -> bool {
        matches!(self, StartOutcome::Started(_))
    }
}

/// Starts crawls against a shared database and status.
#[derive(Clone)]
pub struct CrawlJob {
    db: Arc<Database>,
    status: Arc<CrawlStatus>,
}

impl CrawlJob {
    pub fn new(db: Arc<Database>, status: Arc<CrawlStatus>) -> Self {
        Self { db, status }
    }

    pub fn status(&self) -> CrawlSnapshot {
        self.status.snapshot()
    }

    /// Start a crawl against the platform API. Must be called inside a tokio
    /// runtime.
    ///
    /// A missing API key still starts the job, which then fails immediately
    /// and reports the problem through the status.
    pub fn start(&self, config: CrawlerConfig) -> StartOutcome {
        self.start_with(move || YouTubeClient::new(config))
    }

    /// Start a crawl with a custom comment source.
    pub fn start_with<S, F>(&self, make_source: F) -> StartOutcome
    where
        S: CommentSource + 'static,
        F: FnOnce() -> Result<S> + Send + 'static,
    {
        if !self.status.try_begin() {
            tracing::info!("Crawl start rejected: already running");
            return StartOutcome::AlreadyRunning;
        }

        let db = Arc::clone(&self.db);
        let status = Arc::clone(&self.status);
        let handle = tokio::spawn(async move {
            let _guard = RunningGuard(Arc::clone(&status));
            let outcome = match make_source() {
                Ok(source) => crawl_all(&db, &source, &status).await,
                Err(e) => Err(e),
            };
            match outcome {
                Ok(total) => {
                    tracing::info!(videos = total, "Crawl complete");
                    status.finish(Some(format!(
                        "done: collected comments for {} videos",
                        total
                    )));
                }
                Err(e) => {
                    tracing::error!(error = %e, "Crawl failed");
                    status.finish(Some(format!("error: {}", e)));
                }
            }
        });

        StartOutcome::Started(handle)
    }
}

/// Crawl every active video in catalog order. Returns the number of videos.
pub async fn crawl_all<S: CommentSource>(
    db: &Database,
    source: &S,
    status: &CrawlStatus,
) -> Result<usize> {
    let videos = db.list_videos(true)?;
    let total = videos.len();

    for (i, video) in videos.iter().enumerate() {
        let platform_id = video.platform_id();
        status.set_progress(format!(
            "({}/{}) collecting comments for '{}'...",
            i + 1,
            total,
            platform_id
        ));

        let removed = db.delete_platform_comments(&video.url)?;
        tracing::debug!(video = %video.url, removed, "Cleared platform comments");

        let mut page_token: Option<String> = None;
        let mut stored = 0usize;
        loop {
            let page = source
                .fetch_page(&video.url, platform_id, page_token.as_deref())
                .await?;
            db.insert_comments(&page.comments)?;
            stored += page.comments.len();

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        tracing::info!(video = %video.url, comments = stored, "Crawled video");
    }

    Ok(total)
}
