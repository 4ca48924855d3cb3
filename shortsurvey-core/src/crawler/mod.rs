//! Comment crawling from the video platform API
//!
//! [`client`] talks to the API; [`job`] runs one crawl at a time in the
//! background and reports progress.

pub mod client;
pub mod job;

pub use client::{CommentSource, ThreadPage, YouTubeClient};
pub use job::{crawl_all, CrawlJob, CrawlSnapshot, CrawlStatus, StartOutcome};
