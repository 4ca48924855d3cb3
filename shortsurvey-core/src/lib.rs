//! # shortsurvey-core
//!
//! Core library for shortsurvey - a short-video viewing survey.
//!
//! This library provides:
//! - Domain types for viewing events, activity toggles and comments
//! - Database storage layer with SQLite
//! - The measurement engine that turns raw events into per-pair metrics
//! - Comment threading, platform comment crawling and sheet export/import
//! - Configuration management
//! - Logging infrastructure
//!
//! ## Data model
//!
//! Three stores describe what participants did:
//! - **Event log:** append-only, timestamped interaction events
//! - **Activity:** latest toggle state per (user, video) pair
//! - **Comments:** platform comments plus comments authored in the survey
//!
//! Measurement results are derived from all three on demand.
//!
//! ## Example
//!
//! ```rust,no_run
//! use shortsurvey_core::{Config, Database};
//!
//! let db = Database::open(&Config::database_path()).expect("failed to open database");
//! db.migrate().expect("failed to run migrations");
//!
//! let table = db.compute_metrics(Some("alice"), None).expect("failed to compute metrics");
//! for row in &table.rows {
//!     println!("{} {} {}", row.user_id, row.video_id, row.like);
//! }
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use crawler::{CrawlJob, CrawlSnapshot, CrawlStatus, StartOutcome};
pub use db::Database;
pub use error::{Error, Result};
pub use metrics::{MetricRow, MetricsTable};
pub use sheet::{AdminTable, Sheet};
pub use types::*;

// Public modules
pub mod comments;
pub mod config;
pub mod crawler;
pub mod db;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod sheet;
pub mod types;
