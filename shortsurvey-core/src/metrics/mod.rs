//! Measurement results
//!
//! Turns the three interaction stores (event log, activity toggles and
//! user-authored comments) into one row per `(user_id, video_id)` pair.
//!
//! - [`duration`] pairs start/stop events into accumulated durations
//! - [`engine`] builds the pair set and joins every derived metric onto it
//! - [`format`] fixes column order and renders display cells
//!
//! Everything is recomputed on each call; nothing here is persisted.

pub mod duration;
pub mod engine;
pub mod format;

pub use duration::{sequential_duration, DurationPairing};
pub use engine::{compute_metrics, MetricFilter, PairMetrics};
pub use format::{format_action, Cell, MetricRow, MetricsTable, METRIC_COLUMNS};
