//! Measurement aggregation
//!
//! ## Pair set
//!
//! Rows are keyed by `(user_id, video_id)`. The pair set is the union, in
//! first-seen order, of:
//! 1. event log pairs, except login events (video `N/A`)
//! 2. activity rows
//! 3. user-authored comments, with the author as the user
//!
//! Platform comments never contribute a pair. Every metric is left-joined onto
//! this set, so a pair missing from a source gets zero for that source's
//! columns and no pair is ever dropped by a join.
//!
//! ## Derived metrics
//!
//! | Metric | Source |
//! |--------|--------|
//! | `watch_seconds` | paired `watch_start`/`watch_stop` |
//! | `comment_seconds` | paired `comment_open`/`comment_close` |
//! | `time_to_like` | latest `like` minus earliest `watch_start` |
//! | `time_to_dislike` | latest `dislike` minus earliest `watch_start` |
//! | `comment_authored` | any user-authored comment on the pair |
//!
//! Toggle columns (like, dislike, share, ...) come straight from the
//! activity table, not from replaying the log.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::db::Database;
use crate::error::Result;
use crate::types::{ActivityState, Comment, Event, EventKind, PairKey, NO_VIDEO};

use super::duration::sequential_duration;
use super::format::{round1, MetricRow, MetricsTable, METRIC_COLUMNS};

/// Case-sensitive substring filters, AND'ed. Empty or `None` matches all.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricFilter<'a> {
    pub user: Option<&'a str>,
    pub video: Option<&'a str>,
}

impl<'a> MetricFilter<'a> {
    pub fn new(user: Option<&'a str>, video: Option<&'a str>) -> Self {
        Self { user, video }
    }

    pub fn matches(&self, user_id: &str, video_id: &str) -> bool {
        fn contains(haystack: &str, needle: Option<&str>) -> bool {
            needle.map_or(true, |n| n.is_empty() || haystack.contains(n))
        }
        contains(user_id, self.user) && contains(video_id, self.video)
    }
}

/// Unformatted metrics for one pair.
#[derive(Debug, Clone, PartialEq)]
pub struct PairMetrics {
    pub user_id: String,
    pub video_id: String,
    pub watch_seconds: f64,
    pub comment_seconds: f64,
    /// Seconds from first watch start to last like, one decimal
    pub time_to_like: Option<f64>,
    /// Seconds from first watch start to last dislike, one decimal
    pub time_to_dislike: Option<f64>,
    pub comment_authored: bool,
    /// All zero when the pair has no activity row
    pub activity: ActivityState,
}

/// Timing facts pulled from one pair's event group.
#[derive(Debug, Default)]
struct EventTimings {
    first_start: Option<DateTime<Utc>>,
    last_like: Option<DateTime<Utc>>,
    last_dislike: Option<DateTime<Utc>>,
    watch_seconds: f64,
    comment_seconds: f64,
}

impl EventTimings {
    /// `group` must be in timestamp order.
    fn from_group(group: &[&Event]) -> Self {
        let first_of = |kind: EventKind| {
            group
                .iter()
                .filter(|e| e.kind == kind)
                .map(|e| e.timestamp)
                .min()
        };
        let last_of = |kind: EventKind| {
            group
                .iter()
                .filter(|e| e.kind == kind)
                .map(|e| e.timestamp)
                .max()
        };

        Self {
            first_start: first_of(EventKind::WatchStart),
            last_like: last_of(EventKind::Like),
            last_dislike: last_of(EventKind::Dislike),
            watch_seconds: sequential_duration(
                group.iter().copied(),
                EventKind::WatchStart,
                EventKind::WatchStop,
            ),
            comment_seconds: sequential_duration(
                group.iter().copied(),
                EventKind::CommentOpen,
                EventKind::CommentClose,
            ),
        }
    }

    fn time_to(&self, action: Option<DateTime<Utc>>) -> Option<f64> {
        let start = self.first_start?;
        let action = action?;
        Some(round1((action - start).num_milliseconds() as f64 / 1000.0))
    }
}

/// Ordered, de-duplicated pair collection.
#[derive(Default)]
struct PairSet {
    order: Vec<PairKey>,
    seen: HashSet<PairKey>,
}

impl PairSet {
    fn insert(&mut self, user_id: &str, video_id: &str) {
        let key = (user_id.to_string(), video_id.to_string());
        if self.seen.insert(key.clone()) {
            self.order.push(key);
        }
    }
}

/// Join the three stores into one row per observed pair.
///
/// `events` is expected in insertion order; within a pair events are
/// re-ordered by timestamp with ties kept in that order. Comments that are not
/// user-authored are ignored. Empty inputs are fine and yield an empty table.
pub fn compute_metrics(
    events: &[Event],
    activity: &[ActivityState],
    comments: &[Comment],
    filter: MetricFilter<'_>,
) -> MetricsTable {
    let events: Vec<&Event> = events.iter().filter(|e| e.video_id != NO_VIDEO).collect();
    let user_comments: Vec<&Comment> = comments.iter().filter(|c| c.is_user_authored()).collect();

    let mut pairs = PairSet::default();
    for event in &events {
        pairs.insert(&event.user_id, &event.video_id);
    }
    for state in activity {
        pairs.insert(&state.user_id, &state.video_id);
    }
    for comment in &user_comments {
        pairs.insert(&comment.author, &comment.video_id);
    }

    let mut groups: HashMap<PairKey, Vec<&Event>> = HashMap::new();
    for event in events {
        groups
            .entry((event.user_id.clone(), event.video_id.clone()))
            .or_default()
            .push(event);
    }
    let timings: HashMap<PairKey, EventTimings> = groups
        .into_iter()
        .map(|(key, mut group)| {
            // Stable: equal timestamps keep insertion order
            group.sort_by_key(|e| e.timestamp);
            (key, EventTimings::from_group(&group))
        })
        .collect();

    let activity_by_pair: HashMap<PairKey, &ActivityState> =
        activity.iter().map(|a| (a.key(), a)).collect();
    let authored: HashSet<PairKey> = user_comments
        .iter()
        .map(|c| (c.author.clone(), c.video_id.clone()))
        .collect();

    let rows: Vec<MetricRow> = pairs
        .order
        .into_iter()
        .filter(|(user_id, video_id)| filter.matches(user_id, video_id))
        .map(|key| {
            let timing = timings.get(&key);
            let metrics = PairMetrics {
                watch_seconds: timing.map_or(0.0, |t| t.watch_seconds),
                comment_seconds: timing.map_or(0.0, |t| t.comment_seconds),
                time_to_like: timing.and_then(|t| t.time_to(t.last_like)),
                time_to_dislike: timing.and_then(|t| t.time_to(t.last_dislike)),
                comment_authored: authored.contains(&key),
                activity: activity_by_pair
                    .get(&key)
                    .map(|a| (*a).clone())
                    .unwrap_or_else(|| ActivityState::new(key.0.clone(), key.1.clone())),
                user_id: key.0,
                video_id: key.1,
            };
            MetricRow::from(&metrics)
        })
        .collect();

    tracing::debug!(
        rows = rows.len(),
        pairs_total = pairs.seen.len(),
        "Computed measurement results"
    );

    MetricsTable {
        columns: METRIC_COLUMNS.to_vec(),
        rows,
    }
}

impl Database {
    /// Measurement results over a fresh snapshot of the stores.
    pub fn compute_metrics(
        &self,
        filter_user: Option<&str>,
        filter_video: Option<&str>,
    ) -> Result<MetricsTable> {
        let events = self.list_events()?;
        let activity = self.list_activity()?;
        let comments = self.list_user_comments()?;

        Ok(compute_metrics(
            &events,
            &activity,
            &comments,
            MetricFilter::new(filter_user, filter_video),
        ))
    }
}
