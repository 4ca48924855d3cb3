//! Presentation of measurement rows: column order, rounding and display cells.

use serde::Serialize;

use super::engine::PairMetrics;

/// Output columns, in order.
pub const METRIC_COLUMNS: [&str; 11] = [
    "user_id",
    "video_id",
    "watch_seconds",
    "like",
    "dislike",
    "comment_seconds",
    "comment_authored",
    "share",
    "not_interested",
    "channel_no_recommend",
    "report",
];

/// Round to one decimal place, ties to even (3.25 becomes 3.2).
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round_ties_even() / 10.0
}

/// Render a like/dislike state with its time-to-action.
///
/// `1(<t>)` when the toggle is on and a positive time exists, otherwise the
/// bare state.
pub fn format_action(state: i64, time_to_action: Option<f64>) -> String {
    match time_to_action {
        Some(t) if state == 1 && t > 0.0 => format!("1({:.1})", t),
        _ => state.to_string(),
    }
}

/// A single display value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Text(String),
    Integer(i64),
    Number(f64),
}

impl Cell {
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Cell::Text(s) => serde_json::Value::from(s.as_str()),
            Cell::Integer(i) => serde_json::Value::from(*i),
            Cell::Number(n) => serde_json::Value::from(*n),
        }
    }
}

impl std::fmt::Display for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Cell::Text(s) => f.write_str(s),
            Cell::Integer(i) => write!(f, "{}", i),
            Cell::Number(n) => write!(f, "{:.1}", n),
        }
    }
}

/// One formatted measurement row; field order matches [`METRIC_COLUMNS`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricRow {
    pub user_id: String,
    pub video_id: String,
    pub watch_seconds: f64,
    pub like: String,
    pub dislike: String,
    pub comment_seconds: f64,
    pub comment_authored: i64,
    pub share: i64,
    pub not_interested: i64,
    pub channel_no_recommend: i64,
    pub report: i64,
}

impl MetricRow {
    /// Cells in column order
    pub fn cells(&self) -> Vec<Cell> {
        vec![
            Cell::Text(self.user_id.clone()),
            Cell::Text(self.video_id.clone()),
            Cell::Number(self.watch_seconds),
            Cell::Text(self.like.clone()),
            Cell::Text(self.dislike.clone()),
            Cell::Number(self.comment_seconds),
            Cell::Integer(self.comment_authored),
            Cell::Integer(self.share),
            Cell::Integer(self.not_interested),
            Cell::Integer(self.channel_no_recommend),
            Cell::Integer(self.report),
        ]
    }
}

impl From<&PairMetrics> for MetricRow {
    fn from(m: &PairMetrics) -> Self {
        Self {
            user_id: m.user_id.clone(),
            video_id: m.video_id.clone(),
            watch_seconds: round1(m.watch_seconds),
            like: format_action(m.activity.like, m.time_to_like),
            dislike: format_action(m.activity.dislike, m.time_to_dislike),
            comment_seconds: round1(m.comment_seconds),
            comment_authored: i64::from(m.comment_authored),
            share: m.activity.share,
            not_interested: m.activity.not_interested,
            channel_no_recommend: m.activity.channel_no_recommend,
            report: m.activity.report,
        }
    }
}

/// The measurement result set.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsTable {
    pub columns: Vec<&'static str>,
    pub rows: Vec<MetricRow>,
}

impl MetricsTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
