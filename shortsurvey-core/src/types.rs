//! Core domain types for shortsurvey
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Video** | A clip in the catalog, keyed by its URL |
//! | **Event** | One discrete action a participant took, appended to the log |
//! | **Activity** | Current toggle state for one (user, video) pair |
//! | **Comment** | A platform comment (crawled) or a user-authored comment |
//! | **Pair** | A `(user_id, video_id)` key; the grain of every measurement |
//!
//! Throughout the crate `video_id` is the catalog URL of a clip. The id the
//! video platform uses is derived from it with [`platform_video_id`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Video sentinel written for events that are not tied to a clip (logins).
pub const NO_VIDEO: &str = "N/A";

/// Comment id prefix that marks a comment authored inside the survey.
pub const USER_COMMENT_PREFIX: &str = "user_comment_";

/// A `(user_id, video_id)` key.
pub type PairKey = (String, String);

// ============================================
// Event kinds
// ============================================

/// Every action the feed can log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Login,
    WatchStart,
    WatchStop,
    CommentOpen,
    CommentClose,
    Like,
    LikeCancel,
    Dislike,
    DislikeCancel,
    Share,
    ShareCancel,
    NotInterested,
    NotInterestedCancel,
    ChannelNoRecommend,
    ChannelNoRecommendCancel,
    Report,
    ReportCancel,
    Subscribe,
    SubscribeCancel,
}

/// The activity field an event kind writes, and whether it is the cancel variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Toggle {
    pub field: ActivityField,
    pub cancel: bool,
}

impl EventKind {
    /// All kinds, in declaration order
    pub const ALL: [EventKind; 19] = [
        EventKind::Login,
        EventKind::WatchStart,
        EventKind::WatchStop,
        EventKind::CommentOpen,
        EventKind::CommentClose,
        EventKind::Like,
        EventKind::LikeCancel,
        EventKind::Dislike,
        EventKind::DislikeCancel,
        EventKind::Share,
        EventKind::ShareCancel,
        EventKind::NotInterested,
        EventKind::NotInterestedCancel,
        EventKind::ChannelNoRecommend,
        EventKind::ChannelNoRecommendCancel,
        EventKind::Report,
        EventKind::ReportCancel,
        EventKind::Subscribe,
        EventKind::SubscribeCancel,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Login => "login",
            EventKind::WatchStart => "watch_start",
            EventKind::WatchStop => "watch_stop",
            EventKind::CommentOpen => "comment_open",
            EventKind::CommentClose => "comment_close",
            EventKind::Like => "like",
            EventKind::LikeCancel => "like_cancel",
            EventKind::Dislike => "dislike",
            EventKind::DislikeCancel => "dislike_cancel",
            EventKind::Share => "share",
            EventKind::ShareCancel => "share_cancel",
            EventKind::NotInterested => "not_interested",
            EventKind::NotInterestedCancel => "not_interested_cancel",
            EventKind::ChannelNoRecommend => "channel_no_recommend",
            EventKind::ChannelNoRecommendCancel => "channel_no_recommend_cancel",
            EventKind::Report => "report",
            EventKind::ReportCancel => "report_cancel",
            EventKind::Subscribe => "subscribe",
            EventKind::SubscribeCancel => "subscribe_cancel",
        }
    }

    /// Activity field this kind mutates.
    ///
    /// `None` for kinds that only live in the event log (login, watch and
    /// comment-panel open/close).
    pub fn toggle(&self) -> Option<Toggle> {
        use ActivityField as F;
        let (field, cancel) = match self {
            EventKind::Login
            | EventKind::WatchStart
            | EventKind::WatchStop
            | EventKind::CommentOpen
            | EventKind::CommentClose => return None,
            EventKind::Like => (F::Like, false),
            EventKind::LikeCancel => (F::Like, true),
            EventKind::Dislike => (F::Dislike, false),
            EventKind::DislikeCancel => (F::Dislike, true),
            EventKind::Share => (F::Share, false),
            EventKind::ShareCancel => (F::Share, true),
            EventKind::NotInterested => (F::NotInterested, false),
            EventKind::NotInterestedCancel => (F::NotInterested, true),
            EventKind::ChannelNoRecommend => (F::ChannelNoRecommend, false),
            EventKind::ChannelNoRecommendCancel => (F::ChannelNoRecommend, true),
            EventKind::Report => (F::Report, false),
            EventKind::ReportCancel => (F::Report, true),
            EventKind::Subscribe => (F::Subscribe, false),
            EventKind::SubscribeCancel => (F::Subscribe, true),
        };
        Some(Toggle { field, cancel })
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventKind {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| crate::error::Error::UnknownEventKind(s.to_string()))
    }
}

// ============================================
// Events
// ============================================

/// One row of the append-only event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Database row id (0 before insert); breaks timestamp ties
    pub id: i64,
    pub user_id: String,
    pub video_id: String,
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
    pub session_id: String,
}

// ============================================
// Activity state
// ============================================

/// Toggle-type columns of the activity table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityField {
    Like,
    Dislike,
    Share,
    NotInterested,
    ChannelNoRecommend,
    Report,
    Subscribe,
}

impl ActivityField {
    /// Column name in the `activity` table
    pub fn column(&self) -> &'static str {
        match self {
            ActivityField::Like => "liked",
            ActivityField::Dislike => "disliked",
            ActivityField::Share => "shared",
            ActivityField::NotInterested => "not_interested",
            ActivityField::ChannelNoRecommend => "channel_no_recommend",
            ActivityField::Report => "reported",
            ActivityField::Subscribe => "subscribed",
        }
    }
}

/// Current toggle state of a single (user, video) pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityState {
    pub user_id: String,
    pub video_id: String,
    pub like: i64,
    pub dislike: i64,
    pub share: i64,
    pub not_interested: i64,
    pub channel_no_recommend: i64,
    pub report: i64,
    pub subscribe: i64,
}

impl ActivityState {
    /// Fresh all-zero state for a pair.
    pub fn new(user_id: impl Into<String>, video_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            video_id: video_id.into(),
            ..Default::default()
        }
    }

    pub fn get(&self, field: ActivityField) -> i64 {
        match field {
            ActivityField::Like => self.like,
            ActivityField::Dislike => self.dislike,
            ActivityField::Share => self.share,
            ActivityField::NotInterested => self.not_interested,
            ActivityField::ChannelNoRecommend => self.channel_no_recommend,
            ActivityField::Report => self.report,
            ActivityField::Subscribe => self.subscribe,
        }
    }

    fn set(&mut self, field: ActivityField, value: i64) {
        let slot = match field {
            ActivityField::Like => &mut self.like,
            ActivityField::Dislike => &mut self.dislike,
            ActivityField::Share => &mut self.share,
            ActivityField::NotInterested => &mut self.not_interested,
            ActivityField::ChannelNoRecommend => &mut self.channel_no_recommend,
            ActivityField::Report => &mut self.report,
            ActivityField::Subscribe => &mut self.subscribe,
        };
        *slot = value;
    }

    /// Apply a toggle. Like and dislike are mutually exclusive: activating one
    /// clears the other, cancelling only clears itself.
    pub fn apply(&mut self, toggle: Toggle) {
        let value = if toggle.cancel { 0 } else { 1 };
        self.set(toggle.field, value);
        if !toggle.cancel {
            match toggle.field {
                ActivityField::Like => self.set(ActivityField::Dislike, 0),
                ActivityField::Dislike => self.set(ActivityField::Like, 0),
                _ => {}
            }
        }
    }

    pub fn key(&self) -> PairKey {
        (self.user_id.clone(), self.video_id.clone())
    }
}

// ============================================
// Comments
// ============================================

/// A platform or user-authored comment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    /// Insertion sequence (0 before insert)
    #[serde(skip_serializing)]
    pub seq: i64,
    pub comment_id: String,
    pub video_id: String,
    /// `None` for top-level comments
    pub parent_id: Option<String>,
    pub author: String,
    pub text: String,
    pub published_at: String,
    pub like_count: i64,
    pub avatar_url: Option<String>,
}

impl Comment {
    /// Whether this comment was written by a survey participant.
    pub fn is_user_authored(&self) -> bool {
        self.comment_id.starts_with(USER_COMMENT_PREFIX)
    }
}

/// A top-level comment together with its replies.
#[derive(Debug, Clone, Serialize)]
pub struct CommentThread {
    #[serde(flatten)]
    pub comment: Comment,
    pub replies: Vec<Comment>,
}

/// One page of top-level comments for a video.
#[derive(Debug, Clone, Serialize)]
pub struct CommentPage {
    pub comments: Vec<CommentThread>,
    pub has_next_page: bool,
}

// ============================================
// Catalog and users
// ============================================

/// A clip in the feed catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Video {
    pub seq: i64,
    pub url: String,
    pub channel_name: Option<String>,
    pub channel_profile_url: Option<String>,
    pub description: Option<String>,
    /// Only active videos appear in the feed and get crawled
    pub active: bool,
}

impl Video {
    pub fn platform_id(&self) -> &str {
        platform_video_id(&self.url)
    }
}

/// Extract the platform video id from a shorts URL.
///
/// `https://www.youtube.com/shorts/abc123?feature=share` yields `abc123`.
/// URLs without a `/shorts/` segment yield the query-stripped URL itself.
pub fn platform_video_id(url: &str) -> &str {
    let without_query = url.split('?').next().unwrap_or(url);
    without_query
        .rsplit("/shorts/")
        .next()
        .unwrap_or(without_query)
}

/// Survey participant credentials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginUser {
    pub id: String,
    pub name: String,
    pub password: String,
}

/// A feed entry as shown to one participant.
#[derive(Debug, Clone, Serialize)]
pub struct FeedItem {
    pub video: Video,
    pub platform_id: String,
    pub comment_count: i64,
    pub activity: ActivityState,
}

/// A participant's feed plus where they left off.
#[derive(Debug, Clone, Serialize)]
pub struct Feed {
    pub user_id: String,
    pub items: Vec<FeedItem>,
    pub last_watched: Option<String>,
}
