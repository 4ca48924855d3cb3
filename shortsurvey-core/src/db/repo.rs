//! Database repository layer
//!
//! Provides query and insert operations for all entity types.

use crate::error::{Error, Result};
use crate::types::*;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, Transaction};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

/// Database handle (single connection behind a mutex)
pub struct Database {
    conn: Mutex<Connection>,
}

/// LIKE pattern matching [`USER_COMMENT_PREFIX`] with its underscores escaped
const USER_COMMENT_LIKE: &str = r"user\_comment\_%";

/// Format a timestamp the way every `ts`/`published_at` column stores it.
pub(crate) fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_ts(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

impl Database {
    /// Open or create a database at the given path
    pub fn open(path: &PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // WAL lets admin reads run while the feed keeps logging
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
            ",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run migrations on this database
    pub fn migrate(&self) -> Result<()> {
        let conn = self.connection();
        super::schema::run_migrations(&conn)
    }

    /// Get the underlying connection (for advanced use)
    ///
    /// A poisoned lock is recovered: every write runs in its own transaction,
    /// so a panicking holder cannot leave a half-applied write behind.
    pub fn connection(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ============================================
    // User operations
    // ============================================

    /// Insert or update a participant
    pub fn upsert_user(&self, user: &LoginUser) -> Result<()> {
        let conn = self.connection();
        conn.execute(
            r#"
            INSERT INTO users (id, name, password)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                password = excluded.password
            "#,
            params![user.id, user.name, user.password],
        )?;
        Ok(())
    }

    /// Look up a participant by id and password
    pub fn authenticate(&self, id: &str, password: &str) -> Result<Option<LoginUser>> {
        let conn = self.connection();
        conn.query_row(
            "SELECT id, name, password FROM users WHERE id = ?1 AND password = ?2",
            params![id, password],
            |row| {
                Ok(LoginUser {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    password: row.get(2)?,
                })
            },
        )
        .optional()
        .map_err(Error::from)
    }

    // ============================================
    // Video catalog operations
    // ============================================

    /// Insert or update a catalog entry by URL, returning its seq
    pub fn upsert_video(&self, video: &Video) -> Result<i64> {
        let conn = self.connection();
        let seq = conn.query_row(
            r#"
            INSERT INTO videos (url, channel_name, channel_profile_url, description, active)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(url) DO UPDATE SET
                channel_name = excluded.channel_name,
                channel_profile_url = excluded.channel_profile_url,
                description = excluded.description,
                active = excluded.active
            RETURNING seq
            "#,
            params![
                video.url,
                video.channel_name,
                video.channel_profile_url,
                video.description,
                video.active,
            ],
            |row| row.get(0),
        )?;
        Ok(seq)
    }

    /// List catalog entries in seq order
    pub fn list_videos(&self, active_only: bool) -> Result<Vec<Video>> {
        let conn = self.connection();
        let sql = if active_only {
            "SELECT * FROM videos WHERE active = 1 ORDER BY seq"
        } else {
            "SELECT * FROM videos ORDER BY seq"
        };
        let mut stmt = conn.prepare(sql)?;
        let videos = stmt
            .query_map([], Self::row_to_video)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(videos)
    }

    fn row_to_video(row: &Row) -> rusqlite::Result<Video> {
        Ok(Video {
            seq: row.get("seq")?,
            url: row.get("url")?,
            channel_name: row.get("channel_name")?,
            channel_profile_url: row.get("channel_profile_url")?,
            description: row.get("description")?,
            active: row.get("active")?,
        })
    }

    // ============================================
    // Event operations
    // ============================================

    /// Log an event now and update derived state.
    pub fn record_event(
        &self,
        user_id: &str,
        video_id: &str,
        kind: EventKind,
        session_id: &str,
    ) -> Result<Event> {
        self.record_event_at(user_id, video_id, kind, session_id, Utc::now())
    }

    /// Log an event at an explicit time and update derived state.
    ///
    /// In one transaction: appends the event, applies the kind's toggle to the
    /// pair's activity row (creating it on first use), and for `watch_start`
    /// remembers the video as the user's last watched.
    pub fn record_event_at(
        &self,
        user_id: &str,
        video_id: &str,
        kind: EventKind,
        session_id: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<Event> {
        let mut conn = self.connection();
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO events (user_id, video_id, ts, kind, session_id) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![user_id, video_id, format_ts(timestamp), kind.as_str(), session_id],
        )?;
        let id = tx.last_insert_rowid();

        if let Some(toggle) = kind.toggle() {
            let mut state = Self::activity_in(&tx, user_id, video_id)?
                .unwrap_or_else(|| ActivityState::new(user_id, video_id));
            state.apply(toggle);
            Self::write_activity(&tx, &state)?;
        }

        if kind == EventKind::WatchStart {
            tx.execute(
                r#"
                INSERT INTO last_watched (user_id, video_id) VALUES (?1, ?2)
                ON CONFLICT(user_id) DO UPDATE SET video_id = excluded.video_id
                "#,
                params![user_id, video_id],
            )?;
        }

        tx.commit()?;

        tracing::debug!(user_id, video_id, kind = %kind, "Recorded event");

        Ok(Event {
            id,
            user_id: user_id.to_string(),
            video_id: video_id.to_string(),
            timestamp,
            kind,
            session_id: session_id.to_string(),
        })
    }

    /// Verify credentials and log a login event under a fresh session id.
    ///
    /// Returns the session id, or `None` when the credentials do not match.
    pub fn record_login(&self, user_id: &str, password: &str) -> Result<Option<String>> {
        if self.authenticate(user_id, password)?.is_none() {
            tracing::info!(user_id, "Login rejected");
            return Ok(None);
        }
        let session_id = uuid::Uuid::new_v4().to_string();
        self.record_event(user_id, NO_VIDEO, EventKind::Login, &session_id)?;
        Ok(Some(session_id))
    }

    /// Every event in insertion order
    pub fn list_events(&self) -> Result<Vec<Event>> {
        let conn = self.connection();
        let mut stmt = conn.prepare("SELECT * FROM events ORDER BY id")?;
        let events = stmt
            .query_map([], Self::row_to_event)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(events)
    }

    fn row_to_event(row: &Row) -> rusqlite::Result<Event> {
        let ts_idx = row.as_ref().column_index("ts")?;
        let ts_str: String = row.get(ts_idx)?;
        let kind_idx = row.as_ref().column_index("kind")?;
        let kind_str: String = row.get(kind_idx)?;
        let kind = kind_str.parse::<EventKind>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                kind_idx,
                rusqlite::types::Type::Text,
                e.into(),
            )
        })?;

        Ok(Event {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            video_id: row.get("video_id")?,
            timestamp: parse_ts(ts_idx, &ts_str)?,
            kind,
            session_id: row.get("session_id")?,
        })
    }

    // ============================================
    // Activity operations
    // ============================================

    /// Current activity for a pair, if any toggle was ever logged
    pub fn get_activity(&self, user_id: &str, video_id: &str) -> Result<Option<ActivityState>> {
        let conn = self.connection();
        Self::activity_in(&conn, user_id, video_id)
    }

    /// Every activity row in insertion order
    pub fn list_activity(&self) -> Result<Vec<ActivityState>> {
        let conn = self.connection();
        let mut stmt = conn.prepare("SELECT * FROM activity ORDER BY id")?;
        let rows = stmt
            .query_map([], Self::row_to_activity)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn activity_in(
        conn: &Connection,
        user_id: &str,
        video_id: &str,
    ) -> Result<Option<ActivityState>> {
        conn.query_row(
            "SELECT * FROM activity WHERE user_id = ?1 AND video_id = ?2",
            params![user_id, video_id],
            Self::row_to_activity,
        )
        .optional()
        .map_err(Error::from)
    }

    fn write_activity(tx: &Transaction, state: &ActivityState) -> Result<()> {
        tx.execute(
            r#"
            INSERT INTO activity (user_id, video_id, liked, disliked, shared, not_interested,
                                  channel_no_recommend, reported, subscribed)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(user_id, video_id) DO UPDATE SET
                liked = excluded.liked,
                disliked = excluded.disliked,
                shared = excluded.shared,
                not_interested = excluded.not_interested,
                channel_no_recommend = excluded.channel_no_recommend,
                reported = excluded.reported,
                subscribed = excluded.subscribed
            "#,
            params![
                state.user_id,
                state.video_id,
                state.like,
                state.dislike,
                state.share,
                state.not_interested,
                state.channel_no_recommend,
                state.report,
                state.subscribe,
            ],
        )?;
        Ok(())
    }

    fn row_to_activity(row: &Row) -> rusqlite::Result<ActivityState> {
        Ok(ActivityState {
            user_id: row.get("user_id")?,
            video_id: row.get("video_id")?,
            like: row.get(ActivityField::Like.column())?,
            dislike: row.get(ActivityField::Dislike.column())?,
            share: row.get(ActivityField::Share.column())?,
            not_interested: row.get(ActivityField::NotInterested.column())?,
            channel_no_recommend: row.get(ActivityField::ChannelNoRecommend.column())?,
            report: row.get(ActivityField::Report.column())?,
            subscribe: row.get(ActivityField::Subscribe.column())?,
        })
    }

    /// Video the user most recently started watching
    pub fn last_watched(&self, user_id: &str) -> Result<Option<String>> {
        let conn = self.connection();
        let video: Option<Option<String>> = conn
            .query_row(
                "SELECT video_id FROM last_watched WHERE user_id = ?",
                [user_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(video.flatten())
    }

    // ============================================
    // Comment operations
    // ============================================

    /// Store a comment written by a participant.
    pub fn add_comment(
        &self,
        user_id: &str,
        video_id: &str,
        text: &str,
        parent_id: Option<&str>,
        avatar_base_url: &str,
    ) -> Result<Comment> {
        if user_id.is_empty() || video_id.is_empty() || text.trim().is_empty() {
            return Err(Error::InvalidInput(
                "comment requires a user, a video and non-empty text".to_string(),
            ));
        }

        let mut comment = Comment {
            seq: 0,
            comment_id: format!("{}{}", USER_COMMENT_PREFIX, uuid::Uuid::new_v4()),
            video_id: video_id.to_string(),
            parent_id: parent_id.map(str::to_string),
            author: user_id.to_string(),
            text: text.to_string(),
            published_at: format_ts(Utc::now()),
            like_count: 0,
            avatar_url: Some(format!(
                "{}?u={}",
                avatar_base_url,
                urlencoding::encode(user_id)
            )),
        };

        let conn = self.connection();
        comment.seq = Self::insert_comment_in(&conn, &comment)?;
        Ok(comment)
    }

    /// Insert comments in one transaction. An existing comment id is overwritten.
    pub fn insert_comments(&self, comments: &[Comment]) -> Result<()> {
        let mut conn = self.connection();
        let tx = conn.transaction()?;
        for comment in comments {
            Self::insert_comment_in(&tx, comment)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn insert_comment_in(conn: &Connection, comment: &Comment) -> Result<i64> {
        let seq = conn.query_row(
            r#"
            INSERT INTO comments (video_id, comment_id, parent_id, author, text,
                                  published_at, like_count, avatar_url)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(comment_id) DO UPDATE SET
                video_id = excluded.video_id,
                parent_id = excluded.parent_id,
                author = excluded.author,
                text = excluded.text,
                published_at = excluded.published_at,
                like_count = excluded.like_count,
                avatar_url = excluded.avatar_url
            RETURNING seq
            "#,
            params![
                comment.video_id,
                comment.comment_id,
                comment.parent_id,
                comment.author,
                comment.text,
                comment.published_at,
                comment.like_count,
                comment.avatar_url,
            ],
            |row| row.get(0),
        )?;
        Ok(seq)
    }

    /// Remove every platform comment stored for a video.
    ///
    /// User-authored comments are kept so a recrawl never erases survey data.
    pub fn delete_platform_comments(&self, video_id: &str) -> Result<usize> {
        let conn = self.connection();
        let deleted = conn.execute(
            r"DELETE FROM comments WHERE video_id = ?1 AND comment_id NOT LIKE ?2 ESCAPE '\'",
            params![video_id, USER_COMMENT_LIKE],
        )?;
        Ok(deleted)
    }

    /// All comments written by participants, in insertion order
    pub fn list_user_comments(&self) -> Result<Vec<Comment>> {
        let conn = self.connection();
        let mut stmt = conn.prepare(
            r"SELECT * FROM comments WHERE comment_id LIKE ?1 ESCAPE '\' ORDER BY seq",
        )?;
        let comments = stmt
            .query_map([USER_COMMENT_LIKE], Self::row_to_comment)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(comments)
    }

    /// One page of top-level comments with their replies.
    ///
    /// Pages are 1-based; page 0 is treated as page 1. Only replies to the
    /// comments on this page are loaded.
    pub fn comment_page(&self, video_id: &str, page: usize, per_page: usize) -> Result<CommentPage> {
        let per_page = per_page.max(1);
        let offset = i64::try_from(page.saturating_sub(1).saturating_mul(per_page))
            .unwrap_or(i64::MAX);
        let limit = i64::try_from(per_page.saturating_add(1)).unwrap_or(i64::MAX);
        let conn = self.connection();

        // One extra row tells us whether another page exists
        let mut stmt = conn.prepare(
            r#"
            SELECT * FROM comments
            WHERE video_id = ?1 AND parent_id IS NULL
            ORDER BY published_at DESC, seq DESC
            LIMIT ?2 OFFSET ?3
            "#,
        )?;
        let mut top_level = stmt
            .query_map(
                params![video_id, limit, offset],
                Self::row_to_comment,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let has_next_page = top_level.len() > per_page;
        top_level.truncate(per_page);

        let replies = if top_level.is_empty() {
            Vec::new()
        } else {
            let placeholders = vec!["?"; top_level.len()].join(", ");
            let sql = format!(
                "SELECT * FROM comments WHERE video_id = ? AND parent_id IN ({}) ORDER BY seq",
                placeholders
            );
            let mut stmt = conn.prepare(&sql)?;
            let bind = std::iter::once(video_id)
                .chain(top_level.iter().map(|c| c.comment_id.as_str()));
            let rows = stmt
                .query_map(params_from_iter(bind), Self::row_to_comment)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows
        };

        Ok(CommentPage {
            comments: crate::comments::attach_replies(top_level, replies),
            has_next_page,
        })
    }

    /// Comment totals per video (platform and user-authored)
    pub fn comment_counts(&self) -> Result<HashMap<String, i64>> {
        let conn = self.connection();
        let mut stmt = conn.prepare("SELECT video_id, COUNT(*) FROM comments GROUP BY video_id")?;
        let counts = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<std::result::Result<HashMap<_, _>, _>>()?;
        Ok(counts)
    }

    fn row_to_comment(row: &Row) -> rusqlite::Result<Comment> {
        Ok(Comment {
            seq: row.get("seq")?,
            comment_id: row.get("comment_id")?,
            video_id: row.get("video_id")?,
            parent_id: row.get("parent_id")?,
            author: row.get::<_, Option<String>>("author")?.unwrap_or_default(),
            text: row.get::<_, Option<String>>("text")?.unwrap_or_default(),
            published_at: row
                .get::<_, Option<String>>("published_at")?
                .unwrap_or_default(),
            like_count: row.get::<_, Option<i64>>("like_count")?.unwrap_or(0),
            avatar_url: row.get("avatar_url")?,
        })
    }

    // ============================================
    // Feed
    // ============================================

    /// Active videos as seen by one participant.
    pub fn feed(&self, user_id: &str) -> Result<Feed> {
        let videos = self.list_videos(true)?;
        let counts = self.comment_counts()?;
        let activity: HashMap<String, ActivityState> = self
            .list_activity()?
            .into_iter()
            .filter(|a| a.user_id == user_id)
            .map(|a| (a.video_id.clone(), a))
            .collect();

        let items = videos
            .into_iter()
            .map(|video| FeedItem {
                platform_id: video.platform_id().to_string(),
                comment_count: counts.get(&video.url).copied().unwrap_or(0),
                activity: activity
                    .get(&video.url)
                    .cloned()
                    .unwrap_or_else(|| ActivityState::new(user_id, video.url.clone())),
                video,
            })
            .collect();

        Ok(Feed {
            user_id: user_id.to_string(),
            items,
            last_watched: self.last_watched(user_id)?,
        })
    }
}
