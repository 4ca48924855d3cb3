//! Comment threading
//!
//! A comment page is a slice of top-level comments plus the replies that
//! point at exactly those comments. Replies are never loaded for comments
//! outside the page.

use crate::types::{Comment, CommentThread};
use std::collections::HashMap;

/// Attach replies to their parents, keeping the order of `top_level` and the
/// insertion order of `replies` under each parent.
///
/// Replies whose parent is not in `top_level` are dropped.
pub fn attach_replies(top_level: Vec<Comment>, replies: Vec<Comment>) -> Vec<CommentThread> {
    let mut by_parent: HashMap<String, Vec<Comment>> = HashMap::new();
    for reply in replies {
        if let Some(parent_id) = reply.parent_id.clone() {
            by_parent.entry(parent_id).or_default().push(reply);
        }
    }

    top_level
        .into_iter()
        .map(|comment| CommentThread {
            replies: by_parent.remove(&comment.comment_id).unwrap_or_default(),
            comment,
        })
        .collect()
}
