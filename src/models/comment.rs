use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, Result};

/// Number of levels a thread may have: root comments sit at depth 0, so the
/// deepest node lives at `MAX_COMMENT_DEPTH - 1`.
pub const MAX_COMMENT_DEPTH: i32 = 4;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Comment {
    pub id: String,
    pub article_id: String,
    pub author_id: String,
    pub parent_id: Option<String>,
    pub depth: i32,
    pub content: String,
    pub status: CommentStatus,
    pub reply_count: i64,
    pub is_edited: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum CommentStatus {
    #[default]
    Published,
    Pending,
    Approved,
    Rejected,
    Spam,
    Deleted,
}

impl CommentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Published => "published",
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Spam => "spam",
            Self::Deleted => "deleted",
        }
    }

    /// Content is shown to readers only for these statuses.
    pub fn is_readable(&self) -> bool {
        matches!(self, Self::Published | Self::Approved)
    }

    /// Whether a node in this status counts toward its parent's `reply_count`.
    pub fn counts_as_reply(&self) -> bool {
        !matches!(self, Self::Deleted)
    }
}

impl fmt::Display for CommentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommentStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "published" => Ok(Self::Published),
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "spam" => Ok(Self::Spam),
            "deleted" => Ok(Self::Deleted),
            other => Err(AppError::Internal(format!("Unknown comment status: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CommentSort {
    #[default]
    Newest,
    Oldest,
}

impl Comment {
    /// Builds a node under `parent` (or a root when `None`). Depth bookkeeping
    /// happens here; callers enforce the depth limit.
    pub fn new(
        article_id: String,
        author_id: String,
        content: String,
        parent: Option<&Comment>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            article_id,
            author_id,
            parent_id: parent.map(|p| p.id.clone()),
            depth: parent.map(|p| p.depth + 1).unwrap_or(0),
            content,
            status: CommentStatus::Published,
            reply_count: 0,
            is_edited: false,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.status == CommentStatus::Deleted
    }

    pub fn can_have_replies(&self, max_depth: i32) -> bool {
        self.depth < max_depth - 1
    }

    /// Soft-delete: the node keeps its place in the tree, its text goes away.
    pub fn tombstone(&mut self, now: DateTime<Utc>) {
        self.status = CommentStatus::Deleted;
        self.content = String::new();
        self.deleted_at = Some(now);
        self.updated_at = now;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateCommentRequest {
    #[validate(length(min = 1, max = 64))]
    pub article_id: String,
    pub parent_id: Option<String>,
    #[validate(length(min = 1, max = 10000))]
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UpdateCommentRequest {
    #[validate(length(min = 1, max = 10000))]
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerateCommentRequest {
    pub status: CommentStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommentQuery {
    pub sort: Option<CommentSort>,
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

/// Read-side node of a comment thread. Content is `None` for tombstones and
/// for comments held back by moderation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommentNode {
    pub id: String,
    pub article_id: String,
    pub author_id: String,
    pub parent_id: Option<String>,
    pub depth: i32,
    pub content: Option<String>,
    pub status: CommentStatus,
    pub reply_count: i64,
    pub is_edited: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub replies: Vec<CommentNode>,
}

impl From<Comment> for CommentNode {
    fn from(comment: Comment) -> Self {
        let content = comment.status.is_readable().then_some(comment.content);
        Self {
            id: comment.id,
            article_id: comment.article_id,
            author_id: comment.author_id,
            parent_id: comment.parent_id,
            depth: comment.depth,
            content,
            status: comment.status,
            reply_count: comment.reply_count,
            is_edited: comment.is_edited,
            created_at: comment.created_at,
            updated_at: comment.updated_at,
            replies: Vec::new(),
        }
    }
}
