use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use validator::Validate;

/// The two toggle relations kept in the engagement ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngagementKind {
    Reaction,
    Bookmark,
}

impl EngagementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reaction => "reaction",
            Self::Bookmark => "bookmark",
        }
    }

    pub fn table(&self) -> &'static str {
        match self {
            Self::Reaction => "reactions",
            Self::Bookmark => "bookmarks",
        }
    }

    /// Denormalized article column mirroring this relation.
    pub fn counter_column(&self) -> &'static str {
        match self {
            Self::Reaction => "reaction_count",
            Self::Bookmark => "bookmark_count",
        }
    }
}

impl fmt::Display for EngagementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reaction {
    pub user_id: String,
    pub article_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bookmark {
    pub user_id: String,
    pub article_id: String,
    pub folder: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToggleOutcome {
    Created,
    Removed,
}

/// Result of one toggle: which way it went and the counter afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToggleResult {
    pub outcome: ToggleOutcome,
    pub count: i64,
}

impl ToggleResult {
    pub fn is_active(&self) -> bool {
        self.outcome == ToggleOutcome::Created
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ToggleResponse {
    pub active: bool,
    pub count: i64,
}

impl From<ToggleResult> for ToggleResponse {
    fn from(result: ToggleResult) -> Self {
        Self {
            active: result.is_active(),
            count: result.count,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct EngagementStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    pub count: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct ToggleBookmarkRequest {
    #[validate(length(min = 1, max = 64))]
    pub folder: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookmarkQuery {
    pub folder: Option<String>,
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookmarkWithArticle {
    #[serde(flatten)]
    pub bookmark: Bookmark,
    pub article_title: String,
    pub article_author_id: String,
}
