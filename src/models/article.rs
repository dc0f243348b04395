use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, Result};
use crate::models::user::AuthorProfile;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Article {
    pub id: String,
    pub author_id: String,
    pub title: String,
    pub content: String,
    pub status: ArticleStatus,
    pub published_at: Option<DateTime<Utc>>,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub reaction_count: i64,
    pub bookmark_count: i64,
    pub comment_count: i64,
    pub view_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 文章生命周期状态
///
/// ```text
/// draft ──► scheduled ──► published ──► archived
///   ▲           │             ▲
///   └───────────┘             │
///   └─────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum ArticleStatus {
    #[default]
    Draft,
    Scheduled,
    Published,
    Archived,
}

impl ArticleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Scheduled => "scheduled",
            Self::Published => "published",
            Self::Archived => "archived",
        }
    }

    /// Whether the lifecycle graph has an edge from `self` to `next`.
    pub fn can_transition_to(&self, next: ArticleStatus) -> bool {
        matches!(
            (self, next),
            (Self::Draft, Self::Scheduled)
                | (Self::Draft, Self::Published)
                | (Self::Scheduled, Self::Draft)
                | (Self::Scheduled, Self::Published)
                | (Self::Published, Self::Archived)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Archived)
    }
}

impl fmt::Display for ArticleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArticleStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "draft" => Ok(Self::Draft),
            "scheduled" => Ok(Self::Scheduled),
            "published" => Ok(Self::Published),
            "archived" => Ok(Self::Archived),
            other => Err(AppError::Internal(format!("Unknown article status: {}", other))),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateArticleRequest {
    #[validate(length(min = 1, max = 150))]
    pub title: String,

    #[validate(length(max = 50000))]
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct UpdateArticleRequest {
    #[validate(length(min = 1, max = 150))]
    pub title: Option<String>,

    #[validate(length(max = 50000))]
    pub content: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ScheduleArticleRequest {
    /// RFC 3339 timestamp, must lie in the future
    pub scheduled_for: String,
}

/// Viewer-specific toggle state attached by the aggregation facade.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ViewerState {
    pub reacted: bool,
    pub bookmarked: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleView {
    #[serde(flatten)]
    pub article: Article,
    pub author: AuthorProfile,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viewer: Option<ViewerState>,
}

impl Article {
    pub fn new(author_id: String, title: String, content: String, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            author_id,
            title,
            content,
            status: ArticleStatus::Draft,
            published_at: None,
            scheduled_for: None,
            reaction_count: 0,
            bookmark_count: 0,
            comment_count: 0,
            view_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_published(&self) -> bool {
        self.status == ArticleStatus::Published
    }

    pub fn is_authored_by(&self, user_id: &str) -> bool {
        self.author_id == user_id
    }

    fn ensure_transition(&self, next: ArticleStatus, action: &str) -> Result<()> {
        if self.status.can_transition_to(next) {
            Ok(())
        } else {
            Err(AppError::InvalidTransition(format!(
                "Cannot {} an article in {} status",
                action, self.status
            )))
        }
    }

    pub fn schedule(&mut self, at: DateTime<Utc>, now: DateTime<Utc>) -> Result<()> {
        if self.status != ArticleStatus::Draft {
            return Err(AppError::InvalidTransition(format!(
                "Cannot schedule an article in {} status",
                self.status
            )));
        }
        if at <= now {
            return Err(AppError::validation("Scheduled time must be in the future"));
        }

        self.status = ArticleStatus::Scheduled;
        self.scheduled_for = Some(at);
        self.updated_at = now;
        Ok(())
    }

    pub fn cancel_schedule(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.status != ArticleStatus::Scheduled {
            return Err(AppError::InvalidTransition(format!(
                "Cannot cancel the schedule of an article in {} status",
                self.status
            )));
        }

        self.status = ArticleStatus::Draft;
        self.scheduled_for = None;
        self.updated_at = now;
        Ok(())
    }

    pub fn publish(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.ensure_transition(ArticleStatus::Published, "publish")?;

        self.status = ArticleStatus::Published;
        self.scheduled_for = None;
        if self.published_at.is_none() {
            self.published_at = Some(now);
        }
        self.updated_at = now;
        Ok(())
    }

    /// Publishes only if the article is still scheduled and its time has come.
    pub fn publish_if_due(&mut self, now: DateTime<Utc>) -> Result<()> {
        match (self.status, self.scheduled_for) {
            (ArticleStatus::Scheduled, Some(at)) if at <= now => self.publish(now),
            (ArticleStatus::Scheduled, _) => Err(AppError::invalid_transition(
                "Article is scheduled for a later time",
            )),
            (status, _) => Err(AppError::InvalidTransition(format!(
                "Article is no longer scheduled (status {})",
                status
            ))),
        }
    }

    pub fn archive(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.ensure_transition(ArticleStatus::Archived, "archive")?;

        self.status = ArticleStatus::Archived;
        self.updated_at = now;
        Ok(())
    }

    pub fn apply_edit(
        &mut self,
        title: Option<String>,
        content: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if self.status.is_terminal() {
            return Err(AppError::invalid_transition("Archived articles cannot be edited"));
        }
        if let Some(title) = title {
            self.title = title;
        }
        if let Some(content) = content {
            self.content = content;
        }
        self.updated_at = now;
        Ok(())
    }
}
