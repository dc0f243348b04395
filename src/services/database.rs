use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::ops::Deref;
use std::sync::Arc;
use tracing::{error, info};

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::{
    article::Article,
    comment::{Comment, CommentSort},
    engagement::{Bookmark, EngagementKind, ToggleResult},
    user::AuthorProfile,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Rewrites a locked article row. An `Err` aborts the whole operation and
/// leaves the row untouched.
pub type ArticleMutation<'a> = dyn Fn(&mut Article) -> Result<()> + Send + Sync + 'a;

/// Inspects a locked article before a membership change.
pub type ArticleGuard<'a> = dyn Fn(&Article) -> Result<()> + Send + Sync + 'a;

/// Rewrites a locked comment row.
pub type CommentMutation<'a> = dyn Fn(&mut Comment) -> Result<()> + Send + Sync + 'a;

/// Produces the comment to insert from the locked article and parent.
pub type CommentBuilder<'a> =
    dyn Fn(&Article, Option<&Comment>) -> Result<Comment> + Send + Sync + 'a;

/// A scheduled article whose time has come. Sweeps page through these in
/// `(scheduled_for, id)` order and pass the last one back as the cursor.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct DueArticle {
    pub scheduled_for: DateTime<Utc>,
    pub id: String,
}

/// Counters a reconciliation pass had to correct.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub articles_checked: u64,
    pub article_counters_fixed: u64,
    pub reply_counters_fixed: u64,
    /// Articles whose pass errored and were left for the next run.
    pub articles_failed: u64,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.article_counters_fixed == 0 && self.reply_counters_fixed == 0 && self.articles_failed == 0
    }
}

/// The durable source of truth. Every mutating method is one atomic unit:
/// the row is read and locked, the supplied closure decides, and the write
/// plus any counter deltas commit together or not at all.
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn verify_connection(&self) -> Result<()>;

    // Articles
    async fn insert_article(&self, article: &Article) -> Result<()>;
    async fn get_article(&self, id: &str) -> Result<Option<Article>>;
    async fn update_article(&self, id: &str, mutate: &ArticleMutation<'_>) -> Result<Article>;
    /// Scheduled articles due at `now`, strictly after `after` in
    /// `(scheduled_for, id)` order.
    async fn due_scheduled_articles(
        &self,
        now: DateTime<Utc>,
        after: Option<&DueArticle>,
        limit: usize,
    ) -> Result<Vec<DueArticle>>;
    async fn increment_view_count(&self, id: &str) -> Result<i64>;

    // Engagement ledger
    async fn toggle_engagement(
        &self,
        kind: EngagementKind,
        user_id: &str,
        article_id: &str,
        folder: Option<&str>,
        now: DateTime<Utc>,
        guard: &ArticleGuard<'_>,
    ) -> Result<ToggleResult>;
    async fn has_engagement(&self, kind: EngagementKind, user_id: &str, article_id: &str) -> Result<bool>;
    async fn list_bookmarks(
        &self,
        user_id: &str,
        folder: Option<&str>,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<Bookmark>, usize)>;

    // Discussion tree
    async fn insert_comment(
        &self,
        article_id: &str,
        parent_id: Option<&str>,
        build: &CommentBuilder<'_>,
    ) -> Result<Comment>;
    async fn get_comment(&self, id: &str) -> Result<Option<Comment>>;
    async fn update_comment(&self, id: &str, mutate: &CommentMutation<'_>) -> Result<Comment>;
    async fn list_root_comments(
        &self,
        article_id: &str,
        sort: CommentSort,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<Comment>, usize)>;
    async fn list_children(&self, parent_ids: &[String]) -> Result<Vec<Comment>>;

    // Authors
    async fn upsert_author(&self, profile: &AuthorProfile) -> Result<()>;
    async fn get_author(&self, user_id: &str) -> Result<Option<AuthorProfile>>;

    // Maintenance
    async fn reconcile_counters(&self) -> Result<ReconcileReport>;
}

/// 数据库服务
#[derive(Clone)]
pub struct Database {
    store: Arc<dyn ContentStore>,
}

impl Database {
    /// 创建新的数据库实例
    pub async fn new(config: &Config) -> Result<Self> {
        if config.uses_memory_store() {
            info!("Using in-process memory store");
            return Ok(Self::memory());
        }

        info!("Initializing database connection pool");
        let store = PgStore::connect(&config.database_url, config.database_max_connections).await?;
        store.migrate().await?;

        Ok(Self::from_store(Arc::new(store)))
    }

    pub fn memory() -> Self {
        Self::from_store(Arc::new(MemoryStore::new()))
    }

    pub fn from_store(store: Arc<dyn ContentStore>) -> Self {
        Self { store }
    }

    /// 验证数据库连接
    pub async fn verify(&self) -> Result<()> {
        match self.store.verify_connection().await {
            Ok(()) => {
                info!("Database connection verified successfully");
                Ok(())
            }
            Err(e) => {
                error!("Failed to verify database connection: {}", e);
                Err(e)
            }
        }
    }
}

impl Deref for Database {
    type Target = dyn ContentStore;

    fn deref(&self) -> &Self::Target {
        self.store.as_ref()
    }
}

pub(crate) fn article_not_found() -> AppError {
    AppError::not_found("Article")
}

pub(crate) fn comment_not_found() -> AppError {
    AppError::not_found("Comment")
}
