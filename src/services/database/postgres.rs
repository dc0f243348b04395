//! PostgreSQL store. Mutations lock the rows they depend on with
//! `SELECT ... FOR UPDATE` inside one transaction; membership uniqueness is
//! enforced by the `(user_id, article_id)` primary keys.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{FromRow, Postgres, Transaction};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::{
    article_not_found, comment_not_found, ArticleGuard, ArticleMutation, CommentBuilder,
    CommentMutation, ContentStore, DueArticle, ReconcileReport,
};
use crate::error::{AppError, Result};
use crate::models::{
    article::Article,
    comment::{Comment, CommentSort},
    engagement::{Bookmark, EngagementKind, ToggleOutcome, ToggleResult},
    user::AuthorProfile,
};

const ARTICLE_COLUMNS: &str = "id, author_id, title, content, status, published_at, scheduled_for, \
     reaction_count, bookmark_count, comment_count, view_count, created_at, updated_at";

const COMMENT_COLUMNS: &str = "id, article_id, author_id, parent_id, depth, content, status, \
     reply_count, is_edited, created_at, updated_at, deleted_at";

/// LIMIT/OFFSET reject negatives, so oversized values clamp rather than wrap.
fn sql_bound(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

#[derive(Debug, FromRow)]
struct ArticleRow {
    id: String,
    author_id: String,
    title: String,
    content: String,
    status: String,
    published_at: Option<DateTime<Utc>>,
    scheduled_for: Option<DateTime<Utc>>,
    reaction_count: i64,
    bookmark_count: i64,
    comment_count: i64,
    view_count: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ArticleRow> for Article {
    type Error = AppError;

    fn try_from(row: ArticleRow) -> Result<Self> {
        Ok(Article {
            id: row.id,
            author_id: row.author_id,
            title: row.title,
            content: row.content,
            status: row.status.parse()?,
            published_at: row.published_at,
            scheduled_for: row.scheduled_for,
            reaction_count: row.reaction_count,
            bookmark_count: row.bookmark_count,
            comment_count: row.comment_count,
            view_count: row.view_count,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct CommentRow {
    id: String,
    article_id: String,
    author_id: String,
    parent_id: Option<String>,
    depth: i32,
    content: String,
    status: String,
    reply_count: i64,
    is_edited: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<CommentRow> for Comment {
    type Error = AppError;

    fn try_from(row: CommentRow) -> Result<Self> {
        Ok(Comment {
            id: row.id,
            article_id: row.article_id,
            author_id: row.author_id,
            parent_id: row.parent_id,
            depth: row.depth,
            content: row.content,
            status: row.status.parse()?,
            reply_count: row.reply_count,
            is_edited: row.is_edited,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct BookmarkRow {
    user_id: String,
    article_id: String,
    folder: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<BookmarkRow> for Bookmark {
    fn from(row: BookmarkRow) -> Self {
        Bookmark {
            user_id: row.user_id,
            article_id: row.article_id,
            folder: row.folder,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct AuthorRow {
    user_id: String,
    username: Option<String>,
    display_name: Option<String>,
    updated_at: DateTime<Utc>,
}

impl From<AuthorRow> for AuthorProfile {
    fn from(row: AuthorRow) -> Self {
        AuthorProfile {
            user_id: row.user_id,
            username: row.username,
            display_name: row.display_name,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(url)
            .await?;

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations applied");
        Ok(())
    }

    async fn lock_article(tx: &mut Transaction<'_, Postgres>, id: &str) -> Result<Article> {
        let sql = format!("SELECT {} FROM articles WHERE id = $1 FOR UPDATE", ARTICLE_COLUMNS);
        let row = sqlx::query_as::<_, ArticleRow>(&sql)
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or_else(article_not_found)?;
        row.try_into()
    }

    async fn lock_comment(tx: &mut Transaction<'_, Postgres>, id: &str) -> Result<Option<Comment>> {
        let sql = format!("SELECT {} FROM comments WHERE id = $1 FOR UPDATE", COMMENT_COLUMNS);
        sqlx::query_as::<_, CommentRow>(&sql)
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?
            .map(Comment::try_from)
            .transpose()
    }

    /// Locks the article a comment belongs to. Comment writers take this
    /// before any comment row, the same order as inserts and reconciliation.
    async fn lock_comment_article(
        tx: &mut Transaction<'_, Postgres>,
        comment_id: &str,
    ) -> Result<Option<String>> {
        let article_id = sqlx::query_scalar::<_, String>(
            r#"
            SELECT a.id FROM articles a
            JOIN comments c ON c.article_id = a.id
            WHERE c.id = $1
            FOR UPDATE OF a
            "#,
        )
        .bind(comment_id)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(article_id)
    }

    async fn adjust_reply_count(
        tx: &mut Transaction<'_, Postgres>,
        parent_id: &str,
        delta: i64,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE comments SET reply_count = GREATEST(reply_count + $1, 0) WHERE id = $2",
        )
        .bind(delta)
        .bind(parent_id)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Recomputes one article's counters while holding its row lock, which is
    /// the same lock every toggle and comment insert takes first.
    async fn reconcile_article(&self, article_id: &str) -> Result<(bool, u64)> {
        let mut tx = self.pool.begin().await?;
        let article = Self::lock_article(&mut tx, article_id).await?;

        sqlx::query("SELECT id FROM comments WHERE article_id = $1 ORDER BY id FOR UPDATE")
            .bind(article_id)
            .fetch_all(&mut *tx)
            .await?;

        let (reactions, bookmarks, comments): (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                (SELECT COUNT(*) FROM reactions WHERE article_id = $1),
                (SELECT COUNT(*) FROM bookmarks WHERE article_id = $1),
                (SELECT COUNT(*) FROM comments WHERE article_id = $1)
            "#,
        )
        .bind(article_id)
        .fetch_one(&mut *tx)
        .await?;

        let article_drifted = (article.reaction_count, article.bookmark_count, article.comment_count)
            != (reactions, bookmarks, comments);
        if article_drifted {
            warn!(
                article_id,
                stored = ?(article.reaction_count, article.bookmark_count, article.comment_count),
                actual = ?(reactions, bookmarks, comments),
                "Correcting drifted article counters"
            );
            sqlx::query(
                "UPDATE articles SET reaction_count = $1, bookmark_count = $2, comment_count = $3 WHERE id = $4",
            )
            .bind(reactions)
            .bind(bookmarks)
            .bind(comments)
            .bind(article_id)
            .execute(&mut *tx)
            .await?;
        }

        let replies_fixed = sqlx::query(
            r#"
            UPDATE comments AS c
            SET reply_count = actual.n
            FROM (
                SELECT p.id, COUNT(ch.id) FILTER (WHERE ch.status <> 'deleted') AS n
                FROM comments p
                LEFT JOIN comments ch ON ch.parent_id = p.id
                WHERE p.article_id = $1
                GROUP BY p.id
            ) AS actual
            WHERE c.id = actual.id AND c.reply_count <> actual.n
            "#,
        )
        .bind(article_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;
        Ok((article_drifted, replies_fixed))
    }
}

#[async_trait]
impl ContentStore for PgStore {
    async fn verify_connection(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn insert_article(&self, article: &Article) -> Result<()> {
        let sql = format!(
            "INSERT INTO articles ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
            ARTICLE_COLUMNS
        );
        sqlx::query(&sql)
            .bind(&article.id)
            .bind(&article.author_id)
            .bind(&article.title)
            .bind(&article.content)
            .bind(article.status.as_str())
            .bind(article.published_at)
            .bind(article.scheduled_for)
            .bind(article.reaction_count)
            .bind(article.bookmark_count)
            .bind(article.comment_count)
            .bind(article.view_count)
            .bind(article.created_at)
            .bind(article.updated_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_article(&self, id: &str) -> Result<Option<Article>> {
        let sql = format!("SELECT {} FROM articles WHERE id = $1", ARTICLE_COLUMNS);
        sqlx::query_as::<_, ArticleRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Article::try_from)
            .transpose()
    }

    async fn update_article(&self, id: &str, mutate: &ArticleMutation<'_>) -> Result<Article> {
        let mut tx = self.pool.begin().await?;
        let mut article = Self::lock_article(&mut tx, id).await?;
        mutate(&mut article)?;

        let sql = format!(
            r#"
            UPDATE articles
            SET title = $1, content = $2, status = $3, published_at = $4,
                scheduled_for = $5, updated_at = $6
            WHERE id = $7
            RETURNING {}
            "#,
            ARTICLE_COLUMNS
        );
        let row = sqlx::query_as::<_, ArticleRow>(&sql)
            .bind(&article.title)
            .bind(&article.content)
            .bind(article.status.as_str())
            .bind(article.published_at)
            .bind(article.scheduled_for)
            .bind(article.updated_at)
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        row.try_into()
    }

    async fn due_scheduled_articles(
        &self,
        now: DateTime<Utc>,
        after: Option<&DueArticle>,
        limit: usize,
    ) -> Result<Vec<DueArticle>> {
        let rows = sqlx::query_as::<_, (String, DateTime<Utc>)>(
            r#"
            SELECT id, scheduled_for FROM articles
            WHERE status = 'scheduled' AND scheduled_for <= $1
              AND ($2::TIMESTAMPTZ IS NULL OR (scheduled_for, id) > ($2, $3))
            ORDER BY scheduled_for, id
            LIMIT $4
            "#,
        )
        .bind(now)
        .bind(after.map(|cursor| cursor.scheduled_for))
        .bind(after.map(|cursor| cursor.id.as_str()).unwrap_or(""))
        .bind(sql_bound(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, scheduled_for)| DueArticle { scheduled_for, id })
            .collect())
    }

    async fn increment_view_count(&self, id: &str) -> Result<i64> {
        sqlx::query_scalar::<_, i64>(
            "UPDATE articles SET view_count = view_count + 1 WHERE id = $1 RETURNING view_count",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(article_not_found)
    }

    async fn toggle_engagement(
        &self,
        kind: EngagementKind,
        user_id: &str,
        article_id: &str,
        folder: Option<&str>,
        now: DateTime<Utc>,
        guard: &ArticleGuard<'_>,
    ) -> Result<ToggleResult> {
        let mut tx = self.pool.begin().await?;
        let article = Self::lock_article(&mut tx, article_id).await?;
        guard(&article)?;

        let delete_sql = format!(
            "DELETE FROM {} WHERE user_id = $1 AND article_id = $2",
            kind.table()
        );
        let removed = sqlx::query(&delete_sql)
            .bind(user_id)
            .bind(article_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let outcome = if removed > 0 {
            ToggleOutcome::Removed
        } else {
            match kind {
                EngagementKind::Reaction => {
                    sqlx::query(
                        "INSERT INTO reactions (user_id, article_id, created_at) VALUES ($1, $2, $3)",
                    )
                    .bind(user_id)
                    .bind(article_id)
                    .bind(now)
                    .execute(&mut *tx)
                    .await?;
                }
                EngagementKind::Bookmark => {
                    sqlx::query(
                        "INSERT INTO bookmarks (user_id, article_id, folder, created_at) VALUES ($1, $2, $3, $4)",
                    )
                    .bind(user_id)
                    .bind(article_id)
                    .bind(folder)
                    .bind(now)
                    .execute(&mut *tx)
                    .await?;
                }
            }
            ToggleOutcome::Created
        };

        let delta: i64 = match outcome {
            ToggleOutcome::Created => 1,
            ToggleOutcome::Removed => -1,
        };
        let column = kind.counter_column();
        let update_sql = format!(
            "UPDATE articles SET {col} = GREATEST({col} + $1, 0) WHERE id = $2 RETURNING {col}",
            col = column
        );
        let count = sqlx::query_scalar::<_, i64>(&update_sql)
            .bind(delta)
            .bind(article_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        debug!(%kind, user_id, article_id, ?outcome, count, "Engagement toggled");
        Ok(ToggleResult { outcome, count })
    }

    async fn has_engagement(&self, kind: EngagementKind, user_id: &str, article_id: &str) -> Result<bool> {
        let sql = format!(
            "SELECT EXISTS (SELECT 1 FROM {} WHERE user_id = $1 AND article_id = $2)",
            kind.table()
        );
        let exists = sqlx::query_scalar::<_, bool>(&sql)
            .bind(user_id)
            .bind(article_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    async fn list_bookmarks(
        &self,
        user_id: &str,
        folder: Option<&str>,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<Bookmark>, usize)> {
        let rows = sqlx::query_as::<_, BookmarkRow>(
            r#"
            SELECT user_id, article_id, folder, created_at
            FROM bookmarks
            WHERE user_id = $1 AND ($2::TEXT IS NULL OR folder = $2)
            ORDER BY created_at DESC, article_id
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(user_id)
        .bind(folder)
        .bind(sql_bound(limit))
        .bind(sql_bound(offset))
        .fetch_all(&self.pool)
        .await?;

        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM bookmarks WHERE user_id = $1 AND ($2::TEXT IS NULL OR folder = $2)",
        )
        .bind(user_id)
        .bind(folder)
        .fetch_one(&self.pool)
        .await?;

        Ok((rows.into_iter().map(Bookmark::from).collect(), total as usize))
    }

    async fn insert_comment(
        &self,
        article_id: &str,
        parent_id: Option<&str>,
        build: &CommentBuilder<'_>,
    ) -> Result<Comment> {
        let mut tx = self.pool.begin().await?;
        let article = Self::lock_article(&mut tx, article_id).await?;
        let parent = match parent_id {
            Some(id) => Some(
                Self::lock_comment(&mut tx, id)
                    .await?
                    .ok_or_else(|| AppError::not_found("Parent comment"))?,
            ),
            None => None,
        };

        let comment = build(&article, parent.as_ref())?;
        if comment.parent_id.as_deref() != parent_id {
            return Err(AppError::internal("Comment built under a different parent"));
        }

        let sql = format!(
            "INSERT INTO comments ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
            COMMENT_COLUMNS
        );
        sqlx::query(&sql)
            .bind(&comment.id)
            .bind(&comment.article_id)
            .bind(&comment.author_id)
            .bind(&comment.parent_id)
            .bind(comment.depth)
            .bind(&comment.content)
            .bind(comment.status.as_str())
            .bind(comment.reply_count)
            .bind(comment.is_edited)
            .bind(comment.created_at)
            .bind(comment.updated_at)
            .bind(comment.deleted_at)
            .execute(&mut *tx)
            .await?;

        if let Some(parent_id) = comment.parent_id.as_deref() {
            if comment.status.counts_as_reply() {
                Self::adjust_reply_count(&mut tx, parent_id, 1).await?;
            }
        }
        sqlx::query("UPDATE articles SET comment_count = comment_count + 1 WHERE id = $1")
            .bind(article_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(comment)
    }

    async fn get_comment(&self, id: &str) -> Result<Option<Comment>> {
        let sql = format!("SELECT {} FROM comments WHERE id = $1", COMMENT_COLUMNS);
        sqlx::query_as::<_, CommentRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Comment::try_from)
            .transpose()
    }

    async fn update_comment(&self, id: &str, mutate: &CommentMutation<'_>) -> Result<Comment> {
        let mut tx = self.pool.begin().await?;
        Self::lock_comment_article(&mut tx, id)
            .await?
            .ok_or_else(comment_not_found)?;
        let current = Self::lock_comment(&mut tx, id)
            .await?
            .ok_or_else(comment_not_found)?;

        let mut next = current.clone();
        mutate(&mut next)?;

        let sql = format!(
            r#"
            UPDATE comments
            SET content = $1, status = $2, is_edited = $3, updated_at = $4, deleted_at = $5
            WHERE id = $6
            RETURNING {}
            "#,
            COMMENT_COLUMNS
        );
        let row = sqlx::query_as::<_, CommentRow>(&sql)
            .bind(&next.content)
            .bind(next.status.as_str())
            .bind(next.is_edited)
            .bind(next.updated_at)
            .bind(next.deleted_at)
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

        let was_counted = current.status.counts_as_reply();
        let is_counted = next.status.counts_as_reply();
        if was_counted != is_counted {
            if let Some(parent_id) = current.parent_id.as_deref() {
                let delta = if is_counted { 1 } else { -1 };
                Self::adjust_reply_count(&mut tx, parent_id, delta).await?;
            }
        }

        tx.commit().await?;
        row.try_into()
    }

    async fn list_root_comments(
        &self,
        article_id: &str,
        sort: CommentSort,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<Comment>, usize)> {
        let order = match sort {
            CommentSort::Newest => "created_at DESC, id DESC",
            CommentSort::Oldest => "created_at ASC, id ASC",
        };
        let sql = format!(
            "SELECT {} FROM comments WHERE article_id = $1 AND parent_id IS NULL ORDER BY {} LIMIT $2 OFFSET $3",
            COMMENT_COLUMNS, order
        );
        let rows = sqlx::query_as::<_, CommentRow>(&sql)
            .bind(article_id)
            .bind(sql_bound(limit))
            .bind(sql_bound(offset))
            .fetch_all(&self.pool)
            .await?;

        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM comments WHERE article_id = $1 AND parent_id IS NULL",
        )
        .bind(article_id)
        .fetch_one(&self.pool)
        .await?;

        let comments = rows
            .into_iter()
            .map(Comment::try_from)
            .collect::<Result<Vec<_>>>()?;
        Ok((comments, total as usize))
    }

    async fn list_children(&self, parent_ids: &[String]) -> Result<Vec<Comment>> {
        if parent_ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {} FROM comments WHERE parent_id = ANY($1) ORDER BY created_at ASC, id ASC",
            COMMENT_COLUMNS
        );
        sqlx::query_as::<_, CommentRow>(&sql)
            .bind(parent_ids)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Comment::try_from)
            .collect()
    }

    async fn upsert_author(&self, profile: &AuthorProfile) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO author_profiles (user_id, username, display_name, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id) DO UPDATE
            SET username = EXCLUDED.username,
                display_name = EXCLUDED.display_name,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&profile.user_id)
        .bind(&profile.username)
        .bind(&profile.display_name)
        .bind(profile.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_author(&self, user_id: &str) -> Result<Option<AuthorProfile>> {
        let row = sqlx::query_as::<_, AuthorRow>(
            "SELECT user_id, username, display_name, updated_at FROM author_profiles WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(AuthorProfile::from))
    }

    async fn reconcile_counters(&self) -> Result<ReconcileReport> {
        let ids = sqlx::query_scalar::<_, String>("SELECT id FROM articles ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        let mut report = ReconcileReport::default();
        for id in ids {
            report.articles_checked += 1;
            match self.reconcile_article(&id).await {
                Ok((article_drifted, replies_fixed)) => {
                    if article_drifted {
                        report.article_counters_fixed += 1;
                    }
                    report.reply_counters_fixed += replies_fixed;
                }
                // The next pass retries it; the rest of the table still gets checked.
                Err(e) => {
                    error!("Failed to reconcile counters for article {}: {}", id, e);
                    report.articles_failed += 1;
                }
            }
        }
        Ok(report)
    }
}
