//! In-process store. One mutex guards every table, so each trait method is
//! atomic in the same way a single database transaction is.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;

use super::{
    article_not_found, comment_not_found, ArticleGuard, ArticleMutation, CommentBuilder,
    CommentMutation, ContentStore, DueArticle, ReconcileReport,
};
use crate::error::{AppError, Result};
use crate::models::{
    article::{Article, ArticleStatus},
    comment::{Comment, CommentSort},
    engagement::{Bookmark, EngagementKind, Reaction, ToggleOutcome, ToggleResult},
    user::AuthorProfile,
};

type MembershipKey = (String, String);

#[derive(Default)]
struct Tables {
    articles: HashMap<String, Article>,
    reactions: HashMap<MembershipKey, Reaction>,
    bookmarks: HashMap<MembershipKey, Bookmark>,
    comments: HashMap<String, Comment>,
    authors: HashMap<String, AuthorProfile>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrites an article's counters without touching the ledger. Only
    /// useful to simulate drift for the reconciliation pass.
    pub fn force_counters(&self, article_id: &str, reactions: i64, bookmarks: i64, comments: i64) {
        if let Some(article) = self.tables.lock().articles.get_mut(article_id) {
            article.reaction_count = reactions;
            article.bookmark_count = bookmarks;
            article.comment_count = comments;
        }
    }
}

fn sort_comments(comments: &mut [Comment], sort: CommentSort) {
    comments.sort_by(|a, b| {
        let ord = a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id));
        match sort {
            CommentSort::Oldest => ord,
            CommentSort::Newest => ord.reverse(),
        }
    });
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn verify_connection(&self) -> Result<()> {
        Ok(())
    }

    async fn insert_article(&self, article: &Article) -> Result<()> {
        let mut tables = self.tables.lock();
        if tables.articles.contains_key(&article.id) {
            return Err(AppError::conflict("Article already exists"));
        }
        tables.articles.insert(article.id.clone(), article.clone());
        Ok(())
    }

    async fn get_article(&self, id: &str) -> Result<Option<Article>> {
        Ok(self.tables.lock().articles.get(id).cloned())
    }

    async fn update_article(&self, id: &str, mutate: &ArticleMutation<'_>) -> Result<Article> {
        let mut tables = self.tables.lock();
        let current = tables.articles.get(id).ok_or_else(article_not_found)?;

        let mut next = current.clone();
        mutate(&mut next)?;

        // Counters belong to the ledger and the tree, never to this path.
        next.reaction_count = current.reaction_count;
        next.bookmark_count = current.bookmark_count;
        next.comment_count = current.comment_count;
        next.view_count = current.view_count;

        tables.articles.insert(id.to_string(), next.clone());
        Ok(next)
    }

    async fn due_scheduled_articles(
        &self,
        now: DateTime<Utc>,
        after: Option<&DueArticle>,
        limit: usize,
    ) -> Result<Vec<DueArticle>> {
        let tables = self.tables.lock();
        let mut due: Vec<DueArticle> = tables
            .articles
            .values()
            .filter(|a| a.status == ArticleStatus::Scheduled)
            .filter_map(|a| {
                a.scheduled_for.filter(|at| *at <= now).map(|at| DueArticle {
                    scheduled_for: at,
                    id: a.id.clone(),
                })
            })
            .filter(|due| after.map_or(true, |cursor| due > cursor))
            .collect();
        due.sort();
        due.truncate(limit);
        Ok(due)
    }

    async fn increment_view_count(&self, id: &str) -> Result<i64> {
        let mut tables = self.tables.lock();
        let article = tables.articles.get_mut(id).ok_or_else(article_not_found)?;
        article.view_count += 1;
        Ok(article.view_count)
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
        let mut guard_tables = self.tables.lock();
        let tables = &mut *guard_tables;

        let article = tables.articles.get_mut(article_id).ok_or_else(article_not_found)?;
        guard(&*article)?;

        let key = (user_id.to_string(), article_id.to_string());
        let outcome = match kind {
            EngagementKind::Reaction => {
                if tables.reactions.remove(&key).is_some() {
                    ToggleOutcome::Removed
                } else {
                    tables.reactions.insert(
                        key,
                        Reaction {
                            user_id: user_id.to_string(),
                            article_id: article_id.to_string(),
                            created_at: now,
                        },
                    );
                    ToggleOutcome::Created
                }
            }
            EngagementKind::Bookmark => {
                if tables.bookmarks.remove(&key).is_some() {
                    ToggleOutcome::Removed
                } else {
                    tables.bookmarks.insert(
                        key,
                        Bookmark {
                            user_id: user_id.to_string(),
                            article_id: article_id.to_string(),
                            folder: folder.map(str::to_string),
                            created_at: now,
                        },
                    );
                    ToggleOutcome::Created
                }
            }
        };

        let counter = match kind {
            EngagementKind::Reaction => &mut article.reaction_count,
            EngagementKind::Bookmark => &mut article.bookmark_count,
        };
        match outcome {
            ToggleOutcome::Created => *counter += 1,
            ToggleOutcome::Removed => *counter = (*counter - 1).max(0),
        }

        Ok(ToggleResult {
            outcome,
            count: *counter,
        })
    }

    async fn has_engagement(&self, kind: EngagementKind, user_id: &str, article_id: &str) -> Result<bool> {
        let tables = self.tables.lock();
        let key = (user_id.to_string(), article_id.to_string());
        Ok(match kind {
            EngagementKind::Reaction => tables.reactions.contains_key(&key),
            EngagementKind::Bookmark => tables.bookmarks.contains_key(&key),
        })
    }

    async fn list_bookmarks(
        &self,
        user_id: &str,
        folder: Option<&str>,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<Bookmark>, usize)> {
        let tables = self.tables.lock();
        let mut bookmarks: Vec<Bookmark> = tables
            .bookmarks
            .values()
            .filter(|b| b.user_id == user_id)
            .filter(|b| folder.map_or(true, |f| b.folder.as_deref() == Some(f)))
            .cloned()
            .collect();
        bookmarks.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.article_id.cmp(&b.article_id))
        });

        let total = bookmarks.len();
        let page = bookmarks.into_iter().skip(offset).take(limit).collect();
        Ok((page, total))
    }

    async fn insert_comment(
        &self,
        article_id: &str,
        parent_id: Option<&str>,
        build: &CommentBuilder<'_>,
    ) -> Result<Comment> {
        let mut guard_tables = self.tables.lock();
        let tables = &mut *guard_tables;

        let article = tables.articles.get(article_id).ok_or_else(article_not_found)?;
        let parent = match parent_id {
            Some(id) => Some(
                tables
                    .comments
                    .get(id)
                    .ok_or_else(|| AppError::not_found("Parent comment"))?,
            ),
            None => None,
        };

        let comment = build(article, parent)?;
        if comment.parent_id.as_deref() != parent_id {
            return Err(AppError::internal("Comment built under a different parent"));
        }

        if let Some(parent) = comment.parent_id.as_ref().and_then(|id| tables.comments.get_mut(id)) {
            if comment.status.counts_as_reply() {
                parent.reply_count += 1;
            }
        }
        if let Some(article) = tables.articles.get_mut(article_id) {
            article.comment_count += 1;
        }
        tables.comments.insert(comment.id.clone(), comment.clone());

        Ok(comment)
    }

    async fn get_comment(&self, id: &str) -> Result<Option<Comment>> {
        Ok(self.tables.lock().comments.get(id).cloned())
    }

    async fn update_comment(&self, id: &str, mutate: &CommentMutation<'_>) -> Result<Comment> {
        let mut tables = self.tables.lock();
        let current = tables.comments.get(id).ok_or_else(comment_not_found)?;

        let mut next = current.clone();
        mutate(&mut next)?;

        // Tree shape is immutable.
        next.id = current.id.clone();
        next.article_id = current.article_id.clone();
        next.parent_id = current.parent_id.clone();
        next.depth = current.depth;
        next.reply_count = current.reply_count;

        let was_counted = current.status.counts_as_reply();
        let is_counted = next.status.counts_as_reply();
        if was_counted != is_counted {
            if let Some(parent) = next.parent_id.as_ref().and_then(|p| tables.comments.get_mut(p)) {
                if is_counted {
                    parent.reply_count += 1;
                } else {
                    parent.reply_count = (parent.reply_count - 1).max(0);
                }
            }
        }

        tables.comments.insert(id.to_string(), next.clone());
        Ok(next)
    }

    async fn list_root_comments(
        &self,
        article_id: &str,
        sort: CommentSort,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<Comment>, usize)> {
        let tables = self.tables.lock();
        let mut roots: Vec<Comment> = tables
            .comments
            .values()
            .filter(|c| c.article_id == article_id && c.parent_id.is_none())
            .cloned()
            .collect();
        sort_comments(&mut roots, sort);

        let total = roots.len();
        let page = roots.into_iter().skip(offset).take(limit).collect();
        Ok((page, total))
    }

    async fn list_children(&self, parent_ids: &[String]) -> Result<Vec<Comment>> {
        let tables = self.tables.lock();
        let mut children: Vec<Comment> = tables
            .comments
            .values()
            .filter(|c| c.parent_id.as_ref().map_or(false, |p| parent_ids.contains(p)))
            .cloned()
            .collect();
        sort_comments(&mut children, CommentSort::Oldest);
        Ok(children)
    }

    async fn upsert_author(&self, profile: &AuthorProfile) -> Result<()> {
        self.tables
            .lock()
            .authors
            .insert(profile.user_id.clone(), profile.clone());
        Ok(())
    }

    async fn get_author(&self, user_id: &str) -> Result<Option<AuthorProfile>> {
        Ok(self.tables.lock().authors.get(user_id).cloned())
    }

    async fn reconcile_counters(&self) -> Result<ReconcileReport> {
        let mut guard_tables = self.tables.lock();
        let tables = &mut *guard_tables;
        let mut report = ReconcileReport::default();

        let mut reactions: HashMap<&str, i64> = HashMap::new();
        for (_, article_id) in tables.reactions.keys() {
            *reactions.entry(article_id.as_str()).or_default() += 1;
        }
        let mut bookmarks: HashMap<&str, i64> = HashMap::new();
        for (_, article_id) in tables.bookmarks.keys() {
            *bookmarks.entry(article_id.as_str()).or_default() += 1;
        }
        let mut comments: HashMap<&str, i64> = HashMap::new();
        let mut replies: HashMap<&str, i64> = HashMap::new();
        for comment in tables.comments.values() {
            *comments.entry(comment.article_id.as_str()).or_default() += 1;
            if let Some(parent) = comment.parent_id.as_deref() {
                if comment.status.counts_as_reply() {
                    *replies.entry(parent).or_default() += 1;
                }
            }
        }

        for article in tables.articles.values_mut() {
            report.articles_checked += 1;
            let expected = (
                reactions.get(article.id.as_str()).copied().unwrap_or(0),
                bookmarks.get(article.id.as_str()).copied().unwrap_or(0),
                comments.get(article.id.as_str()).copied().unwrap_or(0),
            );
            if (article.reaction_count, article.bookmark_count, article.comment_count) != expected {
                article.reaction_count = expected.0;
                article.bookmark_count = expected.1;
                article.comment_count = expected.2;
                report.article_counters_fixed += 1;
            }
        }

        let expected_replies: HashMap<String, i64> = replies
            .into_iter()
            .map(|(id, n)| (id.to_string(), n))
            .collect();
        for comment in tables.comments.values_mut() {
            let expected = expected_replies.get(&comment.id).copied().unwrap_or(0);
            if comment.reply_count != expected {
                comment.reply_count = expected;
                report.reply_counters_fixed += 1;
            }
        }

        Ok(report)
    }
}
