use crate::{
    config::Config,
    error::{AppError, Result},
    models::{
        comment::*,
        response::{PaginatedResult, Pagination},
    },
    services::{auth::User, Database},
    utils::clock::Clock,
};
use chrono::Duration;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};
use validator::Validate;

/// 评论相关的运行时参数
#[derive(Debug, Clone)]
pub struct CommentSettings {
    pub enabled: bool,
    pub max_length: usize,
    pub max_depth: i32,
    pub edit_window: Duration,
    pub default_per_page: usize,
    pub max_per_page: usize,
}

impl CommentSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            enabled: config.enable_comments,
            max_length: config.max_comment_length,
            max_depth: config.max_comment_depth,
            edit_window: Duration::minutes(config.comment_edit_window_minutes),
            default_per_page: config.default_comments_per_page,
            max_per_page: config.max_comments_per_page,
        }
    }
}

impl Default for CommentSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

#[derive(Clone)]
pub struct CommentService {
    db: Arc<Database>,
    clock: Arc<dyn Clock>,
    settings: CommentSettings,
}

impl CommentService {
    pub fn new(db: Arc<Database>, clock: Arc<dyn Clock>, settings: CommentSettings) -> Self {
        Self { db, clock, settings }
    }

    fn check_length(&self, content: &str) -> Result<()> {
        if content.trim().is_empty() {
            return Err(AppError::validation("Comment content cannot be empty"));
        }
        if content.chars().count() > self.settings.max_length {
            return Err(AppError::Validation(format!(
                "Comment exceeds {} characters",
                self.settings.max_length
            )));
        }
        Ok(())
    }

    pub async fn create_comment(&self, user: &User, request: CreateCommentRequest) -> Result<Comment> {
        debug!("Creating comment for article: {}", request.article_id);

        if !self.settings.enabled {
            return Err(AppError::forbidden("Comments are disabled"));
        }
        request.validate()?;
        self.check_length(&request.content)?;

        let now = self.clock.now();
        let max_depth = self.settings.max_depth;
        let comment = self
            .db
            .insert_comment(&request.article_id, request.parent_id.as_deref(), &|article, parent| {
                if !article.is_published() {
                    return Err(AppError::NotPublished(
                        "Cannot comment on unpublished articles".to_string(),
                    ));
                }
                if let Some(parent) = parent {
                    if parent.article_id != article.id {
                        return Err(AppError::validation(
                            "Parent comment belongs to a different article",
                        ));
                    }
                    if parent.is_deleted() {
                        return Err(AppError::not_found("Parent comment"));
                    }
                    if !parent.can_have_replies(max_depth) {
                        return Err(AppError::DepthExceeded(format!(
                            "Replies are limited to {} levels",
                            max_depth
                        )));
                    }
                }
                Ok(Comment::new(
                    article.id.clone(),
                    user.id.clone(),
                    request.content.clone(),
                    parent,
                    now,
                ))
            })
            .await?;

        info!(
            "Comment {} created on article {} at depth {}",
            comment.id, comment.article_id, comment.depth
        );
        Ok(comment)
    }

    pub async fn get_comment(&self, comment_id: &str) -> Result<Comment> {
        self.db
            .get_comment(comment_id)
            .await?
            .ok_or_else(|| AppError::not_found("Comment"))
    }

    /// 编辑评论：仅作者本人，且在编辑时限内
    pub async fn update_comment(
        &self,
        comment_id: &str,
        user: &User,
        request: UpdateCommentRequest,
    ) -> Result<Comment> {
        request.validate()?;
        self.check_length(&request.content)?;

        let now = self.clock.now();
        let window = self.settings.edit_window;
        let comment = self
            .db
            .update_comment(comment_id, &|comment| {
                if comment.is_deleted() {
                    return Err(AppError::not_found("Comment"));
                }
                if comment.author_id != user.id {
                    return Err(AppError::forbidden("Only the author can edit this comment"));
                }
                if now - comment.created_at > window {
                    return Err(AppError::EditWindowExpired(format!(
                        "Comments can only be edited within {} minutes",
                        window.num_minutes()
                    )));
                }
                comment.content = request.content.clone();
                comment.is_edited = true;
                comment.updated_at = now;
                Ok(())
            })
            .await?;

        info!("Comment {} edited", comment.id);
        Ok(comment)
    }

    /// 软删除：保留节点与子回复，清空内容
    pub async fn delete_comment(&self, comment_id: &str, user: &User) -> Result<Comment> {
        let now = self.clock.now();
        let comment = self
            .db
            .update_comment(comment_id, &|comment| {
                if comment.is_deleted() {
                    return Err(AppError::not_found("Comment"));
                }
                if comment.author_id != user.id && !user.is_admin() {
                    return Err(AppError::forbidden("Only the author can delete this comment"));
                }
                comment.tombstone(now);
                Ok(())
            })
            .await?;

        info!("Comment {} deleted by {}", comment.id, user.id);
        Ok(comment)
    }

    /// 审核评论状态（仅管理员）
    pub async fn moderate_comment(
        &self,
        comment_id: &str,
        user: &User,
        status: CommentStatus,
    ) -> Result<Comment> {
        if !user.is_admin() {
            return Err(AppError::forbidden("Only administrators can moderate comments"));
        }
        if status == CommentStatus::Deleted {
            return Err(AppError::validation("Use the delete operation to remove comments"));
        }

        let now = self.clock.now();
        let comment = self
            .db
            .update_comment(comment_id, &|comment| {
                if comment.is_deleted() {
                    return Err(AppError::invalid_transition("Deleted comments cannot be moderated"));
                }
                comment.status = status;
                comment.updated_at = now;
                Ok(())
            })
            .await?;

        info!("Comment {} moderated to {}", comment.id, status);
        Ok(comment)
    }

    /// 文章评论列表：分页的顶层评论，回复按层级逐级加载
    pub async fn list_article_comments(
        &self,
        article_id: &str,
        query: CommentQuery,
    ) -> Result<PaginatedResult<CommentNode>> {
        if self.db.get_article(article_id).await?.is_none() {
            return Err(AppError::not_found("Article"));
        }

        let sort = query.sort.unwrap_or_default();
        let (page, limit) = Pagination {
            page: query.page,
            limit: query.limit,
        }
        .resolve(self.settings.default_per_page, self.settings.max_per_page);

        let (roots, total) = self
            .db
            .list_root_comments(article_id, sort, Pagination::offset(page, limit), limit)
            .await?;
        let frontier = roots.iter().map(|c| c.id.clone()).collect();
        let descendants = self.load_descendants(frontier).await?;

        let threads = build_threads(roots, descendants, CommentSort::Oldest);
        Ok(PaginatedResult::new(threads, total, page, limit))
    }

    /// 单条评论的回复子树
    pub async fn list_replies(&self, comment_id: &str, sort: CommentSort) -> Result<CommentNode> {
        let root = self.get_comment(comment_id).await?;
        let descendants = self.load_descendants(vec![root.id.clone()]).await?;

        build_threads(vec![root], descendants, sort)
            .into_iter()
            .next()
            .ok_or_else(|| AppError::internal("Reply tree lost its root"))
    }

    /// Walks down one level per query until the depth bound or an empty level.
    async fn load_descendants(&self, mut frontier: Vec<String>) -> Result<Vec<Comment>> {
        let mut descendants = Vec::new();
        for _ in 1..self.settings.max_depth.max(1) {
            if frontier.is_empty() {
                break;
            }
            let level = self.db.list_children(&frontier).await?;
            frontier = level.iter().map(|c| c.id.clone()).collect();
            descendants.extend(level);
        }
        Ok(descendants)
    }
}

fn sort_nodes(nodes: &mut [CommentNode], sort: CommentSort) {
    nodes.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
    if sort == CommentSort::Newest {
        nodes.reverse();
    }
}

/// Assembles reply trees from a flat set of comments. `roots` keep their
/// given order; replies are ordered by `reply_sort`. Nodes are attached
/// deepest first so no recursion is needed.
pub fn build_threads(
    roots: Vec<Comment>,
    descendants: Vec<Comment>,
    reply_sort: CommentSort,
) -> Vec<CommentNode> {
    let root_ids: Vec<String> = roots.iter().map(|c| c.id.clone()).collect();
    let root_set: HashSet<&str> = root_ids.iter().map(String::as_str).collect();

    let mut slots: Vec<Option<CommentNode>> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for comment in roots.into_iter().chain(descendants) {
        if index.contains_key(&comment.id) {
            continue;
        }
        index.insert(comment.id.clone(), slots.len());
        slots.push(Some(CommentNode::from(comment)));
    }

    let mut order: Vec<(i32, usize)> = slots
        .iter()
        .enumerate()
        .filter_map(|(i, slot)| slot.as_ref().map(|node| (node.depth, i)))
        .collect();
    order.sort_by(|a, b| b.cmp(a));

    for (_, i) in order {
        let parent_idx = match slots[i].as_ref() {
            Some(node) if !root_set.contains(node.id.as_str()) => node
                .parent_id
                .as_ref()
                .and_then(|parent_id| index.get(parent_id))
                .copied(),
            _ => None,
        };
        let Some(parent_idx) = parent_idx else {
            continue;
        };
        if let Some(mut node) = slots[i].take() {
            sort_nodes(&mut node.replies, reply_sort);
            if let Some(parent) = slots[parent_idx].as_mut() {
                parent.replies.push(node);
            }
        }
    }

    root_ids
        .iter()
        .filter_map(|id| index.get(id))
        .filter_map(|&i| slots[i].take())
        .map(|mut node| {
            sort_nodes(&mut node.replies, reply_sort);
            node
        })
        .collect()
}
