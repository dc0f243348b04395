use crate::{
    error::{AppError, Result},
    models::{
        article::*,
        engagement::EngagementKind,
        user::AuthorProfile,
    },
    services::{auth::User, Database},
    utils::clock::Clock,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};
use validator::Validate;

#[derive(Clone)]
pub struct ArticleService {
    db: Arc<Database>,
    clock: Arc<dyn Clock>,
}

/// Author of record or an administrator.
fn ensure_can_manage(article: &Article, user: &User) -> Result<()> {
    if article.is_authored_by(&user.id) || user.is_admin() {
        Ok(())
    } else {
        Err(AppError::forbidden("Only the author can manage this article"))
    }
}

/// Non-published articles exist only for their author and administrators.
pub(crate) fn ensure_visible(article: &Article, viewer: Option<&User>) -> Result<()> {
    let allowed = article.is_published()
        || viewer
            .map(|user| article.is_authored_by(&user.id) || user.is_admin())
            .unwrap_or(false);
    if allowed {
        Ok(())
    } else {
        Err(AppError::not_found("Article"))
    }
}

fn parse_schedule_time(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|_| AppError::validation("scheduled_for must be an RFC 3339 timestamp"))
}

impl ArticleService {
    pub fn new(db: Arc<Database>, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// 创建新文章（草稿）
    pub async fn create_article(&self, user: &User, request: CreateArticleRequest) -> Result<Article> {
        debug!("Creating article for user: {}", user.id);
        request.validate()?;

        let article = Article::new(user.id.clone(), request.title, request.content, self.clock.now());
        self.db.insert_article(&article).await?;

        info!("Created draft article {} by {}", article.id, user.id);
        Ok(article)
    }

    /// 更新文章标题或正文
    pub async fn update_article(
        &self,
        article_id: &str,
        user: &User,
        request: UpdateArticleRequest,
    ) -> Result<Article> {
        debug!("Updating article: {}", article_id);
        request.validate()?;

        let now = self.clock.now();
        let UpdateArticleRequest { title, content } = request;
        let article = self
            .db
            .update_article(article_id, &|article| {
                ensure_can_manage(article, user)?;
                article.apply_edit(title.clone(), content.clone(), now)
            })
            .await?;

        info!("Updated article {}", article.id);
        Ok(article)
    }

    pub async fn get_article(&self, article_id: &str) -> Result<Article> {
        self.db
            .get_article(article_id)
            .await?
            .ok_or_else(|| AppError::not_found("Article"))
    }

    /// 定时发布
    pub async fn schedule(&self, article_id: &str, user: &User, scheduled_for: &str) -> Result<Article> {
        let at = parse_schedule_time(scheduled_for)?;
        let now = self.clock.now();
        if at <= now {
            return Err(AppError::validation("Scheduled time must be in the future"));
        }

        let article = self
            .db
            .update_article(article_id, &|article| {
                ensure_can_manage(article, user)?;
                article.schedule(at, now)
            })
            .await?;

        info!("Article {} scheduled for {}", article.id, at);
        Ok(article)
    }

    pub async fn cancel_schedule(&self, article_id: &str, user: &User) -> Result<Article> {
        let now = self.clock.now();
        let article = self
            .db
            .update_article(article_id, &|article| {
                ensure_can_manage(article, user)?;
                article.cancel_schedule(now)
            })
            .await?;

        info!("Article {} schedule cancelled", article.id);
        Ok(article)
    }

    /// 立即发布
    pub async fn publish_now(&self, article_id: &str, user: &User) -> Result<Article> {
        let now = self.clock.now();
        let article = self
            .db
            .update_article(article_id, &|article| {
                ensure_can_manage(article, user)?;
                article.publish(now)
            })
            .await?;

        info!("Article {} published by {}", article.id, user.id);
        Ok(article)
    }

    /// 归档（仅管理员）
    pub async fn archive(&self, article_id: &str, user: &User) -> Result<Article> {
        if !user.is_admin() {
            return Err(AppError::forbidden("Only administrators can archive articles"));
        }

        let now = self.clock.now();
        let article = self
            .db
            .update_article(article_id, &|article| article.archive(now))
            .await?;

        info!("Article {} archived by {}", article.id, user.id);
        Ok(article)
    }

    /// Publishes a scheduled article whose time has come. Returns `false`
    /// when someone else already moved it out of `scheduled`.
    pub async fn publish_due(&self, article_id: &str) -> Result<bool> {
        let now = self.clock.now();
        match self
            .db
            .update_article(article_id, &|article| article.publish_if_due(now))
            .await
        {
            Ok(article) => {
                info!("Scheduled article {} published", article.id);
                Ok(true)
            }
            Err(AppError::InvalidTransition(reason)) => {
                warn!("Skipping scheduled article {}: {}", article_id, reason);
                Ok(false)
            }
            Err(AppError::NotFound(_)) => {
                warn!("Scheduled article {} disappeared before publishing", article_id);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// 文章详情：作者信息、计数器以及当前读者的互动状态
    pub async fn article_view(&self, article_id: &str, viewer: Option<&User>) -> Result<ArticleView> {
        let mut article = self.get_article(article_id).await?;

        ensure_visible(&article, viewer)?;
        if article.is_published() {
            article.view_count = self.db.increment_view_count(article_id).await?;
        }

        let author = match self.db.get_author(&article.author_id).await? {
            Some(profile) => profile,
            None => AuthorProfile::unknown(&article.author_id, self.clock.now()),
        };

        let viewer = match viewer {
            Some(user) => Some(ViewerState {
                reacted: self
                    .db
                    .has_engagement(EngagementKind::Reaction, &user.id, article_id)
                    .await?,
                bookmarked: self
                    .db
                    .has_engagement(EngagementKind::Bookmark, &user.id, article_id)
                    .await?,
            }),
            None => None,
        };

        Ok(ArticleView { article, author, viewer })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::clock::ManualClock;
    use chrono::Duration;

    fn user(id: &str) -> User {
        User {
            id: id.to_string(),
            username: None,
            display_name: None,
            roles: vec!["user".to_string()],
        }
    }

    fn admin(id: &str) -> User {
        User {
            roles: vec!["admin".to_string()],
            ..user(id)
        }
    }

    fn service() -> (ArticleService, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let service = ArticleService::new(Arc::new(Database::memory()), clock.clone());
        (service, clock)
    }

    async fn draft(service: &ArticleService, author: &User) -> Article {
        service
            .create_article(
                author,
                CreateArticleRequest {
                    title: "Hello".into(),
                    content: "World".into(),
                },
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn only_the_author_or_admin_can_schedule() {
        let (service, clock) = service();
        let author = user("author");
        let article = draft(&service, &author).await;
        let at = (clock.now() + Duration::hours(1)).to_rfc3339();

        let err = service.schedule(&article.id, &user("stranger"), &at).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let scheduled = service.schedule(&article.id, &admin("root"), &at).await.unwrap();
        assert_eq!(scheduled.status, ArticleStatus::Scheduled);
    }

    #[tokio::test]
    async fn schedule_rejects_past_and_malformed_times() {
        let (service, clock) = service();
        let author = user("author");
        let article = draft(&service, &author).await;

        let past = (clock.now() - Duration::minutes(1)).to_rfc3339();
        assert!(matches!(
            service.schedule(&article.id, &author, &past).await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            service.schedule(&article.id, &author, "tomorrow").await,
            Err(AppError::Validation(_))
        ));

        let stored = service.get_article(&article.id).await.unwrap();
        assert_eq!(stored.status, ArticleStatus::Draft);
    }

    #[tokio::test]
    async fn archive_is_admin_only() {
        let (service, _clock) = service();
        let author = user("author");
        let article = draft(&service, &author).await;
        service.publish_now(&article.id, &author).await.unwrap();

        assert!(matches!(
            service.archive(&article.id, &author).await,
            Err(AppError::Forbidden(_))
        ));
        let archived = service.archive(&article.id, &admin("root")).await.unwrap();
        assert_eq!(archived.status, ArticleStatus::Archived);
        assert!(archived.published_at.is_some());
    }

    #[tokio::test]
    async fn publish_due_is_a_no_op_once_published() {
        let (service, clock) = service();
        let author = user("author");
        let article = draft(&service, &author).await;
        let at = (clock.now() + Duration::hours(1)).to_rfc3339();
        service.schedule(&article.id, &author, &at).await.unwrap();

        assert!(!service.publish_due(&article.id).await.unwrap());

        clock.advance(Duration::hours(2));
        assert!(service.publish_due(&article.id).await.unwrap());
        assert!(!service.publish_due(&article.id).await.unwrap());
    }

    #[tokio::test]
    async fn drafts_are_hidden_from_other_readers() {
        let (service, _clock) = service();
        let author = user("author");
        let article = draft(&service, &author).await;

        assert!(matches!(
            service.article_view(&article.id, None).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            service.article_view(&article.id, Some(&user("stranger"))).await,
            Err(AppError::NotFound(_))
        ));

        let view = service.article_view(&article.id, Some(&author)).await.unwrap();
        assert_eq!(view.article.view_count, 0);
        assert_eq!(view.author.user_id, "author");
    }

    #[tokio::test]
    async fn published_views_are_counted() {
        let (service, _clock) = service();
        let author = user("author");
        let article = draft(&service, &author).await;
        service.publish_now(&article.id, &author).await.unwrap();

        service.article_view(&article.id, None).await.unwrap();
        let view = service
            .article_view(&article.id, Some(&user("reader")))
            .await
            .unwrap();

        assert_eq!(view.article.view_count, 2);
        assert_eq!(
            view.viewer,
            Some(ViewerState {
                reacted: false,
                bookmarked: false
            })
        );
    }
}
