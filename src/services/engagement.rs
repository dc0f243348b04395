//! Reaction and bookmark toggles. Both relations share one code path: the
//! store flips membership and moves the article counter in a single unit.

use crate::{
    error::{AppError, Result},
    models::{
        article::Article,
        engagement::*,
        response::{PaginatedResult, Pagination},
    },
    services::{article::ensure_visible, auth::User, Database},
    utils::clock::Clock,
};
use std::sync::Arc;
use tracing::{debug, info};
use validator::Validate;

const DEFAULT_BOOKMARKS_PER_PAGE: usize = 20;
const MAX_BOOKMARKS_PER_PAGE: usize = 100;

#[derive(Clone)]
pub struct EngagementService {
    db: Arc<Database>,
    clock: Arc<dyn Clock>,
}

fn ensure_published(article: &Article) -> Result<()> {
    if article.is_published() {
        Ok(())
    } else {
        Err(AppError::NotPublished(
            "Only published articles accept reactions and bookmarks".to_string(),
        ))
    }
}

impl EngagementService {
    pub fn new(db: Arc<Database>, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    async fn toggle(
        &self,
        kind: EngagementKind,
        user: &User,
        article_id: &str,
        folder: Option<&str>,
    ) -> Result<ToggleResult> {
        debug!("Toggling {} on article {} for user {}", kind, article_id, user.id);

        let result = self
            .db
            .toggle_engagement(
                kind,
                &user.id,
                article_id,
                folder,
                self.clock.now(),
                &ensure_published,
            )
            .await?;

        info!(
            "User {} {:?} {} on article {} (count {})",
            user.id, result.outcome, kind, article_id, result.count
        );
        Ok(result)
    }

    pub async fn toggle_reaction(&self, user: &User, article_id: &str) -> Result<ToggleResult> {
        self.toggle(EngagementKind::Reaction, user, article_id, None).await
    }

    /// 切换收藏。`folder` 只在新建收藏时生效。
    pub async fn toggle_bookmark(
        &self,
        user: &User,
        article_id: &str,
        request: ToggleBookmarkRequest,
    ) -> Result<ToggleResult> {
        request.validate()?;
        self.toggle(EngagementKind::Bookmark, user, article_id, request.folder.as_deref())
            .await
    }

    /// Current counter plus, for a signed-in caller, whether they hold the toggle.
    /// Drafts and scheduled articles answer `NotFound` to anyone but their
    /// author or an admin, like the article itself.
    pub async fn status(
        &self,
        kind: EngagementKind,
        user: Option<&User>,
        article_id: &str,
    ) -> Result<EngagementStatus> {
        let count = self.count(kind, user, article_id).await?;
        let active = match user {
            Some(user) => Some(self.db.has_engagement(kind, &user.id, article_id).await?),
            None => None,
        };
        Ok(EngagementStatus { active, count })
    }

    pub async fn count(
        &self,
        kind: EngagementKind,
        viewer: Option<&User>,
        article_id: &str,
    ) -> Result<i64> {
        let article = self
            .db
            .get_article(article_id)
            .await?
            .ok_or_else(|| AppError::not_found("Article"))?;
        ensure_visible(&article, viewer)?;

        Ok(match kind {
            EngagementKind::Reaction => article.reaction_count,
            EngagementKind::Bookmark => article.bookmark_count,
        })
    }

    /// 获取用户收藏列表
    pub async fn list_bookmarks(
        &self,
        user: &User,
        query: BookmarkQuery,
    ) -> Result<PaginatedResult<BookmarkWithArticle>> {
        let (page, limit) = Pagination {
            page: query.page,
            limit: query.limit,
        }
        .resolve(DEFAULT_BOOKMARKS_PER_PAGE, MAX_BOOKMARKS_PER_PAGE);

        let (bookmarks, total) = self
            .db
            .list_bookmarks(&user.id, query.folder.as_deref(), Pagination::offset(page, limit), limit)
            .await?;

        let mut data = Vec::with_capacity(bookmarks.len());
        for bookmark in bookmarks {
            if let Some(article) = self.db.get_article(&bookmark.article_id).await? {
                data.push(BookmarkWithArticle {
                    bookmark,
                    article_title: article.title,
                    article_author_id: article.author_id,
                });
            }
        }

        Ok(PaginatedResult::new(data, total, page, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::clock::SystemClock;

    fn user(id: &str) -> User {
        User {
            id: id.to_string(),
            username: None,
            display_name: None,
            roles: vec![],
        }
    }

    async fn setup(published: bool) -> (EngagementService, Arc<Database>, String) {
        let db = Arc::new(Database::memory());
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let mut article = Article::new("author".into(), "T".into(), "C".into(), clock.now());
        if published {
            article.publish(clock.now()).unwrap();
        }
        db.insert_article(&article).await.unwrap();
        (EngagementService::new(db.clone(), clock), db, article.id)
    }

    #[tokio::test]
    async fn reaction_toggle_round_trip_restores_count() {
        let (service, _db, id) = setup(true).await;
        let reader = user("reader");

        let on = service.toggle_reaction(&reader, &id).await.unwrap();
        assert_eq!(on.outcome, ToggleOutcome::Created);
        assert_eq!(on.count, 1);

        let off = service.toggle_reaction(&reader, &id).await.unwrap();
        assert_eq!(off.outcome, ToggleOutcome::Removed);
        assert_eq!(off.count, 0);

        let status = service
            .status(EngagementKind::Reaction, Some(&reader), &id)
            .await
            .unwrap();
        assert_eq!(status.active, Some(false));
        assert_eq!(status.count, 0);
    }

    #[tokio::test]
    async fn drafts_reject_toggles() {
        let (service, db, id) = setup(false).await;
        let err = service.toggle_reaction(&user("reader"), &id).await.unwrap_err();
        assert!(matches!(err, AppError::NotPublished(_)));

        let article = db.get_article(&id).await.unwrap().unwrap();
        assert_eq!(article.reaction_count, 0);
    }

    #[tokio::test]
    async fn draft_counters_are_hidden_from_strangers() {
        let (service, _db, id) = setup(false).await;

        for viewer in [None, Some(user("reader"))] {
            assert!(matches!(
                service.status(EngagementKind::Reaction, viewer.as_ref(), &id).await,
                Err(AppError::NotFound(_))
            ));
            assert!(matches!(
                service.count(EngagementKind::Bookmark, viewer.as_ref(), &id).await,
                Err(AppError::NotFound(_))
            ));
        }

        let own = service
            .status(EngagementKind::Reaction, Some(&user("author")), &id)
            .await
            .unwrap();
        assert_eq!(own, EngagementStatus { active: Some(false), count: 0 });

        let admin = User {
            roles: vec!["admin".into()],
            ..user("moderator")
        };
        assert_eq!(
            service.count(EngagementKind::Reaction, Some(&admin), &id).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn missing_article_is_not_found() {
        let (service, _db, _id) = setup(true).await;
        assert!(matches!(
            service.toggle_reaction(&user("reader"), "nope").await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            service.status(EngagementKind::Bookmark, None, "nope").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn bookmarks_keep_folder_and_list_by_folder() {
        let (service, _db, id) = setup(true).await;
        let reader = user("reader");

        service
            .toggle_bookmark(
                &reader,
                &id,
                ToggleBookmarkRequest {
                    folder: Some("later".into()),
                },
            )
            .await
            .unwrap();

        let all = service
            .list_bookmarks(&reader, BookmarkQuery::default())
            .await
            .unwrap();
        assert_eq!(all.total, 1);
        assert_eq!(all.data[0].bookmark.folder.as_deref(), Some("later"));
        assert_eq!(all.data[0].article_title, "T");

        let other = service
            .list_bookmarks(
                &reader,
                BookmarkQuery {
                    folder: Some("work".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(other.total, 0);
        assert!(other.data.is_empty());
    }
}
