use crate::{
    config::Config,
    services::{
        ArticleService, AuthService, CommentService, CommentSettings, Database,
        EngagementService, PublicationScheduler,
    },
    utils::clock::{Clock, SystemClock},
};
use std::sync::Arc;

/// 应用程序的共享状态
/// 包含所有服务和配置的引用
#[derive(Clone)]
pub struct AppState {
    /// 应用配置
    pub config: Config,

    /// 数据库连接
    pub db: Arc<Database>,

    /// 时钟
    pub clock: Arc<dyn Clock>,

    /// 认证服务
    pub auth_service: AuthService,

    /// 文章服务
    pub article_service: ArticleService,

    /// 点赞与收藏
    pub engagement_service: EngagementService,

    /// 评论服务
    pub comment_service: CommentService,

    /// 定时发布
    pub scheduler: PublicationScheduler,
}

impl AppState {
    pub fn new(config: Config, db: Database) -> Self {
        Self::with_clock(config, db, Arc::new(SystemClock))
    }

    /// Wires every service against one store and one time source.
    pub fn with_clock(config: Config, db: Database, clock: Arc<dyn Clock>) -> Self {
        let db = Arc::new(db);
        let auth_service = AuthService::new(&config);
        let article_service = ArticleService::new(db.clone(), clock.clone());
        let engagement_service = EngagementService::new(db.clone(), clock.clone());
        let comment_service = CommentService::new(
            db.clone(),
            clock.clone(),
            CommentSettings::from_config(&config),
        );
        let scheduler = PublicationScheduler::new(
            db.clone(),
            article_service.clone(),
            clock.clone(),
            config.scheduler_batch_size,
        );

        Self {
            config,
            db,
            clock,
            auth_service,
            article_service,
            engagement_service,
            comment_service,
            scheduler,
        }
    }
}
