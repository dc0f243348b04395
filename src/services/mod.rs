pub mod database;
pub mod auth;
pub mod article;
pub mod comment;
pub mod engagement;
pub mod scheduler;

// 重新导出常用类型
pub use database::Database;
pub use auth::AuthService;
pub use article::ArticleService;
pub use comment::{CommentService, CommentSettings};
pub use engagement::EngagementService;
pub use scheduler::PublicationScheduler;
