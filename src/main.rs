use std::sync::Arc;
use axum::http::{HeaderValue, Method};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tracing::{info, warn, error};
use tokio::time::{interval, Duration, MissedTickBehavior};

use inkpress::{
    config::Config,
    routes,
    services::Database,
    state::AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 加载配置
    dotenv::dotenv().ok();
    let config = Config::from_env()?;

    // 初始化日志
    init_tracing(&config);

    info!("Starting inkpress service ({})...", config.environment);

    // 初始化数据库连接
    let db = match Database::new(&config).await {
        Ok(db) => db,
        Err(e) => {
            error!("Failed to create database connection: {}", e);
            return Err(anyhow::anyhow!("Database initialization failed: {}", e));
        }
    };
    db.verify().await?;

    // 创建应用状态
    let app_state = Arc::new(AppState::new(config.clone(), db));

    // 启动后台任务
    start_background_tasks(app_state.clone());

    // 配置 CORS
    let origins = config
        .cors_allowed_origins
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect::<Vec<_>>();
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any)
        .allow_origin(origins);

    let app = routes::build_router(app_state)
        .layer(cors)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http());

    // 启动主服务器
    let addr = format!("{}:{}", config.server_host, config.server_port);
    info!("Starting server on http://{}", addr);

    axum::Server::bind(&addr.parse()?)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}

fn init_tracing(config: &Config) {
    let registry = tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.log_level));

    if config.is_production() {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn start_background_tasks(app_state: Arc<AppState>) {
    info!("Starting background tasks...");

    // 定时发布任务
    let scheduler = app_state.scheduler.clone();
    scheduler.spawn(Duration::from_secs(app_state.config.scheduler_interval_secs.max(1)));

    // 计数器校对任务
    let every = app_state.config.reconcile_interval_secs;
    if every == 0 {
        info!("Counter reconciliation disabled");
    } else {
        let reconcile_state = app_state.clone();
        tokio::spawn(async move {
            let mut interval = interval(Duration::from_secs(every));
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                interval.tick().await;
                match reconcile_state.db.reconcile_counters().await {
                    Ok(report) if report.is_clean() => {
                        info!("Counter reconciliation found no drift ({} articles)", report.articles_checked);
                    }
                    Ok(report) => {
                        warn!(
                            "Counter reconciliation corrected {} articles and {} reply counts, {} articles failed",
                            report.article_counters_fixed,
                            report.reply_counters_fixed,
                            report.articles_failed
                        );
                    }
                    Err(e) => error!("Failed to reconcile counters: {}", e),
                }
            }
        });
    }

    info!("Background tasks started successfully");
}
