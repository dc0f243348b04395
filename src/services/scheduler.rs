//! Periodic sweep that publishes scheduled articles once their time arrives.

use crate::{
    error::Result,
    services::{database::DueArticle, ArticleService, Database},
    utils::clock::Clock,
};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info};

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub due: u64,
    pub published: u64,
    /// Lost a race: the article was no longer scheduled when locked.
    pub skipped: u64,
    pub failed: u64,
}

#[derive(Debug, Default)]
struct SchedulerStats {
    sweeps: AtomicU64,
    published: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
}

/// 调度器累计统计（用于健康检查）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerSnapshot {
    pub sweeps: u64,
    pub published: u64,
    pub skipped: u64,
    pub failed: u64,
}

#[derive(Clone)]
pub struct PublicationScheduler {
    db: Arc<Database>,
    articles: ArticleService,
    clock: Arc<dyn Clock>,
    batch_size: usize,
    stats: Arc<SchedulerStats>,
}

impl PublicationScheduler {
    pub fn new(
        db: Arc<Database>,
        articles: ArticleService,
        clock: Arc<dyn Clock>,
        batch_size: usize,
    ) -> Self {
        Self {
            db,
            articles,
            clock,
            batch_size: batch_size.max(1),
            stats: Arc::new(SchedulerStats::default()),
        }
    }

    /// Publishes every article due at this instant, reading them in pages of
    /// `batch_size`. Each article is handled on its own; a failure neither
    /// stops the sweep nor hides the articles queued behind it.
    pub async fn sweep(&self) -> Result<SweepReport> {
        let now = self.clock.now();
        let mut report = SweepReport::default();
        let mut cursor: Option<DueArticle> = None;

        loop {
            let page = self
                .db
                .due_scheduled_articles(now, cursor.as_ref(), self.batch_size)
                .await?;
            let exhausted = page.len() < self.batch_size;
            report.due += page.len() as u64;

            for due in &page {
                match self.articles.publish_due(&due.id).await {
                    Ok(true) => report.published += 1,
                    Ok(false) => report.skipped += 1,
                    Err(e) => {
                        error!("Failed to publish scheduled article {}: {}", due.id, e);
                        report.failed += 1;
                    }
                }
            }

            match page.into_iter().last() {
                Some(last) if !exhausted => cursor = Some(last),
                _ => break,
            }
        }

        self.stats.sweeps.fetch_add(1, Ordering::Relaxed);
        self.stats.published.fetch_add(report.published, Ordering::Relaxed);
        self.stats.skipped.fetch_add(report.skipped, Ordering::Relaxed);
        self.stats.failed.fetch_add(report.failed, Ordering::Relaxed);

        if report.due > 0 {
            info!(
                due = report.due,
                published = report.published,
                skipped = report.skipped,
                failed = report.failed,
                "Publication sweep finished"
            );
        } else {
            debug!("Publication sweep found nothing due");
        }
        Ok(report)
    }

    pub fn snapshot(&self) -> SchedulerSnapshot {
        SchedulerSnapshot {
            sweeps: self.stats.sweeps.load(Ordering::Relaxed),
            published: self.stats.published.load(Ordering::Relaxed),
            skipped: self.stats.skipped.load(Ordering::Relaxed),
            failed: self.stats.failed.load(Ordering::Relaxed),
        }
    }

    /// Runs `sweep` on a fixed interval until the returned task is aborted.
    pub fn spawn(self, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                if let Err(e) = self.sweep().await {
                    error!("Publication sweep failed: {}", e);
                }
            }
        })
    }
}
