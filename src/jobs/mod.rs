use crate::context::AppContext;
use std::sync::Arc;
use tokio::time::{interval, Duration};
use tracing::{error, info};

pub mod tasks;

/// Job scheduler for background tasks
pub struct JobScheduler {
    context: Arc<AppContext>,
}

impl JobScheduler {
    pub fn new(context: Arc<AppContext>) -> Self {
        Self { context }
    }

    /// Start all background jobs
    pub fn start(self: Arc<Self>) {
        info!("Starting background job scheduler");

        tokio::spawn(Self::orphaned_upload_cleanup_job(Arc::clone(&self)));
        tokio::spawn(Self::health_check_job(Arc::clone(&self)));

        info!("Background jobs started");
    }

    /// Remove uploads never attached to a note (runs every 6 hours)
    async fn orphaned_upload_cleanup_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(21600));

        loop {
            interval.tick().await;
            info!("Running orphaned upload cleanup");

            match tasks::cleanup_orphaned_uploads(&scheduler.context).await {
                Ok(0) => info!("Upload cleanup: nothing to remove"),
                Ok(count) => info!("Cleaned up {} orphaned uploads", count),
                Err(e) => error!("Failed to cleanup orphaned uploads: {}", e),
            }
        }
    }

    /// Health check job (runs every 5 minutes)
    async fn health_check_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(300));

        loop {
            interval.tick().await;

            if let Err(e) = tasks::health_check(&scheduler.context).await {
                error!("Health check failed: {}", e);
            }
        }
    }
}
