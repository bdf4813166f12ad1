/// Application context and dependency injection
use crate::{
    account::AccountManager,
    admin::{AuditLog, ModerationManager},
    blob_store::{BlobBackend, DiskBlobBackend, NoteStorage, StorageSettings},
    catalog::CatalogManager,
    config::ServerConfig,
    db,
    error::{MarketError, MarketResult},
    notify::{self, Notifier},
    rate_limit::{LimiterQuotas, RateLimiter},
    wallet::{BalanceRequestManager, PurchaseEngine},
};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub db: SqlitePool,
    pub account_manager: Arc<AccountManager>,
    pub catalog: Arc<CatalogManager>,
    pub storage: Arc<NoteStorage>,
    // Wallet
    pub purchases: Arc<PurchaseEngine>,
    pub topups: Arc<BalanceRequestManager>,
    // Admin & Moderation
    pub moderation_manager: Arc<ModerationManager>,
    pub audit_log: Arc<AuditLog>,
    pub notifier: Arc<dyn Notifier>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> MarketResult<Self> {
        config.validate()?;

        Self::ensure_directories(&config).await?;

        let db = db::create_pool(&config.storage.database, db::DatabaseOptions::default()).await?;
        db::run_migrations(&db).await?;
        db::test_connection(&db).await?;

        let backend: Arc<dyn BlobBackend> =
            Arc::new(DiskBlobBackend::new(config.storage.blobstore_location.clone()));
        let notifier = notify::from_config(&config.notifications)?;

        Ok(Self::from_parts(config, db, backend, notifier))
    }

    /// Wire managers over an already prepared database, backend and notifier
    pub fn from_parts(
        config: ServerConfig,
        db: SqlitePool,
        backend: Arc<dyn BlobBackend>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let config = Arc::new(config);

        let account_manager = AccountManager::new(db.clone(), config.clone());
        let catalog = CatalogManager::new(db.clone());
        let storage = NoteStorage::new(
            backend,
            db.clone(),
            StorageSettings {
                upload_limit: config.service.upload_limit,
                public_url: config.service.public_url.clone(),
                signing_secret: config.authentication.jwt_secret.clone(),
            },
        );

        let purchases = PurchaseEngine::new(db.clone(), account_manager.clone(), catalog.clone());
        let topups = BalanceRequestManager::new(
            db.clone(),
            account_manager.clone(),
            config.wallet.clone(),
            notifier.clone(),
        );
        let moderation_manager =
            ModerationManager::new(db.clone(), catalog.clone(), storage.clone());
        let audit_log = AuditLog::new(db.clone());
        let rate_limiter = RateLimiter::new(LimiterQuotas::default());

        Self {
            config,
            db,
            account_manager: Arc::new(account_manager),
            catalog: Arc::new(catalog),
            storage: Arc::new(storage),
            purchases: Arc::new(purchases),
            topups: Arc::new(topups),
            moderation_manager: Arc::new(moderation_manager),
            audit_log: Arc::new(audit_log),
            notifier,
            rate_limiter: Arc::new(rate_limiter),
        }
    }

    /// Ensure required directories exist
    async fn ensure_directories(config: &ServerConfig) -> MarketResult<()> {
        for dir in [&config.storage.data_directory, &config.storage.blobstore_location] {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                MarketError::Internal(format!("Failed to create directory {:?}: {}", dir, e))
            })?;
        }
        Ok(())
    }

    /// Get service URL
    pub fn service_url(&self) -> &str {
        &self.config.service.public_url
    }
}
