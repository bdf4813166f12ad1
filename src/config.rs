/// Configuration management for Notemart
use crate::error::{MarketError, MarketResult};
use crate::wallet::Money;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub authentication: AuthConfig,
    pub wallet: WalletConfig,
    pub notifications: NotificationConfig,
    pub rate_limit: RateLimitConfig,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    /// Externally reachable base URL, used for signed download links
    pub public_url: String,
    pub version: String,
    pub upload_limit: usize,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_directory: PathBuf,
    pub database: PathBuf,
    pub blobstore_location: PathBuf,
    /// Lifetime of signed download URLs
    pub download_url_ttl_secs: u64,
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub access_token_ttl_secs: i64,
    /// Shared secret used by the external identity provider to sign sign-in assertions
    pub federated_secret: Option<String>,
    /// Emails that are granted the admin role on registration or sign-in
    pub admin_emails: Vec<String>,
}

/// Wallet top-up bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletConfig {
    pub topup_min: Money,
    pub topup_max: Money,
}

/// Telegram bot used for review alerts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive
    pub level: String,
    /// Emit JSON lines instead of human readable output
    pub json: bool,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            topup_min: Money::from_major(10),
            topup_max: Money::from_major(100_000),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> MarketResult<Self> {
        dotenv::dotenv().ok();

        let hostname = env::var("NOTEMART_HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
        let port: u16 = env::var("NOTEMART_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .map_err(|_| MarketError::InvalidInput("Invalid port number".to_string()))?;
        let public_url = env::var("NOTEMART_PUBLIC_URL")
            .unwrap_or_else(|_| format!("http://{}:{}", hostname, port));
        let version = env!("CARGO_PKG_VERSION").to_string();
        let upload_limit = env::var("NOTEMART_UPLOAD_LIMIT")
            .unwrap_or_else(|_| "20971520".to_string())
            .parse()
            .unwrap_or(20 * 1024 * 1024);

        let data_directory: PathBuf = env::var("NOTEMART_DATA_DIRECTORY")
            .unwrap_or_else(|_| "./data".to_string())
            .into();
        let database = env::var("NOTEMART_DB_LOCATION")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("notemart.sqlite"));
        let blobstore_location = env::var("NOTEMART_BLOBSTORE_DISK_LOCATION")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("blobs"));
        let download_url_ttl_secs = env::var("NOTEMART_DOWNLOAD_URL_TTL_SECS")
            .unwrap_or_else(|_| "3600".to_string())
            .parse()
            .unwrap_or(3600);

        let jwt_secret = env::var("NOTEMART_JWT_SECRET")
            .map_err(|_| MarketError::InvalidInput("JWT secret required".to_string()))?;
        let access_token_ttl_secs = env::var("NOTEMART_ACCESS_TOKEN_TTL_SECS")
            .unwrap_or_else(|_| "604800".to_string())
            .parse()
            .unwrap_or(604800);
        let federated_secret = env::var("NOTEMART_FEDERATED_SECRET").ok();

        let admin_emails = env::var("NOTEMART_ADMIN_EMAILS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect::<Vec<String>>();

        let defaults = WalletConfig::default();
        let topup_min = match env::var("NOTEMART_TOPUP_MIN") {
            Ok(raw) => Money::parse(&raw)?,
            Err(_) => defaults.topup_min,
        };
        let topup_max = match env::var("NOTEMART_TOPUP_MAX") {
            Ok(raw) => Money::parse(&raw)?,
            Err(_) => defaults.topup_max,
        };

        let telegram_bot_token = env::var("NOTEMART_TELEGRAM_BOT_TOKEN").ok();
        let telegram_chat_id = env::var("NOTEMART_TELEGRAM_CHAT_ID").ok();

        let rate_limit_enabled = env::var("NOTEMART_RATE_LIMITS_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse()
            .unwrap_or(true);

        let log_level = env::var("RUST_LOG")
            .unwrap_or_else(|_| "notemart=debug,tower_http=debug".to_string());
        let log_json = env::var("NOTEMART_LOG_FORMAT")
            .map(|f| f.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        Ok(ServerConfig {
            service: ServiceConfig {
                hostname,
                port,
                public_url,
                version,
                upload_limit,
            },
            storage: StorageConfig {
                data_directory,
                database,
                blobstore_location,
                download_url_ttl_secs,
            },
            authentication: AuthConfig {
                jwt_secret,
                access_token_ttl_secs,
                federated_secret,
                admin_emails,
            },
            wallet: WalletConfig {
                topup_min,
                topup_max,
            },
            notifications: NotificationConfig {
                telegram_bot_token,
                telegram_chat_id,
            },
            rate_limit: RateLimitConfig {
                enabled: rate_limit_enabled,
            },
            logging: LoggingConfig {
                level: log_level,
                json: log_json,
            },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> MarketResult<()> {
        if self.service.hostname.is_empty() {
            return Err(MarketError::InvalidInput("Hostname cannot be empty".to_string()));
        }

        if self.authentication.jwt_secret.len() < 32 {
            return Err(MarketError::InvalidInput(
                "JWT secret must be at least 32 characters".to_string(),
            ));
        }

        if self.wallet.topup_min.is_zero() || self.wallet.topup_min > self.wallet.topup_max {
            return Err(MarketError::InvalidInput(
                "Top-up minimum must be positive and not exceed the maximum".to_string(),
            ));
        }

        Ok(())
    }

    /// Whether an email is on the admin bootstrap list
    pub fn is_admin_email(&self, email: &str) -> bool {
        let email = email.to_lowercase();
        self.authentication.admin_emails.iter().any(|e| *e == email)
    }

    /// Configuration suitable for unit tests
    #[cfg(test)]
    pub fn for_tests() -> Self {
        ServerConfig {
            service: ServiceConfig {
                hostname: "localhost".to_string(),
                port: 8080,
                public_url: "http://localhost:8080".to_string(),
                version: "0.1.0".to_string(),
                upload_limit: 1024 * 1024,
            },
            storage: StorageConfig {
                data_directory: PathBuf::from("./data"),
                database: PathBuf::from(":memory:"),
                blobstore_location: PathBuf::from("./data/blobs"),
                download_url_ttl_secs: 600,
            },
            authentication: AuthConfig {
                jwt_secret: "test-secret-key-for-testing-only-0123".to_string(),
                access_token_ttl_secs: 3600,
                federated_secret: Some("federated-test-secret".to_string()),
                admin_emails: vec!["root@notemart.test".to_string()],
            },
            wallet: WalletConfig::default(),
            notifications: NotificationConfig {
                telegram_bot_token: None,
                telegram_chat_id: None,
            },
            rate_limit: RateLimitConfig { enabled: false },
            logging: LoggingConfig {
                level: "info".to_string(),
                json: false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_short_secret() {
        let mut config = ServerConfig::for_tests();
        config.authentication.jwt_secret = "short".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_inverted_topup_bounds() {
        let mut config = ServerConfig::for_tests();
        config.wallet.topup_min = Money::from_major(500);
        config.wallet.topup_max = Money::from_major(100);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_admin_email_is_case_insensitive() {
        let config = ServerConfig::for_tests();
        assert!(config.is_admin_email("Root@Notemart.TEST"));
        assert!(!config.is_admin_email("someone@notemart.test"));
    }
}
