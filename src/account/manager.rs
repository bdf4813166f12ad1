/// Account manager implementation using runtime queries
use crate::{
    account::{FederatedClaims, LoginRequest, PurchasedNote, RegisterRequest, ValidatedSession},
    config::ServerConfig,
    db::account::{Account, Provider, Role},
    error::{is_unique_violation, MarketError, MarketResult},
};
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

/// Access token claims. The role is read from the account row, never from here.
#[derive(Debug, Serialize, Deserialize)]
struct AccessClaims {
    sub: String,
    iat: i64,
    exp: i64,
}

/// Account manager service
#[derive(Clone)]
pub struct AccountManager {
    db: SqlitePool,
    config: Arc<ServerConfig>,
}

impl AccountManager {
    /// Create a new account manager
    pub fn new(db: SqlitePool, config: Arc<ServerConfig>) -> Self {
        Self { db, config }
    }

    /// Register an account with email and password
    pub async fn register(&self, req: RegisterRequest) -> MarketResult<Account> {
        req.validate()?;

        let email = req.email.trim().to_lowercase();
        let name = req.name.trim().to_string();
        if name.is_empty() {
            return Err(MarketError::InvalidInput("name is required".to_string()));
        }

        if self.get_account_by_email(&email).await?.is_some() {
            return Err(MarketError::Conflict("Email already registered".to_string()));
        }

        let password_hash = hash_password(&req.password)?;

        self.insert_account(
            &email,
            &name,
            req.image.as_deref(),
            Some(&password_hash),
            Provider::Credentials,
        )
        .await
    }

    /// Verify credentials and return the account
    pub async fn login(&self, req: &LoginRequest) -> MarketResult<Account> {
        req.validate()?;

        let invalid = || MarketError::Unauthorized("Invalid credentials".to_string());

        let account = self
            .get_account_by_email(&req.email.trim().to_lowercase())
            .await?
            .ok_or_else(invalid)?;

        // Federated-only accounts have no password
        let stored = account.password_hash.as_deref().ok_or_else(invalid)?;
        if !verify_password(&req.password, stored)? {
            return Err(invalid());
        }

        self.apply_admin_bootstrap(account).await
    }

    /// Sign in with an identity-provider assertion, creating the account on first use
    pub async fn sign_in_federated(&self, id_token: &str) -> MarketResult<Account> {
        let secret = self
            .config
            .authentication
            .federated_secret
            .as_deref()
            .ok_or_else(|| MarketError::Forbidden("Federated sign-in is not enabled".to_string()))?;

        let claims = decode::<FederatedClaims>(
            id_token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )
        .map_err(|e| {
            tracing::warn!("Federated assertion rejected: {}", e);
            MarketError::Unauthorized("Invalid identity assertion".to_string())
        })?
        .claims;

        let email = claims.email.trim().to_lowercase();
        if !email.contains('@') {
            return Err(MarketError::InvalidInput("Identity assertion has no valid email".to_string()));
        }

        if let Some(existing) = self.get_account_by_email(&email).await? {
            return self.apply_admin_bootstrap(existing).await;
        }

        tracing::info!("Creating account on first federated sign-in");
        match self
            .insert_account(
                &email,
                claims.name.trim(),
                claims.picture.as_deref(),
                None,
                Provider::Federated,
            )
            .await
        {
            Ok(account) => Ok(account),
            // Concurrent first sign-in created it already
            Err(MarketError::Conflict(_)) => self
                .get_account_by_email(&email)
                .await?
                .ok_or_else(|| MarketError::Internal("Account vanished after conflict".to_string())),
            Err(e) => Err(e),
        }
    }

    /// Promote an existing account whose email was added to the admin list
    async fn apply_admin_bootstrap(&self, account: Account) -> MarketResult<Account> {
        if account.is_admin() || !self.config.is_admin_email(&account.email) {
            return Ok(account);
        }

        sqlx::query("UPDATE account SET role = ?1 WHERE id = ?2")
            .bind(Role::Admin.as_str())
            .bind(&account.id)
            .execute(&self.db)
            .await?;

        tracing::info!(account_id = %account.id, "Promoted account to admin from bootstrap list");
        self.get_account(&account.id).await
    }

    async fn insert_account(
        &self,
        email: &str,
        name: &str,
        image: Option<&str>,
        password_hash: Option<&str>,
        provider: Provider,
    ) -> MarketResult<Account> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let role = if self.config.is_admin_email(email) {
            Role::Admin
        } else {
            Role::Student
        };

        sqlx::query(
            "INSERT INTO account (id, email, name, image, password_hash, provider, role, wallet_balance, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8)",
        )
        .bind(&id)
        .bind(email)
        .bind(name)
        .bind(image)
        .bind(password_hash)
        .bind(provider.as_str())
        .bind(role.as_str())
        .bind(now)
        .execute(&self.db)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                MarketError::Conflict("Email already registered".to_string())
            } else {
                MarketError::Database(e)
            }
        })?;

        tracing::info!(account_id = %id, role = role.as_str(), "Account created");

        self.get_account(&id).await
    }

    /// Issue a signed access token for an account
    pub fn issue_access_token(&self, account_id: &str) -> MarketResult<String> {
        let now = Utc::now().timestamp();
        let claims = AccessClaims {
            sub: account_id.to_string(),
            iat: now,
            exp: now + self.config.authentication.access_token_ttl_secs,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.config.authentication.jwt_secret.as_bytes()),
        )
        .map_err(|e| MarketError::Internal(format!("Failed to sign access token: {}", e)))
    }

    /// Validate access token and return session info
    pub fn validate_access_token(&self, token: &str) -> MarketResult<ValidatedSession> {
        let data = decode::<AccessClaims>(
            token,
            &DecodingKey::from_secret(self.config.authentication.jwt_secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                MarketError::Unauthorized("Token has expired".to_string())
            }
            _ => MarketError::Unauthorized("Invalid token".to_string()),
        })?;

        Ok(ValidatedSession {
            account_id: data.claims.sub,
            expires_at: data.claims.exp,
        })
    }

    /// Get account by id
    pub async fn get_account(&self, id: &str) -> MarketResult<Account> {
        self.find_account(id)
            .await?
            .ok_or_else(|| MarketError::NotFound("Account not found".to_string()))
    }

    pub async fn find_account(&self, id: &str) -> MarketResult<Option<Account>> {
        let row = sqlx::query(&format!("SELECT {} FROM account WHERE id = ?1", Account::COLUMNS))
            .bind(id)
            .fetch_optional(&self.db)
            .await?;

        row.as_ref().map(Account::from_row).transpose()
    }

    /// Get account by email (case-insensitive)
    pub async fn get_account_by_email(&self, email: &str) -> MarketResult<Option<Account>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM account WHERE email = ?1 COLLATE NOCASE",
            Account::COLUMNS
        ))
        .bind(email.trim())
        .fetch_optional(&self.db)
        .await?;

        row.as_ref().map(Account::from_row).transpose()
    }

    /// Whether the account already owns a note
    pub async fn has_purchased(&self, account_id: &str, note_id: &str) -> MarketResult<bool> {
        let found: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM purchased_note WHERE account_id = ?1 AND note_id = ?2",
        )
        .bind(account_id)
        .bind(note_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(found.is_some())
    }

    /// List notes the account has bought, newest first
    pub async fn list_purchases(&self, account_id: &str) -> MarketResult<Vec<PurchasedNote>> {
        let rows = sqlx::query(
            r#"
            SELECT p.note_id, n.title, n.subject, p.purchased_at
            FROM purchased_note p
            JOIN note n ON n.id = p.note_id
            WHERE p.account_id = ?1
            ORDER BY p.purchased_at DESC
            "#,
        )
        .bind(account_id)
        .fetch_all(&self.db)
        .await?;

        let mut purchases = Vec::with_capacity(rows.len());
        for row in rows {
            purchases.push(PurchasedNote {
                note_id: row.try_get("note_id")?,
                title: row.try_get("title")?,
                subject: row.try_get("subject")?,
                purchased_at: row.try_get("purchased_at")?,
            });
        }
        Ok(purchases)
    }

    /// Count accounts (admin statistics)
    pub async fn count_accounts(&self) -> MarketResult<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM account")
            .fetch_one(&self.db)
            .await?;
        Ok(count)
    }
}

fn hash_password(password: &str) -> MarketResult<String> {
    let salt = SaltString::encode_b64(Uuid::new_v4().as_bytes())
        .map_err(|e| MarketError::Internal(format!("Salt generation failed: {}", e)))?;
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| MarketError::Internal(format!("Password hashing failed: {}", e)))
}

fn verify_password(password: &str, stored: &str) -> MarketResult<bool> {
    let parsed = PasswordHash::new(stored)
        .map_err(|e| MarketError::Internal(format!("Stored password hash is corrupt: {}", e)))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}
