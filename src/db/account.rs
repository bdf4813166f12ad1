/// Account database models
use crate::{
    error::{MarketError, MarketResult},
    wallet::Money,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row};

/// Account role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Admin => "admin",
        }
    }

    pub fn from_str(s: &str) -> MarketResult<Self> {
        match s.to_lowercase().as_str() {
            "student" => Ok(Role::Student),
            "admin" => Ok(Role::Admin),
            _ => Err(MarketError::Internal(format!("Invalid role: {}", s))),
        }
    }
}

/// How the account signs in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Credentials,
    Federated,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Credentials => "credentials",
            Provider::Federated => "federated",
        }
    }

    pub fn from_str(s: &str) -> MarketResult<Self> {
        match s {
            "credentials" => Ok(Provider::Credentials),
            "federated" => Ok(Provider::Federated),
            _ => Err(MarketError::Internal(format!("Invalid provider: {}", s))),
        }
    }
}

/// Account record in the database
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: String,
    pub email: String,
    pub name: String,
    pub image: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub provider: Provider,
    pub role: Role,
    pub wallet_balance: Money,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub const COLUMNS: &'static str =
        "id, email, name, image, password_hash, provider, role, wallet_balance, created_at";

    pub fn from_row(row: &SqliteRow) -> MarketResult<Self> {
        let provider: String = row.try_get("provider")?;
        let role: String = row.try_get("role")?;
        Ok(Account {
            id: row.try_get("id")?,
            email: row.try_get("email")?,
            name: row.try_get("name")?,
            image: row.try_get("image")?,
            password_hash: row.try_get("password_hash")?,
            provider: Provider::from_str(&provider)?,
            role: Role::from_str(&role)?,
            wallet_balance: Money::from_minor(row.try_get("wallet_balance")?)?,
            created_at: row.try_get("created_at")?,
        })
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}
