/// Account management system
///
/// Handles registration, credential and federated sign-in, access tokens
/// and the account-side view of purchases.

mod manager;

pub use manager::AccountManager;

use crate::{db::account::Account, wallet::Money};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Credential registration request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,
    #[validate(length(min = 1, max = 100, message = "must be between 1 and 100 characters"))]
    pub name: String,
    #[validate(length(min = 8, max = 256, message = "must be at least 8 characters"))]
    pub password: String,
    #[validate(url(message = "must be a URL"))]
    pub image: Option<String>,
}

/// Credential login request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,
    #[validate(length(min = 1, message = "is required"))]
    pub password: String,
}

/// Federated sign-in request carrying the identity provider's signed assertion
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FederatedSignInRequest {
    pub id_token: String,
}

/// Claims the identity provider asserts about a signed-in user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FederatedClaims {
    pub email: String,
    pub name: String,
    pub picture: Option<String>,
    pub exp: i64,
}

/// Session response
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub access_token: String,
    pub account: AccountView,
}

/// Public view of an account
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountView {
    pub id: String,
    pub email: String,
    pub name: String,
    pub image: Option<String>,
    pub role: crate::db::account::Role,
    pub wallet_balance: Money,
    pub created_at: DateTime<Utc>,
}

impl From<Account> for AccountView {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            email: account.email,
            name: account.name,
            image: account.image,
            role: account.role,
            wallet_balance: account.wallet_balance,
            created_at: account.created_at,
        }
    }
}

/// Validated session from bearer token
#[derive(Debug, Clone)]
pub struct ValidatedSession {
    pub account_id: String,
    pub expires_at: i64,
}

/// A note in the account's purchase history
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchasedNote {
    pub note_id: String,
    pub title: String,
    pub subject: String,
    pub purchased_at: DateTime<Utc>,
}
