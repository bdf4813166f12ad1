/// Balance top-up requests
///
/// Users claim they paid through an external mobile wallet and quote its
/// transaction ID. An admin checks the claim and approves or rejects it;
/// approval credits the requester.
use crate::{
    account::AccountManager,
    admin::{Decision, ReviewStatus},
    config::WalletConfig,
    error::{is_unique_violation, MarketError, MarketResult},
    notify::{self, MarketEvent, Notifier},
    wallet::{Money, PaymentMethod},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use std::sync::Arc;
use uuid::Uuid;

const MAX_TRANSACTION_ID_LEN: usize = 100;

const COLUMNS: &str =
    "id, account_id, amount, method, transaction_id, status, admin_note, created_at, reviewed_at";

/// Top-up submission body
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitBalanceRequest {
    pub amount: Money,
    pub method: String,
    pub transaction_id: String,
}

/// Stored balance request
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceRequest {
    pub id: String,
    pub account_id: String,
    pub amount: Money,
    pub method: PaymentMethod,
    pub transaction_id: String,
    pub status: ReviewStatus,
    pub admin_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl BalanceRequest {
    fn from_row(row: &SqliteRow) -> MarketResult<Self> {
        let method: String = row.try_get("method")?;
        let status: String = row.try_get("status")?;
        Ok(Self {
            id: row.try_get("id")?,
            account_id: row.try_get("account_id")?,
            amount: Money::from_minor(row.try_get("amount")?)?,
            method: PaymentMethod::from_str(&method)?,
            transaction_id: row.try_get("transaction_id")?,
            status: ReviewStatus::from_str(&status)?,
            admin_note: row.try_get("admin_note")?,
            created_at: row.try_get("created_at")?,
            reviewed_at: row.try_get("reviewed_at")?,
        })
    }
}

#[derive(Clone)]
pub struct BalanceRequestManager {
    db: SqlitePool,
    accounts: AccountManager,
    limits: WalletConfig,
    notifier: Arc<dyn Notifier>,
}

impl BalanceRequestManager {
    pub fn new(
        db: SqlitePool,
        accounts: AccountManager,
        limits: WalletConfig,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            db,
            accounts,
            limits,
            notifier,
        }
    }

    /// Record a Pending top-up claim and alert the admins
    pub async fn submit(
        &self,
        account_id: &str,
        req: SubmitBalanceRequest,
    ) -> MarketResult<BalanceRequest> {
        if req.amount < self.limits.topup_min || req.amount > self.limits.topup_max {
            return Err(MarketError::InvalidInput(format!(
                "Amount must be between {} and {}",
                self.limits.topup_min, self.limits.topup_max
            )));
        }

        let method = PaymentMethod::from_str(&req.method)?;

        let transaction_id = req.transaction_id.trim();
        if transaction_id.is_empty() {
            return Err(MarketError::InvalidInput("Transaction ID is required".to_string()));
        }
        if transaction_id.chars().count() > MAX_TRANSACTION_ID_LEN {
            return Err(MarketError::InvalidInput(format!(
                "Transaction ID must be at most {} characters",
                MAX_TRANSACTION_ID_LEN
            )));
        }

        let account = self.accounts.get_account(account_id).await?;

        let used: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM balance_request WHERE transaction_id = ?1")
                .bind(transaction_id)
                .fetch_optional(&self.db)
                .await?;
        if used.is_some() {
            return Err(transaction_id_used());
        }

        let id = Uuid::new_v4().to_string();
        sqlx::query(
            r#"
            INSERT INTO balance_request (id, account_id, amount, method, transaction_id, status, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, 'Pending', ?6)
            "#,
        )
        .bind(&id)
        .bind(&account.id)
        .bind(req.amount.minor())
        .bind(method.as_str())
        .bind(transaction_id)
        .bind(Utc::now())
        .execute(&self.db)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                transaction_id_used()
            } else {
                MarketError::Database(e)
            }
        })?;

        tracing::info!(request_id = %id, account_id = %account.id, amount = %req.amount, method = method.as_str(), "Balance request submitted");

        let request = self.get(&id).await?;

        notify::dispatch(
            self.notifier.clone(),
            MarketEvent::NewBalanceRequest {
                request_id: request.id.clone(),
                account_email: account.email,
                amount: request.amount,
                method,
                transaction_id: request.transaction_id.clone(),
            },
        );

        Ok(request)
    }

    /// Approve or reject a Pending request; approval credits the requester
    pub async fn resolve(
        &self,
        request_id: &str,
        decision: Decision,
        admin_note: Option<String>,
    ) -> MarketResult<BalanceRequest> {
        let admin_note = admin_note
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        let now = Utc::now();

        let mut tx = self.db.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE balance_request
            SET status = ?1, admin_note = ?2, reviewed_at = ?3
            WHERE id = ?4 AND status = 'Pending'
            RETURNING account_id, amount
            "#,
        )
        .bind(decision.status().as_str())
        .bind(&admin_note)
        .bind(now)
        .bind(request_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = updated else {
            tx.rollback().await?;
            // Distinguish a missing request from one that was already resolved
            let existing = self.find(request_id).await?;
            return Err(match existing {
                None => MarketError::NotFound("Balance request not found".to_string()),
                Some(r) => MarketError::InvalidState(format!(
                    "Balance request has already been {}",
                    r.status.as_str().to_lowercase()
                )),
            });
        };

        if decision == Decision::Approved {
            let account_id: String = row.try_get("account_id")?;
            let amount: i64 = row.try_get("amount")?;
            sqlx::query("UPDATE account SET wallet_balance = wallet_balance + ?1 WHERE id = ?2")
                .bind(amount)
                .bind(&account_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        tracing::info!(request_id, decision = decision.status().as_str(), "Balance request resolved");

        self.get(request_id).await
    }

    pub async fn find(&self, id: &str) -> MarketResult<Option<BalanceRequest>> {
        let row = sqlx::query(&format!("SELECT {} FROM balance_request WHERE id = ?1", COLUMNS))
            .bind(id)
            .fetch_optional(&self.db)
            .await?;

        row.as_ref().map(BalanceRequest::from_row).transpose()
    }

    pub async fn get(&self, id: &str) -> MarketResult<BalanceRequest> {
        self.find(id)
            .await?
            .ok_or_else(|| MarketError::NotFound("Balance request not found".to_string()))
    }

    /// An account's own requests, newest first
    pub async fn list_for_account(&self, account_id: &str) -> MarketResult<Vec<BalanceRequest>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM balance_request WHERE account_id = ?1 ORDER BY created_at DESC",
            COLUMNS
        ))
        .bind(account_id)
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(BalanceRequest::from_row).collect()
    }

    pub async fn count_by_status(&self, status: ReviewStatus) -> MarketResult<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM balance_request WHERE status = ?1")
            .bind(status.as_str())
            .fetch_one(&self.db)
            .await?;
        Ok(count)
    }

    /// Admin queue; Pending requests are listed oldest first
    pub async fn list_by_status(
        &self,
        status: ReviewStatus,
        limit: i64,
    ) -> MarketResult<Vec<BalanceRequest>> {
        let order = if status == ReviewStatus::Pending { "ASC" } else { "DESC" };
        let rows = sqlx::query(&format!(
            "SELECT {} FROM balance_request WHERE status = ?1 ORDER BY created_at {} LIMIT ?2",
            COLUMNS, order
        ))
        .bind(status.as_str())
        .bind(limit.clamp(1, 200))
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(BalanceRequest::from_row).collect()
    }
}

fn transaction_id_used() -> MarketError {
    MarketError::Conflict("This transaction ID has already been used".to_string())
}
