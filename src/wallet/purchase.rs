/// Purchase transaction engine
///
/// A purchase debits the buyer, records ownership, bumps the listing's
/// counter, credits the uploader and writes the immutable transaction row.
/// All of it happens in one SQLite transaction whose first statement is the
/// conditional debit, so the write lock is held before anything inside the
/// transaction is read.
use crate::{
    account::AccountManager,
    catalog::CatalogManager,
    error::{is_unique_violation, MarketError, MarketResult},
    wallet::{Money, RevenueSplit},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use uuid::Uuid;

/// Outcome of a successful purchase
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseReceipt {
    pub transaction_id: String,
    pub note_id: String,
    pub amount: Money,
    pub seller_amount: Money,
    pub platform_amount: Money,
    pub buyer_balance: Money,
}

/// Stored purchase transaction
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub id: String,
    pub buyer_id: String,
    pub note_id: String,
    pub seller_id: String,
    pub amount: Money,
    pub seller_amount: Money,
    pub platform_amount: Money,
    pub created_at: DateTime<Utc>,
}

impl TransactionRecord {
    fn from_row(row: &SqliteRow) -> MarketResult<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            buyer_id: row.try_get("buyer_id")?,
            note_id: row.try_get("note_id")?,
            seller_id: row.try_get("seller_id")?,
            amount: Money::from_minor(row.try_get("amount")?)?,
            seller_amount: Money::from_minor(row.try_get("seller_amount")?)?,
            platform_amount: Money::from_minor(row.try_get("platform_amount")?)?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[derive(Clone)]
pub struct PurchaseEngine {
    db: SqlitePool,
    accounts: AccountManager,
    catalog: CatalogManager,
}

impl PurchaseEngine {
    pub fn new(db: SqlitePool, accounts: AccountManager, catalog: CatalogManager) -> Self {
        Self {
            db,
            accounts,
            catalog,
        }
    }

    /// Buy a note with the buyer's wallet balance
    pub async fn purchase(&self, buyer_id: &str, note_id: &str) -> MarketResult<PurchaseReceipt> {
        let note = self.catalog.get_note(note_id).await?;
        if !note.is_approved() {
            return Err(MarketError::Forbidden(
                "This note is not available for purchase".to_string(),
            ));
        }

        let buyer = self.accounts.get_account(buyer_id).await?;

        if self.accounts.has_purchased(&buyer.id, &note.id).await? {
            return Err(already_purchased());
        }

        if note.uploader_id == buyer.id {
            return Err(MarketError::InvalidOperation(
                "You cannot buy your own note".to_string(),
            ));
        }

        if buyer.wallet_balance < note.price {
            return Err(insufficient_balance(note.price, buyer.wallet_balance));
        }

        let price = note.price;
        let split = RevenueSplit::of(price);
        let transaction_id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let mut tx = self.db.begin().await?;

        let debited = sqlx::query(
            r#"
            UPDATE account SET wallet_balance = wallet_balance - ?1
            WHERE id = ?2 AND wallet_balance >= ?1
            RETURNING wallet_balance
            "#,
        )
        .bind(price.minor())
        .bind(&buyer.id)
        .fetch_optional(&mut *tx)
        .await?;

        let buyer_balance = match debited {
            Some(row) => Money::from_minor(row.try_get("wallet_balance")?)?,
            None => {
                tx.rollback().await?;
                return Err(insufficient_balance(price, Money::ZERO));
            }
        };

        let inserted = sqlx::query(
            "INSERT INTO purchased_note (account_id, note_id, purchased_at) VALUES (?1, ?2, ?3)",
        )
        .bind(&buyer.id)
        .bind(&note.id)
        .bind(now)
        .execute(&mut *tx)
        .await;

        if let Err(e) = inserted {
            tx.rollback().await?;
            return Err(if is_unique_violation(&e) {
                already_purchased()
            } else {
                MarketError::Database(e)
            });
        }

        let counted = sqlx::query(
            "UPDATE note SET purchase_count = purchase_count + 1 WHERE id = ?1 AND status = 'Approved'",
        )
        .bind(&note.id)
        .execute(&mut *tx)
        .await?;

        if counted.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(MarketError::Forbidden(
                "This note is not available for purchase".to_string(),
            ));
        }

        sqlx::query("UPDATE account SET wallet_balance = wallet_balance + ?1 WHERE id = ?2")
            .bind(split.seller_amount.minor())
            .bind(&note.uploader_id)
            .execute(&mut *tx)
            .await?;

        let recorded = sqlx::query(
            r#"
            INSERT INTO purchase_transaction
                (id, buyer_id, note_id, seller_id, amount, seller_amount, platform_amount, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&transaction_id)
        .bind(&buyer.id)
        .bind(&note.id)
        .bind(&note.uploader_id)
        .bind(price.minor())
        .bind(split.seller_amount.minor())
        .bind(split.platform_amount.minor())
        .bind(now)
        .execute(&mut *tx)
        .await;

        if let Err(e) = recorded {
            tx.rollback().await?;
            return Err(if is_unique_violation(&e) {
                already_purchased()
            } else {
                MarketError::Database(e)
            });
        }

        tx.commit().await?;

        tracing::info!(
            transaction_id = %transaction_id,
            buyer_id = %buyer.id,
            note_id = %note.id,
            amount = %price,
            seller_amount = %split.seller_amount,
            platform_amount = %split.platform_amount,
            "Purchase completed"
        );

        Ok(PurchaseReceipt {
            transaction_id,
            note_id: note.id,
            amount: price,
            seller_amount: split.seller_amount,
            platform_amount: split.platform_amount,
            buyer_balance,
        })
    }

    /// Purchases made by an account, newest first
    pub async fn list_for_buyer(&self, buyer_id: &str) -> MarketResult<Vec<TransactionRecord>> {
        self.list_where("buyer_id", buyer_id).await
    }

    /// Sales of an uploader's notes, newest first
    pub async fn list_for_seller(&self, seller_id: &str) -> MarketResult<Vec<TransactionRecord>> {
        self.list_where("seller_id", seller_id).await
    }

    async fn list_where(&self, column: &'static str, id: &str) -> MarketResult<Vec<TransactionRecord>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT id, buyer_id, note_id, seller_id, amount, seller_amount, platform_amount, created_at
            FROM purchase_transaction
            WHERE {} = ?1
            ORDER BY created_at DESC
            "#,
            column
        ))
        .bind(id)
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(TransactionRecord::from_row).collect()
    }

    /// Total commission the platform has kept across all sales
    pub async fn platform_revenue(&self) -> MarketResult<Money> {
        let total: i64 =
            sqlx::query_scalar("SELECT COALESCE(SUM(platform_amount), 0) FROM purchase_transaction")
                .fetch_one(&self.db)
                .await?;
        Money::from_minor(total)
    }
}

fn already_purchased() -> MarketError {
    MarketError::Conflict("You have already purchased this note".to_string())
}

fn insufficient_balance(price: Money, balance: Money) -> MarketError {
    if balance.is_zero() {
        MarketError::PaymentRequired(format!("Insufficient balance: this note costs {}", price))
    } else {
        MarketError::PaymentRequired(format!(
            "Insufficient balance: this note costs {} but your balance is {}",
            price, balance
        ))
    }
}
