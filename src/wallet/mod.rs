/// Wallet: money, purchases and balance top-ups
mod money;
pub mod purchase;
pub mod topup;

pub use money::{Money, RevenueSplit, MAX_PRICE, SELLER_SHARE_PERCENT};
pub use purchase::{PurchaseEngine, PurchaseReceipt, TransactionRecord};
pub use topup::{BalanceRequest, BalanceRequestManager, SubmitBalanceRequest};

use crate::error::{MarketError, MarketResult};
use serde::{Deserialize, Serialize};

/// External payment channels accepted for top-ups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Bkash,
    Nagad,
    Rocket,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Bkash => "bkash",
            PaymentMethod::Nagad => "nagad",
            PaymentMethod::Rocket => "rocket",
        }
    }

    pub fn from_str(s: &str) -> MarketResult<Self> {
        match s.trim().to_lowercase().as_str() {
            "bkash" => Ok(PaymentMethod::Bkash),
            "nagad" => Ok(PaymentMethod::Nagad),
            "rocket" => Ok(PaymentMethod::Rocket),
            other => Err(MarketError::InvalidInput(format!(
                "Unsupported payment method '{}'",
                other
            ))),
        }
    }
}
