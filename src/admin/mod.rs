/// Admin and Moderation System
///
/// Review states shared by notes and balance requests, the note
/// moderation workflow, and the admin audit log.

pub mod audit;
pub mod moderation;

pub use audit::{AuditLog, AuditLogEntry};
pub use moderation::{ModerationManager, NoteResolution, ResolveNoteRequest};

use crate::error::{MarketError, MarketResult};
use serde::{Deserialize, Serialize};

/// Review state of a note, submission or balance request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReviewStatus {
    Pending,
    Approved,
    Rejected,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::Pending => "Pending",
            ReviewStatus::Approved => "Approved",
            ReviewStatus::Rejected => "Rejected",
        }
    }

    pub fn from_str(s: &str) -> MarketResult<Self> {
        match s {
            "Pending" => Ok(ReviewStatus::Pending),
            "Approved" => Ok(ReviewStatus::Approved),
            "Rejected" => Ok(ReviewStatus::Rejected),
            _ => Err(MarketError::InvalidInput(format!("Invalid status: {}", s))),
        }
    }
}

/// Outcome an admin may choose for a pending item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Decision {
    Approved,
    Rejected,
}

impl Decision {
    /// Only terminal states are accepted; "Pending" or anything else is invalid input
    pub fn from_str(s: &str) -> MarketResult<Self> {
        match s {
            "Approved" => Ok(Decision::Approved),
            "Rejected" => Ok(Decision::Rejected),
            _ => Err(MarketError::InvalidInput(format!(
                "Decision must be Approved or Rejected, got '{}'",
                s
            ))),
        }
    }

    pub fn status(&self) -> ReviewStatus {
        match self {
            Decision::Approved => ReviewStatus::Approved,
            Decision::Rejected => ReviewStatus::Rejected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_rejects_pending() {
        assert_eq!(Decision::from_str("Approved").unwrap(), Decision::Approved);
        assert_eq!(Decision::from_str("Rejected").unwrap().status(), ReviewStatus::Rejected);
        assert!(matches!(
            Decision::from_str("Pending").unwrap_err(),
            MarketError::InvalidInput(_)
        ));
        assert!(Decision::from_str("approve").is_err());
    }
}
