//! Bill model for utility-billing-service.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Bill status. Stored capitalised, as the billing cycle writes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BillStatus {
    Open,
    Partial,
    Paid,
}

impl BillStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillStatus::Open => "Open",
            BillStatus::Partial => "Partial",
            BillStatus::Paid => "Paid",
        }
    }

    /// Status implied by a remaining balance after a payment is applied.
    pub fn for_balance(remaining_balance: Decimal) -> Self {
        if remaining_balance <= Decimal::ZERO {
            BillStatus::Paid
        } else {
            BillStatus::Partial
        }
    }
}

/// A billing-cycle obligation. Created by the billing run; only the balance
/// ledger mutates `remaining_balance` and `status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bill {
    pub id: i64,
    pub customer_id: i64,
    pub total_amount: Decimal,
    pub remaining_balance: Decimal,
    pub status: BillStatus,
    /// `None` for rows the billing cycle wrote before versioning.
    #[serde(default)]
    pub version: Option<i64>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}
