use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentType {
    Full,
    Partial,
}

impl PaymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentType::Full => "Full",
            PaymentType::Partial => "Partial",
        }
    }

    pub fn from_string(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "full" => Some(PaymentType::Full),
            "partial" => Some(PaymentType::Partial),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus {
    Pending,
    Approved,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "Pending",
            PaymentStatus::Approved => "Approved",
        }
    }

    pub fn from_string(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Some(PaymentStatus::Pending),
            "approved" => Some(PaymentStatus::Approved),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: i64,
    pub customer_id: i64,
    pub bill_id: i64,
    #[serde(default)]
    pub user_id: Option<String>,
    pub amount: Decimal,
    pub payment_type: PaymentType,
    pub payment_method: String,
    pub account_number: String,
    pub meter_number: String,
    pub proof_of_payment: String,
    pub status: PaymentStatus,
    /// Balance the bill would carry once this payment is approved.
    pub remaining_balance: Decimal,
    #[serde(default)]
    pub customer_type: Option<String>,
    #[serde(default)]
    pub idempotency_key: Option<String>,
    #[serde(default)]
    pub approved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub approved_by: Option<String>,
    #[serde(default)]
    pub version: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert shape for a payment; the store assigns the id.
#[derive(Debug, Clone, Serialize)]
pub struct NewPayment {
    pub customer_id: i64,
    pub bill_id: i64,
    pub user_id: Option<String>,
    pub amount: Decimal,
    pub payment_type: PaymentType,
    pub payment_method: String,
    pub account_number: String,
    pub meter_number: String,
    pub proof_of_payment: String,
    pub status: PaymentStatus,
    pub remaining_balance: Decimal,
    pub customer_type: Option<String>,
    pub idempotency_key: Option<String>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct ListPaymentsFilter {
    pub status: Option<PaymentStatus>,
    pub customer_id: Option<i64>,
    pub bill_id: Option<i64>,
    pub customer_type: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payment_enums_parse_loosely() {
        assert_eq!(PaymentType::from_string("FULL"), Some(PaymentType::Full));
        assert_eq!(PaymentType::from_string(" partial "), Some(PaymentType::Partial));
        assert_eq!(PaymentType::from_string("installment"), None);
        assert_eq!(PaymentStatus::from_string("Approved"), Some(PaymentStatus::Approved));
    }

    #[test]
    fn test_payment_type_serializes_capitalised() {
        assert_eq!(
            serde_json::to_value(PaymentType::Partial).unwrap(),
            serde_json::json!("Partial")
        );
    }
}
