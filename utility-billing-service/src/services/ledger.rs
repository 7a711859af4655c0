//! The only writer of a bill's remaining balance and status.

use super::gateway::{from_record, next_version, to_record, Filter, StoreGateway};
use crate::error::{BillingError, BillingResult};
use crate::models::{Bill, BillStatus};
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, instrument};

const MAX_APPLY_ATTEMPTS: u32 = 3;

#[derive(Clone)]
pub struct BillBalanceLedger {
    store: Arc<dyn StoreGateway>,
    table: String,
}

impl BillBalanceLedger {
    pub fn new(store: Arc<dyn StoreGateway>, table: impl Into<String>) -> Self {
        Self {
            store,
            table: table.into(),
        }
    }

    #[instrument(skip(self))]
    pub async fn get(&self, bill_id: i64) -> BillingResult<Bill> {
        match self.store.get_one(&self.table, bill_id).await? {
            Some(record) => from_record(&self.table, record),
            None => Err(BillingError::BillNotFound(bill_id)),
        }
    }

    /// Sets the bill's remaining balance (floored at zero) and derives its
    /// status from it. The caller's snapshot is trusted as-is.
    #[instrument(skip(self, new_remaining_balance), fields(balance = %new_remaining_balance))]
    pub async fn apply(&self, bill_id: i64, new_remaining_balance: Decimal) -> BillingResult<Bill> {
        let balance = new_remaining_balance.max(Decimal::ZERO);
        let status = BillStatus::for_balance(new_remaining_balance);

        for attempt in 1..=MAX_APPLY_ATTEMPTS {
            let bill = self.get(bill_id).await?;

            let changes = to_record(&json!({
                "remaining_balance": balance,
                "status": status,
                "version": next_version(bill.version),
                "updated_at": Utc::now(),
            }))?;
            let guard = Filter::by_id(bill_id).at_version(bill.version);

            if let Some(record) = self
                .store
                .update_where(&self.table, &guard, changes)
                .await?
                .into_iter()
                .next()
            {
                let updated: Bill = from_record(&self.table, record)?;
                info!(
                    bill_id,
                    status = updated.status.as_str(),
                    remaining_balance = %updated.remaining_balance,
                    "Bill balance applied"
                );
                return Ok(updated);
            }

            debug!(bill_id, attempt, version = ?bill.version, "Bill changed underneath, retrying");
        }

        Err(BillingError::Conflict(format!(
            "bill {} kept changing while applying a balance",
            bill_id
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::InMemoryStore;

    async fn ledger_with_bill(total: Decimal) -> (Arc<InMemoryStore>, BillBalanceLedger) {
        let store = Arc::new(InMemoryStore::new());
        store
            .seed(
                "bills",
                [json!({
                    "id": 1,
                    "customer_id": 3,
                    "total_amount": total,
                    "remaining_balance": total,
                    "status": "Open",
                    "version": 1
                })
                .as_object()
                .cloned()
                .unwrap()],
            )
            .await;
        let ledger = BillBalanceLedger::new(store.clone(), "bills");
        (store, ledger)
    }

    #[tokio::test]
    async fn test_partial_balance_keeps_bill_partial() {
        let (_, ledger) = ledger_with_bill(Decimal::new(150000, 2)).await;

        let bill = ledger.apply(1, Decimal::new(50000, 2)).await.unwrap();

        assert_eq!(bill.remaining_balance, Decimal::new(500, 0));
        assert_eq!(bill.status, BillStatus::Partial);
        assert_eq!(bill.version, Some(2));
    }

    #[tokio::test]
    async fn test_bill_written_by_billing_cycle_without_version() {
        let store = Arc::new(InMemoryStore::new());
        store
            .seed(
                "bills",
                [json!({
                    "id": 7,
                    "customer_id": 3,
                    "total_amount": "1500.00",
                    "remaining_balance": "1500.00",
                    "status": "Open"
                })
                .as_object()
                .cloned()
                .unwrap()],
            )
            .await;
        let ledger = BillBalanceLedger::new(store.clone(), "bills");

        let bill = ledger.apply(7, Decimal::new(50000, 2)).await.unwrap();
        assert_eq!(bill.status, BillStatus::Partial);
        assert_eq!(bill.remaining_balance, Decimal::new(500, 0));
        assert_eq!(bill.version, Some(1));

        let bill = ledger.apply(7, Decimal::ZERO).await.unwrap();
        assert_eq!(bill.status, BillStatus::Paid);
        assert_eq!(bill.version, Some(2));
    }

    #[tokio::test]
    async fn test_zero_or_negative_balance_pays_bill() {
        let (_, ledger) = ledger_with_bill(Decimal::new(150000, 2)).await;

        let bill = ledger.apply(1, Decimal::new(-100, 2)).await.unwrap();

        assert_eq!(bill.remaining_balance, Decimal::ZERO);
        assert_eq!(bill.status, BillStatus::Paid);
    }

    #[tokio::test]
    async fn test_missing_bill() {
        let (_, ledger) = ledger_with_bill(Decimal::ONE).await;
        let err = ledger.apply(99, Decimal::ZERO).await.unwrap_err();
        assert!(matches!(err, BillingError::BillNotFound(99)));
    }
}
