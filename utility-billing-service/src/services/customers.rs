use super::gateway::{from_record, Filter, StoreGateway};
use crate::error::{BillingError, BillingResult};
use crate::models::Customer;
use std::sync::Arc;
use tracing::instrument;

/// Customer lookups pushed down to the store as indexed equality queries.
#[derive(Clone)]
pub struct CustomerDirectory {
    store: Arc<dyn StoreGateway>,
    table: String,
}

impl CustomerDirectory {
    pub fn new(store: Arc<dyn StoreGateway>, table: impl Into<String>) -> Self {
        Self {
            store,
            table: table.into(),
        }
    }

    #[instrument(skip(self))]
    pub async fn find_by_account(&self, account_number: &str) -> BillingResult<Option<Customer>> {
        let filter = Filter::new().eq("account_number", account_number.trim());
        match self.store.get(&self.table, &filter).await?.into_iter().next() {
            Some(record) => Ok(Some(from_record(&self.table, record)?)),
            None => Ok(None),
        }
    }

    /// The customer must exist under `customer_id` with exactly this account
    /// and meter number.
    #[instrument(skip(self))]
    pub async fn verify(
        &self,
        customer_id: i64,
        account_number: &str,
        meter_number: &str,
    ) -> BillingResult<Customer> {
        let filter = Filter::by_id(customer_id)
            .eq("account_number", account_number.trim())
            .eq("meter_number", meter_number.trim());

        match self.store.get(&self.table, &filter).await?.into_iter().next() {
            Some(record) => from_record(&self.table, record),
            None => Err(BillingError::Verification),
        }
    }
}
