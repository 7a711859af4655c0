//! Payment submission, approval and listing.

use super::customers::CustomerDirectory;
use super::gateway::{from_record, next_version, to_record, Filter, StoreGateway};
use super::ledger::BillBalanceLedger;
use super::metrics;
use super::storage::{ensure_upload_size, BlobStore, PAYMENT_PROOF_PREFIX};
use crate::error::{BillingError, BillingResult};
use crate::models::{
    ListPaymentsFilter, NewPayment, Payment, PaymentStatus, PaymentType, Principal, Upload,
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// Validated input for [`PaymentProcessor::submit`].
#[derive(Debug, Clone)]
pub struct SubmitPayment {
    pub customer_id: i64,
    pub bill_id: i64,
    pub amount: Decimal,
    pub payment_type: PaymentType,
    pub payment_method: String,
    pub account_number: String,
    pub meter_number: String,
    pub proof: Upload,
    pub user_id: Option<String>,
    pub idempotency_key: Option<String>,
}

#[derive(Clone)]
pub struct PaymentProcessor {
    store: Arc<dyn StoreGateway>,
    customers: CustomerDirectory,
    ledger: BillBalanceLedger,
    blobs: Arc<dyn BlobStore>,
    table: String,
    max_upload_bytes: usize,
}

impl PaymentProcessor {
    pub fn new(
        store: Arc<dyn StoreGateway>,
        customers: CustomerDirectory,
        ledger: BillBalanceLedger,
        blobs: Arc<dyn BlobStore>,
        table: impl Into<String>,
        max_upload_bytes: usize,
    ) -> Self {
        Self {
            store,
            customers,
            ledger,
            blobs,
            table: table.into(),
            max_upload_bytes,
        }
    }

    #[instrument(
        skip(self, request),
        fields(customer_id = request.customer_id, bill_id = request.bill_id, payment_type = request.payment_type.as_str())
    )]
    pub async fn submit(&self, request: SubmitPayment) -> BillingResult<Payment> {
        let result = self.try_submit(request).await;
        observe("submit", &result);
        result
    }

    async fn try_submit(&self, request: SubmitPayment) -> BillingResult<Payment> {
        if request.amount <= Decimal::ZERO {
            return Err(BillingError::validation("amount must be greater than zero"));
        }
        if request.payment_method.trim().is_empty() {
            return Err(BillingError::validation("payment_method is required"));
        }
        ensure_upload_size(&request.proof, self.max_upload_bytes)?;

        let customer = self
            .customers
            .verify(request.customer_id, &request.account_number, &request.meter_number)
            .await?;

        if let Some(key) = request.idempotency_key.as_deref() {
            if let Some(existing) = self.find_by_idempotency_key(key).await? {
                return replay(
                    existing,
                    request.customer_id,
                    request.bill_id,
                    request.amount,
                    request.payment_type,
                );
            }
        }

        let bill = self.ledger.get(request.bill_id).await?;

        let remaining_balance = match request.payment_type {
            PaymentType::Full if request.amount != bill.total_amount => {
                return Err(BillingError::AmountMismatch {
                    amount: request.amount,
                    total: bill.total_amount,
                })
            }
            PaymentType::Full => Decimal::ZERO,
            PaymentType::Partial if request.amount >= bill.total_amount => {
                return Err(BillingError::AmountTooHigh {
                    amount: request.amount,
                    total: bill.total_amount,
                })
            }
            PaymentType::Partial => bill.total_amount - request.amount,
        };

        let proof_url = self
            .blobs
            .store(
                request.proof.bytes,
                &format!("{}/{}", PAYMENT_PROOF_PREFIX, request.proof.file_name),
            )
            .await?;

        let now = Utc::now();
        let new_payment = NewPayment {
            customer_id: request.customer_id,
            bill_id: request.bill_id,
            user_id: request.user_id,
            amount: request.amount,
            payment_type: request.payment_type,
            payment_method: request.payment_method.trim().to_string(),
            account_number: request.account_number.trim().to_string(),
            meter_number: request.meter_number.trim().to_string(),
            proof_of_payment: proof_url,
            status: PaymentStatus::Pending,
            remaining_balance,
            customer_type: customer.customer_type,
            idempotency_key: request.idempotency_key,
            version: 1,
            created_at: now,
            updated_at: now,
        };

        let record = match self.store.insert(&self.table, to_record(&new_payment)?).await {
            Ok(record) => record,
            Err(err) => return self.recover_duplicate(&new_payment, err).await,
        };
        let payment: Payment = from_record(&self.table, record)?;

        info!(
            payment_id = payment.id,
            amount = %payment.amount,
            remaining_balance = %payment.remaining_balance,
            "Payment submitted"
        );
        Ok(payment)
    }

    /// The store keeps idempotency_key unique, so a failed insert may mean a
    /// concurrent submission with the same key got there first.
    async fn recover_duplicate(
        &self,
        new_payment: &NewPayment,
        err: BillingError,
    ) -> BillingResult<Payment> {
        let Some(key) = new_payment.idempotency_key.as_deref() else {
            return Err(err);
        };
        match self.find_by_idempotency_key(key).await? {
            Some(existing) => replay(
                existing,
                new_payment.customer_id,
                new_payment.bill_id,
                new_payment.amount,
                new_payment.payment_type,
            ),
            None => Err(err),
        }
    }

    async fn find_by_idempotency_key(&self, key: &str) -> BillingResult<Option<Payment>> {
        let filter = Filter::new().eq("idempotency_key", key);
        match self.store.get(&self.table, &filter).await?.into_iter().next() {
            Some(record) => Ok(Some(from_record(&self.table, record)?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self))]
    pub async fn get(&self, payment_id: i64) -> BillingResult<Payment> {
        match self.store.get_one(&self.table, payment_id).await? {
            Some(record) => from_record(&self.table, record),
            None => Err(BillingError::PaymentNotFound(payment_id)),
        }
    }

    /// Pending to Approved, exactly once, then the bill balance. If the bill
    /// write fails the payment is put back to Pending.
    #[instrument(skip(self, principal), fields(approver = %principal.id))]
    pub async fn approve(&self, payment_id: i64, principal: &Principal) -> BillingResult<Payment> {
        let result = self.try_approve(payment_id, principal).await;
        observe("approve", &result);
        result
    }

    async fn try_approve(&self, payment_id: i64, principal: &Principal) -> BillingResult<Payment> {
        let payment = self.get(payment_id).await?;
        if payment.status == PaymentStatus::Approved {
            return Err(already_approved(payment_id));
        }

        let now = Utc::now();
        let changes = to_record(&json!({
            "status": PaymentStatus::Approved,
            "approved_at": now,
            "approved_by": principal.display_name,
            "updated_at": now,
            "version": next_version(payment.version),
        }))?;
        let guard = Filter::by_id(payment_id).eq("status", PaymentStatus::Pending.as_str());

        let approved: Payment = match self
            .store
            .update_where(&self.table, &guard, changes)
            .await?
            .into_iter()
            .next()
        {
            Some(record) => from_record(&self.table, record)?,
            // Someone else approved it between our read and write.
            None => return Err(already_approved(payment_id)),
        };

        let balance = match approved.payment_type {
            PaymentType::Full => Decimal::ZERO,
            PaymentType::Partial => approved.remaining_balance,
        };

        if let Err(err) = self.ledger.apply(approved.bill_id, balance).await {
            self.roll_back_approval(&approved, &err).await;
            return Err(err);
        }

        info!(
            payment_id,
            bill_id = approved.bill_id,
            approved_by = %principal.display_name,
            "Payment approved"
        );
        Ok(approved)
    }

    async fn roll_back_approval(&self, payment: &Payment, cause: &BillingError) {
        warn!(
            payment_id = payment.id,
            bill_id = payment.bill_id,
            error = %cause,
            "Bill update failed, returning payment to Pending"
        );

        let revert = to_record(&json!({
            "status": PaymentStatus::Pending,
            "approved_at": Value::Null,
            "approved_by": Value::Null,
            "updated_at": Utc::now(),
            "version": next_version(payment.version),
        }));
        let guard = Filter::by_id(payment.id).eq("status", PaymentStatus::Approved.as_str());

        let reverted = match revert {
            Ok(revert) => self.store.update_where(&self.table, &guard, revert).await,
            Err(e) => Err(e),
        };

        match reverted {
            Ok(rows) if !rows.is_empty() => {
                metrics::record_payment("approve", "rolled_back");
            }
            Ok(_) => {
                error!(
                    payment_id = payment.id,
                    bill_id = payment.bill_id,
                    "Payment is Approved but its bill was not updated and the rollback matched no row; manual remediation required"
                );
                metrics::record_payment("approve", "needs_remediation");
            }
            Err(e) => {
                error!(
                    payment_id = payment.id,
                    bill_id = payment.bill_id,
                    error = %e,
                    "Payment is Approved but its bill was not updated and the rollback failed; manual remediation required"
                );
                metrics::record_payment("approve", "needs_remediation");
            }
        }
    }

    /// Newest first.
    #[instrument(skip(self))]
    pub async fn list(&self, filter: &ListPaymentsFilter) -> BillingResult<Vec<Payment>> {
        let mut query = Filter::new();
        if let Some(status) = filter.status {
            query = query.eq("status", status.as_str());
        }
        if let Some(customer_id) = filter.customer_id {
            query = query.eq("customer_id", customer_id);
        }
        if let Some(bill_id) = filter.bill_id {
            query = query.eq("bill_id", bill_id);
        }

        let mut payments = self
            .store
            .get(&self.table, &query)
            .await?
            .into_iter()
            .map(|record| from_record::<Payment>(&self.table, record))
            .collect::<BillingResult<Vec<_>>>()?;

        if let Some(customer_type) = filter.customer_type.as_deref() {
            payments.retain(|p| {
                p.customer_type
                    .as_deref()
                    .is_some_and(|t| t.eq_ignore_ascii_case(customer_type))
            });
        }

        payments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(payments)
    }
}

/// A key may only replay the payment it was first used for.
fn replay(
    existing: Payment,
    customer_id: i64,
    bill_id: i64,
    amount: Decimal,
    payment_type: PaymentType,
) -> BillingResult<Payment> {
    let same_payment = existing.customer_id == customer_id
        && existing.bill_id == bill_id
        && existing.amount == amount
        && existing.payment_type == payment_type;
    if !same_payment {
        return Err(BillingError::Conflict(
            "idempotency key was already used for a different payment".to_string(),
        ));
    }
    info!(payment_id = existing.id, "Replayed payment submission");
    Ok(existing)
}

fn already_approved(payment_id: i64) -> BillingError {
    BillingError::Conflict(format!("payment {} is already approved", payment_id))
}

fn observe<T>(operation: &str, result: &BillingResult<T>) {
    match result {
        Ok(_) => metrics::record_payment(operation, "ok"),
        Err(e) => {
            warn!(operation, kind = e.kind(), error = %e, "Payment operation failed");
            metrics::record_payment(operation, e.kind());
            metrics::record_error(e.kind());
        }
    }
}
