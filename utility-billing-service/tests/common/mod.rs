#![allow(dead_code)]

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use utility_billing_service::config::BillingConfig;
use utility_billing_service::error::{BillingError, BillingResult};
use utility_billing_service::models::{Principal, StaffRole, Upload};
use utility_billing_service::services::{
    next_version, BlobStore, Filter, InMemoryStore, LocalBlobStore, Record, StoreGateway, SubmitPayment,
};
use utility_billing_service::startup::{AppState, Application};

pub const ACCOUNT: &str = "511901200173";
pub const METER: &str = "MTR-0042";
pub const CUSTOMER_ID: i64 = 3;
pub const BILL_ID: i64 = 7;

pub fn record(value: Value) -> Record {
    value.as_object().cloned().expect("fixture must be an object")
}

pub fn money(units: i64, cents: u32) -> Decimal {
    Decimal::new(units * 100 + cents as i64, 2)
}

pub fn bill_handler() -> Principal {
    Principal::new("11", "Maria Santos", StaffRole::BillHandler)
}

pub fn meter_handler() -> Principal {
    Principal::new("12", "Pedro Reyes", StaffRole::MeterHandler)
}

/// One customer and one open bill for `total`, shaped the way the billing
/// cycle writes it: no `version` column.
pub async fn seed_customer_and_bill(store: &InMemoryStore, total: Decimal) {
    store
        .seed(
            "customers_tb",
            [record(json!({
                "id": CUSTOMER_ID,
                "name": "Juan Dela Cruz",
                "account_number": ACCOUNT,
                "meter_number": METER,
                "customer_type": "residential",
                "email": "juan@example.com"
            }))],
        )
        .await;
    store
        .seed(
            "bills",
            [record(json!({
                "id": BILL_ID,
                "customer_id": CUSTOMER_ID,
                "total_amount": total,
                "remaining_balance": total,
                "status": "Open"
            }))],
        )
        .await;
}

/// A ticket row as the legacy portal stored it: no `version`, null history.
pub async fn seed_legacy_ticket(store: &InMemoryStore, id: i64, reference: &str) {
    store
        .seed(
            "tickets_tb",
            [record(json!({
                "id": id,
                "ticket_reference": reference,
                "customer_id": CUSTOMER_ID,
                "account_number": ACCOUNT,
                "category": "Technical",
                "subcategory": "Low Water Pressure",
                "subject": "Technical - Low Water Pressure",
                "description": "Weak flow since Monday",
                "status": "open",
                "priority": "medium",
                "remarks_history": null,
                "created_at": "2024-11-19T08:30:00Z",
                "updated_at": "2024-11-19T08:30:00Z"
            }))],
        )
        .await;
}

pub fn payment_request(amount: Decimal, payment_type: &str) -> SubmitPayment {
    SubmitPayment {
        customer_id: CUSTOMER_ID,
        bill_id: BILL_ID,
        amount,
        payment_type: utility_billing_service::models::PaymentType::from_string(payment_type)
            .expect("known payment type"),
        payment_method: "GCash".to_string(),
        account_number: ACCOUNT.to_string(),
        meter_number: METER.to_string(),
        proof: Upload::new("receipt.png", vec![0x89, 0x50, 0x4e, 0x47]),
        user_id: None,
        idempotency_key: None,
    }
}

/// Engines over an in-memory store and a temp-dir blob store.
pub struct TestContext {
    pub store: Arc<InMemoryStore>,
    pub state: AppState,
    pub upload_dir: TempDir,
}

impl TestContext {
    pub async fn new() -> Self {
        let store = Arc::new(InMemoryStore::new());
        Self::with_store(store.clone(), store).await
    }

    /// `inner` is kept for fixtures and assertions; `gateway` is what the
    /// engines talk to, possibly a wrapper around `inner`.
    pub async fn with_store(inner: Arc<InMemoryStore>, gateway: Arc<dyn StoreGateway>) -> Self {
        let upload_dir = tempfile::tempdir().expect("temp dir");
        let blobs: Arc<dyn BlobStore> = Arc::new(
            LocalBlobStore::new(upload_dir.path(), "http://localhost/uploads")
                .await
                .expect("local blob store"),
        );
        let config = BillingConfig::in_memory(upload_dir.path());
        let state = AppState::new(config, gateway, blobs);
        Self {
            store: inner,
            state,
            upload_dir,
        }
    }

    pub async fn bill(&self) -> Value {
        let rows = self
            .store
            .get("bills", &Filter::by_id(BILL_ID))
            .await
            .expect("bills readable");
        Value::Object(rows.into_iter().next().expect("bill exists"))
    }

    pub async fn payment_count(&self) -> usize {
        self.store.rows("payments").await.len()
    }
}

/// Fails bill writes on demand; everything else passes through.
pub struct FailingBillWrites {
    pub inner: Arc<InMemoryStore>,
    pub fail_bill_updates: AtomicBool,
    pub fail_all_updates_after_bill: AtomicBool,
}

impl FailingBillWrites {
    pub fn new(inner: Arc<InMemoryStore>) -> Self {
        Self {
            inner,
            fail_bill_updates: AtomicBool::new(false),
            fail_all_updates_after_bill: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl StoreGateway for FailingBillWrites {
    async fn get(&self, collection: &str, filter: &Filter) -> BillingResult<Vec<Record>> {
        self.inner.get(collection, filter).await
    }

    async fn insert(&self, collection: &str, record: Record) -> BillingResult<Record> {
        self.inner.insert(collection, record).await
    }

    async fn update_where(
        &self,
        collection: &str,
        filter: &Filter,
        partial: Record,
    ) -> BillingResult<Vec<Record>> {
        if collection == "bills" && self.fail_bill_updates.load(Ordering::SeqCst) {
            return Err(BillingError::gateway("update", "HTTP 500: bills unavailable"));
        }
        if collection == "payments"
            && self.fail_all_updates_after_bill.load(Ordering::SeqCst)
            && partial.get("status") == Some(&json!("Pending"))
        {
            return Err(BillingError::gateway("update", "HTTP 500: payments unavailable"));
        }
        self.inner.update_where(collection, filter, partial).await
    }
}

/// Lets a competing write land between a ticket read and its guarded write,
/// the first `races` times a ticket update is attempted.
pub struct RacingTicketWrites {
    pub inner: Arc<InMemoryStore>,
    races: AtomicU32,
    competing: Record,
    pub attempts: AtomicU32,
}

impl RacingTicketWrites {
    pub fn new(inner: Arc<InMemoryStore>, races: u32, competing: Record) -> Self {
        Self {
            inner,
            races: AtomicU32::new(races),
            competing,
            attempts: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl StoreGateway for RacingTicketWrites {
    async fn get(&self, collection: &str, filter: &Filter) -> BillingResult<Vec<Record>> {
        self.inner.get(collection, filter).await
    }

    async fn insert(&self, collection: &str, record: Record) -> BillingResult<Record> {
        self.inner.insert(collection, record).await
    }

    async fn update_where(
        &self,
        collection: &str,
        filter: &Filter,
        partial: Record,
    ) -> BillingResult<Vec<Record>> {
        if collection == "tickets_tb" {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let remaining = self.races.load(Ordering::SeqCst);
            if remaining > 0 {
                self.races.store(remaining - 1, Ordering::SeqCst);
                // Another staff member saves first, bumping the version.
                for row in self.inner.get(collection, &Filter::new()).await? {
                    let Some(id) = row.get("id").and_then(Value::as_i64) else {
                        continue;
                    };
                    let version = row.get("version").and_then(Value::as_i64);
                    let mut competing = self.competing.clone();
                    competing.insert("version".to_string(), json!(next_version(version)));
                    self.inner
                        .update_where(collection, &Filter::by_id(id), competing)
                        .await?;
                }
            }
        }
        self.inner.update_where(collection, filter, partial).await
    }
}

/// Models a unique constraint on `payments.idempotency_key` losing a race:
/// a competing submission lands first and our insert is rejected.
pub struct DuplicateKeyOnInsert {
    pub inner: Arc<InMemoryStore>,
    pub competing: Record,
}

#[async_trait]
impl StoreGateway for DuplicateKeyOnInsert {
    async fn get(&self, collection: &str, filter: &Filter) -> BillingResult<Vec<Record>> {
        self.inner.get(collection, filter).await
    }

    async fn insert(&self, collection: &str, record: Record) -> BillingResult<Record> {
        if collection == "payments" && record.get("idempotency_key").is_some_and(|k| !k.is_null()) {
            let mut competing = record.clone();
            competing.extend(self.competing.clone());
            self.inner.insert(collection, competing).await?;
            return Err(BillingError::gateway(
                "insert",
                "HTTP 409: duplicate key value violates unique constraint",
            ));
        }
        self.inner.insert(collection, record).await
    }

    async fn update_where(
        &self,
        collection: &str,
        filter: &Filter,
        partial: Record,
    ) -> BillingResult<Vec<Record>> {
        self.inner.update_where(collection, filter, partial).await
    }
}

pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub store: Arc<InMemoryStore>,
    pub upload_dir: TempDir,
}

impl TestApp {
    pub async fn spawn() -> Self {
        let store = Arc::new(InMemoryStore::new());
        let upload_dir = tempfile::tempdir().expect("temp dir");
        let blobs: Arc<dyn BlobStore> = Arc::new(
            LocalBlobStore::new(upload_dir.path(), "http://localhost/uploads")
                .await
                .expect("local blob store"),
        );
        let config = BillingConfig::in_memory(upload_dir.path());

        let app = Application::build_with(config, store.clone(), blobs)
            .await
            .expect("Failed to build test application");

        let port = app.port();
        let address = format!("http://127.0.0.1:{}", port);

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        // Wait for the server by polling the health endpoint
        let client = reqwest::Client::new();
        let health_url = format!("{}/health", address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        }

        TestApp {
            address,
            port,
            store,
            upload_dir,
        }
    }

    pub fn staff_get(&self, client: &reqwest::Client, path: &str, principal: &Principal) -> reqwest::RequestBuilder {
        with_principal(client.get(format!("{}{}", self.address, path)), principal)
    }
}

pub fn with_principal(builder: reqwest::RequestBuilder, principal: &Principal) -> reqwest::RequestBuilder {
    builder
        .header("X-Staff-ID", principal.id.as_str())
        .header("X-Staff-Name", principal.display_name.as_str())
        .header("X-Staff-Role", principal.role.as_str())
}
