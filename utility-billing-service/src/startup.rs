use crate::config::{BillingConfig, StorageConfig, StoreConfig};
use crate::handlers;
use crate::middleware::http_metrics_middleware;
use crate::services::{
    BillBalanceLedger, BlobStore, CustomerDirectory, InMemoryStore, LocalBlobStore,
    PaymentProcessor, StoreGateway, SupabaseBlobStore, SupabaseGateway, TicketWorkflowEngine,
};
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::request_id_middleware;
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Room for the text fields and multipart framing around an upload.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub config: BillingConfig,
    pub store: Arc<dyn StoreGateway>,
    pub payments: PaymentProcessor,
    pub tickets: TicketWorkflowEngine,
}

impl AppState {
    pub fn new(
        config: BillingConfig,
        store: Arc<dyn StoreGateway>,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        let tables = &config.tables;
        let customers = CustomerDirectory::new(store.clone(), &tables.customers);
        let ledger = BillBalanceLedger::new(store.clone(), &tables.bills);

        let payments = PaymentProcessor::new(
            store.clone(),
            customers.clone(),
            ledger,
            blobs.clone(),
            &tables.payments,
            config.max_upload_bytes,
        );
        let tickets = TicketWorkflowEngine::new(
            store.clone(),
            customers,
            blobs,
            &tables.tickets,
            config.ticket_update_max_attempts,
            config.max_upload_bytes,
        );

        Self {
            config,
            store,
            payments,
            tickets,
        }
    }
}

pub struct Application {
    port: u16,
    server: Box<dyn std::future::Future<Output = std::io::Result<()>> + Send + Unpin>,
}

impl Application {
    pub async fn build(config: BillingConfig) -> Result<Self, AppError> {
        let store: Arc<dyn StoreGateway> = match &config.store {
            StoreConfig::Memory => {
                tracing::warn!("Using the in-memory row store; data is lost on restart");
                Arc::new(InMemoryStore::new())
            }
            StoreConfig::Supabase(supabase) => Arc::new(SupabaseGateway::new(supabase).map_err(|e| {
                tracing::error!("Failed to create row store client: {}", e);
                AppError::from(e)
            })?),
        };

        let blobs: Arc<dyn BlobStore> = match &config.storage {
            StorageConfig::Local { path, public_url } => Arc::new(
                LocalBlobStore::new(path.clone(), public_url.clone())
                    .await
                    .map_err(|e| {
                        tracing::error!(
                            "Failed to initialize local storage at {}: {}",
                            path.display(),
                            e
                        );
                        AppError::from(e)
                    })?,
            ),
            StorageConfig::Supabase { supabase, bucket } => Arc::new(
                SupabaseBlobStore::new(supabase, bucket.clone()).map_err(AppError::from)?,
            ),
        };

        Self::build_with(config, store, blobs).await
    }

    /// Builds the app over the given store and blob storage.
    pub async fn build_with(
        config: BillingConfig,
        store: Arc<dyn StoreGateway>,
        blobs: Arc<dyn BlobStore>,
    ) -> Result<Self, AppError> {
        let port = config.common.port;
        let body_limit = config.max_upload_bytes + MULTIPART_OVERHEAD_BYTES;
        let state = AppState::new(config, store, blobs);

        let app = router(state, body_limit);

        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind TCP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!("Listening on {}", port);

        let server = axum::serve(listener, app);

        Ok(Self {
            port,
            server: Box::new(server.into_future()),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        self.server.await
    }
}

pub fn router(state: AppState, body_limit: usize) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_handler))
        .route(
            "/payments",
            get(handlers::list_payments).post(handlers::submit_payment),
        )
        .route("/payments/:id", get(handlers::get_payment))
        .route("/payments/:id/approve", post(handlers::approve_payment))
        .route(
            "/tickets",
            get(handlers::list_tickets).post(handlers::create_ticket),
        )
        .route("/tickets/categories", get(handlers::ticket_categories))
        .route(
            "/tickets/:locator",
            get(handlers::get_ticket)
                .put(handlers::update_ticket)
                .delete(handlers::delete_ticket),
        )
        .route_layer(middleware::from_fn(http_metrics_middleware))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}
