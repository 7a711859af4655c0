mod payments;
mod tickets;

pub use payments::{approve_payment, get_payment, list_payments, submit_payment};
pub use tickets::{
    create_ticket, delete_ticket, get_ticket, list_tickets, ticket_categories, update_ticket,
};

use crate::services::{metrics, Filter};
use crate::startup::AppState;
use axum::{extract::State, http::header, response::IntoResponse, Json};
use serde_json::json;
use service_core::error::AppError;

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": state.config.service_name,
        "version": state.config.service_version
    }))
}

/// Ready once the row store answers a trivial read.
pub async fn readiness_check(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    state
        .store
        .get(&state.config.tables.tickets, &Filter::by_id(0))
        .await
        .map_err(|e| {
            tracing::warn!(error = %e, "Row store not reachable");
            AppError::ServiceUnavailable
        })?;

    Ok(Json(json!({ "status": "ready" })))
}

pub async fn metrics_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::get_metrics(),
    )
}
