use crate::dtos::{MultipartForm, PaymentListQuery, SubmitPaymentForm};
use crate::models::{ListPaymentsFilter, Principal};
use crate::startup::AppState;
use axum::{
    extract::{Multipart, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;

const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

pub async fn list_payments(
    State(state): State<AppState>,
    _principal: Principal,
    Query(query): Query<PaymentListQuery>,
) -> Result<impl IntoResponse, AppError> {
    let filter = ListPaymentsFilter::try_from(query)?;
    let payments = state.payments.list(&filter).await?;
    Ok(Json(payments))
}

/// Customer-facing: no staff principal, identity is checked against the
/// account and meter numbers instead.
pub async fn submit_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let form = MultipartForm::read(multipart).await?;
    let mut request = SubmitPaymentForm::from_multipart(form).into_request()?;

    if request.idempotency_key.is_none() {
        request.idempotency_key = headers
            .get(IDEMPOTENCY_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);
    }

    let payment = state.payments.submit(request).await?;
    Ok((StatusCode::CREATED, Json(payment)))
}

pub async fn get_payment(
    State(state): State<AppState>,
    _principal: Principal,
    Path(payment_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let payment = state.payments.get(payment_id).await?;
    Ok(Json(payment))
}

pub async fn approve_payment(
    State(state): State<AppState>,
    principal: Principal,
    Path(payment_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    if !principal.role.can_approve_payments() {
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "{} staff cannot approve payments",
            principal.role.as_str()
        )));
    }

    let payment = state.payments.approve(payment_id, &principal).await?;
    Ok(Json(payment))
}
