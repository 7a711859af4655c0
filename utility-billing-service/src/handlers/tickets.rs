use crate::dtos::{CreateTicketForm, CreateTicketResponse, MultipartForm, UpdateTicketRequest};
use crate::models::{Principal, TicketLocator};
use crate::startup::AppState;
use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;

pub async fn list_tickets(
    State(state): State<AppState>,
    _principal: Principal,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.tickets.list().await?))
}

pub async fn create_ticket(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let form = MultipartForm::read(multipart).await?;
    let request = CreateTicketForm::from_multipart(form).into_request()?;
    let ticket = state.tickets.create(request).await?;
    Ok((StatusCode::CREATED, Json(CreateTicketResponse::from(ticket))))
}

pub async fn ticket_categories(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.tickets.categories())
}

pub async fn get_ticket(
    State(state): State<AppState>,
    _principal: Principal,
    Path(locator): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let ticket = state.tickets.get(&TicketLocator::parse(&locator)).await?;
    Ok(Json(ticket))
}

pub async fn update_ticket(
    State(state): State<AppState>,
    principal: Principal,
    Path(locator): Path<String>,
    Json(request): Json<UpdateTicketRequest>,
) -> Result<impl IntoResponse, AppError> {
    let changes = request.into_changes()?;
    let ticket = state
        .tickets
        .update(&TicketLocator::parse(&locator), changes, &principal)
        .await?;
    Ok(Json(ticket))
}

pub async fn delete_ticket(
    State(state): State<AppState>,
    principal: Principal,
    Path(locator): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let ticket = state
        .tickets
        .delete(&TicketLocator::parse(&locator), &principal)
        .await?;
    Ok(Json(ticket))
}
