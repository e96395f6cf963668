//! Charger fleet handlers
//!
//! Thin wrappers over [`ChargerRegistry`](crate::application::ChargerRegistry).
//! None of them wait for the Central System: start/stop return once the call
//! has been sent.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tracing::info;

use super::dto::{
    validate_charger_id, ActionResponse, ChargerDto, CreateChargerRequest, PowerRequest,
    StartTransactionRequest,
};
use crate::application::SharedChargerRegistry;
use crate::interfaces::http::common::{api_error, ApiError, ApiResponse, ValidatedJson};

#[derive(Clone)]
pub struct ChargersState {
    pub registry: SharedChargerRegistry,
    /// Id-tag used when a start request carries none
    pub default_id_tag: Arc<str>,
}

type JsonResult<T> = Result<Json<ApiResponse<T>>, ApiError<T>>;

#[utoipa::path(
    get,
    path = "/chargers",
    tag = "Chargers",
    responses(
        (status = 200, description = "Every simulated charger", body = ApiResponse<Vec<ChargerDto>>)
    )
)]
pub async fn list_chargers(State(state): State<ChargersState>) -> Json<ApiResponse<Vec<ChargerDto>>> {
    let chargers = state
        .registry
        .list()
        .await
        .into_iter()
        .map(ChargerDto::from)
        .collect();
    Json(ApiResponse::success(chargers))
}

#[utoipa::path(
    get,
    path = "/chargers/{id}",
    tag = "Chargers",
    params(("id" = String, Path, description = "Charger ID")),
    responses(
        (status = 200, description = "Charger snapshot", body = ApiResponse<ChargerDto>),
        (status = 404, description = "Not found")
    )
)]
pub async fn get_charger(
    State(state): State<ChargersState>,
    Path(id): Path<String>,
) -> JsonResult<ChargerDto> {
    let summary = state.registry.get(&id).await.map_err(api_error)?;
    Ok(Json(ApiResponse::success(summary.into())))
}

#[utoipa::path(
    post,
    path = "/chargers",
    tag = "Chargers",
    request_body = CreateChargerRequest,
    responses(
        (status = 201, description = "Charger created and powering on", body = ApiResponse<ChargerDto>),
        (status = 409, description = "Already exists"),
        (status = 422, description = "Validation error")
    )
)]
pub async fn create_charger(
    State(state): State<ChargersState>,
    ValidatedJson(body): ValidatedJson<CreateChargerRequest>,
) -> Result<(StatusCode, Json<ApiResponse<ChargerDto>>), ApiError<ChargerDto>> {
    let summary = state.registry.create(&body.id).await.map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(summary.into()))))
}

#[utoipa::path(
    delete,
    path = "/chargers/{id}",
    tag = "Chargers",
    params(("id" = String, Path, description = "Charger ID")),
    responses(
        (status = 200, description = "Charger removed", body = ApiResponse<ActionResponse>),
        (status = 404, description = "Not found")
    )
)]
pub async fn delete_charger(
    State(state): State<ChargersState>,
    Path(id): Path<String>,
) -> JsonResult<ActionResponse> {
    state.registry.delete(&id).await.map_err(api_error)?;
    Ok(Json(ApiResponse::success(ActionResponse::new(format!(
        "Charger {} deleted",
        id
    )))))
}

#[utoipa::path(
    post,
    path = "/chargers/{id}/power",
    tag = "Chargers",
    params(("id" = String, Path, description = "Charger ID")),
    request_body = PowerRequest,
    responses(
        (status = 200, description = "Power state applied", body = ApiResponse<ActionResponse>),
        (status = 404, description = "Not found")
    )
)]
pub async fn set_power(
    State(state): State<ChargersState>,
    Path(id): Path<String>,
    Json(body): Json<PowerRequest>,
) -> JsonResult<ActionResponse> {
    let outcome = state
        .registry
        .set_power(&id, body.on)
        .await
        .map_err(api_error)?;
    Ok(Json(ApiResponse::success(outcome.into())))
}

#[utoipa::path(
    post,
    path = "/chargers/{id}/start",
    tag = "Chargers",
    params(("id" = String, Path, description = "Charger ID")),
    request_body(content = StartTransactionRequest, description = "Optional; idTag defaults to the configured tag"),
    responses(
        (status = 200, description = "StartTransaction sent", body = ApiResponse<ActionResponse>),
        (status = 400, description = "Invalid JSON"),
        (status = 404, description = "Not found"),
        (status = 409, description = "Not operational or transaction already in progress")
    )
)]
pub async fn start_transaction(
    State(state): State<ChargersState>,
    Path(id): Path<String>,
    body: Bytes,
) -> JsonResult<ActionResponse> {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        StartTransactionRequest::default()
    } else {
        serde_json::from_slice::<StartTransactionRequest>(&body).map_err(|e| {
            (
                StatusCode::BAD_REQUEST,
                Json(ApiResponse::error(format!("Invalid JSON: {}", e))),
            )
        })?
    };

    let id_tag = request
        .id_tag
        .filter(|tag| !tag.is_empty())
        .unwrap_or_else(|| state.default_id_tag.to_string());

    state
        .registry
        .start_transaction(&id, &id_tag)
        .await
        .map_err(api_error)?;
    Ok(Json(ApiResponse::success(ActionResponse::new(format!(
        "StartTransaction sent for {} with idTag {}",
        id, id_tag
    )))))
}

#[utoipa::path(
    post,
    path = "/chargers/{id}/stop",
    tag = "Chargers",
    params(("id" = String, Path, description = "Charger ID")),
    responses(
        (status = 200, description = "Transaction stopped", body = ApiResponse<ActionResponse>),
        (status = 404, description = "Not found"),
        (status = 409, description = "No transaction in progress")
    )
)]
pub async fn stop_transaction(
    State(state): State<ChargersState>,
    Path(id): Path<String>,
) -> JsonResult<ActionResponse> {
    state
        .registry
        .stop_transaction(&id)
        .await
        .map_err(api_error)?;
    Ok(Json(ApiResponse::success(ActionResponse::new(format!(
        "Transaction stopped on {}",
        id
    )))))
}

/// `GET /start-charger/{id}`: create-and-power-on with a plain-text reply.
#[utoipa::path(
    get,
    path = "/start-charger/{id}",
    tag = "Chargers",
    params(("id" = String, Path, description = "Charger ID")),
    responses(
        (status = 200, description = "Charger created", body = String),
        (status = 409, description = "Already exists"),
        (status = 422, description = "Invalid charger id")
    )
)]
pub async fn start_charger(
    State(state): State<ChargersState>,
    Path(id): Path<String>,
) -> Result<String, ApiError<ChargerDto>> {
    if id.is_empty() || id.len() > 64 {
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ApiResponse::error("id: length must be 1..=64")),
        ));
    }
    if let Err(e) = validate_charger_id(&id) {
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ApiResponse::error(format!("id: {}", e))),
        ));
    }
    state.registry.create(&id).await.map_err(api_error)?;
    info!(charger_id = %id, "Charger started via legacy endpoint");
    Ok(format!("Started charger simulation for charger ID: {}", id))
}
