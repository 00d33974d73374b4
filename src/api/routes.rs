use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Number};
use std::{str::FromStr, sync::Arc};
use tower_http::cors::CorsLayer;
use tracing::error;

use crate::{
    admission::Rejection,
    middleware::request_logging,
    models::{self, to_display, Statistics, Transaction},
    service::TransactionService,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<TransactionService>,
}

/// Create the API router
pub fn create_router(service: Arc<TransactionService>) -> Router {
    let state = AppState { service };

    Router::new()
        .route("/health", get(health_check))
        .route(
            "/transactions",
            post(create_transaction).delete(delete_transactions),
        )
        .route("/statistics", get(get_statistics))
        .with_state(state)
        .layer(middleware::from_fn(request_logging))
        .layer(CorsLayer::permissive())
}

// ===== Route Handlers =====

/// Health check endpoint
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Record a transaction.
///
/// 201 when admitted, 204 when older than the window, 422 when a field is
/// unparseable or the timestamp is in the future, 400 when the body is not
/// JSON, lacks a field or is sent without a JSON content type.
async fn create_transaction(
    State(state): State<AppState>,
    payload: Result<Json<TransactionRequest>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(request) = payload?;
    let amount = parse_amount(&request.amount)?;
    let timestamp = parse_timestamp(&request.timestamp)?;

    match state
        .service
        .add_transaction(Transaction::new(amount, timestamp))
    {
        Ok(()) => Ok(StatusCode::CREATED),
        Err(Rejection::ExpiredTimestamp) => Ok(StatusCode::NO_CONTENT),
        Err(rejection @ Rejection::FutureTimestamp) => {
            Err(ApiError::Unprocessable(rejection.to_string()))
        }
    }
}

/// Statistics over the live window
async fn get_statistics(
    State(state): State<AppState>,
) -> Result<Json<StatisticsResponse>, ApiError> {
    let snapshot = state.service.statistics();
    Ok(Json(StatisticsResponse::try_from(&*snapshot)?))
}

/// Delete every transaction
async fn delete_transactions(State(state): State<AppState>) -> StatusCode {
    state.service.delete_transactions();
    StatusCode::NO_CONTENT
}

// ===== Request/Response Types =====

#[derive(Debug, Deserialize)]
pub struct TransactionRequest {
    #[serde(deserialize_with = "string_or_number")]
    pub amount: String,
    #[serde(deserialize_with = "string_or_number")]
    pub timestamp: String,
}

/// Accept a JSON string or number, keeping its textual form.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(text) => text,
        Raw::Number(number) => number.to_string(),
    })
}

/// Decimal fields are JSON numbers written with exactly two fractional digits.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatisticsResponse {
    pub sum: Number,
    pub avg: Number,
    pub max: Number,
    pub min: Number,
    pub count: u64,
}

impl TryFrom<&Statistics> for StatisticsResponse {
    type Error = ApiError;

    fn try_from(stats: &Statistics) -> Result<Self, ApiError> {
        Ok(Self {
            sum: display_number(&stats.sum)?,
            avg: display_number(&stats.avg)?,
            max: display_number(&stats.max)?,
            min: display_number(&stats.min)?,
            count: stats.count,
        })
    }
}

fn display_number(value: &BigDecimal) -> Result<Number, ApiError> {
    let text = to_display(value).to_string();
    Number::from_str(&text)
        .map_err(|e| ApiError::Internal(format!("Cannot encode {text} as a JSON number: {e}")))
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

fn parse_amount(raw: &str) -> Result<BigDecimal, ApiError> {
    models::parse_amount(raw)
        .map_err(|e| ApiError::Unprocessable(format!("Invalid amount {raw}: {e}")))
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, ApiError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|_| ApiError::Unprocessable(format!("Invalid timestamp: {raw}")))
}

// ===== Error Handling =====

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unprocessable(String),
    Internal(String),
}

/// Syntax errors, missing fields and a missing JSON content type are all
/// malformed requests.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unprocessable(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            ApiError::Internal(msg) => {
                error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = Json(json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}
