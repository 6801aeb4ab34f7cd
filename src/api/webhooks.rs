use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use tracing::{info, warn};

use crate::api::AppState;
use crate::error::BillingError;

/// Header carrying the hex signature of the raw body
pub const SIGNATURE_HEADER: &str = "signature";

fn signature(headers: &HeaderMap) -> &str {
    headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

/// POST /callback/{handler}/refund
pub async fn handle_refund_callback(
    State(state): State<AppState>,
    Path(handler): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, BillingError> {
    info!(handler = %handler, "Received refund callback");

    let outcome = state
        .billing
        .process_refund_callback(&handler, &body, signature(&headers))
        .await
        .inspect_err(|e| warn!(handler = %handler, error = %e, "Refund callback rejected"))?;

    Ok((StatusCode::OK, Json(serde_json::json!({ "status": outcome }))))
}

/// POST /callback/{handler}/payment
pub async fn handle_payment_callback(
    State(state): State<AppState>,
    Path(handler): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, BillingError> {
    info!(handler = %handler, "Received payment callback");

    let outcome = state
        .billing
        .process_payment_callback(&handler, &body, signature(&headers))
        .await
        .inspect_err(|e| warn!(handler = %handler, error = %e, "Payment callback rejected"))?;

    Ok((StatusCode::OK, Json(serde_json::json!({ "status": outcome }))))
}
