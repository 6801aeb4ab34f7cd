use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::AppState;
use crate::error::BillingError;
use crate::middleware::success_response;

#[derive(Debug, Deserialize)]
pub struct CreateRefundBody {
    pub amount: Decimal,
    pub reason: String,
    pub creator_id: String,
}

/// POST /api/orders/{order_id}/refunds
pub async fn create_refund(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(body): Json<CreateRefundBody>,
) -> Result<impl IntoResponse, BillingError> {
    let refund = state
        .billing
        .create_refund(order_id, body.amount, &body.reason, &body.creator_id)
        .await?;
    Ok((StatusCode::CREATED, success_response(refund)))
}
