//! Order creation and payment form endpoints

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Form, Json,
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::api::AppState;
use crate::error::BillingError;
use crate::middleware::success_response;
use crate::services::{OrderCreateRequest, PaymentFormRequest};

/// POST /api/orders with a JSON body, signed over the raw bytes
pub async fn create_order_json(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<impl IntoResponse, BillingError> {
    let request = OrderCreateRequest::from_json(&body)?;
    let order = state.billing.create_order(request).await?;
    Ok((StatusCode::CREATED, success_response(order)))
}

/// POST /api/orders/form with a url-encoded body, signed over the sorted pairs
pub async fn create_order_form(
    State(state): State<AppState>,
    Form(pairs): Form<Vec<(String, String)>>,
) -> Result<impl IntoResponse, BillingError> {
    let request = OrderCreateRequest::from_form(pairs)?;
    let order = state.billing.create_order(request).await?;
    Ok((StatusCode::CREATED, success_response(order)))
}

#[derive(Debug, Deserialize)]
pub struct PaymentMethodsQuery {
    pub customer_token: Option<String>,
}

/// GET /api/orders/{order_id}/payment-methods
pub async fn payment_form_methods(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Query(query): Query<PaymentMethodsQuery>,
) -> Result<impl IntoResponse, BillingError> {
    let methods = state
        .billing
        .payment_form_methods(order_id, query.customer_token.as_deref())
        .await?;
    Ok(success_response(methods))
}

/// POST /api/payments
pub async fn create_payment(
    State(state): State<AppState>,
    Json(request): Json<PaymentFormRequest>,
) -> Result<impl IntoResponse, BillingError> {
    let order_id = request.order_id;
    let redirect_url = state.billing.create_payment(request).await?;
    info!(order_id = %order_id, "Payer redirected to payment system");
    Ok(success_response(serde_json::json!({ "redirect_url": redirect_url })))
}

#[derive(Debug, Deserialize)]
pub struct SystemFeesQuery {
    pub payment_method: String,
    pub region: String,
    pub card_brand: Option<String>,
}

/// GET /api/system-fees
pub async fn system_fees(
    State(state): State<AppState>,
    Query(query): Query<SystemFeesQuery>,
) -> Result<impl IntoResponse, BillingError> {
    let fees = state.billing.system_fees(
        &query.payment_method,
        &query.region,
        query.card_brand.as_deref(),
    )?;
    Ok(success_response(fees))
}
