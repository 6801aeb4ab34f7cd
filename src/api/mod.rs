//! HTTP surface of the billing engine

pub mod orders;
pub mod refunds;
pub mod webhooks;

use axum::{
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::services::BillingService;

#[derive(Clone)]
pub struct AppState {
    pub billing: Arc<BillingService>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/orders", post(orders::create_order_json))
        .route("/api/orders/form", post(orders::create_order_form))
        .route(
            "/api/orders/{order_id}/payment-methods",
            get(orders::payment_form_methods),
        )
        .route("/api/payments", post(orders::create_payment))
        .route("/api/system-fees", get(orders::system_fees))
        .route("/api/orders/{order_id}/refunds", post(refunds::create_refund))
        .route(
            "/callback/{handler}/refund",
            post(webhooks::handle_refund_callback),
        )
        .route(
            "/callback/{handler}/payment",
            post(webhooks::handle_payment_callback),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
