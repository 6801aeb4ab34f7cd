//! Billing operations exposed to the transport layer

use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::cache::ReferenceCache;
use crate::config::BillingConfig;
use crate::database::{OrderRepository, RefundRepository};
use crate::error::BillingResult;
use crate::models::{Order, Refund, SystemFees};
use crate::payments::HandlerRegistry;
use crate::services::callback::{CallbackOutcome, CallbackProcessor};
use crate::services::geo::GeoLookup;
use crate::services::order_processor::{OrderCreateRequest, OrderCreateRequestProcessor};
use crate::services::payment::{
    PaymentCreateProcessor, PaymentFormMethod, PaymentFormMethods, PaymentFormRequest,
};
use crate::services::refund::{RefundCreateRequest, RefundLocks, RefundProcessor};
use crate::services::saved_cards::SavedCardLookup;

/// Everything the billing operations depend on, built once per process
pub struct BillingService {
    pub(crate) cache: Arc<ReferenceCache>,
    pub(crate) orders: Arc<dyn OrderRepository>,
    pub(crate) refunds: Arc<dyn RefundRepository>,
    pub(crate) geo: Arc<dyn GeoLookup>,
    pub(crate) saved_cards: Arc<dyn SavedCardLookup>,
    pub(crate) handlers: HandlerRegistry,
    pub(crate) settings: BillingConfig,
    pub(crate) refund_locks: RefundLocks,
}

impl BillingService {
    pub fn new(
        cache: Arc<ReferenceCache>,
        orders: Arc<dyn OrderRepository>,
        refunds: Arc<dyn RefundRepository>,
        geo: Arc<dyn GeoLookup>,
        saved_cards: Arc<dyn SavedCardLookup>,
        handlers: HandlerRegistry,
        settings: BillingConfig,
    ) -> Self {
        Self {
            cache,
            orders,
            refunds,
            geo,
            saved_cards,
            handlers,
            settings,
            refund_locks: RefundLocks::new(),
        }
    }

    pub fn settings(&self) -> &BillingConfig {
        &self.settings
    }

    pub fn cache(&self) -> &Arc<ReferenceCache> {
        &self.cache
    }

    pub async fn create_order(&self, request: OrderCreateRequest) -> BillingResult<Order> {
        let order = OrderCreateRequestProcessor::new(self, request)
            .process()
            .await?;
        info!(order_id = %order.id, project_id = %order.project.id, "Order created");
        Ok(order)
    }

    /// Returns the gateway redirect URL for the payer
    pub async fn create_payment(&self, request: PaymentFormRequest) -> BillingResult<String> {
        PaymentCreateProcessor::new(self).process(request).await
    }

    pub async fn payment_form_methods(
        &self,
        order_id: Uuid,
        customer_token: Option<&str>,
    ) -> BillingResult<Vec<PaymentFormMethod>> {
        PaymentFormMethods::new(self).list(order_id, customer_token).await
    }

    pub async fn create_refund(
        &self,
        order_id: Uuid,
        amount: Decimal,
        reason: &str,
        creator_id: &str,
    ) -> BillingResult<Refund> {
        RefundProcessor::new(self)
            .create(RefundCreateRequest {
                order_id,
                amount,
                reason: reason.to_string(),
                creator_id: creator_id.to_string(),
            })
            .await
    }

    pub async fn process_refund_callback(
        &self,
        handler_name: &str,
        raw_body: &[u8],
        signature: &str,
    ) -> BillingResult<CallbackOutcome> {
        CallbackProcessor::new(self)
            .process_refund(handler_name, raw_body, signature)
            .await
    }

    pub async fn process_payment_callback(
        &self,
        handler_name: &str,
        raw_body: &[u8],
        signature: &str,
    ) -> BillingResult<CallbackOutcome> {
        CallbackProcessor::new(self)
            .process_payment(handler_name, raw_body, signature)
            .await
    }

    /// Latest system-fee record for a payment method, payer region and card brand
    pub fn system_fees(
        &self,
        payment_method_id: &str,
        region: &str,
        card_brand: Option<&str>,
    ) -> BillingResult<SystemFees> {
        let snapshot = self.cache.snapshot();
        Ok(snapshot
            .system_fees(payment_method_id, region, card_brand)?
            .clone())
    }
}
