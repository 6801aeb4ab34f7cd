//! Reconciliation of payment-system notifications against stored state
//!
//! Nothing is written before the signature has been verified with the
//! callback password of the order's payment method.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};
use crate::models::{Order, OrderStatus, Refund, RefundStatus};
use crate::payments::provider::PaymentSystemHandler;
use crate::payments::types::{CallbackKind, GatewayCallback, GatewayStatus};
use crate::services::billing::BillingService;
use crate::services::payment_method::resolve_credentials;

/// Acknowledgement returned to the payment system
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CallbackOutcome {
    Processed,
    /// Intermediate status; the stored state was left as is
    TemporarilySkipped,
}

pub struct CallbackProcessor<'a> {
    service: &'a BillingService,
}

impl<'a> CallbackProcessor<'a> {
    pub fn new(service: &'a BillingService) -> Self {
        Self { service }
    }

    pub async fn process_refund(
        &self,
        handler_name: &str,
        raw_body: &[u8],
        signature: &str,
    ) -> BillingResult<CallbackOutcome> {
        let (handler, callback) = self.parse(handler_name, raw_body, CallbackKind::Refund)?;

        let external_id = callback
            .refund_id
            .as_deref()
            .ok_or(BillingError::CallbackRequestIncorrect)?;
        let mut refund = self
            .service
            .refunds
            .find_by_external_id(external_id)
            .await?
            .ok_or(BillingError::RefundNotFound)?;

        let merchant_order_id = Uuid::parse_str(callback.merchant_order_id.trim()).ok();
        if merchant_order_id != Some(refund.order_id) {
            warn!(refund_id = %refund.id, merchant_order_id = %callback.merchant_order_id, "Refund callback points to another order");
            return Err(BillingError::OrderNotFound);
        }

        let mut order = self
            .service
            .orders
            .find_by_id(refund.order_id)
            .await?
            .ok_or(BillingError::OrderNotFound)?;
        if let Some(payment_id) = callback.payment_id.as_deref() {
            if order.payment_method_order_id.as_deref() != Some(payment_id) {
                warn!(refund_id = %refund.id, order_id = %order.id, "Refund callback points to another payment");
                return Err(BillingError::OrderNotFound);
            }
        }

        self.verify(handler.as_ref(), &order, raw_body, signature)?;

        if callback.amount != refund.amount
            || !callback.currency.eq_ignore_ascii_case(&refund.currency.code_a3)
        {
            return Err(BillingError::RequestAmountOrCurrencyIsInvalid);
        }

        if callback.status.is_temporary() {
            info!(refund_id = %refund.id, status = ?callback.status, "Refund callback temporarily skipped");
            return Ok(CallbackOutcome::TemporarilySkipped);
        }

        if refund.status == RefundStatus::Completed || refund.status == RefundStatus::Rejected {
            info!(refund_id = %refund.id, status = ?refund.status, "Refund already final");
            return Ok(CallbackOutcome::Processed);
        }

        self.finish_refund(&mut refund, &mut order, &callback).await?;
        Ok(CallbackOutcome::Processed)
    }

    async fn finish_refund(
        &self,
        refund: &mut Refund,
        order: &mut Order,
        callback: &GatewayCallback,
    ) -> BillingResult<()> {
        match callback.status {
            GatewayStatus::Completed => {
                refund.set_status(RefundStatus::Completed);
                self.service.refunds.update(refund).await?;

                let completed = self.service.refunds.total_completed(order.id).await?;
                if completed >= order.payment_method_income_amount {
                    order.set_status(OrderStatus::Refund);
                    self.service.orders.update(order).await?;
                    info!(order_id = %order.id, "Order fully refunded");
                }
            }
            _ => {
                refund.decline_reason = callback.decline_reason.clone();
                refund.set_status(RefundStatus::Rejected);
                self.service.refunds.update(refund).await?;
            }
        }

        info!(refund_id = %refund.id, order_id = %order.id, status = ?refund.status, "Refund callback processed");
        Ok(())
    }

    pub async fn process_payment(
        &self,
        handler_name: &str,
        raw_body: &[u8],
        signature: &str,
    ) -> BillingResult<CallbackOutcome> {
        let (handler, callback) = self.parse(handler_name, raw_body, CallbackKind::Payment)?;

        let order_id = Uuid::parse_str(callback.merchant_order_id.trim())
            .map_err(|_| BillingError::OrderNotFound)?;
        let mut order = self
            .service
            .orders
            .find_by_id(order_id)
            .await?
            .ok_or(BillingError::OrderNotFound)?;

        self.verify(handler.as_ref(), &order, raw_body, signature)?;

        if order.status != OrderStatus::PaymentSystemCreate {
            return Err(BillingError::OrderAlreadyProcessed);
        }

        if callback.amount != order.payment_method_outcome_amount
            || !callback
                .currency
                .eq_ignore_ascii_case(&order.payment_method_outcome_currency.code_a3)
        {
            return Err(BillingError::RequestAmountOrCurrencyIsInvalid);
        }

        let status = match callback.status {
            GatewayStatus::Completed => OrderStatus::PaymentSystemComplete,
            GatewayStatus::Declined => OrderStatus::PaymentSystemReject,
            GatewayStatus::Cancelled => OrderStatus::PaymentSystemCancel,
            temporary => {
                info!(order_id = %order.id, status = ?temporary, "Payment callback temporarily skipped");
                return Ok(CallbackOutcome::TemporarilySkipped);
            }
        };

        order.payment_method_order_id = callback.payment_id.clone();
        order.payment_method_order_closed_at = Some(Utc::now());
        order.set_status(status);
        self.service.orders.update(&order).await?;

        info!(order_id = %order.id, status = ?order.status, "Payment callback processed");
        Ok(CallbackOutcome::Processed)
    }

    fn parse(
        &self,
        handler_name: &str,
        raw_body: &[u8],
        expected: CallbackKind,
    ) -> BillingResult<(Arc<dyn PaymentSystemHandler>, GatewayCallback)> {
        let handler = self.service.handlers.get_by_name(handler_name)?;
        let callback = handler.parse_callback(raw_body)?;
        if callback.kind != expected {
            return Err(BillingError::CallbackRequestIncorrect);
        }
        Ok((handler, callback))
    }

    fn verify(
        &self,
        handler: &dyn PaymentSystemHandler,
        order: &Order,
        raw_body: &[u8],
        signature: &str,
    ) -> BillingResult<()> {
        let method = order
            .payment_method
            .as_ref()
            .ok_or(BillingError::CallbackRequestIncorrect)?;
        let snapshot = self.service.cache.snapshot();
        let credentials = resolve_credentials(
            &snapshot,
            &order.project.id,
            &method.id,
            self.service.settings.environment,
        )?;

        handler
            .verify_callback(raw_body, signature, &credentials.callback_password)
            .map_err(|e| {
                warn!(order_id = %order.id, handler = %handler.name(), "Callback signature rejected");
                BillingError::from(e)
            })
    }
}
