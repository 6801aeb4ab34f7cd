//! Refund creation bounded by the refunded total of the order

use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OwnedMutexGuard;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};
use crate::models::{Order, OrderStatus, Refund, RefundStatus};
use crate::payments::types::RefundCreateRequest as GatewayRefundRequest;
use crate::services::billing::BillingService;
use crate::services::payment_method::resolve_credentials;

#[derive(Debug, Clone)]
pub struct RefundCreateRequest {
    pub order_id: Uuid,
    pub amount: Decimal,
    pub reason: String,
    pub creator_id: String,
}

type OrderLock = Arc<tokio::sync::Mutex<()>>;

/// Per-order admission lock. The refunded total of an order is read and the
/// new refund stored while holding it; the gateway call happens outside.
///
/// Only serializes callers of one process.
#[derive(Default)]
pub struct RefundLocks {
    locks: Mutex<HashMap<Uuid, OrderLock>>,
}

impl RefundLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, order_id: Uuid) -> RefundAdmission<'_> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.entry(order_id).or_default().clone()
        };
        let guard = lock.clone().lock_owned().await;
        RefundAdmission {
            locks: self,
            order_id,
            lock,
            guard: Some(guard),
        }
    }

    /// Orders with a live lock entry
    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct RefundAdmission<'a> {
    locks: &'a RefundLocks,
    order_id: Uuid,
    lock: OrderLock,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for RefundAdmission<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self
            .locks
            .locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // map entry plus ours: nobody else is waiting
        if Arc::strong_count(&self.lock) == 2 {
            locks.remove(&self.order_id);
        }
    }
}

pub struct RefundProcessor<'a> {
    service: &'a BillingService,
}

impl<'a> RefundProcessor<'a> {
    pub fn new(service: &'a BillingService) -> Self {
        Self { service }
    }

    pub async fn create(&self, request: RefundCreateRequest) -> BillingResult<Refund> {
        if request.amount <= Decimal::ZERO {
            return Err(BillingError::RefundAmountInvalid);
        }

        let (order, mut refund) = {
            let _admission = self.service.refund_locks.lock(request.order_id).await;

            let order = self
                .service
                .orders
                .find_by_id(request.order_id)
                .await?
                .ok_or(BillingError::OrderNotFound)?;

            self.check_order(&order, request.amount).await?;

            let refund = Refund::new(
                order.id,
                request.amount,
                order.payment_method_income_currency.clone(),
                request.reason,
                request.creator_id,
            );
            self.service.refunds.insert(&refund).await?;
            (order, refund)
        };
        info!(refund_id = %refund.id, order_id = %order.id, amount = %refund.amount, "Refund created");

        match self.send(&order, &refund).await {
            Ok(external_id) => {
                refund.external_id = Some(external_id);
                refund.set_status(RefundStatus::InProgress);
                self.service.refunds.update(&refund).await?;
                info!(refund_id = %refund.id, order_id = %order.id, "Refund sent to payment system");
                Ok(refund)
            }
            Err(e) => {
                let message = match &e {
                    BillingError::RefundRequestFailed(message) => message.clone(),
                    other => other.to_string(),
                };
                error!(refund_id = %refund.id, order_id = %order.id, error = %message, "Refund request failed");
                refund.decline_reason = Some(message.clone());
                refund.set_status(RefundStatus::Rejected);
                self.service.refunds.update(&refund).await?;
                Err(BillingError::RefundRequestFailed(message))
            }
        }
    }

    async fn check_order(&self, order: &Order, amount: Decimal) -> BillingResult<()> {
        if order.status == OrderStatus::Refund {
            return Err(BillingError::OrderAlreadyRefunded);
        }
        if !order.refund_allowed() {
            return Err(BillingError::RefundNotAllowed);
        }

        let refunded = self.service.refunds.total_refunded(order.id).await?;
        if refunded + amount > order.payment_method_income_amount {
            warn!(
                order_id = %order.id,
                refunded = %refunded,
                requested = %amount,
                "Refund exceeds the remaining payment amount"
            );
            return Err(BillingError::RefundPaymentAmountLess);
        }
        Ok(())
    }

    /// Returns the gateway refund id
    async fn send(&self, order: &Order, refund: &Refund) -> BillingResult<String> {
        let method = order
            .payment_method
            .as_ref()
            .ok_or(BillingError::RefundNotAllowed)?;
        let transaction_id = order
            .payment_method_order_id
            .clone()
            .ok_or(BillingError::RefundNotAllowed)?;

        let snapshot = self.service.cache.snapshot();
        let credentials = resolve_credentials(
            &snapshot,
            &order.project.id,
            &method.id,
            self.service.settings.environment,
        )?;
        let handler = self
            .service
            .handlers
            .get_by_name(&method.payment_system.handler)?;

        let response = handler
            .create_refund(&GatewayRefundRequest {
                refund_id: refund.id,
                order_id: order.id,
                payment_transaction_id: transaction_id,
                amount: refund.amount,
                currency: refund.currency.code_a3.clone(),
                reason: refund.reason.clone(),
                payment_method_external_id: method.external_id.clone(),
                credentials,
            })
            .await?;

        Ok(response.external_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_admission_is_exclusive_per_order() {
        let locks = Arc::new(RefundLocks::new());
        let order_id = Uuid::new_v4();

        let first = locks.lock(order_id).await;
        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _second = locks.lock(order_id).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        let _other_order = locks.lock(Uuid::new_v4()).await;

        drop(first);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn test_released_locks_are_pruned() {
        let locks = RefundLocks::new();
        let order_id = Uuid::new_v4();

        {
            let _admission = locks.lock(order_id).await;
            assert_eq!(locks.len(), 1);
        }
        assert!(locks.is_empty());
    }
}
