//! In-process order and refund store
//!
//! Same semantics as the Postgres repositories, including the
//! `(project_id, project_order_id)` uniqueness, for local runs and tests.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use uuid::Uuid;

use crate::database::error::{DatabaseError, DatabaseErrorKind};
use crate::database::repository::{
    OrderRepository, RefundRepository, ORDERS_PROJECT_ORDER_ID_KEY,
};
use crate::models::{Order, Refund, RefundStatus};

#[derive(Default)]
pub struct InMemoryOrderRepository {
    orders: Mutex<HashMap<Uuid, Order>>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.orders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn not_found(entity: &str, id: Uuid) -> DatabaseError {
    DatabaseError::new(DatabaseErrorKind::NotFound {
        entity: entity.to_string(),
        id: id.to_string(),
    })
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn insert(&self, order: &Order) -> Result<(), DatabaseError> {
        let mut orders = self.orders.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(project_order_id) = &order.project_order_id {
            let duplicate = orders.values().any(|existing| {
                existing.project.id == order.project.id
                    && existing.project_order_id.as_deref() == Some(project_order_id.as_str())
            });
            if duplicate {
                return Err(DatabaseError::new(DatabaseErrorKind::UniqueViolation {
                    constraint: ORDERS_PROJECT_ORDER_ID_KEY.to_string(),
                }));
            }
        }
        if orders.contains_key(&order.id) {
            return Err(DatabaseError::new(DatabaseErrorKind::UniqueViolation {
                constraint: "orders_pkey".to_string(),
            }));
        }

        orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn update(&self, order: &Order) -> Result<(), DatabaseError> {
        let mut orders = self.orders.lock().unwrap_or_else(PoisonError::into_inner);
        match orders.get_mut(&order.id) {
            Some(existing) => {
                *existing = order.clone();
                Ok(())
            }
            None => Err(not_found("Order", order.id)),
        }
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Order>, DatabaseError> {
        let orders = self.orders.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(orders.get(&id).cloned())
    }

    async fn find_by_project_order_id(
        &self,
        project_id: &str,
        project_order_id: &str,
    ) -> Result<Option<Order>, DatabaseError> {
        let orders = self.orders.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(orders
            .values()
            .find(|o| {
                o.project.id == project_id && o.project_order_id.as_deref() == Some(project_order_id)
            })
            .cloned())
    }
}

#[derive(Default)]
pub struct InMemoryRefundRepository {
    refunds: Mutex<HashMap<Uuid, Refund>>,
}

impl InMemoryRefundRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn sum_where(&self, order_id: Uuid, pred: impl Fn(RefundStatus) -> bool) -> Decimal {
        let refunds = self.refunds.lock().unwrap_or_else(PoisonError::into_inner);
        refunds
            .values()
            .filter(|r| r.order_id == order_id && pred(r.status))
            .map(|r| r.amount)
            .sum()
    }
}

#[async_trait]
impl RefundRepository for InMemoryRefundRepository {
    async fn insert(&self, refund: &Refund) -> Result<(), DatabaseError> {
        let mut refunds = self.refunds.lock().unwrap_or_else(PoisonError::into_inner);
        if refunds.contains_key(&refund.id) {
            return Err(DatabaseError::new(DatabaseErrorKind::UniqueViolation {
                constraint: "refunds_pkey".to_string(),
            }));
        }
        refunds.insert(refund.id, refund.clone());
        Ok(())
    }

    async fn update(&self, refund: &Refund) -> Result<(), DatabaseError> {
        let mut refunds = self.refunds.lock().unwrap_or_else(PoisonError::into_inner);
        match refunds.get_mut(&refund.id) {
            Some(existing) => {
                *existing = refund.clone();
                Ok(())
            }
            None => Err(not_found("Refund", refund.id)),
        }
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Refund>, DatabaseError> {
        let refunds = self.refunds.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(refunds.get(&id).cloned())
    }

    async fn find_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<Refund>, DatabaseError> {
        let refunds = self.refunds.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(refunds
            .values()
            .find(|r| r.external_id.as_deref() == Some(external_id))
            .cloned())
    }

    async fn find_by_order_id(&self, order_id: Uuid) -> Result<Vec<Refund>, DatabaseError> {
        let refunds = self.refunds.lock().unwrap_or_else(PoisonError::into_inner);
        let mut found: Vec<Refund> = refunds
            .values()
            .filter(|r| r.order_id == order_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(found)
    }

    async fn total_refunded(&self, order_id: Uuid) -> Result<Decimal, DatabaseError> {
        Ok(self.sum_where(order_id, |status| status.is_counted()))
    }

    async fn total_completed(&self, order_id: Uuid) -> Result<Decimal, DatabaseError> {
        Ok(self.sum_where(order_id, |status| status == RefundStatus::Completed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Currency;
    use rust_decimal_macros::dec;

    fn rub() -> Currency {
        Currency {
            code_int: 643,
            code_a3: "RUB".to_string(),
            name: "Russian ruble".to_string(),
            is_active: true,
        }
    }

    #[tokio::test]
    async fn test_rejected_refunds_do_not_count() {
        let repo = InMemoryRefundRepository::new();
        let order_id = Uuid::new_v4();

        let first = Refund::new(order_id, dec!(10), rub(), "duplicate", "support");
        let mut second = Refund::new(order_id, dec!(5), rub(), "duplicate", "support");
        second.set_status(RefundStatus::Rejected);
        let mut third = Refund::new(order_id, dec!(2.5), rub(), "partial", "support");
        third.set_status(RefundStatus::Completed);

        repo.insert(&first).await.unwrap();
        repo.insert(&second).await.unwrap();
        repo.insert(&third).await.unwrap();

        assert_eq!(repo.total_refunded(order_id).await.unwrap(), dec!(12.5));
        assert_eq!(repo.total_completed(order_id).await.unwrap(), dec!(2.5));
        assert_eq!(repo.total_refunded(Uuid::new_v4()).await.unwrap(), dec!(0));
    }

    #[tokio::test]
    async fn test_update_of_unknown_refund_is_not_found() {
        let repo = InMemoryRefundRepository::new();
        let refund = Refund::new(Uuid::new_v4(), dec!(1), rub(), "r", "c");
        let err = repo.update(&refund).await.unwrap_err();
        assert!(err.is_not_found());
    }
}
