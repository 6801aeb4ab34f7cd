//! Storage seams for the documents the engine writes

use async_trait::async_trait;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::database::error::DatabaseError;
use crate::models::{Order, Refund};

/// Unique index over `(project_id, project_order_id)`
pub const ORDERS_PROJECT_ORDER_ID_KEY: &str = "orders_project_order_id_key";

/// Persistent store for orders.
///
/// `(project.id, project_order_id)` is unique among orders carrying a project order
/// id; `insert` reports a violation of [`ORDERS_PROJECT_ORDER_ID_KEY`] through
/// [`DatabaseError::violates`].
#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn insert(&self, order: &Order) -> Result<(), DatabaseError>;

    async fn update(&self, order: &Order) -> Result<(), DatabaseError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Order>, DatabaseError>;

    async fn find_by_project_order_id(
        &self,
        project_id: &str,
        project_order_id: &str,
    ) -> Result<Option<Order>, DatabaseError>;
}

/// Persistent store for refunds
#[async_trait]
pub trait RefundRepository: Send + Sync {
    async fn insert(&self, refund: &Refund) -> Result<(), DatabaseError>;

    async fn update(&self, refund: &Refund) -> Result<(), DatabaseError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Refund>, DatabaseError>;

    async fn find_by_external_id(&self, external_id: &str)
        -> Result<Option<Refund>, DatabaseError>;

    async fn find_by_order_id(&self, order_id: Uuid) -> Result<Vec<Refund>, DatabaseError>;

    /// Sum of every refund of the order that was not rejected
    async fn total_refunded(&self, order_id: Uuid) -> Result<Decimal, DatabaseError>;

    /// Sum of the completed refunds of the order
    async fn total_completed(&self, order_id: Uuid) -> Result<Decimal, DatabaseError>;
}
