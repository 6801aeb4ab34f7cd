use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::error::{DatabaseError, DatabaseErrorKind};
use crate::database::repository::OrderRepository;
use crate::models::Order;

/// Orders stored as JSONB documents with the lookup columns broken out
pub struct PgOrderRepository {
    pool: PgPool,
}

impl PgOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderRepository for PgOrderRepository {
    async fn insert(&self, order: &Order) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO orders (id, project_id, project_order_id, status, document, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(order.id)
        .bind(&order.project.id)
        .bind(&order.project_order_id)
        .bind(order.status.as_i16())
        .bind(Json(order))
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(())
    }

    async fn update(&self, order: &Order) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            "UPDATE orders
             SET status = $2, document = $3, updated_at = $4
             WHERE id = $1",
        )
        .bind(order.id)
        .bind(order.status.as_i16())
        .bind(Json(order))
        .bind(order.updated_at)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::new(DatabaseErrorKind::NotFound {
                entity: "Order".to_string(),
                id: order.id.to_string(),
            }));
        }
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Order>, DatabaseError> {
        let row = sqlx::query_as::<_, (Json<Order>,)>("SELECT document FROM orders WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        Ok(row.map(|(Json(order),)| order))
    }

    async fn find_by_project_order_id(
        &self,
        project_id: &str,
        project_order_id: &str,
    ) -> Result<Option<Order>, DatabaseError> {
        let row = sqlx::query_as::<_, (Json<Order>,)>(
            "SELECT document FROM orders WHERE project_id = $1 AND project_order_id = $2",
        )
        .bind(project_id)
        .bind(project_order_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(row.map(|(Json(order),)| order))
    }
}
