use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::error::{DatabaseError, DatabaseErrorKind};
use crate::database::repository::RefundRepository;
use crate::models::{Refund, RefundStatus};

pub struct PgRefundRepository {
    pool: PgPool,
}

impl PgRefundRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RefundRepository for PgRefundRepository {
    async fn insert(&self, refund: &Refund) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO refunds (id, order_id, external_id, amount, status, document, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(refund.id)
        .bind(refund.order_id)
        .bind(&refund.external_id)
        .bind(refund.amount)
        .bind(refund.status.as_i16())
        .bind(Json(refund))
        .bind(refund.created_at)
        .bind(refund.updated_at)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(())
    }

    async fn update(&self, refund: &Refund) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            "UPDATE refunds
             SET external_id = $2, status = $3, document = $4, updated_at = $5
             WHERE id = $1",
        )
        .bind(refund.id)
        .bind(&refund.external_id)
        .bind(refund.status.as_i16())
        .bind(Json(refund))
        .bind(refund.updated_at)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::new(DatabaseErrorKind::NotFound {
                entity: "Refund".to_string(),
                id: refund.id.to_string(),
            }));
        }
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Refund>, DatabaseError> {
        let row = sqlx::query_as::<_, (Json<Refund>,)>("SELECT document FROM refunds WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        Ok(row.map(|(Json(refund),)| refund))
    }

    async fn find_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<Refund>, DatabaseError> {
        let row = sqlx::query_as::<_, (Json<Refund>,)>(
            "SELECT document FROM refunds WHERE external_id = $1",
        )
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(row.map(|(Json(refund),)| refund))
    }

    async fn find_by_order_id(&self, order_id: Uuid) -> Result<Vec<Refund>, DatabaseError> {
        let rows = sqlx::query_as::<_, (Json<Refund>,)>(
            "SELECT document FROM refunds WHERE order_id = $1 ORDER BY created_at ASC",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(rows.into_iter().map(|(Json(refund),)| refund).collect())
    }

    async fn total_refunded(&self, order_id: Uuid) -> Result<Decimal, DatabaseError> {
        sqlx::query_scalar::<_, Decimal>(
            "SELECT COALESCE(SUM(amount), 0) FROM refunds WHERE order_id = $1 AND status <> $2",
        )
        .bind(order_id)
        .bind(RefundStatus::Rejected.as_i16())
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn total_completed(&self, order_id: Uuid) -> Result<Decimal, DatabaseError> {
        sqlx::query_scalar::<_, Decimal>(
            "SELECT COALESCE(SUM(amount), 0) FROM refunds WHERE order_id = $1 AND status = $2",
        )
        .bind(order_id)
        .bind(RefundStatus::Completed.as_i16())
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }
}
