use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::reference::Currency;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RefundStatus {
    Created,
    InProgress,
    Completed,
    Rejected,
}

impl RefundStatus {
    pub fn as_i16(&self) -> i16 {
        match self {
            RefundStatus::Created => 0,
            RefundStatus::Rejected => 1,
            RefundStatus::InProgress => 2,
            RefundStatus::Completed => 3,
        }
    }

    /// Counts towards the refunded total of its order.
    pub fn is_counted(&self) -> bool {
        !matches!(self, RefundStatus::Rejected)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Refund {
    pub id: Uuid,
    pub order_id: Uuid,
    pub external_id: Option<String>,
    pub amount: Decimal,
    pub currency: Currency,
    pub reason: String,
    pub creator_id: String,
    pub status: RefundStatus,
    /// Gateway-provided explanation for a rejection.
    pub decline_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Refund {
    pub fn new(
        order_id: Uuid,
        amount: Decimal,
        currency: Currency,
        reason: impl Into<String>,
        creator_id: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            order_id,
            external_id: None,
            amount,
            currency,
            reason: reason.into(),
            creator_id: creator_id.into(),
            status: RefundStatus::Created,
            decline_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn set_status(&mut self, status: RefundStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}
