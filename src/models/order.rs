use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use super::reference::{Currency, FixedPackage, PaymentMethodType};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    New,
    PaymentSystemCreate,
    PaymentSystemRejectOnCreate,
    PaymentSystemReject,
    PaymentSystemComplete,
    PaymentSystemCancel,
    ProjectInProgress,
    ProjectComplete,
    ProjectPending,
    ProjectReject,
    Refund,
    Chargeback,
}

impl OrderStatus {
    pub fn as_i16(&self) -> i16 {
        match self {
            OrderStatus::New => 0,
            OrderStatus::PaymentSystemCreate => 1,
            OrderStatus::PaymentSystemRejectOnCreate => 2,
            OrderStatus::PaymentSystemReject => 3,
            OrderStatus::PaymentSystemComplete => 4,
            OrderStatus::ProjectInProgress => 5,
            OrderStatus::ProjectComplete => 6,
            OrderStatus::ProjectPending => 7,
            OrderStatus::ProjectReject => 8,
            OrderStatus::Refund => 9,
            OrderStatus::Chargeback => 10,
            OrderStatus::PaymentSystemCancel => 12,
        }
    }
}

/// Immutable snapshot of the project and merchant taken at order creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectOrder {
    pub id: String,
    pub name: String,
    pub url_success: Option<String>,
    pub url_fail: Option<String>,
    pub merchant: MerchantSnapshot,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerchantSnapshot {
    pub id: String,
    pub name: String,
    pub accounting_currency: Currency,
    pub is_vat_enabled: bool,
    pub is_commission_to_user_enabled: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PayerData {
    pub ip: String,
    pub country: String,
    pub country_name: String,
    pub city: String,
    pub subdivision: Option<String>,
    pub timezone: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderPaymentSystem {
    pub id: String,
    pub name: String,
    pub handler: String,
    pub accounting_currency: Currency,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderPaymentMethod {
    pub id: String,
    pub name: String,
    pub group_alias: String,
    pub external_id: String,
    pub method_type: PaymentMethodType,
    pub payment_system: OrderPaymentSystem,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OrderFee {
    pub amount_payment_method_currency: Decimal,
    pub amount_merchant_currency: Decimal,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OrderFeePsp {
    pub amount_payment_method_currency: Decimal,
    pub amount_merchant_currency: Decimal,
    pub amount_psp_currency: Decimal,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OrderFeePaymentSystem {
    pub amount_payment_method_currency: Decimal,
    pub amount_merchant_currency: Decimal,
    pub amount_payment_system_currency: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub project: ProjectOrder,
    /// Order identifier on the project's side.
    pub project_order_id: Option<String>,
    pub project_account: Option<String>,
    pub description: String,
    pub status: OrderStatus,

    pub project_income_amount: Decimal,
    pub project_income_currency: Currency,
    pub project_outcome_amount: Decimal,
    pub project_outcome_currency: Currency,
    pub payment_method_income_amount: Decimal,
    pub payment_method_income_currency: Currency,
    pub payment_method_outcome_amount: Decimal,
    pub payment_method_outcome_currency: Currency,
    pub amount_in_merchant_accounting_currency: Decimal,

    pub payment_method: Option<OrderPaymentMethod>,
    /// Transaction id assigned by the gateway.
    pub payment_method_order_id: Option<String>,
    pub payment_method_order_closed_at: Option<DateTime<Utc>>,
    pub fixed_package: Option<FixedPackage>,
    pub payer: PayerData,

    pub project_fee_amount: Option<OrderFee>,
    pub psp_fee_amount: Option<OrderFeePsp>,
    pub payment_system_fee_amount: Option<OrderFeePaymentSystem>,
    pub to_payer_fee_amount: Option<OrderFee>,
    pub vat_amount: Option<OrderFee>,

    #[serde(default)]
    pub project_params: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn refund_allowed(&self) -> bool {
        matches!(
            self.status,
            OrderStatus::PaymentSystemComplete
                | OrderStatus::ProjectInProgress
                | OrderStatus::ProjectComplete
                | OrderStatus::ProjectPending
        )
    }

    pub fn can_create_payment(&self) -> bool {
        matches!(
            self.status,
            OrderStatus::New | OrderStatus::PaymentSystemRejectOnCreate
        )
    }

    pub fn set_status(&mut self, status: OrderStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}
