//! Reference-data records served by the reference cache.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Currency {
    pub code_int: i32,
    pub code_a3: String,
    pub name: String,
    pub is_active: bool,
}

/// Directed rate edge. The source amount is divided by `rate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrencyRate {
    pub currency_from: i32,
    pub currency_to: i32,
    pub rate: Decimal,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Country {
    pub code_a2: String,
    pub code_int: i32,
    pub name: String,
    /// VAT rates for this country differ per subdivision (state, province).
    pub vat_by_subdivision: bool,
    pub is_active: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethodType {
    BankCard,
    Ewallet,
    Crypto,
}

/// Terminal credentials for the payment gateway.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TerminalCredentials {
    pub terminal: String,
    pub password: String,
    pub callback_password: String,
}

impl TerminalCredentials {
    pub fn is_complete(&self) -> bool {
        !self.terminal.trim().is_empty() && !self.password.trim().is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentMethod {
    pub id: String,
    pub name: String,
    pub group_alias: String,
    /// Identifier of the method on the gateway side, e.g. `BANKCARD`.
    pub external_id: String,
    pub method_type: PaymentMethodType,
    pub currencies: Vec<i32>,
    pub min_payment_amount: Decimal,
    /// Zero means no upper bound.
    pub max_payment_amount: Decimal,
    pub payment_system_id: String,
    /// Credentials used outside of production.
    pub test_settings: TerminalCredentials,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentSystem {
    pub id: String,
    pub name: String,
    /// Name of the gateway handler, e.g. `cardpay`.
    pub handler: String,
    pub accounting_currency: i32,
    pub is_active: bool,
}

/// Per project+payment-method commission percentages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Commission {
    pub project_id: String,
    pub payment_method_id: String,
    pub payment_method_commission: Decimal,
    pub psp_commission: Decimal,
    pub total_commission_to_user: Decimal,
    pub start_date: DateTime<Utc>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vat {
    pub country: String,
    pub subdivision: Option<String>,
    /// Percentage.
    pub vat: Decimal,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemFees {
    pub payment_method_id: String,
    pub region: String,
    pub card_brand: Option<String>,
    pub percent_fee: Decimal,
    pub fixed_fee: Decimal,
    pub fixed_fee_currency: i32,
    pub start_date: DateTime<Utc>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixedPackage {
    pub id: String,
    pub name: String,
    pub currency: String,
    pub price: Decimal,
    pub is_active: bool,
}

/// Per-project settings for one payment method group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectPaymentMethod {
    pub id: String,
    pub credentials: TerminalCredentials,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Merchant {
    pub id: String,
    pub name: String,
    /// Accounting (payout) currency, numeric code.
    pub currency: i32,
    pub is_vat_enabled: bool,
    pub is_commission_to_user_enabled: bool,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub merchant_id: String,
    pub name: String,
    pub secret_key: String,
    pub is_active: bool,
    pub signature_required: bool,
    pub only_fixed_amounts: bool,
    /// Currency in which `min_payment_amount`/`max_payment_amount` are expressed.
    pub limits_currency: Option<i32>,
    pub min_payment_amount: Decimal,
    /// Zero means no upper bound.
    pub max_payment_amount: Decimal,
    pub url_success: Option<String>,
    pub url_fail: Option<String>,
    /// Packages keyed by region (country code).
    #[serde(default)]
    pub fixed_packages: HashMap<String, Vec<FixedPackage>>,
    /// Production settings keyed by payment method group alias.
    #[serde(default)]
    pub payment_methods: HashMap<String, ProjectPaymentMethod>,
}
