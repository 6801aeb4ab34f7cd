//! Order creation pipeline
//!
//! [`OrderCreateRequestProcessor`] runs ordered, partly conditional steps over
//! a request and accumulates what each step resolved in [`OrderCreateChecked`].
//! Later steps read what earlier ones resolved, so the order is fixed:
//!
//! 1. project, 2. signature, 3. payer location, 4. currency, 5. fixed package,
//! 6. currency presence, 7. project order id, 8. payment method, 9. limits,
//! 10. order assembly, commissions and insert.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use sha2::{Digest, Sha512};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::cache::ReferenceSnapshot;
use crate::database::ORDERS_PROJECT_ORDER_ID_KEY;
use crate::error::{BillingError, BillingResult};
use crate::models::{
    Currency, FixedPackage, Merchant, MerchantSnapshot, Order, OrderStatus, PayerData, Project,
    ProjectOrder,
};
use crate::money::format_amount;
use crate::payments::utils::secure_eq;
use crate::services::billing::BillingService;
use crate::services::commission::CommissionEngine;
use crate::services::currency_converter::CurrencyConverter;
use crate::services::geo::locate_payer;
use crate::services::payment_method::{resolve_by_group, ResolvedPaymentMethod};

const SIGNATURE_FIELD: &str = "signature";

/// How the request reached us; signatures are computed over this
#[derive(Debug, Clone, Default)]
pub enum RequestSource {
    /// Built in-process, nothing to verify a signature against
    #[default]
    Internal,
    /// `application/x-www-form-urlencoded` pairs as submitted
    Form(Vec<(String, String)>),
    /// Raw JSON body as submitted
    Json(Vec<u8>),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderCreateRequest {
    #[serde(rename = "project")]
    pub project_id: String,
    pub signature: Option<String>,
    pub amount: Decimal,
    /// Alphabetic currency code
    pub currency: Option<String>,
    pub account: Option<String>,
    /// Order identifier on the project's side
    pub order_id: Option<String>,
    pub description: Option<String>,
    /// Payment method group alias
    pub payment_method: Option<String>,
    pub region: Option<String>,
    #[serde(default)]
    pub payer_ip: String,
    pub payer_email: Option<String>,
    pub payer_phone: Option<String>,
    pub url_success: Option<String>,
    pub url_fail: Option<String>,
    /// Project-defined extra parameters, stored on the order as is
    #[serde(default)]
    pub other: HashMap<String, String>,
    #[serde(skip)]
    pub source: RequestSource,
}

impl OrderCreateRequest {
    pub fn from_json(body: &[u8]) -> BillingResult<Self> {
        let mut request: OrderCreateRequest = serde_json::from_slice(body)
            .map_err(|e| BillingError::RequestInvalid(e.to_string()))?;
        request.source = RequestSource::Json(body.to_vec());
        Ok(request)
    }

    pub fn from_form(pairs: Vec<(String, String)>) -> BillingResult<Self> {
        let mut request = OrderCreateRequest::default();
        let non_empty = |v: &str| Some(v.to_string()).filter(|v| !v.trim().is_empty());

        for (key, value) in &pairs {
            match key.as_str() {
                "project" => request.project_id = value.clone(),
                SIGNATURE_FIELD => request.signature = non_empty(value),
                "amount" => {
                    request.amount = Decimal::from_str(value.trim())
                        .map_err(|_| BillingError::RequestInvalid(format!("amount: {}", value)))?
                }
                "currency" => request.currency = non_empty(value),
                "account" => request.account = non_empty(value),
                "order_id" => request.order_id = non_empty(value),
                "description" => request.description = non_empty(value),
                "payment_method" => request.payment_method = non_empty(value),
                "region" => request.region = non_empty(value),
                "payer_ip" => request.payer_ip = value.clone(),
                "payer_email" => request.payer_email = non_empty(value),
                "payer_phone" => request.payer_phone = non_empty(value),
                "url_success" => request.url_success = non_empty(value),
                "url_fail" => request.url_fail = non_empty(value),
                _ => {
                    request.other.insert(key.clone(), value.clone());
                }
            }
        }

        request.source = RequestSource::Form(pairs);
        Ok(request)
    }
}

/// SHA-512 hex of the form pairs sorted by key and concatenated as `key=value`
/// with no separator, followed by the project secret. The signature pair
/// itself is excluded.
pub fn form_signature(pairs: &[(String, String)], secret: &str) -> String {
    let mut sorted: Vec<&(String, String)> =
        pairs.iter().filter(|(k, _)| k != SIGNATURE_FIELD).collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));

    let mut hasher = Sha512::new();
    for (key, value) in sorted {
        hasher.update(key.as_bytes());
        hasher.update(b"=");
        hasher.update(value.as_bytes());
    }
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// SHA-512 hex of the raw body followed by the project secret
pub fn json_signature(body: &[u8], secret: &str) -> String {
    let mut hasher = Sha512::new();
    hasher.update(body);
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// What the steps resolved so far
#[derive(Debug, Default)]
pub struct OrderCreateChecked {
    pub project: Option<Project>,
    pub merchant: Option<Merchant>,
    pub payer: Option<PayerData>,
    pub currency: Option<Currency>,
    pub fixed_package: Option<FixedPackage>,
    pub payment_method: Option<ResolvedPaymentMethod>,
}

pub struct OrderCreateRequestProcessor<'a> {
    service: &'a BillingService,
    snapshot: Arc<ReferenceSnapshot>,
    request: OrderCreateRequest,
    checked: OrderCreateChecked,
}

impl<'a> OrderCreateRequestProcessor<'a> {
    pub fn new(service: &'a BillingService, request: OrderCreateRequest) -> Self {
        Self {
            snapshot: service.cache.snapshot(),
            service,
            request,
            checked: OrderCreateChecked::default(),
        }
    }

    pub async fn process(mut self) -> BillingResult<Order> {
        self.process_project()?;

        if self.request.signature.is_some() || self.project()?.signature_required {
            self.process_signature()?;
        }

        self.process_payer_data().await?;

        if self.request.currency.is_some() {
            self.process_currency()?;
        }

        if self.project()?.only_fixed_amounts {
            self.process_fixed_package()?;
        }

        if self.checked.currency.is_none() {
            return Err(BillingError::CurrencyIsRequired);
        }

        if self.request.order_id.is_some() {
            self.process_project_order_id().await?;
        }

        if self.request.payment_method.is_some() {
            self.process_payment_method()?;
        }

        self.process_limit_amounts()?;

        let order = self.prepare_order()?;
        self.insert_order(&order).await?;
        Ok(order)
    }

    fn project(&self) -> BillingResult<&Project> {
        self.checked
            .project
            .as_ref()
            .ok_or_else(|| BillingError::Internal("project is not resolved".to_string()))
    }

    fn currency(&self) -> BillingResult<&Currency> {
        self.checked
            .currency
            .as_ref()
            .ok_or(BillingError::CurrencyIsRequired)
    }

    fn process_project(&mut self) -> BillingResult<()> {
        let project = self.snapshot.project(&self.request.project_id)?;
        if !project.is_active {
            return Err(BillingError::ProjectInactive);
        }

        let merchant = self.snapshot.merchant(&project.merchant_id)?;
        if !merchant.is_active {
            return Err(BillingError::ProjectInactive);
        }

        self.checked.project = Some(project.clone());
        self.checked.merchant = Some(merchant.clone());
        Ok(())
    }

    fn process_signature(&self) -> BillingResult<()> {
        let project = self.project()?;
        let supplied = self
            .request
            .signature
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(BillingError::SignatureInvalid)?;

        let expected = match &self.request.source {
            RequestSource::Form(pairs) => form_signature(pairs, &project.secret_key),
            RequestSource::Json(body) => json_signature(body, &project.secret_key),
            RequestSource::Internal => return Err(BillingError::SignatureInvalid),
        };

        if !secure_eq(expected.as_bytes(), supplied.to_lowercase().as_bytes()) {
            warn!(project_id = %project.id, "Order request signature mismatch");
            return Err(BillingError::SignatureInvalid);
        }
        Ok(())
    }

    async fn process_payer_data(&mut self) -> BillingResult<()> {
        let geo = locate_payer(
            self.service.geo.as_ref(),
            &self.request.payer_ip,
            self.service.settings.call_timeout(),
        )
        .await?;

        self.checked.payer = Some(PayerData {
            ip: self.request.payer_ip.clone(),
            country: geo.country_code.to_uppercase(),
            country_name: geo.country_name,
            city: geo.city,
            subdivision: geo.subdivision.filter(|s| !s.trim().is_empty()),
            timezone: geo.timezone,
            email: self.request.payer_email.clone(),
            phone: self.request.payer_phone.clone(),
        });
        Ok(())
    }

    fn process_currency(&mut self) -> BillingResult<()> {
        let code = self.request.currency.as_deref().unwrap_or_default();
        let currency = self.snapshot.currency_by_a3(code)?;
        self.checked.currency = Some(currency.clone());
        Ok(())
    }

    fn process_fixed_package(&mut self) -> BillingResult<()> {
        let region = self
            .request
            .region
            .clone()
            .filter(|r| !r.trim().is_empty())
            .or_else(|| self.checked.payer.as_ref().map(|p| p.country.clone()))
            .map(|r| r.trim().to_uppercase())
            .filter(|r| !r.is_empty())
            .ok_or(BillingError::PayerRegionUnknown)?;

        let package = {
            let packages = self
                .project()?
                .fixed_packages
                .get(&region)
                .filter(|p| !p.is_empty())
                .ok_or(BillingError::FixedPackageForRegionNotFound)?;

            let requested_currency = self.checked.currency.as_ref().map(|c| c.code_a3.as_str());
            packages
                .iter()
                .find(|p| {
                    p.is_active
                        && p.price == self.request.amount
                        && requested_currency
                            .map(|code| p.currency.eq_ignore_ascii_case(code))
                            .unwrap_or(true)
                })
                .cloned()
                .ok_or(BillingError::FixedPackageNotFound)?
        };

        if self.checked.currency.is_none() {
            let currency = self.snapshot.currency_by_a3(&package.currency)?.clone();
            self.checked.currency = Some(currency);
        }

        debug!(project_id = %self.request.project_id, package_id = %package.id, region = %region, "Fixed package matched");
        self.checked.fixed_package = Some(package);
        Ok(())
    }

    async fn process_project_order_id(&self) -> BillingResult<()> {
        let project_order_id = self.request.order_id.as_deref().unwrap_or_default();
        let existing = self
            .service
            .orders
            .find_by_project_order_id(&self.project()?.id, project_order_id)
            .await?;

        if existing.is_some() {
            return Err(BillingError::ProjectOrderIdIsDuplicate);
        }
        Ok(())
    }

    fn process_payment_method(&mut self) -> BillingResult<()> {
        let group = self.request.payment_method.as_deref().unwrap_or_default();
        let resolved = resolve_by_group(
            &self.snapshot,
            self.project()?,
            group,
            self.currency()?.code_int,
            self.service.settings.environment,
        )?;
        self.checked.payment_method = Some(resolved);
        Ok(())
    }

    fn process_limit_amounts(&self) -> BillingResult<()> {
        let project = self.project()?;
        let currency = self.currency()?;
        let amount = self.request.amount;

        if amount <= Decimal::ZERO {
            return Err(BillingError::AmountLowerThanMinAllowed);
        }

        let project_amount = match project.limits_currency {
            Some(limits_currency) if limits_currency != currency.code_int => {
                CurrencyConverter::new(&self.snapshot).convert(
                    currency.code_int,
                    limits_currency,
                    amount,
                )?
            }
            _ => amount,
        };

        if project_amount < project.min_payment_amount {
            return Err(BillingError::AmountLowerThanMinAllowed);
        }
        if project.max_payment_amount > Decimal::ZERO && project_amount > project.max_payment_amount
        {
            return Err(BillingError::AmountGreaterThanMaxAllowed);
        }

        if let Some(resolved) = &self.checked.payment_method {
            let method = &resolved.method;
            if amount < method.min_payment_amount {
                return Err(BillingError::AmountLowerThanMinAllowedPaymentMethod);
            }
            if method.max_payment_amount > Decimal::ZERO && amount > method.max_payment_amount {
                return Err(BillingError::AmountGreaterThanMaxAllowedPaymentMethod);
            }
        }
        Ok(())
    }

    fn prepare_order(&self) -> BillingResult<Order> {
        let project = self.project()?;
        let merchant = self
            .checked
            .merchant
            .as_ref()
            .ok_or(BillingError::MerchantNotFound)?;
        let currency = self.currency()?.clone();
        let merchant_currency = self.snapshot.currency(merchant.currency)?.clone();

        let amount = format_amount(self.request.amount);
        let merchant_amount = CurrencyConverter::new(&self.snapshot).convert(
            currency.code_int,
            merchant_currency.code_int,
            amount,
        )?;

        let payment_method = match &self.checked.payment_method {
            Some(resolved) => Some(resolved.to_order_method(&self.snapshot)?),
            None => None,
        };

        let id = Uuid::new_v4();
        let now = Utc::now();
        let mut order = Order {
            id,
            project: ProjectOrder {
                id: project.id.clone(),
                name: project.name.clone(),
                url_success: self
                    .request
                    .url_success
                    .clone()
                    .or_else(|| project.url_success.clone()),
                url_fail: self
                    .request
                    .url_fail
                    .clone()
                    .or_else(|| project.url_fail.clone()),
                merchant: MerchantSnapshot {
                    id: merchant.id.clone(),
                    name: merchant.name.clone(),
                    accounting_currency: merchant_currency,
                    is_vat_enabled: merchant.is_vat_enabled,
                    is_commission_to_user_enabled: merchant.is_commission_to_user_enabled,
                },
            },
            project_order_id: self.request.order_id.clone(),
            project_account: self.request.account.clone(),
            description: self
                .request
                .description
                .clone()
                .unwrap_or_else(|| format!("Payment by order # {}", id)),
            status: OrderStatus::New,
            project_income_amount: amount,
            project_income_currency: currency.clone(),
            project_outcome_amount: amount,
            project_outcome_currency: currency.clone(),
            payment_method_income_amount: amount,
            payment_method_income_currency: currency.clone(),
            payment_method_outcome_amount: amount,
            payment_method_outcome_currency: currency,
            amount_in_merchant_accounting_currency: merchant_amount,
            payment_method,
            payment_method_order_id: None,
            payment_method_order_closed_at: None,
            fixed_package: self.checked.fixed_package.clone(),
            payer: self.checked.payer.clone().unwrap_or_default(),
            project_fee_amount: None,
            psp_fee_amount: None,
            payment_system_fee_amount: None,
            to_payer_fee_amount: None,
            vat_amount: None,
            project_params: self.request.other.clone(),
            created_at: now,
            updated_at: now,
        };

        if order.payment_method.is_some() {
            CommissionEngine::new(&self.snapshot, &self.service.settings.psp_accounting_currency)
                .process_order_commissions(&mut order)?;
        }

        Ok(order)
    }

    async fn insert_order(&self, order: &Order) -> BillingResult<()> {
        match self.service.orders.insert(order).await {
            Ok(()) => Ok(()),
            Err(e) if e.violates(ORDERS_PROJECT_ORDER_ID_KEY) => {
                warn!(order_id = %order.id, project_id = %order.project.id, "Concurrent duplicate project order id");
                Err(BillingError::ProjectOrderIdIsDuplicate)
            }
            Err(e) => {
                warn!(order_id = %order.id, error = %e, "Order insert failed");
                Err(e.into())
            }
        }
    }
}
