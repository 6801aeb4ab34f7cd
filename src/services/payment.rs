//! Payment creation from the payment form

use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};
use crate::models::{Order, OrderStatus, PaymentMethodType};
use crate::payments::types::{BankCard, PaymentCreateRequest};
use crate::services::bank_card::BankCardValidator;
use crate::services::billing::BillingService;
use crate::services::commission::CommissionEngine;
use crate::services::payment_method::{
    check_payment_method, resolve_credentials, ResolvedPaymentMethod,
};
use crate::services::saved_cards::SavedCard;

static EMAIL_RE: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();

fn email_valid(email: &str) -> BillingResult<bool> {
    let re = EMAIL_RE
        .get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$"))
        .as_ref()
        .map_err(|e| BillingError::Internal(e.to_string()))?;
    Ok(re.is_match(email))
}

/// Payer input submitted from the payment form
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentFormRequest {
    pub order_id: Uuid,
    pub payment_method_id: String,
    pub email: String,
    pub card: Option<BankCard>,
    pub ewallet_account: Option<String>,
    /// Payer IP as seen by the form; falls back to the one stored on the order
    pub ip: Option<String>,
}

pub struct PaymentCreateProcessor<'a> {
    service: &'a BillingService,
}

impl<'a> PaymentCreateProcessor<'a> {
    pub fn new(service: &'a BillingService) -> Self {
        Self { service }
    }

    pub async fn process(&self, request: PaymentFormRequest) -> BillingResult<String> {
        let mut order = self
            .service
            .orders
            .find_by_id(request.order_id)
            .await?
            .ok_or(BillingError::OrderNotFound)?;

        let resolved = self.validate(&order, &request)?;
        self.prepare(&mut order, &resolved, &request)?;
        self.service.orders.update(&order).await?;

        match self.send(&order, &resolved, &request).await {
            Ok(redirect_url) => {
                info!(order_id = %order.id, handler = %resolved.system.handler, "Payment created");
                Ok(redirect_url)
            }
            Err(e) => {
                error!(order_id = %order.id, handler = %resolved.system.handler, error = %e, "Payment create request failed");
                order.set_status(OrderStatus::PaymentSystemRejectOnCreate);
                self.service.orders.update(&order).await?;
                Err(match e {
                    BillingError::CreateRequestFailed(_) => e,
                    other => BillingError::CreateRequestFailed(other.to_string()),
                })
            }
        }
    }

    fn validate(
        &self,
        order: &Order,
        request: &PaymentFormRequest,
    ) -> BillingResult<ResolvedPaymentMethod> {
        if !order.can_create_payment() {
            return Err(BillingError::OrderAlreadyProcessed);
        }

        let snapshot = self.service.cache.snapshot();
        let project = snapshot.project(&order.project.id)?;
        if !project.is_active {
            return Err(BillingError::ProjectInactive);
        }

        let method = snapshot.payment_method(&request.payment_method_id)?;
        if !method
            .currencies
            .contains(&order.payment_method_income_currency.code_int)
        {
            return Err(BillingError::PaymentMethodNotFound);
        }
        let resolved =
            check_payment_method(&snapshot, project, method, self.service.settings.environment)?;

        if !email_valid(request.email.trim())? {
            return Err(BillingError::PaymentEmailInvalid);
        }

        match resolved.method.method_type {
            PaymentMethodType::BankCard => {
                let card = request
                    .card
                    .as_ref()
                    .ok_or(BillingError::BankCardPanIsInvalid)?;
                BankCardValidator::new(card).validate()?;
            }
            PaymentMethodType::Ewallet => {
                let has_account = request
                    .ewallet_account
                    .as_deref()
                    .map(|a| !a.trim().is_empty())
                    .unwrap_or(false);
                if !has_account {
                    return Err(BillingError::PaymentAccountInvalid);
                }
            }
            PaymentMethodType::Crypto => {}
        }

        let amount = order.payment_method_income_amount;
        if amount < resolved.method.min_payment_amount {
            return Err(BillingError::AmountLowerThanMinAllowedPaymentMethod);
        }
        if resolved.method.max_payment_amount > Decimal::ZERO
            && amount > resolved.method.max_payment_amount
        {
            return Err(BillingError::AmountGreaterThanMaxAllowedPaymentMethod);
        }

        Ok(resolved)
    }

    /// Stores the chosen method and its fees on the order
    fn prepare(
        &self,
        order: &mut Order,
        resolved: &ResolvedPaymentMethod,
        request: &PaymentFormRequest,
    ) -> BillingResult<()> {
        let snapshot = self.service.cache.snapshot();
        order.payment_method = Some(resolved.to_order_method(&snapshot)?);
        order.payer.email = Some(request.email.trim().to_string());
        if let Some(ip) = request.ip.as_deref().filter(|ip| !ip.trim().is_empty()) {
            order.payer.ip = ip.to_string();
        }

        // fees are recalculated from the untouched income amount
        order.payment_method_outcome_amount = order.payment_method_income_amount;
        CommissionEngine::new(&snapshot, &self.service.settings.psp_accounting_currency)
            .process_order_commissions(order)?;

        order.set_status(OrderStatus::PaymentSystemCreate);
        Ok(())
    }

    async fn send(
        &self,
        order: &Order,
        resolved: &ResolvedPaymentMethod,
        request: &PaymentFormRequest,
    ) -> BillingResult<String> {
        let snapshot = self.service.cache.snapshot();
        let credentials = resolve_credentials(
            &snapshot,
            &order.project.id,
            &resolved.method.id,
            self.service.settings.environment,
        )?;
        let handler = self.service.handlers.get_by_name(&resolved.system.handler)?;

        let response = handler
            .create_payment(&PaymentCreateRequest {
                order_id: order.id,
                description: order.description.clone(),
                amount: order.payment_method_outcome_amount,
                currency: order.payment_method_outcome_currency.code_a3.clone(),
                payment_method_external_id: resolved.method.external_id.clone(),
                credentials,
                payer_email: request.email.trim().to_string(),
                payer_ip: order.payer.ip.clone(),
                card: request.card.clone(),
                ewallet_account: request.ewallet_account.clone(),
                url_success: order.project.url_success.clone(),
                url_fail: order.project.url_fail.clone(),
            })
            .await?;

        Ok(response.redirect_url)
    }
}

/// One entry of the payment form
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentFormMethod {
    pub id: String,
    pub name: String,
    pub group_alias: String,
    pub method_type: PaymentMethodType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub saved_cards: Vec<SavedCard>,
}

pub struct PaymentFormMethods<'a> {
    service: &'a BillingService,
}

impl<'a> PaymentFormMethods<'a> {
    pub fn new(service: &'a BillingService) -> Self {
        Self { service }
    }

    /// Active methods of the order currency whose limits admit the order amount
    pub async fn list(
        &self,
        order_id: Uuid,
        customer_token: Option<&str>,
    ) -> BillingResult<Vec<PaymentFormMethod>> {
        let order = self
            .service
            .orders
            .find_by_id(order_id)
            .await?
            .ok_or(BillingError::OrderNotFound)?;

        let snapshot = self.service.cache.snapshot();
        let project = snapshot.project(&order.project.id)?;
        let amount = order.payment_method_income_amount;

        let mut methods: Vec<PaymentFormMethod> = snapshot
            .payment_methods_for_currency(order.payment_method_income_currency.code_int)
            .into_iter()
            .filter(|m| {
                check_payment_method(&snapshot, project, m, self.service.settings.environment)
                    .is_ok()
            })
            .filter(|m| amount >= m.min_payment_amount)
            .filter(|m| m.max_payment_amount <= Decimal::ZERO || amount <= m.max_payment_amount)
            .map(|m| PaymentFormMethod {
                id: m.id.clone(),
                name: m.name.clone(),
                group_alias: m.group_alias.clone(),
                method_type: m.method_type,
                saved_cards: Vec::new(),
            })
            .collect();

        if let Some(token) = customer_token.filter(|t| !t.trim().is_empty()) {
            if methods
                .iter()
                .any(|m| m.method_type == PaymentMethodType::BankCard)
            {
                let cards = self.saved_cards(&order.project.id, token).await;
                for method in methods
                    .iter_mut()
                    .filter(|m| m.method_type == PaymentMethodType::BankCard)
                {
                    method.saved_cards = cards.clone();
                }
            }
        }

        Ok(methods)
    }

    /// Best effort: any failure degrades to no saved cards
    async fn saved_cards(&self, project_id: &str, customer_token: &str) -> Vec<SavedCard> {
        let lookup = self.service.saved_cards.saved_cards(project_id, customer_token);
        match tokio::time::timeout(self.service.settings.call_timeout(), lookup).await {
            Ok(Ok(cards)) => cards,
            Ok(Err(e)) => {
                warn!(project_id = %project_id, error = %e, "Saved cards lookup failed");
                Vec::new()
            }
            Err(_) => {
                warn!(project_id = %project_id, "Saved cards lookup timed out");
                Vec::new()
            }
        }
    }
}
