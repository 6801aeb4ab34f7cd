//! Payment method eligibility and terminal credentials

use crate::cache::ReferenceSnapshot;
use crate::config::Environment;
use crate::error::{BillingError, BillingResult};
use crate::models::{
    OrderPaymentMethod, OrderPaymentSystem, PaymentMethod, PaymentSystem, Project,
    TerminalCredentials,
};

/// A payment method that passed every eligibility check, with its system
#[derive(Debug, Clone)]
pub struct ResolvedPaymentMethod {
    pub method: PaymentMethod,
    pub system: PaymentSystem,
}

impl ResolvedPaymentMethod {
    /// Snapshot stored on the order
    pub fn to_order_method(&self, snapshot: &ReferenceSnapshot) -> BillingResult<OrderPaymentMethod> {
        let accounting_currency = snapshot.currency(self.system.accounting_currency)?.clone();
        Ok(OrderPaymentMethod {
            id: self.method.id.clone(),
            name: self.method.name.clone(),
            group_alias: self.method.group_alias.clone(),
            external_id: self.method.external_id.clone(),
            method_type: self.method.method_type,
            payment_system: OrderPaymentSystem {
                id: self.system.id.clone(),
                name: self.system.name.clone(),
                handler: self.system.handler.clone(),
                accounting_currency,
            },
        })
    }
}

/// Checks an already looked-up method: active method, active system and, in
/// production, explicit enablement on the project with complete credentials
pub fn check_payment_method(
    snapshot: &ReferenceSnapshot,
    project: &Project,
    method: &PaymentMethod,
    environment: Environment,
) -> BillingResult<ResolvedPaymentMethod> {
    if !method.is_active {
        return Err(BillingError::PaymentMethodInactive);
    }

    let system = snapshot.payment_system(&method.payment_system_id)?;
    if !system.is_active {
        return Err(BillingError::PaymentSystemInactive);
    }

    if environment.is_production() {
        let settings = project
            .payment_methods
            .get(&method.group_alias)
            .filter(|s| s.is_active && s.credentials.is_complete())
            .ok_or(BillingError::PaymentMethodNotAllowed)?;
        if settings.id != method.id {
            return Err(BillingError::PaymentMethodIncompatible);
        }
    }

    Ok(ResolvedPaymentMethod {
        method: method.clone(),
        system: system.clone(),
    })
}

/// Resolves a method by group alias and currency, then checks it
pub fn resolve_by_group(
    snapshot: &ReferenceSnapshot,
    project: &Project,
    group_alias: &str,
    currency: i32,
    environment: Environment,
) -> BillingResult<ResolvedPaymentMethod> {
    let method = snapshot.payment_method_by_group_and_currency(group_alias, currency)?;
    check_payment_method(snapshot, project, method, environment)
}

/// Terminal credentials for gateway calls: the project's own settings in
/// production, the method's test terminal otherwise
pub fn resolve_credentials(
    snapshot: &ReferenceSnapshot,
    project_id: &str,
    method_id: &str,
    environment: Environment,
) -> BillingResult<TerminalCredentials> {
    let method = snapshot.payment_method(method_id)?;
    if !environment.is_production() {
        return Ok(method.test_settings.clone());
    }

    let project = snapshot.project(project_id)?;
    project
        .payment_methods
        .get(&method.group_alias)
        .filter(|s| s.credentials.is_complete())
        .map(|s| s.credentials.clone())
        .ok_or(BillingError::PaymentMethodNotAllowed)
}
