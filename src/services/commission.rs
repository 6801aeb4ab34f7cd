//! Order fee calculation
//!
//! All percentages apply to the payment-method outcome amount `A` as it was
//! before any addition. VAT and the commission shifted to the payer are added
//! to `A`; every fee line is recorded in the payment-method currency and
//! converted into the accounting currency of each party.
//!
//! The calculation is all-or-nothing: fees are computed into
//! [`OrderCommissions`] and written to the order only when every lookup and
//! conversion succeeded.

use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::cache::ReferenceSnapshot;
use crate::error::{BillingError, BillingResult};
use crate::models::{Order, OrderFee, OrderFeePaymentSystem, OrderFeePsp};
use crate::money::{format_amount, percent_of};
use crate::services::currency_converter::CurrencyConverter;

/// Every fee line computed for one order
#[derive(Debug, Clone, PartialEq)]
pub struct OrderCommissions {
    pub vat_amount: Option<OrderFee>,
    pub to_payer_fee_amount: Option<OrderFee>,
    pub project_fee_amount: OrderFee,
    pub psp_fee_amount: OrderFeePsp,
    pub payment_system_fee_amount: OrderFeePaymentSystem,
    /// Final payment-method outcome amount
    pub payment_method_outcome_amount: Decimal,
}

impl OrderCommissions {
    pub fn apply_to(self, order: &mut Order) {
        order.vat_amount = self.vat_amount;
        order.to_payer_fee_amount = self.to_payer_fee_amount;
        order.project_fee_amount = Some(self.project_fee_amount);
        order.psp_fee_amount = Some(self.psp_fee_amount);
        order.payment_system_fee_amount = Some(self.payment_system_fee_amount);
        order.payment_method_outcome_amount = self.payment_method_outcome_amount;
    }
}

pub struct CommissionEngine<'a> {
    snapshot: &'a ReferenceSnapshot,
    /// Alphabetic code of the PSP accounting currency
    psp_accounting_currency: &'a str,
}

impl<'a> CommissionEngine<'a> {
    pub fn new(snapshot: &'a ReferenceSnapshot, psp_accounting_currency: &'a str) -> Self {
        Self {
            snapshot,
            psp_accounting_currency,
        }
    }

    /// Computes the fees of the order and stores them on it. The order is left
    /// untouched on error.
    pub fn process_order_commissions(&self, order: &mut Order) -> BillingResult<()> {
        let commissions = self.calculate(order).map_err(|e| {
            warn!(order_id = %order.id, error = %e, "Order commission calculation failed");
            e
        })?;
        commissions.apply_to(order);
        Ok(())
    }

    pub fn calculate(&self, order: &Order) -> BillingResult<OrderCommissions> {
        let method = order
            .payment_method
            .as_ref()
            .ok_or(BillingError::PaymentMethodNotFound)?;
        let converter = CurrencyConverter::new(self.snapshot);
        let merchant = &order.project.merchant;

        let base = order.payment_method_outcome_amount;
        let method_currency = order.payment_method_outcome_currency.code_int;
        let merchant_currency = merchant.accounting_currency.code_int;
        let psp_currency = self.snapshot.currency_by_a3(self.psp_accounting_currency)?.code_int;
        let system_currency = method.payment_system.accounting_currency.code_int;

        let mut outcome = base;

        let vat_amount = if merchant.is_vat_enabled {
            let vat = self
                .snapshot
                .vat(&order.payer.country, order.payer.subdivision.as_deref())?;
            let amount = percent_of(base, vat.vat);
            outcome += amount;
            Some(OrderFee {
                amount_payment_method_currency: amount,
                amount_merchant_currency: converter.convert(
                    method_currency,
                    merchant_currency,
                    amount,
                )?,
            })
        } else {
            None
        };

        let commission = self.snapshot.commission(&order.project.id, &method.id)?;
        let method_commission = percent_of(base, commission.payment_method_commission);
        let psp_commission = percent_of(base, commission.psp_commission);
        let mut total = method_commission + psp_commission;

        let to_payer_fee_amount = if merchant.is_commission_to_user_enabled {
            let to_user = percent_of(base, commission.total_commission_to_user);
            total -= to_user;
            outcome += to_user;
            Some(OrderFee {
                amount_payment_method_currency: to_user,
                amount_merchant_currency: converter.convert(
                    method_currency,
                    merchant_currency,
                    to_user,
                )?,
            })
        } else {
            None
        };

        let project_fee_amount = OrderFee {
            amount_payment_method_currency: total,
            amount_merchant_currency: converter.convert(method_currency, merchant_currency, total)?,
        };

        let psp_fee_amount = OrderFeePsp {
            amount_payment_method_currency: psp_commission,
            amount_merchant_currency: converter.convert(
                method_currency,
                merchant_currency,
                psp_commission,
            )?,
            amount_psp_currency: converter.convert(method_currency, psp_currency, psp_commission)?,
        };

        let payment_system_fee_amount = OrderFeePaymentSystem {
            amount_payment_method_currency: method_commission,
            amount_payment_system_currency: converter.convert(
                method_currency,
                system_currency,
                method_commission,
            )?,
            amount_merchant_currency: converter.convert(
                method_currency,
                merchant_currency,
                method_commission,
            )?,
        };

        let payment_method_outcome_amount = format_amount(outcome);
        debug!(
            order_id = %order.id,
            base = %base,
            outcome = %payment_method_outcome_amount,
            project_fee = %total,
            "Order commissions calculated"
        );

        Ok(OrderCommissions {
            vat_amount,
            to_payer_fee_amount,
            project_fee_amount,
            psp_fee_amount,
            payment_system_fee_amount,
            payment_method_outcome_amount,
        })
    }
}
