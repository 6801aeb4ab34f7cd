#![allow(dead_code)]

use async_trait::async_trait;
use billing_server::cache::{ReferenceCache, ReferenceData};
use billing_server::config::{BillingConfig, Environment};
use billing_server::database::{
    DatabaseError, InMemoryOrderRepository, InMemoryRefundRepository, OrderRepository,
    RefundRepository,
};
use billing_server::models::{
    Commission, Country, Currency, CurrencyRate, FixedPackage, Merchant, Order, OrderStatus,
    PaymentMethod, PaymentMethodType, PaymentSystem, Project, ProjectPaymentMethod, Refund,
    SystemFees, TerminalCredentials, Vat,
};
use billing_server::payments::providers::{CardPayConfig, CardPayHandler};
use billing_server::payments::utils::hmac_sha512_hex;
use billing_server::payments::{
    BankCard, GatewayCallback, GatewayError, GatewayResult, GatewaySession, HandlerName,
    HandlerRegistry, PaymentCreateRequest, PaymentCreateResponse, PaymentSystemHandler,
    RefundCreateRequest, RefundCreateResponse,
};
use billing_server::services::{
    BillingService, GeoData, OrderCreateRequest, PaymentFormRequest, SavedCard, StaticGeoLookup,
    StaticSavedCards,
};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const CALLBACK_PASSWORD: &str = "callback-secret";
pub const P2_SECRET: &str = "p2-secret";
pub const US_PAYER_IP: &str = "8.8.8.8";
pub const CUSTOMER_TOKEN: &str = "customer-1";

pub fn currency(code_int: i32, code_a3: &str) -> Currency {
    Currency {
        code_int,
        code_a3: code_a3.to_string(),
        name: code_a3.to_string(),
        is_active: true,
    }
}

fn rate(from: i32, to: i32, rate: Decimal) -> CurrencyRate {
    CurrencyRate {
        currency_from: from,
        currency_to: to,
        rate,
        is_active: true,
    }
}

fn credentials(terminal: &str) -> TerminalCredentials {
    TerminalCredentials {
        terminal: terminal.to_string(),
        password: "terminal-password".to_string(),
        callback_password: CALLBACK_PASSWORD.to_string(),
    }
}

fn method(
    id: &str,
    group: &str,
    method_type: PaymentMethodType,
    currencies: Vec<i32>,
    max: Decimal,
) -> PaymentMethod {
    PaymentMethod {
        id: id.to_string(),
        name: id.to_string(),
        group_alias: group.to_string(),
        external_id: group.to_uppercase(),
        method_type,
        currencies,
        min_payment_amount: dec!(1),
        max_payment_amount: max,
        payment_system_id: "ps_cardpay".to_string(),
        test_settings: credentials("test-terminal"),
        is_active: true,
    }
}

fn commission(project_id: &str, method_id: &str, method: Decimal, psp: Decimal, to_user: Decimal) -> Commission {
    Commission {
        project_id: project_id.to_string(),
        payment_method_id: method_id.to_string(),
        payment_method_commission: method,
        psp_commission: psp,
        total_commission_to_user: to_user,
        start_date: Utc::now() - Duration::days(1),
        is_active: true,
    }
}

/// Reference data shared by the integration tests:
///
/// - `p1`: USD merchant, no VAT, no commission shifting, limits in RUB
///   (10..=100000), bank cards enabled in production
/// - `p2`: RUB merchant with VAT and commission shifting, fixed packages only,
///   signed requests only
pub fn reference_data() -> ReferenceData {
    let mut p1_methods = HashMap::new();
    p1_methods.insert(
        "bank_card".to_string(),
        ProjectPaymentMethod {
            id: "pm_card".to_string(),
            credentials: credentials("p1-terminal"),
            is_active: true,
        },
    );

    let mut p2_packages = HashMap::new();
    p2_packages.insert(
        "RU".to_string(),
        vec![
            FixedPackage {
                id: "pkg_500".to_string(),
                name: "500 gems".to_string(),
                currency: "RUB".to_string(),
                price: dec!(500),
                is_active: true,
            },
            FixedPackage {
                id: "pkg_old".to_string(),
                name: "retired".to_string(),
                currency: "RUB".to_string(),
                price: dec!(700),
                is_active: false,
            },
        ],
    );

    ReferenceData {
        currencies: vec![
            currency(643, "RUB"),
            currency(840, "USD"),
            currency(978, "EUR"),
        ],
        currency_rates: vec![
            rate(643, 840, dec!(64)),
            rate(840, 643, dec!(0.015625)),
            rate(643, 978, dec!(70)),
            rate(840, 978, dec!(1.25)),
        ],
        countries: vec![
            Country {
                code_a2: "RU".to_string(),
                code_int: 643,
                name: "Russia".to_string(),
                vat_by_subdivision: false,
                is_active: true,
            },
            Country {
                code_a2: "US".to_string(),
                code_int: 840,
                name: "United States".to_string(),
                vat_by_subdivision: true,
                is_active: true,
            },
        ],
        payment_methods: vec![
            method(
                "pm_card",
                "bank_card",
                PaymentMethodType::BankCard,
                vec![643, 840],
                Decimal::ZERO,
            ),
            method(
                "pm_wallet",
                "qiwi",
                PaymentMethodType::Ewallet,
                vec![643],
                dec!(15000),
            ),
        ],
        payment_systems: vec![PaymentSystem {
            id: "ps_cardpay".to_string(),
            name: "CardPay".to_string(),
            handler: "cardpay".to_string(),
            accounting_currency: 978,
            is_active: true,
        }],
        commissions: vec![
            commission("p1", "pm_card", dec!(2.5), dec!(1), dec!(1)),
            commission("p1", "pm_wallet", dec!(3), dec!(1), dec!(0)),
            commission("p2", "pm_card", dec!(3), dec!(1), dec!(2)),
            commission("p2", "pm_wallet", dec!(3), dec!(1), dec!(2)),
        ],
        vat: vec![
            Vat {
                country: "RU".to_string(),
                subdivision: None,
                vat: dec!(20),
                is_active: true,
            },
            Vat {
                country: "US".to_string(),
                subdivision: Some("CA".to_string()),
                vat: dec!(7.25),
                is_active: true,
            },
        ],
        system_fees: vec![
            SystemFees {
                payment_method_id: "pm_card".to_string(),
                region: "RU".to_string(),
                card_brand: Some("VISA".to_string()),
                percent_fee: dec!(1.9),
                fixed_fee: dec!(0.2),
                fixed_fee_currency: 978,
                start_date: Utc::now() - Duration::days(30),
                is_active: true,
            },
            SystemFees {
                payment_method_id: "pm_card".to_string(),
                region: "RU".to_string(),
                card_brand: Some("VISA".to_string()),
                percent_fee: dec!(2.1),
                fixed_fee: dec!(0.2),
                fixed_fee_currency: 978,
                start_date: Utc::now() - Duration::days(2),
                is_active: true,
            },
        ],
        projects: vec![
            Project {
                id: "p1".to_string(),
                merchant_id: "m1".to_string(),
                name: "Project one".to_string(),
                secret_key: "p1-secret".to_string(),
                is_active: true,
                signature_required: false,
                only_fixed_amounts: false,
                limits_currency: Some(643),
                min_payment_amount: dec!(10),
                max_payment_amount: dec!(100000),
                url_success: Some("https://p1.test/success".to_string()),
                url_fail: Some("https://p1.test/fail".to_string()),
                fixed_packages: HashMap::new(),
                payment_methods: p1_methods,
            },
            Project {
                id: "p2".to_string(),
                merchant_id: "m2".to_string(),
                name: "Project two".to_string(),
                secret_key: P2_SECRET.to_string(),
                is_active: true,
                signature_required: true,
                only_fixed_amounts: true,
                limits_currency: None,
                min_payment_amount: Decimal::ZERO,
                max_payment_amount: Decimal::ZERO,
                url_success: None,
                url_fail: None,
                fixed_packages: p2_packages,
                payment_methods: HashMap::new(),
            },
            Project {
                id: "p_off".to_string(),
                merchant_id: "m1".to_string(),
                name: "Disabled".to_string(),
                secret_key: "off".to_string(),
                is_active: false,
                signature_required: false,
                only_fixed_amounts: false,
                limits_currency: None,
                min_payment_amount: Decimal::ZERO,
                max_payment_amount: Decimal::ZERO,
                url_success: None,
                url_fail: None,
                fixed_packages: HashMap::new(),
                payment_methods: HashMap::new(),
            },
        ],
        merchants: vec![
            Merchant {
                id: "m1".to_string(),
                name: "Merchant USD".to_string(),
                currency: 840,
                is_vat_enabled: false,
                is_commission_to_user_enabled: false,
                is_active: true,
            },
            Merchant {
                id: "m2".to_string(),
                name: "Merchant RUB".to_string(),
                currency: 643,
                is_vat_enabled: true,
                is_commission_to_user_enabled: true,
                is_active: true,
            },
        ],
    }
}

pub fn moscow() -> GeoData {
    GeoData {
        country_code: "RU".to_string(),
        country_name: "Russia".to_string(),
        city: "Moscow".to_string(),
        subdivision: None,
        timezone: "Europe/Moscow".to_string(),
    }
}

pub fn california() -> GeoData {
    GeoData {
        country_code: "US".to_string(),
        country_name: "United States".to_string(),
        city: "San Francisco".to_string(),
        subdivision: Some("CA".to_string()),
        timezone: "America/Los_Angeles".to_string(),
    }
}

/// Payment system double: payments and refunds are answered locally, callback
/// parsing and signature checks are the real CardPay ones
pub struct MockGateway {
    cardpay: CardPayHandler,
    pub fail_payments: AtomicBool,
    pub fail_refunds: AtomicBool,
    pub payment_calls: AtomicUsize,
    pub refund_calls: AtomicUsize,
    pub last_payment: Mutex<Option<PaymentCreateRequest>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            cardpay: CardPayHandler::new(CardPayConfig::default(), Arc::new(GatewaySession::new()))
                .expect("cardpay handler"),
            fail_payments: AtomicBool::new(false),
            fail_refunds: AtomicBool::new(false),
            payment_calls: AtomicUsize::new(0),
            refund_calls: AtomicUsize::new(0),
            last_payment: Mutex::new(None),
        }
    }
}

#[async_trait]
impl PaymentSystemHandler for MockGateway {
    fn name(&self) -> HandlerName {
        HandlerName::Cardpay
    }

    async fn create_payment(
        &self,
        request: &PaymentCreateRequest,
    ) -> GatewayResult<PaymentCreateResponse> {
        self.payment_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_payment.lock().unwrap() = Some(request.clone());
        if self.fail_payments.load(Ordering::SeqCst) {
            return Err(GatewayError::CreateRequestFailed {
                message: "terminal is blocked".to_string(),
            });
        }
        Ok(PaymentCreateResponse {
            redirect_url: format!("https://gateway.test/pay/{}", request.order_id),
        })
    }

    async fn create_refund(
        &self,
        request: &RefundCreateRequest,
    ) -> GatewayResult<RefundCreateResponse> {
        self.refund_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_refunds.load(Ordering::SeqCst) {
            return Err(GatewayError::RefundRequestFailed {
                message: "refund period is over".to_string(),
            });
        }
        Ok(RefundCreateResponse {
            external_id: format!("rf-{}", request.refund_id),
        })
    }

    fn verify_callback(
        &self,
        payload: &[u8],
        signature: &str,
        callback_password: &str,
    ) -> GatewayResult<()> {
        self.cardpay
            .verify_callback(payload, signature, callback_password)
    }

    fn parse_callback(&self, payload: &[u8]) -> GatewayResult<GatewayCallback> {
        self.cardpay.parse_callback(payload)
    }
}

pub struct TestContext {
    pub service: BillingService,
    pub orders: Arc<InMemoryOrderRepository>,
    pub refunds: Arc<InMemoryRefundRepository>,
    pub gateway: Arc<MockGateway>,
}

pub fn context(environment: Environment) -> TestContext {
    let refunds = Arc::new(InMemoryRefundRepository::new());
    context_with_refunds(environment, refunds.clone(), refunds)
}

/// Context whose refund reads yield to the scheduler before answering
pub fn context_with_yielding_refunds(environment: Environment) -> TestContext {
    let refunds = Arc::new(InMemoryRefundRepository::new());
    let yielding = Arc::new(YieldingRefunds {
        inner: refunds.clone(),
    });
    context_with_refunds(environment, yielding, refunds)
}

fn context_with_refunds(
    environment: Environment,
    service_refunds: Arc<dyn RefundRepository>,
    refunds: Arc<InMemoryRefundRepository>,
) -> TestContext {
    let orders = Arc::new(InMemoryOrderRepository::new());
    let gateway = Arc::new(MockGateway::new());
    let service = build_service(environment, orders.clone(), service_refunds, gateway.clone());

    TestContext {
        service,
        orders,
        refunds,
        gateway,
    }
}

pub fn build_service(
    environment: Environment,
    orders: Arc<dyn OrderRepository>,
    refunds: Arc<dyn RefundRepository>,
    gateway: Arc<MockGateway>,
) -> BillingService {
    let mut handlers = HandlerRegistry::new();
    handlers.register(gateway);

    let geo = StaticGeoLookup::new()
        .with_entry(US_PAYER_IP, california())
        .with_fallback(moscow());
    let saved_cards = StaticSavedCards::new().with_cards(
        "p1",
        CUSTOMER_TOKEN,
        vec![SavedCard {
            id: "card-1".to_string(),
            masked_pan: "400000******0002".to_string(),
            expire: "02/2099".to_string(),
        }],
    );

    let settings = BillingConfig {
        environment,
        ..BillingConfig::default()
    };

    BillingService::new(
        Arc::new(ReferenceCache::from_data(reference_data())),
        orders,
        refunds,
        Arc::new(geo),
        Arc::new(saved_cards),
        handlers,
        settings,
    )
}

/// Refund repository that gives other tasks a chance to run inside every
/// total lookup
pub struct YieldingRefunds {
    pub inner: Arc<InMemoryRefundRepository>,
}

#[async_trait]
impl RefundRepository for YieldingRefunds {
    async fn insert(&self, refund: &Refund) -> Result<(), DatabaseError> {
        self.inner.insert(refund).await
    }

    async fn update(&self, refund: &Refund) -> Result<(), DatabaseError> {
        self.inner.update(refund).await
    }

    async fn find_by_id(&self, id: uuid::Uuid) -> Result<Option<Refund>, DatabaseError> {
        self.inner.find_by_id(id).await
    }

    async fn find_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<Refund>, DatabaseError> {
        self.inner.find_by_external_id(external_id).await
    }

    async fn find_by_order_id(&self, order_id: uuid::Uuid) -> Result<Vec<Refund>, DatabaseError> {
        self.inner.find_by_order_id(order_id).await
    }

    async fn total_refunded(&self, order_id: uuid::Uuid) -> Result<Decimal, DatabaseError> {
        tokio::task::yield_now().await;
        let total = self.inner.total_refunded(order_id).await;
        tokio::task::yield_now().await;
        total
    }

    async fn total_completed(&self, order_id: uuid::Uuid) -> Result<Decimal, DatabaseError> {
        tokio::task::yield_now().await;
        self.inner.total_completed(order_id).await
    }
}

pub fn order_request(project: &str, amount: Decimal, currency: &str) -> OrderCreateRequest {
    OrderCreateRequest {
        project_id: project.to_string(),
        amount,
        currency: Some(currency.to_string()),
        payer_ip: "127.0.0.1".to_string(),
        ..OrderCreateRequest::default()
    }
}

pub fn valid_card() -> BankCard {
    BankCard {
        pan: "4000000000000002".to_string(),
        holder: "JOHN DOE".to_string(),
        cvv: "123".to_string(),
        month: "02".to_string(),
        year: "2099".to_string(),
    }
}

pub fn card_payment(order_id: uuid::Uuid) -> PaymentFormRequest {
    PaymentFormRequest {
        order_id,
        payment_method_id: "pm_card".to_string(),
        email: "payer@example.com".to_string(),
        card: Some(valid_card()),
        ewallet_account: None,
        ip: None,
    }
}

pub fn sign(body: &[u8]) -> String {
    hmac_sha512_hex(body, CALLBACK_PASSWORD).expect("hmac")
}

pub fn payment_callback(order: &Order, status: &str, transaction_id: &str) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "merchant_order": { "id": order.id.to_string() },
        "payment_data": {
            "id": transaction_id,
            "status": status,
            "amount": order.payment_method_outcome_amount.to_string(),
            "currency": order.payment_method_outcome_currency.code_a3,
        }
    }))
    .expect("callback body")
}

pub fn refund_callback(
    order: &Order,
    external_id: &str,
    status: &str,
    amount: Decimal,
    currency: &str,
) -> Vec<u8> {
    let decline_reason = (status == "DECLINED").then_some("insufficient funds");
    serde_json::to_vec(&serde_json::json!({
        "merchant_order": { "id": order.id.to_string() },
        "payment_data": {
            "id": order.payment_method_order_id,
            "status": "COMPLETED",
            "amount": order.payment_method_outcome_amount.to_string(),
            "currency": order.payment_method_outcome_currency.code_a3,
        },
        "refund_data": {
            "id": external_id,
            "status": status,
            "amount": amount.to_string(),
            "currency": currency,
            "decline_reason": decline_reason,
        }
    }))
    .expect("callback body")
}

/// Order of `p1` for 1000 RUB paid by bank card and confirmed by the payment
/// system with transaction `tx-1`
pub async fn paid_order(ctx: &TestContext) -> Order {
    let mut request = order_request("p1", dec!(1000), "RUB");
    request.payment_method = Some("bank_card".to_string());
    let order = ctx.service.create_order(request).await.expect("order");

    ctx.service
        .create_payment(card_payment(order.id))
        .await
        .expect("payment");

    let stored = ctx.orders_get(order.id).await;
    let body = payment_callback(&stored, "COMPLETED", "tx-1");
    ctx.service
        .process_payment_callback("cardpay", &body, &sign(&body))
        .await
        .expect("payment callback");

    let paid = ctx.orders_get(order.id).await;
    assert_eq!(paid.status, OrderStatus::PaymentSystemComplete);
    paid
}

impl TestContext {
    pub async fn orders_get(&self, id: uuid::Uuid) -> Order {
        use billing_server::database::OrderRepository;
        self.orders
            .find_by_id(id)
            .await
            .expect("storage")
            .expect("order exists")
    }
}
