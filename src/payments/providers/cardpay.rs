use crate::models::TerminalCredentials;
use crate::payments::error::{GatewayError, GatewayResult};
use crate::payments::provider::PaymentSystemHandler;
use crate::payments::session::{token_key, GatewaySession, TokenAuthority};
use crate::payments::types::{
    CallbackKind, GatewayCallback, GatewayStatus, GatewayToken, HandlerName,
    PaymentCreateRequest, PaymentCreateResponse, RefundCreateRequest, RefundCreateResponse,
};
use crate::payments::utils::{verify_hmac_sha512_hex, PaymentHttpClient, RequestBody};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct CardPayConfig {
    pub api_url: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for CardPayConfig {
    fn default() -> Self {
        Self {
            api_url: "https://sandbox.cardpay.com".to_string(),
            timeout_secs: 30,
            max_retries: 2,
        }
    }
}

impl CardPayConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_url: std::env::var("CARDPAY_API_URL")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or(defaults.api_url),
            timeout_secs: std::env::var("CARDPAY_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(defaults.timeout_secs),
            max_retries: std::env::var("CARDPAY_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(defaults.max_retries),
        }
    }
}

pub struct CardPayHandler {
    config: CardPayConfig,
    http: PaymentHttpClient,
    session: Arc<GatewaySession>,
}

impl CardPayHandler {
    pub fn new(config: CardPayConfig, session: Arc<GatewaySession>) -> GatewayResult<Self> {
        let http =
            PaymentHttpClient::new(Duration::from_secs(config.timeout_secs), config.max_retries)?;
        Ok(Self {
            config,
            http,
            session,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.api_url, path)
    }

    async fn request_token(&self, form: &[(&str, &str)]) -> GatewayResult<GatewayToken> {
        let raw: CardPayTokenResponse = self
            .http
            .request_json(
                reqwest::Method::POST,
                &self.endpoint("/api/auth/token"),
                None,
                RequestBody::Form(form),
            )
            .await
            .map_err(|e| GatewayError::AuthenticateFailed {
                message: e.to_string(),
            })?;

        Ok(GatewayToken::issued_now(
            raw.access_token,
            raw.refresh_token,
            raw.expires_in,
            raw.refresh_expires_in,
        ))
    }

    fn payment_payload(request: &PaymentCreateRequest) -> CardPayPaymentRequest<'_> {
        CardPayPaymentRequest {
            request: CardPayRequestMeta::new(),
            merchant_order: CardPayMerchantOrder {
                id: request.order_id.to_string(),
                description: &request.description,
            },
            payment_method: &request.payment_method_external_id,
            payment_data: CardPayAmount {
                amount: request.amount,
                currency: &request.currency,
            },
            card_account: request.card.as_ref().map(|card| CardPayCardAccount {
                card: CardPayCard {
                    pan: &card.pan,
                    holder: &card.holder,
                    security_code: &card.cvv,
                    expiration: card.expiration(),
                },
            }),
            ewallet_account: request
                .ewallet_account
                .as_deref()
                .map(|id| CardPayEwalletAccount { id }),
            customer: CardPayCustomer {
                email: &request.payer_email,
                ip: &request.payer_ip,
            },
            return_urls: CardPayReturnUrls {
                success_url: request.url_success.as_deref(),
                decline_url: request.url_fail.as_deref(),
                cancel_url: request.url_fail.as_deref(),
            },
        }
    }
}

#[async_trait]
impl TokenAuthority for CardPayHandler {
    async fn authenticate(&self, credentials: &TerminalCredentials) -> GatewayResult<GatewayToken> {
        self.request_token(&[
            ("grant_type", "password"),
            ("terminal_code", credentials.terminal.as_str()),
            ("password", credentials.password.as_str()),
        ])
        .await
    }

    async fn refresh(
        &self,
        credentials: &TerminalCredentials,
        refresh_token: &str,
    ) -> GatewayResult<GatewayToken> {
        self.request_token(&[
            ("grant_type", "refresh_token"),
            ("terminal_code", credentials.terminal.as_str()),
            ("refresh_token", refresh_token),
        ])
        .await
    }
}

#[async_trait]
impl PaymentSystemHandler for CardPayHandler {
    fn name(&self) -> HandlerName {
        HandlerName::Cardpay
    }

    async fn create_payment(
        &self,
        request: &PaymentCreateRequest,
    ) -> GatewayResult<PaymentCreateResponse> {
        let payload = serde_json::to_value(Self::payment_payload(request)).map_err(|e| {
            GatewayError::CreateRequestFailed {
                message: format!("failed to encode payment request: {}", e),
            }
        })?;
        let url = self.endpoint("/api/payments");

        let raw: CardPayPaymentResponse = self
            .session
            .with_token(
                &token_key(&request.payment_method_external_id, &request.credentials),
                self,
                &request.credentials,
                |token| {
                    let url = url.clone();
                    let payload = &payload;
                    async move {
                        self.http
                            .request_json_once(
                                reqwest::Method::POST,
                                &url,
                                Some(&token),
                                RequestBody::Json(payload),
                            )
                            .await
                    }
                },
            )
            .await
            .map_err(|e| match e {
                GatewayError::AuthenticateFailed { .. } => e,
                other => GatewayError::CreateRequestFailed {
                    message: other.to_string(),
                },
            })?;

        let redirect_url = raw.redirect_url.filter(|u| !u.trim().is_empty()).ok_or(
            GatewayError::CreateRequestFailed {
                message: "gateway response carries no redirect url".to_string(),
            },
        )?;
        info!(order_id = %request.order_id, "cardpay payment created");

        Ok(PaymentCreateResponse { redirect_url })
    }

    async fn create_refund(
        &self,
        request: &RefundCreateRequest,
    ) -> GatewayResult<RefundCreateResponse> {
        let payload = serde_json::json!({
            "request": CardPayRequestMeta::with_id(request.refund_id),
            "merchant_order": {
                "id": request.order_id.to_string(),
                "description": request.reason,
            },
            "payment_data": { "id": request.payment_transaction_id },
            "refund_data": CardPayAmount {
                amount: request.amount,
                currency: &request.currency,
            },
        });
        let url = self.endpoint("/api/refunds");

        let raw: CardPayRefundResponse = self
            .session
            .with_token(
                &token_key(&request.payment_method_external_id, &request.credentials),
                self,
                &request.credentials,
                |token| {
                    let url = url.clone();
                    let payload = &payload;
                    async move {
                        self.http
                            .request_json_once(
                                reqwest::Method::POST,
                                &url,
                                Some(&token),
                                RequestBody::Json(payload),
                            )
                            .await
                    }
                },
            )
            .await
            .map_err(|e| GatewayError::RefundRequestFailed {
                message: e.to_string(),
            })?;

        let external_id = raw
            .refund_data
            .and_then(|d| d.id)
            .filter(|id| !id.trim().is_empty())
            .ok_or(GatewayError::RefundRequestFailed {
                message: "gateway response carries no refund id".to_string(),
            })?;
        info!(refund_id = %request.refund_id, external_id = %external_id, "cardpay refund created");

        Ok(RefundCreateResponse { external_id })
    }

    fn verify_callback(
        &self,
        payload: &[u8],
        signature: &str,
        callback_password: &str,
    ) -> GatewayResult<()> {
        if callback_password.is_empty() || signature.trim().is_empty() {
            return Err(GatewayError::SignatureInvalid);
        }
        if verify_hmac_sha512_hex(payload, callback_password, signature) {
            Ok(())
        } else {
            warn!("cardpay callback signature mismatch");
            Err(GatewayError::SignatureInvalid)
        }
    }

    fn parse_callback(&self, payload: &[u8]) -> GatewayResult<GatewayCallback> {
        let raw: CardPayCallback =
            serde_json::from_slice(payload).map_err(|e| GatewayError::RequestIncorrect {
                message: e.to_string(),
            })?;

        let merchant_order_id = raw.merchant_order.id;
        let payment_id = raw.payment_data.as_ref().and_then(|p| p.id.clone());

        match (raw.refund_data, raw.payment_data) {
            (Some(refund), _) => Ok(GatewayCallback {
                kind: CallbackKind::Refund,
                merchant_order_id,
                payment_id,
                refund_id: Some(refund.id),
                status: refund.status,
                amount: refund.amount,
                currency: refund.currency,
                decline_reason: refund.decline_reason,
            }),
            (None, Some(payment)) => Ok(GatewayCallback {
                kind: CallbackKind::Payment,
                merchant_order_id,
                payment_id,
                refund_id: None,
                status: payment.status,
                amount: payment.amount,
                currency: payment.currency,
                decline_reason: payment.decline_reason,
            }),
            (None, None) => Err(GatewayError::RequestIncorrect {
                message: "callback carries neither payment_data nor refund_data".to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CardPayTokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
    refresh_expires_in: i64,
}

#[derive(Debug, Serialize)]
struct CardPayRequestMeta {
    id: String,
    time: String,
}

impl CardPayRequestMeta {
    fn new() -> Self {
        Self::with_id(Uuid::new_v4())
    }

    fn with_id(id: Uuid) -> Self {
        Self {
            id: id.to_string(),
            time: Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct CardPayMerchantOrder<'a> {
    id: String,
    description: &'a str,
}

#[derive(Debug, Serialize)]
struct CardPayAmount<'a> {
    #[serde(with = "rust_decimal::serde::float")]
    amount: Decimal,
    currency: &'a str,
}

#[derive(Serialize)]
struct CardPayCard<'a> {
    pan: &'a str,
    holder: &'a str,
    security_code: &'a str,
    expiration: String,
}

#[derive(Serialize)]
struct CardPayCardAccount<'a> {
    card: CardPayCard<'a>,
}

#[derive(Debug, Serialize)]
struct CardPayEwalletAccount<'a> {
    id: &'a str,
}

#[derive(Debug, Serialize)]
struct CardPayCustomer<'a> {
    email: &'a str,
    ip: &'a str,
}

#[derive(Debug, Serialize)]
struct CardPayReturnUrls<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    success_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    decline_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cancel_url: Option<&'a str>,
}

#[derive(Serialize)]
struct CardPayPaymentRequest<'a> {
    request: CardPayRequestMeta,
    merchant_order: CardPayMerchantOrder<'a>,
    payment_method: &'a str,
    payment_data: CardPayAmount<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    card_account: Option<CardPayCardAccount<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ewallet_account: Option<CardPayEwalletAccount<'a>>,
    customer: CardPayCustomer<'a>,
    return_urls: CardPayReturnUrls<'a>,
}

#[derive(Debug, Deserialize)]
struct CardPayPaymentResponse {
    redirect_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CardPayRefundData {
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CardPayRefundResponse {
    refund_data: Option<CardPayRefundData>,
}

#[derive(Debug, Deserialize)]
struct CardPayCallbackOrder {
    id: String,
}

#[derive(Debug, Deserialize)]
struct CardPayCallbackPayment {
    id: Option<String>,
    status: GatewayStatus,
    amount: Decimal,
    currency: String,
    decline_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CardPayCallbackRefund {
    id: String,
    status: GatewayStatus,
    amount: Decimal,
    currency: String,
    decline_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CardPayCallback {
    merchant_order: CardPayCallbackOrder,
    payment_data: Option<CardPayCallbackPayment>,
    refund_data: Option<CardPayCallbackRefund>,
}
