use billing_server::models::TerminalCredentials;
use billing_server::payments::providers::{CardPayConfig, CardPayHandler};
use billing_server::payments::{
    token_key, GatewayError, GatewaySession, PaymentCreateRequest, PaymentSystemHandler,
    RefundCreateRequest, TokenState,
};
use rust_decimal_macros::dec;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const METHOD_KEY: &str = "BANKCARD";

fn credentials() -> TerminalCredentials {
    TerminalCredentials {
        terminal: "T-100".to_string(),
        password: "terminal-password".to_string(),
        callback_password: "callback-secret".to_string(),
    }
}

fn handler(server: &MockServer, session: Arc<GatewaySession>) -> CardPayHandler {
    CardPayHandler::new(
        CardPayConfig {
            api_url: server.uri(),
            timeout_secs: 5,
            max_retries: 0,
        },
        session,
    )
    .unwrap()
}

fn token(access: &str, refresh: &str) -> serde_json::Value {
    json!({
        "access_token": access,
        "refresh_token": refresh,
        "expires_in": 300,
        "refresh_expires_in": 3600
    })
}

fn payment_request() -> PaymentCreateRequest {
    PaymentCreateRequest {
        order_id: Uuid::new_v4(),
        description: "Payment by order".to_string(),
        amount: dec!(1000),
        currency: "RUB".to_string(),
        payment_method_external_id: METHOD_KEY.to_string(),
        credentials: credentials(),
        payer_email: "payer@example.com".to_string(),
        payer_ip: "127.0.0.1".to_string(),
        card: None,
        ewallet_account: None,
        url_success: None,
        url_fail: None,
    }
}

fn refund_request(amount: rust_decimal::Decimal) -> RefundCreateRequest {
    RefundCreateRequest {
        refund_id: Uuid::new_v4(),
        order_id: Uuid::new_v4(),
        payment_transaction_id: "tx-1".to_string(),
        amount,
        currency: "RUB".to_string(),
        reason: "customer request".to_string(),
        payment_method_external_id: METHOD_KEY.to_string(),
        credentials: credentials(),
    }
}

async fn mount_password_grant(server: &MockServer, access: &str, times: u64) {
    Mock::given(method("POST"))
        .and(path("/api/auth/token"))
        .and(body_string_contains("grant_type=password"))
        .and(body_string_contains("terminal_code=T-100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token(access, "refresh-1")))
        .expect(times)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_create_payment_authenticates_once_and_reuses_token() {
    let server = MockServer::start().await;
    mount_password_grant(&server, "access-1", 1).await;

    Mock::given(method("POST"))
        .and(path("/api/payments"))
        .and(header("authorization", "Bearer access-1"))
        .and(body_partial_json(json!({
            "payment_method": METHOD_KEY,
            "payment_data": { "amount": 1000.0, "currency": "RUB" }
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "redirect_url": "https://cardpay.test/pay/1" })),
        )
        .expect(2)
        .mount(&server)
        .await;

    let session = Arc::new(GatewaySession::new());
    let cardpay = handler(&server, session.clone());

    let first = cardpay.create_payment(&payment_request()).await.unwrap();
    assert_eq!(first.redirect_url, "https://cardpay.test/pay/1");
    assert_eq!(session.state(&token_key(METHOD_KEY, &credentials())).await, TokenState::Authenticated);

    cardpay.create_payment(&payment_request()).await.unwrap();
}

#[tokio::test]
async fn test_rejected_token_is_refreshed_and_call_retried_once() {
    let server = MockServer::start().await;
    mount_password_grant(&server, "access-1", 1).await;

    Mock::given(method("POST"))
        .and(path("/api/auth/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=refresh-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token("access-2", "refresh-2")))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/payments"))
        .and(header("authorization", "Bearer access-1"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/payments"))
        .and(header("authorization", "Bearer access-2"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "redirect_url": "https://cardpay.test/pay/2" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let cardpay = handler(&server, Arc::new(GatewaySession::new()));
    let response = cardpay.create_payment(&payment_request()).await.unwrap();
    assert_eq!(response.redirect_url, "https://cardpay.test/pay/2");
}

#[tokio::test]
async fn test_second_rejection_is_not_retried_again() {
    let server = MockServer::start().await;
    mount_password_grant(&server, "access-1", 1).await;

    Mock::given(method("POST"))
        .and(path("/api/auth/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token("access-2", "refresh-2")))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/payments"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;

    let cardpay = handler(&server, Arc::new(GatewaySession::new()));
    let err = cardpay.create_payment(&payment_request()).await.unwrap_err();
    assert!(matches!(err, GatewayError::CreateRequestFailed { .. }));
}

#[tokio::test]
async fn test_failed_authentication_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/token"))
        .respond_with(ResponseTemplate::new(400).set_body_string("invalid terminal"))
        .mount(&server)
        .await;

    let session = Arc::new(GatewaySession::new());
    let cardpay = handler(&server, session.clone());
    let err = cardpay.create_payment(&payment_request()).await.unwrap_err();

    assert!(matches!(err, GatewayError::AuthenticateFailed { .. }));
    assert_eq!(session.state(&token_key(METHOD_KEY, &credentials())).await, TokenState::Unauthenticated);
}

#[tokio::test]
async fn test_payment_without_redirect_is_create_failure() {
    let server = MockServer::start().await;
    mount_password_grant(&server, "access-1", 1).await;
    Mock::given(method("POST"))
        .and(path("/api/payments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let cardpay = handler(&server, Arc::new(GatewaySession::new()));
    let err = cardpay.create_payment(&payment_request()).await.unwrap_err();
    assert!(matches!(err, GatewayError::CreateRequestFailed { .. }));
}

#[tokio::test]
async fn test_create_refund_returns_gateway_refund_id() {
    let server = MockServer::start().await;
    mount_password_grant(&server, "access-1", 1).await;

    let refund_id = Uuid::new_v4();
    Mock::given(method("POST"))
        .and(path("/api/refunds"))
        .and(header("authorization", "Bearer access-1"))
        .and(body_partial_json(json!({
            "request": { "id": refund_id.to_string() },
            "payment_data": { "id": "tx-1" },
            "refund_data": { "amount": 250.5, "currency": "RUB" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "refund_data": { "id": "cp-refund-7", "status": "IN_PROGRESS" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let cardpay = handler(&server, Arc::new(GatewaySession::new()));
    let response = cardpay
        .create_refund(&RefundCreateRequest {
            refund_id,
            order_id: Uuid::new_v4(),
            payment_transaction_id: "tx-1".to_string(),
            amount: dec!(250.5),
            currency: "RUB".to_string(),
            reason: "customer request".to_string(),
            payment_method_external_id: METHOD_KEY.to_string(),
            credentials: credentials(),
        })
        .await
        .unwrap();

    assert_eq!(response.external_id, "cp-refund-7");
}

#[tokio::test]
async fn test_refund_rejected_by_gateway() {
    let server = MockServer::start().await;
    mount_password_grant(&server, "access-1", 1).await;
    Mock::given(method("POST"))
        .and(path("/api/refunds"))
        .respond_with(ResponseTemplate::new(422).set_body_string("refund period is over"))
        .mount(&server)
        .await;

    let cardpay = handler(&server, Arc::new(GatewaySession::new()));
    let err = cardpay
        .create_refund(&RefundCreateRequest {
            refund_id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
            payment_transaction_id: "tx-1".to_string(),
            amount: dec!(10),
            currency: "RUB".to_string(),
            reason: "customer request".to_string(),
            payment_method_external_id: METHOD_KEY.to_string(),
            credentials: credentials(),
        })
        .await
        .unwrap_err();

    match err {
        GatewayError::RefundRequestFailed { message } => {
            assert!(message.contains("refund period is over"))
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_refund_creation_is_not_repeated_after_server_error() {
    let server = MockServer::start().await;
    mount_password_grant(&server, "access-1", 1).await;
    Mock::given(method("POST"))
        .and(path("/api/refunds"))
        .respond_with(ResponseTemplate::new(502))
        .expect(1)
        .mount(&server)
        .await;

    let cardpay = CardPayHandler::new(
        CardPayConfig {
            api_url: server.uri(),
            ..CardPayConfig::default()
        },
        Arc::new(GatewaySession::new()),
    )
    .unwrap();
    let err = cardpay
        .create_refund(&refund_request(dec!(1000)))
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::RefundRequestFailed { .. }));
}

#[tokio::test]
async fn test_payment_creation_is_not_repeated_after_server_error() {
    let server = MockServer::start().await;
    mount_password_grant(&server, "access-1", 1).await;
    Mock::given(method("POST"))
        .and(path("/api/payments"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let cardpay = CardPayHandler::new(
        CardPayConfig {
            api_url: server.uri(),
            ..CardPayConfig::default()
        },
        Arc::new(GatewaySession::new()),
    )
    .unwrap();
    let err = cardpay.create_payment(&payment_request()).await.unwrap_err();

    assert!(matches!(err, GatewayError::CreateRequestFailed { .. }));
}

#[tokio::test]
async fn test_each_terminal_authenticates_with_its_own_credentials() {
    let server = MockServer::start().await;
    mount_password_grant(&server, "access-test", 1).await;
    Mock::given(method("POST"))
        .and(path("/api/auth/token"))
        .and(body_string_contains("grant_type=password"))
        .and(body_string_contains("terminal_code=T-200"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token("access-prod", "refresh-9")))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/payments"))
        .and(header("authorization", "Bearer access-test"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "redirect_url": "https://cardpay.test/pay/test" })),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/payments"))
        .and(header("authorization", "Bearer access-prod"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "redirect_url": "https://cardpay.test/pay/prod" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let session = Arc::new(GatewaySession::new());
    let cardpay = handler(&server, session.clone());

    let first = cardpay.create_payment(&payment_request()).await.unwrap();
    assert_eq!(first.redirect_url, "https://cardpay.test/pay/test");

    let mut production = payment_request();
    production.credentials.terminal = "T-200".to_string();
    let second = cardpay.create_payment(&production).await.unwrap();
    assert_eq!(second.redirect_url, "https://cardpay.test/pay/prod");

    assert_eq!(
        session
            .state(&token_key(METHOD_KEY, &production.credentials))
            .await,
        TokenState::Authenticated
    );
}
