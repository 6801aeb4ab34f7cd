use crate::payments::error::GatewayResult;
use crate::payments::types::{
    GatewayCallback, HandlerName, PaymentCreateRequest, PaymentCreateResponse,
    RefundCreateRequest, RefundCreateResponse,
};
use async_trait::async_trait;

/// One payment-system integration: payment creation, refunds and inbound
/// notification handling
#[async_trait]
pub trait PaymentSystemHandler: Send + Sync {
    fn name(&self) -> HandlerName;

    /// Registers the payment and returns the URL the payer is sent to
    async fn create_payment(
        &self,
        request: &PaymentCreateRequest,
    ) -> GatewayResult<PaymentCreateResponse>;

    async fn create_refund(&self, request: &RefundCreateRequest)
        -> GatewayResult<RefundCreateResponse>;

    /// Checks the signature over the raw body with the method's callback password
    fn verify_callback(
        &self,
        payload: &[u8],
        signature: &str,
        callback_password: &str,
    ) -> GatewayResult<()>;

    fn parse_callback(&self, payload: &[u8]) -> GatewayResult<GatewayCallback>;
}
