use thiserror::Error;

pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum GatewayError {
    #[error("authentication failed: {message}")]
    AuthenticateFailed { message: String },

    /// The gateway rejected the bearer token (HTTP 401)
    #[error("access token rejected by gateway")]
    Unauthorized,

    #[error("create request failed: {message}")]
    CreateRequestFailed { message: String },

    #[error("refund request failed: {message}")]
    RefundRequestFailed { message: String },

    #[error("handler incorrect: {handler}")]
    HandlerNotFound { handler: String },

    #[error("request incorrect: {message}")]
    RequestIncorrect { message: String },

    #[error("callback signature verification failed")]
    SignatureInvalid,

    #[error("network error: {message}")]
    NetworkError { message: String },

    #[error("gateway error: status={status}, message={message}")]
    ProviderError { status: u16, message: String },
}

impl GatewayError {
    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::NetworkError { .. } | GatewayError::Unauthorized => true,
            GatewayError::ProviderError { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
