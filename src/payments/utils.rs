use crate::payments::error::{GatewayError, GatewayResult};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::warn;

/// Request payload encoding
pub enum RequestBody<'a> {
    Empty,
    Json(&'a JsonValue),
    Form(&'a [(&'a str, &'a str)]),
}

#[derive(Clone)]
pub struct PaymentHttpClient {
    client: Client,
    timeout: Duration,
    max_retries: u32,
}

impl PaymentHttpClient {
    pub fn new(timeout: Duration, max_retries: u32) -> GatewayResult<Self> {
        let client =
            Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| GatewayError::NetworkError {
                    message: format!("failed to initialize HTTP client: {}", e),
                })?;

        Ok(Self {
            client,
            timeout,
            max_retries,
        })
    }

    /// Sends the request, retrying transport failures, 429 and 5xx answers with
    /// exponential backoff. 401 surfaces as [`GatewayError::Unauthorized`].
    ///
    /// Only for idempotent calls such as token grants.
    pub async fn request_json<T: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        url: &str,
        bearer_token: Option<&str>,
        body: RequestBody<'_>,
    ) -> GatewayResult<T> {
        self.send(method, url, bearer_token, body, self.max_retries)
            .await
    }

    /// Sends the request exactly once. Payment and refund creation go through
    /// here since a failed answer does not mean the gateway did nothing.
    pub async fn request_json_once<T: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        url: &str,
        bearer_token: Option<&str>,
        body: RequestBody<'_>,
    ) -> GatewayResult<T> {
        self.send(method, url, bearer_token, body, 0).await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        url: &str,
        bearer_token: Option<&str>,
        body: RequestBody<'_>,
        max_retries: u32,
    ) -> GatewayResult<T> {
        let mut last_error = None;
        for attempt in 0..=max_retries {
            let mut request = self.client.request(method.clone(), url);
            request = request.timeout(self.timeout);

            if let Some(token) = bearer_token {
                request = request.bearer_auth(token);
            }
            request = match &body {
                RequestBody::Empty => request,
                RequestBody::Json(payload) => request.json(*payload),
                RequestBody::Form(fields) => request.form(*fields),
            };

            let response = request
                .send()
                .await
                .map_err(|e| GatewayError::NetworkError {
                    message: format!("gateway request failed: {}", e),
                });

            match response {
                Ok(resp) => {
                    let status = resp.status();
                    let text = resp.text().await.unwrap_or_default();
                    if status.is_success() {
                        return serde_json::from_str::<T>(&text).map_err(|e| {
                            GatewayError::ProviderError {
                                status: status.as_u16(),
                                message: format!("invalid gateway JSON response: {}", e),
                            }
                        });
                    }

                    if status.as_u16() == 401 {
                        return Err(GatewayError::Unauthorized);
                    }

                    if (status.as_u16() == 429 || status.is_server_error())
                        && attempt < max_retries
                    {
                        warn!(
                            status = %status,
                            attempt = attempt + 1,
                            "gateway error, retrying"
                        );
                        tokio::time::sleep(Duration::from_secs(1 << attempt)).await;
                        continue;
                    }

                    return Err(GatewayError::ProviderError {
                        status: status.as_u16(),
                        message: text,
                    });
                }
                Err(e) => {
                    last_error = Some(e);
                    if attempt < max_retries {
                        tokio::time::sleep(Duration::from_secs(1 << attempt)).await;
                        continue;
                    }
                }
            }
        }

        Err(last_error.unwrap_or(GatewayError::NetworkError {
            message: "gateway request failed".to_string(),
        }))
    }
}

pub fn hmac_sha512_hex(payload: &[u8], secret: &str) -> Option<String> {
    use hmac::{Hmac, Mac};
    use sha2::Sha512;

    type HmacSha512 = Hmac<Sha512>;
    let mut mac = HmacSha512::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(payload);
    Some(hex::encode(mac.finalize().into_bytes()))
}

pub fn verify_hmac_sha512_hex(payload: &[u8], secret: &str, signature: &str) -> bool {
    match hmac_sha512_hex(payload, secret) {
        Some(computed) => secure_eq(
            computed.as_bytes(),
            signature.trim().to_lowercase().as_bytes(),
        ),
        None => false,
    }
}

pub fn secure_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter()
        .zip(b.iter())
        .fold(0_u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secure_eq_behaves_correctly() {
        assert!(secure_eq(b"abc", b"abc"));
        assert!(!secure_eq(b"abc", b"abd"));
        assert!(!secure_eq(b"abc", b"ab"));
    }

    #[test]
    fn callback_hmac_verification() {
        let payload = br#"{"refund_data":{"id":"r-1","status":"COMPLETED"}}"#;
        let signature = hmac_sha512_hex(payload, "callback-secret").unwrap();
        assert_eq!(signature.len(), 128);
        assert!(verify_hmac_sha512_hex(payload, "callback-secret", &signature));
        assert!(verify_hmac_sha512_hex(
            payload,
            "callback-secret",
            &signature.to_uppercase()
        ));
        assert!(!verify_hmac_sha512_hex(payload, "other-secret", &signature));
        assert!(!verify_hmac_sha512_hex(payload, "callback-secret", "not-a-valid-signature"));
    }
}
