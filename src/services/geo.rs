//! Payer geolocation collaborator

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::warn;

use crate::error::{BillingError, BillingResult};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GeoData {
    pub country_code: String,
    pub country_name: String,
    pub city: String,
    pub subdivision: Option<String>,
    pub timezone: String,
}

#[derive(Debug, thiserror::Error)]
#[error("geo lookup failed: {0}")]
pub struct GeoLookupError(pub String);

#[async_trait]
pub trait GeoLookup: Send + Sync {
    async fn lookup(&self, ip: &str) -> Result<GeoData, GeoLookupError>;
}

/// Resolves the payer location with a deadline; any failure is reported as an
/// unknown payer region
pub async fn locate_payer(
    geo: &dyn GeoLookup,
    ip: &str,
    deadline: Duration,
) -> BillingResult<GeoData> {
    match tokio::time::timeout(deadline, geo.lookup(ip)).await {
        Ok(Ok(data)) if !data.country_code.trim().is_empty() => Ok(data),
        Ok(Ok(_)) => {
            warn!(ip = %ip, "Geo lookup returned no country");
            Err(BillingError::PayerRegionUnknown)
        }
        Ok(Err(e)) => {
            warn!(ip = %ip, error = %e, "Geo lookup failed");
            Err(BillingError::PayerRegionUnknown)
        }
        Err(_) => {
            warn!(ip = %ip, timeout_ms = deadline.as_millis() as u64, "Geo lookup timed out");
            Err(BillingError::PayerRegionUnknown)
        }
    }
}

/// Fixed IP table with an optional fallback location
#[derive(Debug, Clone, Default)]
pub struct StaticGeoLookup {
    entries: HashMap<String, GeoData>,
    fallback: Option<GeoData>,
}

impl StaticGeoLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, ip: impl Into<String>, data: GeoData) -> Self {
        self.entries.insert(ip.into(), data);
        self
    }

    pub fn with_fallback(mut self, data: GeoData) -> Self {
        self.fallback = Some(data);
        self
    }
}

#[async_trait]
impl GeoLookup for StaticGeoLookup {
    async fn lookup(&self, ip: &str) -> Result<GeoData, GeoLookupError> {
        self.entries
            .get(ip)
            .or(self.fallback.as_ref())
            .cloned()
            .ok_or_else(|| GeoLookupError(format!("no location for {}", ip)))
    }
}

/// GeoIP service answering `GET {base_url}/{ip}` with a [`GeoData`] document
pub struct HttpGeoLookup {
    client: reqwest::Client,
    base_url: String,
}

impl HttpGeoLookup {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, GeoLookupError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GeoLookupError(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl GeoLookup for HttpGeoLookup {
    async fn lookup(&self, ip: &str) -> Result<GeoData, GeoLookupError> {
        let url = format!("{}/{}", self.base_url, ip);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| GeoLookupError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(GeoLookupError(format!("status {}", response.status())));
        }

        response
            .json::<GeoData>()
            .await
            .map_err(|e| GeoLookupError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SlowGeo;

    #[async_trait]
    impl GeoLookup for SlowGeo {
        async fn lookup(&self, _ip: &str) -> Result<GeoData, GeoLookupError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(GeoData::default())
        }
    }

    fn russia() -> GeoData {
        GeoData {
            country_code: "RU".to_string(),
            country_name: "Russia".to_string(),
            city: "Moscow".to_string(),
            subdivision: Some("MOW".to_string()),
            timezone: "Europe/Moscow".to_string(),
        }
    }

    #[tokio::test]
    async fn test_known_ip_is_located() {
        let geo = StaticGeoLookup::new().with_entry("127.0.0.1", russia());
        let data = locate_payer(&geo, "127.0.0.1", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(data.country_code, "RU");
    }

    #[tokio::test]
    async fn test_failures_map_to_unknown_region() {
        let geo = StaticGeoLookup::new();
        assert_eq!(
            locate_payer(&geo, "10.0.0.1", Duration::from_secs(1)).await,
            Err(BillingError::PayerRegionUnknown)
        );
        assert_eq!(
            locate_payer(&SlowGeo, "10.0.0.1", Duration::from_millis(20)).await,
            Err(BillingError::PayerRegionUnknown)
        );
    }

    #[tokio::test]
    async fn test_http_lookup_reads_service_document() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/8.8.8.8"))
            .respond_with(ResponseTemplate::new(200).set_body_json(russia()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/1.1.1.1"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let geo = HttpGeoLookup::new(server.uri(), Duration::from_secs(2)).unwrap();
        assert_eq!(geo.lookup("8.8.8.8").await.unwrap(), russia());
        assert!(geo.lookup("1.1.1.1").await.is_err());
    }
}
