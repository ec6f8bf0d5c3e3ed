use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::SignalLogSettings;
use crate::models::{GeoPoint, Signal};
use crate::services::stores::{SignalLog, StoreError};

#[derive(Debug, Serialize)]
struct LookupRequest<'a> {
    category: &'a str,
    lat: f64,
    lng: f64,
    #[serde(rename = "radiusMeters")]
    radius_meters: f64,
    limit: usize,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    signals: Vec<Signal>,
}

/// HTTP client for the durable signal log (tertiary tier)
///
/// The log service exposes a best-effort lookup over its retained signals:
/// `POST {endpoint}/signals/lookup`.
pub struct HttpSignalLog {
    base_url: String,
    api_key: Option<String>,
    client: Client,
}

impl HttpSignalLog {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Result<Self, StoreError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            base_url: base_url.into(),
            api_key,
            client,
        })
    }

    /// Build a client when an endpoint is configured
    pub fn from_settings(settings: &SignalLogSettings) -> Result<Option<Self>, StoreError> {
        match settings.endpoint.as_deref().map(str::trim) {
            Some(endpoint) if !endpoint.is_empty() => Self::new(
                endpoint,
                settings.api_key.clone(),
                Duration::from_secs(settings.http_timeout_secs.unwrap_or(5)),
            )
            .map(Some),
            _ => Ok(None),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }
}

#[async_trait]
impl SignalLog for HttpSignalLog {
    async fn lookup(
        &self,
        category: &str,
        center: GeoPoint,
        radius_meters: f64,
        limit: usize,
    ) -> Result<Vec<Signal>, StoreError> {
        let url = self.url("/signals/lookup");
        tracing::debug!("Querying signal log: {}", url);

        let body = LookupRequest {
            category,
            lat: center.lat,
            lng: center.lng,
            radius_meters,
            limit,
        };

        let response = self
            .authorized(self.client.post(&url))
            .json(&body)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::SERVICE_UNAVAILABLE {
            return Err(StoreError::Unavailable(format!("signal log at {}", self.base_url)));
        }
        if !response.status().is_success() {
            return Err(StoreError::Api(format!(
                "Signal log lookup failed: {}",
                response.status()
            )));
        }

        let parsed: LookupResponse = response.json().await?;
        Ok(parsed.signals)
    }

    async fn health_check(&self) -> Result<bool, StoreError> {
        let response = self
            .authorized(self.client.get(self.url("/health")))
            .send()
            .await?;
        Ok(response.status().is_success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SignalStatus;

    #[tokio::test]
    async fn test_lookup_parses_signals() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/signals/lookup")
            .match_header("authorization", "Bearer secret")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"signals":[{"id":"s9","category":"water","location":{"lat":19.44,"lng":-99.13},"priority":2,"status":"active"}]}"#,
            )
            .create_async()
            .await;

        let log = HttpSignalLog::new(server.url(), Some("secret".to_string()), Duration::from_secs(2)).unwrap();
        let signals = log
            .lookup("water", GeoPoint::new(19.43, -99.13), 5000.0, 10)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].id, "s9");
        assert_eq!(signals[0].status, SignalStatus::Active);
    }

    #[tokio::test]
    async fn test_lookup_surfaces_http_errors() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/signals/lookup")
            .with_status(500)
            .create_async()
            .await;

        let log = HttpSignalLog::new(server.url(), None, Duration::from_secs(2)).unwrap();
        let result = log.lookup("water", GeoPoint::new(0.0, 0.0), 1000.0, 5).await;

        assert!(matches!(result, Err(StoreError::Api(_))));
    }

    #[tokio::test]
    async fn test_lookup_maps_503_to_unavailable() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/signals/lookup")
            .with_status(503)
            .create_async()
            .await;

        let log = HttpSignalLog::new(server.url(), None, Duration::from_secs(2)).unwrap();
        let result = log.lookup("water", GeoPoint::new(0.0, 0.0), 1000.0, 5).await;

        assert!(matches!(result, Err(StoreError::Unavailable(_))));
    }

    #[test]
    fn test_unconfigured_endpoint_yields_none() {
        let settings = SignalLogSettings {
            endpoint: Some("  ".to_string()),
            api_key: None,
            http_timeout_secs: None,
        };
        assert!(HttpSignalLog::from_settings(&settings).unwrap().is_none());
    }
}
