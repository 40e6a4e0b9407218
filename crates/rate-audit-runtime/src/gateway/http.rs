//! Remote gateway over HTTP.
//!
//! Posts `{tracking_number, client_id, carrier_id, fields}` to the configured
//! endpoint and expects a JSON object of field values back.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use rate_audit_core::{FactMap, RecordKey};
use reqwest::StatusCode;
use serde::Serialize;

use super::secrets::ApiCredential;
use super::{DataGateway, GatewayError};

/// Environment variable holding the gateway API key.
pub const GATEWAY_API_KEY_ENV: &str = "RATE_AUDIT_GATEWAY_KEY";

#[derive(Debug, Serialize)]
struct FetchRequest<'a> {
    tracking_number: &'a str,
    client_id: &'a str,
    carrier_id: &'a str,
    fields: &'a BTreeSet<String>,
}

/// Gateway backed by a remote data service.
pub struct HttpGateway {
    endpoint: String,
    credential: Option<ApiCredential>,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpGateway")
            .field("endpoint", &self.endpoint)
            .field("credential", &self.credential)
            .finish()
    }
}

impl HttpGateway {
    /// Create a gateway for `endpoint` with a transport-level timeout.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Unavailable(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            endpoint: endpoint.into(),
            credential: None,
            client,
        })
    }

    /// Send `credential` as the `x-api-key` header.
    pub fn with_credential(mut self, credential: ApiCredential) -> Self {
        self.credential = Some(credential);
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Map a non-success status to a gateway failure.
fn classify_status(status: StatusCode, body: String) -> GatewayError {
    match status {
        StatusCode::NOT_FOUND => GatewayError::NotFound(body),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GatewayError::Unauthorized(body),
        StatusCode::TOO_MANY_REQUESTS => GatewayError::Unavailable(format!("rate limited: {}", body)),
        s if s.is_server_error() => GatewayError::Unavailable(format!("{}: {}", s, body)),
        s => GatewayError::Unavailable(format!("unexpected status {}: {}", s, body)),
    }
}

#[async_trait]
impl DataGateway for HttpGateway {
    async fn fetch(
        &self,
        key: &RecordKey,
        fields: &BTreeSet<String>,
    ) -> Result<FactMap, GatewayError> {
        let body = FetchRequest {
            tracking_number: &key.tracking_number,
            client_id: &key.client_id,
            carrier_id: &key.carrier_id,
            fields,
        };

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(credential) = &self.credential {
            // Only expose the credential here, at the point of use
            request = request.header("x-api-key", credential.expose());
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                GatewayError::Unavailable("request timed out".to_string())
            } else {
                GatewayError::Unavailable(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(status, text));
        }

        let facts: FactMap = response
            .json()
            .await
            .map_err(|e| GatewayError::Unavailable(format!("malformed response: {}", e)))?;

        // Drop anything that was not asked for
        Ok(facts
            .into_iter()
            .filter(|(name, _)| fields.contains(name))
            .collect())
    }

    fn name(&self) -> &str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::secrets::CredentialSource;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            classify_status(StatusCode::NOT_FOUND, String::new()),
            GatewayError::NotFound(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::FORBIDDEN, String::new()),
            GatewayError::Unauthorized(_)
        ));
        assert!(classify_status(StatusCode::TOO_MANY_REQUESTS, String::new()).is_transient());
        assert!(classify_status(StatusCode::BAD_GATEWAY, String::new()).is_transient());
    }

    #[test]
    fn test_debug_hides_credential() {
        let gateway = HttpGateway::new("http://localhost:8080/facts", Duration::from_secs(5))
            .unwrap()
            .with_credential(ApiCredential::new(
                "sk-gateway-secret",
                CredentialSource::Programmatic,
                "gateway API key",
            ));
        let debug = format!("{:?}", gateway);
        assert!(!debug.contains("sk-gateway-secret"));
        assert!(debug.contains("localhost:8080"));
    }
}
